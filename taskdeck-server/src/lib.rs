pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod middleware;
pub mod queries;

use std::sync::Arc;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthState;
use crate::config::ServerConfig;
use crate::database::ServerDatabase;
use crate::errors::ServerResult;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<ServerDatabase>,
    pub auth: AuthState,
    pub config: ServerConfig,
}

impl AppState {
    /// Connects, migrates and wires the auth service.
    pub async fn connect(config: ServerConfig) -> ServerResult<Arc<Self>> {
        let db = Arc::new(ServerDatabase::new(&config.database_url).await?);
        db.run_migrations().await?;
        let auth = AuthState::new(db.clone(), config.token_ttl());

        Ok(Arc::new(Self { db, auth, config }))
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/register", post(api::register))
        .route("/login", post(api::login))
        .route("/logout", post(api::logout))
        .route("/user", get(api::current_user).delete(api::delete_account))
        .route("/tasks", get(api::list_tasks).post(api::create_task))
        .route(
            "/tasks/:id",
            get(api::show_task)
                .put(api::update_task)
                .patch(api::update_task)
                .delete(api::delete_task),
        );

    Router::new()
        .nest("/api", api)
        .route("/sanctum/csrf-cookie", get(api::csrf_cookie))
        .route("/health", get(|| async { "OK" }))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .frontend_urls
        .iter()
        .filter_map(|url| match HeaderValue::from_str(url.trim()) {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::warn!(%url, %e, "ignoring invalid frontend origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(middleware::XSRF_HEADER),
        ])
}
