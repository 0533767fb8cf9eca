use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use taskdeck_server::{app, config::ServerConfig, AppState};
use tower::ServiceExt;

/// An in-process server over a fresh in-memory database.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        let state = AppState::connect(ServerConfig::in_memory()).await.unwrap();
        Self {
            router: app(state.clone()),
            state,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("accept", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn register(&self, name: &str, email: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/api/register",
            None,
            Some(json!({
                "name": name,
                "email": email,
                "password": "secret-password",
                "password_confirmation": "secret-password",
            })),
        )
        .await
    }

    pub async fn login(&self, email: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/api/login",
            None,
            Some(json!({ "email": email, "password": "secret-password" })),
        )
        .await
    }

    /// Registers and signs in, returning the bearer token.
    pub async fn signed_in(&self, name: &str, email: &str) -> String {
        assert_eq!(self.register(name, email).await.status, StatusCode::CREATED);
        let response = self.login(email).await;
        assert_eq!(response.status, StatusCode::OK);
        response.body["token"].as_str().unwrap().to_string()
    }

    pub async fn create_task(&self, token: &str, body: Value) -> TestResponse {
        self.request(Method::POST, "/api/tasks", Some(token), Some(body))
            .await
    }
}
