use std::future::Future;
use std::sync::Arc;

use cookie::Cookie;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use taskdeck_core::{
    CreateTaskRequest, ErrorBody, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
    Task, UpdateTaskRequest, UserSummary,
};
use uuid::Uuid;

use crate::errors::{ClientError, ClientResult};
use crate::session::SessionStore;

/// Task endpoints as the board needs them.
pub trait TaskApi: Send + Sync + 'static {
    fn list_tasks(&self) -> impl Future<Output = ClientResult<Vec<Task>>> + Send;

    fn create_task(
        &self,
        request: &CreateTaskRequest,
    ) -> impl Future<Output = ClientResult<Task>> + Send;

    fn update_task(
        &self,
        id: Uuid,
        request: &UpdateTaskRequest,
    ) -> impl Future<Output = ClientResult<Task>> + Send;

    fn delete_task(&self, id: Uuid) -> impl Future<Output = ClientResult<()>> + Send;
}

const SESSION_COOKIE: &str = "taskdeck_session";
const XSRF_COOKIE: &str = "XSRF-TOKEN";
const XSRF_HEADER: &str = "X-XSRF-TOKEN";

/// HTTP client for the taskdeck API. Sends the stored credential as a bearer
/// header and keeps server cookies, echoing the CSRF cookie on writes so the
/// session cookie works on its own.
pub struct ApiClient {
    http: reqwest::Client,
    cookies: Arc<Jar>,
    origin: Url,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(server_url: &str, session: Arc<SessionStore>) -> ClientResult<Self> {
        let base_url = server_url.trim_end_matches('/').to_string();
        let origin = Url::parse(&base_url)
            .map_err(|e| ClientError::Configuration(format!("server url {server_url}: {e}")))?;

        let cookies = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .build()?;
        Ok(Self {
            http,
            cookies,
            origin,
            base_url,
            session,
        })
    }

    /// Fetches the CSRF cookie. Failure is logged and otherwise ignored; the
    /// bearer flow does not depend on it.
    pub async fn csrf_handshake(&self) {
        let url = format!("{}/sanctum/csrf-cookie", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("CSRF cookie fetched");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "CSRF handshake rejected");
            }
            Err(e) => {
                tracing::warn!(%e, "CSRF handshake failed");
            }
        }
    }

    pub async fn register(&self, request: &RegisterRequest) -> ClientResult<MessageResponse> {
        let builder = self.request(Method::POST, "/api/register").await.json(request);
        decode(builder.send().await?).await
    }

    pub async fn login(&self, request: &LoginRequest) -> ClientResult<LoginResponse> {
        let builder = self.request(Method::POST, "/api/login").await.json(request);
        decode(builder.send().await?).await
    }

    pub async fn logout(&self) -> ClientResult<()> {
        let builder = self.request(Method::POST, "/api/logout").await;
        check(builder.send().await?).await?;
        Ok(())
    }

    pub async fn current_user(&self) -> ClientResult<UserSummary> {
        let builder = self.request(Method::GET, "/api/user").await;
        decode(builder.send().await?).await
    }

    pub async fn delete_account(&self) -> ClientResult<()> {
        let builder = self.request(Method::DELETE, "/api/user").await;
        check(builder.send().await?).await?;
        Ok(())
    }

    /// Drops the server's session cookie from the jar.
    pub fn forget_session_cookie(&self) {
        self.cookies.add_cookie_str(
            &format!("{SESSION_COOKIE}=; Max-Age=0; Path=/"),
            &self.origin,
        );
    }

    /// The CSRF token the server handed out, if the handshake succeeded.
    pub fn xsrf_token(&self) -> Option<String> {
        let header = self.cookies.cookies(&self.origin)?;
        let header = header.to_str().ok()?;
        Cookie::split_parse(header)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == XSRF_COOKIE)
            .map(|cookie| cookie.value().to_string())
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let writes = !matches!(method, Method::GET | Method::HEAD | Method::OPTIONS);
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/json");
        if writes {
            if let Some(token) = self.xsrf_token() {
                builder = builder.header(XSRF_HEADER, token);
            }
        }
        match self.session.token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut builder = self.request(method, path).await;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        decode(builder.send().await?).await
    }
}

impl TaskApi for ApiClient {
    async fn list_tasks(&self) -> ClientResult<Vec<Task>> {
        self.send_json::<(), _>(Method::GET, "/api/tasks", None).await
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> ClientResult<Task> {
        self.send_json(Method::POST, "/api/tasks", Some(request)).await
    }

    async fn update_task(&self, id: Uuid, request: &UpdateTaskRequest) -> ClientResult<Task> {
        self.send_json(Method::PATCH, &format!("/api/tasks/{id}"), Some(request))
            .await
    }

    async fn delete_task(&self, id: Uuid) -> ClientResult<()> {
        let builder = self
            .request(Method::DELETE, &format!("/api/tasks/{id}"))
            .await;
        check(builder.send().await?).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let response = check(response).await?;
    Ok(response.json().await?)
}

/// Turns a non-2xx answer into the matching error.
async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.json::<ErrorBody>().await.ok();
    let message = body
        .as_ref()
        .map(|b| b.message.clone())
        .unwrap_or_else(|| status.to_string());
    tracing::debug!(%status, %message, "request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::FORBIDDEN => ClientError::Forbidden(message),
        StatusCode::NOT_FOUND => ClientError::NotFound,
        StatusCode::UNPROCESSABLE_ENTITY => ClientError::Validation {
            message,
            errors: body.map(|b| b.errors).unwrap_or_default(),
        },
        other => ClientError::Server {
            status: other.as_u16(),
            message,
        },
    })
}
