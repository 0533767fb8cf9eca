use std::fmt::{Display, Formatter};

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use taskdeck_core::{DomainError, ErrorBody, ValidationErrors};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("{0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    ApiError(#[from] ApiError),

    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("argon2 Library Error: {0}")]
    HashingError(argon2::password_hash::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl From<argon2::password_hash::Error> for ServerError {
    fn from(error: argon2::password_hash::Error) -> Self {
        ServerError::HashingError(error)
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::ApiError(ApiError::unprocessable(rejection.body_text()))
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    Unprocessable(String),
    Forbidden(String),
}

impl ApiError {
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::Unprocessable(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unprocessable(message) => write!(f, "Status=422, Unprocessable: {}", message),
            ApiError::Forbidden(message) => write!(f, "Status=403, Forbidden: {}", message),
        }
    }
}

pub const UNAUTHENTICATED: &str = "Unauthenticated.";
pub const NOT_FOUND: &str = "Not found.";

/// `"The title field is required. (and 1 more error)"`
fn summary(errors: &ValidationErrors) -> String {
    let all = errors.flatten();
    let first = errors
        .first_message()
        .unwrap_or("The given data was invalid.")
        .to_string();
    match all.len() {
        0 | 1 => first,
        n => format!(
            "{} (and {} more error{})",
            first,
            n - 1,
            if n - 1 == 1 { "" } else { "s" }
        ),
    }
}

fn body(status: StatusCode, message: impl Into<String>, errors: ValidationErrors) -> Response {
    let body = ErrorBody {
        message: message.into(),
        errors,
    };
    (status, axum::Json(body)).into_response()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::ApiError(e) => {
                warn!("{}", e);
                match e {
                    ApiError::Unprocessable(message) => {
                        body(StatusCode::UNPROCESSABLE_ENTITY, message, ValidationErrors::new())
                    }
                    ApiError::Forbidden(message) => {
                        body(StatusCode::FORBIDDEN, message, ValidationErrors::new())
                    }
                }
            }
            ServerError::Domain(DomainError::Validation(errors)) => {
                body(StatusCode::UNPROCESSABLE_ENTITY, summary(&errors), errors)
            }
            ServerError::Domain(DomainError::Authentication(reason)) => {
                warn!(%reason, "authentication rejected");
                body(StatusCode::UNAUTHORIZED, UNAUTHENTICATED, ValidationErrors::new())
            }
            // Answered exactly like an unknown id so task existence never leaks.
            ServerError::Domain(DomainError::Authorization(task_id)) => {
                warn!(%task_id, "rejected access to a task owned by another user");
                body(StatusCode::NOT_FOUND, NOT_FOUND, ValidationErrors::new())
            }
            ServerError::Domain(DomainError::NotFound(what)) => {
                tracing::debug!(%what, "not found");
                body(StatusCode::NOT_FOUND, NOT_FOUND, ValidationErrors::new())
            }
            other => {
                error!(%other, "request failed");
                body(StatusCode::INTERNAL_SERVER_ERROR, "Server Error", ValidationErrors::new())
            }
        }
    }
}
