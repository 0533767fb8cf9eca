use taskdeck_core::ValidationErrors;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    Validation {
        message: String,
        errors: ValidationErrors,
    },

    #[error("Unauthenticated")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found")]
    NotFound,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Failed to acquire lock: {0}")]
    LockError(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Transport faults and 5xx answers; worth a "try again" banner.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    /// Messages suitable for an alert: the field messages of a validation
    /// failure, otherwise the error itself.
    pub fn field_messages(&self) -> Vec<String> {
        match self {
            ClientError::Validation { message, errors } if errors.is_empty() => {
                vec![message.clone()]
            }
            ClientError::Validation { errors, .. } => errors.flatten(),
            other => vec![other.to_string()],
        }
    }
}
