use thiserror::Error;

/// Platform-wide error type. The ingress maps variants onto HTTP statuses;
/// workers treat everything except [`SentinylError::Database`] as a
/// per-finding failure and keep going.
#[derive(Error, Debug)]
pub enum SentinylError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication required: {0}")]
    Unauthorized(String),

    #[error("quota exceeded: {0}")]
    PaymentRequired(serde_json::Value),

    #[error("forbidden: {0}")]
    Forbidden(serde_json::Value),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for SentinylError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("record not found".to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for SentinylError {
    fn from(err: redis::RedisError) -> Self {
        Self::Transport(format!("redis: {err}"))
    }
}

impl From<reqwest::Error> for SentinylError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SentinylError>;
