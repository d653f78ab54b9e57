use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use sentinyl_core::SentinylError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Ingress error with the stable JSON body `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<Value>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "detail": self.detail }));
        (self.status, body).into_response()
    }
}

impl From<SentinylError> for ApiError {
    fn from(err: SentinylError) -> Self {
        match err {
            SentinylError::Validation(msg) => Self::bad_request(msg),
            SentinylError::Unauthorized(msg) => Self::unauthorized(msg),
            SentinylError::PaymentRequired(detail) => {
                Self::new(StatusCode::PAYMENT_REQUIRED, detail)
            }
            SentinylError::Forbidden(detail) => Self::new(StatusCode::FORBIDDEN, detail),
            SentinylError::NotFound(msg) => Self::not_found(msg),
            SentinylError::Conflict(msg) => Self::conflict(msg),
            SentinylError::Transport(msg) | SentinylError::Database(msg) => Self::internal(msg),
            SentinylError::Serialization(e) => Self::internal(e.to_string()),
            SentinylError::Internal(msg) => Self::internal(msg),
        }
    }
}
