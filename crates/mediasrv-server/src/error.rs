//! Server-specific error types: wraps [`mediasrv_core::CoreError`] and maps
//! it to HTTP status codes per spec.md §7's error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mediasrv_core::error::{AuthError, CoreError, PathError, RecordError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::Core(CoreError::Record(RecordError::NoSegmentsFound(_))) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ServerError::Core(CoreError::Auth(AuthError::AuthenticationFailed { .. })) => {
                (StatusCode::UNAUTHORIZED, "authentication failed".to_string())
            }
            ServerError::Core(CoreError::Path(PathError::NotConfigured(_))) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ServerError::Core(CoreError::Path(
                PathError::AlreadyPublishing | PathError::NoOnePublishing,
            )) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::Core(CoreError::BadRequest(_)) | ServerError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Core(CoreError::ClientDisconnected) => {
                // spec.md §7: silently swallow, but a handler that
                // reaches this far already owns the response -- closing
                // with no body is the closest axum equivalent.
                (StatusCode::OK, String::new())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, body).into_response()
    }
}
