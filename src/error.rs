use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Error taxonomy shared by REST handlers and WebSocket event handlers.
/// Validation and authorization failures are resolved at the boundary and
/// never leave a partial mutation behind.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing required fields.
    #[error("{0}")]
    Validation(String),

    /// Unknown user/group/message/notification id.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Non-creator attempting an owner-only action, or a user acting on
    /// another user's private resource.
    #[error("{0}")]
    PermissionDenied(String),

    /// Missing or invalid token.
    #[error("{0}")]
    Unauthorized(String),

    /// Illegal state transition (e.g. creator leaving their own group).
    #[error("{0}")]
    InvalidOperation(String),

    /// Unexpected internal failure. Logged; surfaced as a generic 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidOperation(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Never leak internal details to the client.
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "request failed with internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
