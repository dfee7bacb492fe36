use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hearth_core::ChatError;
use hearth_schema::ErrorBody;

/// Error surfaced to HTTP callers as `{"error": "..."}`.
///
/// Server-side faults are logged in full and answered with a generic message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// Map a controller failure; `failure` is the generic text for 500s.
    pub fn from_chat(error: ChatError, failure: &str) -> Self {
        match error {
            ChatError::Validation(message) => Self::bad_request(message),
            ChatError::NotFound(_) => Self::not_found("Session not found"),
            other => {
                tracing::error!(error = %other, "{failure}");
                Self::internal(failure)
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}
