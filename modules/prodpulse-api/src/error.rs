use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use prodpulse_common::PulseError;

/// HTTP-facing error. Every response body carries a human-readable `error`
/// field; `message` holds the detail when there is one.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error")]
    Validation(String),
    #[error("Not found")]
    NotFound(String),
    #[error("Conflict")]
    Conflict(String),
    #[error("Service unavailable")]
    Unavailable(String),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> Option<String> {
        match self {
            Self::Validation(m) | Self::NotFound(m) | Self::Conflict(m) | Self::Unavailable(m) => {
                Some(m.clone())
            }
            // Internal details stay in the logs, not the response.
            Self::Internal(_) => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!(error = %e, "request failed");
        }
        let mut body = json!({ "error": self.to_string() });
        if let Some(message) = self.message() {
            body["message"] = json!(message);
        }
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<PulseError> for ApiError {
    fn from(e: PulseError) -> Self {
        match e {
            PulseError::Validation(m) => Self::Validation(m),
            PulseError::NotFound(m) => Self::NotFound(m),
            PulseError::Conflict(m) => Self::Conflict(m),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}
