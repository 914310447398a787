use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::query::graphite::GraphiteError;

/// How a failed render request is reported to the client.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Missing or malformed request parameter, including unparseable targets
    #[error("{0}")]
    InvalidParameter(String),
    /// Well-formed request the engine refuses to evaluate
    #[error("{0}")]
    BadRequest(String),
    /// Anything else; the detail is logged, never sent to the client
    #[error("internal error: {0}")]
    Internal(String),
}

impl RenderError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParameter(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ApiError {
        match self {
            Self::InvalidParameter(message) => ApiError::new("invalid_parameter", message.clone()),
            Self::BadRequest(message) => ApiError::new("bad_request", message.clone()),
            Self::Internal(_) => ApiError::new("internal_error", "Internal server error"),
        }
    }
}

impl From<GraphiteError> for RenderError {
    fn from(err: GraphiteError) -> Self {
        if err.is_user_error() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error category
    pub error: String,
    /// Human-readable error description
    pub message: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for RenderError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
