use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::job::SnapshotError;

/// Diagnostic attached to error responses for the response logger
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

/// Errors returned by HTTP handlers
///
/// Job failures carry the real cause for the log only; the client sees a
/// generic message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("failed to create snapshot")]
    JobFailed { detail: String },

    #[error("failed to deliver snapshot")]
    Delivery { detail: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::JobFailed { .. } | ApiError::Delivery { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::JobFailed { detail } | ApiError::Delivery { detail } => detail.clone(),
        }
    }
}

impl From<SnapshotError> for ApiError {
    fn from(err: SnapshotError) -> Self {
        if err.is_input_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::JobFailed {
                detail: err.to_string(),
            }
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Delivery {
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = ErrorDetail(self.detail());
        let mut response =
            (self.status(), Json(json!({ "error": self.to_string() }))).into_response();
        response.extensions_mut().insert(detail);
        response
    }
}
