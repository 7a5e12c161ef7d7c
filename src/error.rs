// src/error.rs
//! Mapping of core errors onto the HTTP contract: `{success:false, error}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::normalize::RejectedInput;
use crate::resolve::ChainExhausted;
use crate::retention::RetentionError;
use crate::retrieve::RetrievalError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    InvalidInput(#[from] RejectedInput),
    #[error("invalid request body: {0}")]
    BadRequest(String),
    #[error("could not resolve video: {0}")]
    Resolution(#[from] ChainExhausted),
    #[error("video resolved but download failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("download not found or expired")]
    NotFound,
    #[error("{0}")]
    Internal(String),
}

impl From<RetentionError> for ApiError {
    fn from(e: RetentionError) -> Self {
        match e {
            RetentionError::NotFound(_) => Self::NotFound,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Resolution(_) => StatusCode::BAD_GATEWAY,
            Self::Retrieval(e) if e.is_upstream() => StatusCode::BAD_GATEWAY,
            Self::Retrieval(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        }
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            ApiError::from(RejectedInput::Empty).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::BadRequest("missing field".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ChainExhausted { attempts: vec![] }).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(RetrievalError::Status(403)).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(RetrievalError::Io(std::io::Error::other("disk"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(RetentionError::NotFound(Default::default())).status(),
            StatusCode::NOT_FOUND
        );
    }
}
