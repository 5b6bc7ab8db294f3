use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use larder_core::SyncError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Too many requests: {0}")]
    TooManyRequests(String, u64),
    #[error("Internal server error: {0}")]
    Internal(String),
    /// Sync failures keep the sync envelope on the wire
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Body shared by every failure, matching the failed sync envelope
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::TooManyRequests(message.into(), retry_after_secs)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Sync(SyncError::InvalidRequest(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) | Self::Sync(SyncError::Unauthorized(_)) => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TooManyRequests(_, _) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) | Self::Sync(SyncError::Internal(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            Self::TooManyRequests(_, secs) => Some(*secs),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_errors_map_to_status_codes() {
        let invalid = AppError::from(SyncError::InvalidRequest("`data` is required".into()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert!(invalid.to_string().starts_with("Invalid request"));

        let unauthorized = AppError::from(SyncError::Unauthorized("unknown token".into()));
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

        let internal = AppError::from(SyncError::Internal(larder_core::Error::Database(
            "disk full".into(),
        )));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limited_response_sets_retry_after() {
        let response = AppError::too_many_requests("slow down", 42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
