//! Error types for the control plane API
//!
//! Every non-2xx response carries the same JSON body shape,
//! `{success: false, error, details}`, which the uptime monitors and the
//! admin UI both consume.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dealsync_core_resilience::ResilienceError;
use dealsync_fetcher::SyncError;
use serde::Serialize;

/// JSON body for error responses
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// An error response: HTTP status plus the standard body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            error: self.error,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            // Fail-fast rejection or dead store: the service itself is
            // degraded, not the gateway path
            SyncError::Upstream(ResilienceError::CircuitOpen) => StatusCode::SERVICE_UNAVAILABLE,
            SyncError::Upstream(_) => StatusCode::BAD_GATEWAY,
            SyncError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        ApiError::new(status, "sync cycle failed").with_details(err.to_string())
    }
}
