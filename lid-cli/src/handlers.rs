use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use lid_core::error::{ErrorKind, LockError};

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LockBody {
    pub signee: String,
    #[serde(default)]
    pub level: i64,
    /// Lease duration for this call, overriding the server default
    pub duration_ms: Option<i64>,
    /// Storage TTL hint for this call
    pub ttl_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UnlockBody {
    pub signee: String,
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct PurgeResponse {
    pub purged: usize,
}

// ─── Errors ─────────────────────────────────────────────────────────────────

/// A failed call, rendered as `{"success": false, "error": ..., "kind": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: None,
            message: message.into(),
        }
    }
}

impl From<LockError> for ApiError {
    fn from(err: LockError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            kind: Some(kind),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, error = %self.message, "Request failed");
        }
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
            kind: self.kind,
        };
        (self.status, Json(body)).into_response()
    }
}
