//! Typed error boundaries.
//!
//! Each component exposes a `thiserror` enum so callers (HTTP handlers,
//! the processor's ack/no-ack decision) can match on failure kind instead
//! of inspecting a string. Internal glue code still uses `anyhow` where no
//! caller needs to branch on the specific cause.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("missing X-API-Key header")]
    MissingCredential,
    #[error("malformed API key format")]
    MalformedCredential,
    #[error("unknown or inactive API key")]
    UnauthorizedCredential,
    #[error("over usage limit: used={used} limit={limit}")]
    OverLimit { used: u64, limit: u64 },
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
    #[error("batch too large: {0} events (max 100)")]
    BatchTooLarge(usize),
    #[error("event bus unavailable")]
    BusUnavailable,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            IngestError::MissingCredential => (StatusCode::UNAUTHORIZED, "missing_credential"),
            IngestError::MalformedCredential => {
                (StatusCode::UNAUTHORIZED, "malformed_credential")
            }
            IngestError::UnauthorizedCredential => (StatusCode::FORBIDDEN, "unauthorized"),
            IngestError::OverLimit { .. } => (StatusCode::TOO_MANY_REQUESTS, "over_limit"),
            IngestError::InvalidEnvelope(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_envelope"),
            IngestError::BatchTooLarge(_) => (StatusCode::BAD_REQUEST, "batch_too_large"),
            IngestError::BusUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "bus_unavailable"),
        };
        let body = match &self {
            IngestError::OverLimit { used, limit } => json!({
                "error": error,
                "message": self.to_string(),
                "used": used,
                "limit": limit,
                "remaining": limit.saturating_sub(*used),
            }),
            _ => json!({ "error": error, "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection unavailable: {0}")]
    Unavailable(String),
    #[error("bus operation failed: {0}")]
    Operation(#[from] redis::RedisError),
    #[error("in-memory fallback ring is full, dropping message")]
    FallbackFull,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("analytics store connection failed: {0}")]
    Connection(String),
    #[error("analytics write failed: {0}")]
    Write(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let status = match &self {
            BillingError::SignatureMismatch => StatusCode::BAD_REQUEST,
            BillingError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            BillingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("query failed: {0}")]
    Query(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("upload failed: {0}")]
    Upload(String),
}
