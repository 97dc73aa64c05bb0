//! Request body size limits.
//!
//! The guard needs the exact body bytes for signature checks, so bodies are
//! buffered here under a hard cap before anything else reads them.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap};

use crate::error::ShieldError;

/// Read the whole body, refusing anything larger than `limit` bytes.
pub async fn buffer_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, ShieldError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if declared.is_some_and(|len| len > limit) {
        return Err(ShieldError::PayloadTooLarge { limit });
    }

    axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| ShieldError::PayloadTooLarge { limit })
}
