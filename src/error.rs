//! Request rejection taxonomy.
//!
//! Every way the guard (or a handler) can turn a request away maps to one
//! [`ShieldError`] variant, which knows its status code, a machine-readable
//! reason, and the message that is safe to show the client.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::security::SignatureError;

/// Coarse classification used for logging severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or unauthenticated input. User-correctable.
    Client,
    /// Quota or block. Expected under load.
    Quota,
    /// Unexpected failure inside the handler.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ShieldError {
    #[error("unsupported content type")]
    UnsupportedMediaType,

    #[error("invalid request signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("client is blocked for {retry_after}s")]
    Blocked { retry_after: u64 },

    #[error("rate limit exceeded, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("handler did not finish within {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body of every rejection.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub reason: &'static str,
}

impl ShieldError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Blocked { .. } | Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType => "unsupported_media_type",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::BadRequest(_) => "bad_request",
            Self::Blocked { .. } => "blocked",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout(_) => "request_timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Blocked { .. } | Self::RateLimited { .. } => ErrorClass::Quota,
            Self::Timeout(_) | Self::Internal(_) => ErrorClass::Internal,
            _ => ErrorClass::Client,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Blocked { retry_after } | Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Message shown to the client. Never includes internal detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::UnsupportedMediaType => "Invalid content type. Use application/json.".into(),
            Self::InvalidSignature(_) => "Invalid or missing request signature.".into(),
            Self::PayloadTooLarge { .. } => "Request body too large.".into(),
            Self::BadRequest(message) => message.clone(),
            Self::Blocked { .. } => "Too many requests. You have been temporarily blocked.".into(),
            Self::RateLimited { .. } => "Rate limit exceeded. Please try again later.".into(),
            Self::Timeout(_) => "Request timed out.".into(),
            Self::Internal(_) => "Internal server error".into(),
        }
    }
}

impl IntoResponse for ShieldError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message(),
            reason: self.reason(),
        };
        let mut response = (self.status(), Json(body)).into_response();
        if let Some(secs) = self.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
