//! Response assembly for guarded routes.
//!
//! # Responsibilities
//! - Stamp accumulated security headers onto handler and rejection responses
//! - Build the preflight response
//! - Render rate-limit telemetry headers

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::ShieldError;
use crate::security::headers::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};

/// Copy `headers` onto `response`, replacing values the handler set, except
/// that a handler-chosen `Content-Type` is kept.
pub fn apply_headers(response: &mut Response, headers: HeaderMap) {
    let target = response.headers_mut();
    let keep_content_type = target.contains_key(header::CONTENT_TYPE);

    for (name, value) in headers.iter() {
        if name == header::CONTENT_TYPE && keep_content_type {
            continue;
        }
        target.insert(name.clone(), value.clone());
    }
}

/// 204 answer to a CORS preflight.
pub fn preflight(headers: HeaderMap) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    *response.headers_mut() = headers;
    response
}

/// Render `err` with the guard's accumulated headers.
pub fn rejection(err: ShieldError, headers: HeaderMap) -> Response {
    let mut response = err.into_response();
    apply_headers(&mut response, headers);
    response
}

/// Add `X-RateLimit-*` headers.
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_epoch: u64) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_epoch));
}
