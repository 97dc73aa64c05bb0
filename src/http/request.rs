//! Request inspection helpers.
//!
//! # Responsibilities
//! - Derive the client key used to bucket limiter state
//! - Decide whether a request must carry a JSON body
//!
//! # Design Decisions
//! - The first `X-Forwarded-For` hop is trusted as-is. There is no
//!   trusted-proxy chain, so a direct client can pick its own key.

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, Method, Request},
};

use crate::security::headers::{X_FORWARDED_FOR, X_REAL_IP};

/// Request ID header set and propagated by the server.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Key used when nothing identifies the client.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Header value as text, if present and visible ASCII.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Derive the rate-limit key for `req`.
///
/// Order: first `X-Forwarded-For` entry, `X-Real-IP`, socket peer address,
/// then [`UNKNOWN_CLIENT`].
pub fn client_key<B>(req: &Request<B>) -> String {
    let headers = req.headers();

    if let Some(first) = header_str(headers, &X_FORWARDED_FOR)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }

    if let Some(real_ip) = header_str(headers, &X_REAL_IP)
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return real_ip.to_string();
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    UNKNOWN_CLIENT.to_string()
}

/// Methods whose body the handler will parse.
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    header_str(headers, &header::CONTENT_TYPE)
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}
