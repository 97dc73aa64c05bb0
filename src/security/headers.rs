//! Security response headers and the cross-origin gate.
//!
//! Every response carries the baseline hardening headers. CORS headers are
//! added only when the request `Origin` matches an allowlist entry exactly,
//! and the granted origin is always echoed back, never `*`.

use std::collections::HashSet;

use axum::http::{
    header::{self, HeaderName},
    HeaderMap, HeaderValue,
};

use crate::config::{ConfigError, CorsConfig};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_REQUEST_SIGNATURE: HeaderName = HeaderName::from_static("x-request-signature");
pub const X_REQUEST_TIMESTAMP: HeaderName = HeaderName::from_static("x-request-timestamp");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers attached to every response.
pub fn baseline_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers
}

/// Grants CORS to a fixed set of origins.
#[derive(Debug, Clone)]
pub struct OriginGate {
    allowed: HashSet<String>,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
}

impl OriginGate {
    pub fn from_config(config: &CorsConfig) -> Result<Self, ConfigError> {
        let header_value = |field: &'static str, value: String| {
            HeaderValue::from_str(&value).map_err(|_| ConfigError::InvalidHeader { field, value })
        };

        Ok(Self {
            allowed: config.allowed_origins.iter().cloned().collect(),
            allow_methods: header_value("cors.allowed_methods", config.allowed_methods.join(", "))?,
            allow_headers: header_value("cors.allowed_headers", config.allowed_headers.join(", "))?,
            max_age: HeaderValue::from(config.max_age_secs),
        })
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.contains(origin)
    }

    /// Baseline headers, plus CORS grants when `origin` is allowlisted.
    pub fn compute_headers(&self, origin: Option<&str>) -> HeaderMap {
        let mut headers = baseline_headers();

        let Some(origin) = origin.filter(|o| self.is_allowed(o)) else {
            return headers;
        };
        let Ok(origin) = HeaderValue::from_str(origin) else {
            return headers;
        };

        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers
    }
}
