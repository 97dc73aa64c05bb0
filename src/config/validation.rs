//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse but cannot
//! work. All violations are collected so one run reports everything.

use url::Url;

use crate::config::schema::ShieldConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("allowed origin {origin:?} is not a bare scheme://host[:port] origin")]
    InvalidOrigin { origin: String },

    #[error("route {path:?} is configured more than once")]
    DuplicateRoute { path: String },

    #[error("route path {path:?} must start with '/'")]
    InvalidRoutePath { path: String },
}

/// Check `config`, returning every problem found.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut non_zero = |field: &str, value: u64| {
        if value == 0 {
            errors.push(ValidationError::Zero { field: field.to_string() });
        }
    };
    non_zero("rate_limit.window_secs", config.rate_limit.window_secs);
    non_zero("rate_limit.max_requests", config.rate_limit.max_requests.into());
    non_zero("rate_limit.chat_max_requests", config.rate_limit.chat_max_requests.into());
    non_zero("rate_limit.block_threshold", config.rate_limit.block_threshold.into());
    non_zero("rate_limit.block_duration_secs", config.rate_limit.block_duration_secs);
    non_zero("security.max_body_size", config.security.max_body_size as u64);
    non_zero("timeouts.request_secs", config.timeouts.request_secs);

    for route in &config.routes {
        if let Some(max) = route.max_requests {
            non_zero(&format!("routes[{}].max_requests", route.path), max.into());
        }
        if let Some(window) = route.window_secs {
            non_zero(&format!("routes[{}].window_secs", route.path), window);
        }
    }

    for origin in &config.cors.allowed_origins {
        if !is_bare_origin(origin) {
            errors.push(ValidationError::InvalidOrigin { origin: origin.clone() });
        }
    }

    for (i, route) in config.routes.iter().enumerate() {
        if !route.path.starts_with('/') {
            errors.push(ValidationError::InvalidRoutePath { path: route.path.clone() });
        }
        if config.routes[..i].iter().any(|r| r.path == route.path) {
            errors.push(ValidationError::DuplicateRoute { path: route.path.clone() });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Browsers send `Origin` as exactly `scheme://host[:port]`; anything else
/// in the allowlist could never match.
fn is_bare_origin(origin: &str) -> bool {
    match Url::parse(origin) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.origin().ascii_serialization() == origin,
        Err(_) => false,
    }
}
