//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Quotas and block escalation.
    pub rate_limit: RateLimitConfig,

    /// Cross-origin allowlist.
    pub cors: CorsConfig,

    /// Request signing.
    pub signature: SignatureConfig,

    /// Body and input limits.
    pub security: SecurityConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Per-route policy overrides.
    pub routes: Vec<RoutePolicyConfig>,
}

impl ShieldConfig {
    /// Override entry for `path`, if any.
    pub fn route(&self, path: &str) -> Option<&RoutePolicyConfig> {
        self.routes.iter().find(|r| r.path == path)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sliding window length in seconds (`RATE_LIMIT_WINDOW`).
    pub window_secs: u64,

    /// Default requests per window (`RATE_LIMIT_MAX_REQUESTS`).
    pub max_requests: u32,

    /// Stricter limit for chat endpoints (`RATE_LIMIT_CHAT_MAX`).
    pub chat_max_requests: u32,

    /// Quota violations before a client is blocked.
    pub block_threshold: u32,

    /// Block length in seconds.
    pub block_duration_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 20,
            chat_max_requests: 10,
            block_threshold: 5,
            block_duration_secs: 600,
        }
    }
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Exact origins granted CORS (`ALLOWED_ORIGINS`).
    pub allowed_origins: Vec<String>,

    pub allowed_methods: Vec<String>,

    pub allowed_headers: Vec<String>,

    /// Preflight cache lifetime.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            allowed_methods: vec!["GET".into(), "POST".into(), "OPTIONS".into()],
            allowed_headers: vec![
                "Content-Type".into(),
                "X-API-Key".into(),
                "X-Request-Timestamp".into(),
                "X-Request-Signature".into(),
            ],
            max_age_secs: 86_400,
        }
    }
}

/// Request signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Shared HMAC secret (`API_SECRET_KEY`). Empty disables enforcement.
    pub secret: String,

    /// Accepted distance between signed timestamp and now, in seconds.
    pub max_skew_secs: u64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            max_skew_secs: 300,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Sanitized length of a chat message.
    pub max_message_chars: usize,

    /// Sanitized length of one history entry.
    pub max_history_chars: usize,

    /// History entries kept (most recent).
    pub max_history_entries: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 256 * 1024,
            max_message_chars: 4000,
            max_history_chars: 2000,
            max_history_entries: 20,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Grace period for in-flight requests on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Per-route policy override. Unset fields keep the route's built-in value.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutePolicyConfig {
    /// Route path, e.g. "/api/chat".
    pub path: String,

    pub max_requests: Option<u32>,

    pub window_secs: Option<u64>,

    pub require_signature: Option<bool>,
}
