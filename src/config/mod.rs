//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: RATE_LIMIT_*, ALLOWED_ORIGINS, API_SECRET_KEY)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!     → consumed once by the server's composition root
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; route policies are fixed at registration
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_with, ConfigError};
pub use schema::{
    CorsConfig, ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig, RoutePolicyConfig,
    SecurityConfig, ShieldConfig, SignatureConfig, TimeoutConfig, TlsConfig,
};
