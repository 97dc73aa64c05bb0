//! Request Shield
//!
//! Request-protection middleware for axum services.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request-id / trace                           (http::server)
//!                          │
//!                          ▼
//!                    ┌──────────────┐   origin gate, block, quota,
//!                    │ RequestGuard │   content type, body, signature
//!                    └──────┬───────┘   (http::middleware, security)
//!                           │ admitted
//!                           ▼
//!                        handler ──▶ security headers merged ──▶ Client Response
//! ```
//!
//! Cross-cutting: `config` (TOML + env), `observability` (tracing, metrics),
//! `lifecycle` (startup, signals, shutdown), `clock` (injectable time).

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::ShieldConfig;
pub use error::ShieldError;
pub use http::{EndpointPolicy, RequestGuard, ShieldServer};
pub use lifecycle::Shutdown;
