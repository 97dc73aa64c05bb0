//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (baseline hardening headers, CORS allowlist)
//!     → rate_limit.rs (block list, then sliding-window quota per client)
//!     → limits.rs (bounded body buffering)
//!     → signature.rs (HMAC + timestamp freshness, per route)
//!     → Pass to handler
//!
//! Handlers:
//!     → sanitize.rs (strip control characters from untrusted text)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Limiter state is per instance, never a process global
//! - Client keys come from forwarded headers without a trusted-proxy check

pub mod headers;
pub mod limits;
pub mod rate_limit;
pub mod sanitize;
pub mod signature;

pub use headers::OriginGate;
pub use rate_limit::{BlockPolicy, QuotaCheck, RateLimiter};
pub use sanitize::sanitize;
pub use signature::{SignatureError, SignatureValidator};
