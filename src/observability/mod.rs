//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Guard and handlers produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for aggregation)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Client key, route and rejection reason are structured fields, not text
//! - Metric updates are no-ops until a recorder is installed, so tests need no setup

pub mod logging;
pub mod metrics;
