//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, global layers: request ID, trace)
//!     → middleware/guard.rs (per-route protection)
//!     → request.rs (client key, content-type rules)
//!     → handlers.rs (external collaborators; payload.rs validates bodies)
//!     → response.rs (merge security headers, render rejections)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod payload;
pub mod request;
pub mod response;
pub mod server;

pub use middleware::{EndpointPolicy, RequestGuard, RequestGuardLayer};
pub use request::X_REQUEST_ID;
pub use server::{AppState, ShieldServer};
