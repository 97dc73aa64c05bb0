//! Middleware for protected routes.
//!
//! Handlers are plain `tower::Service`s and middleware are `tower::Layer`s,
//! so the guard composes with any other layer in the stack.

pub mod guard;

pub use guard::{EndpointPolicy, RequestGuard, RequestGuardLayer, RequestGuardService};
