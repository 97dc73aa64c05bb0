//! Network layer.
//!
//! Plain TCP listeners are bound directly in the lifecycle module; this
//! module only holds TLS setup.

pub mod tls;
