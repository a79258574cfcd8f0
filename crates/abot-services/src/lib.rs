//! The abot service.
//!
//! [`Abot`] wires the core together: it owns the plugin registry, the
//! intent model, the dispatcher and the session table. [`Abot::serve`]
//! runs the plugin RPC endpoint and the HTTP front-end ([`api`]) side by
//! side until cancelled.

pub mod api;
pub mod error;
pub mod service;

pub use error::{Result, ServiceError};
pub use service::{Abot, Handled};
