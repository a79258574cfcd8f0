//! CLI command implementations for `abot`.
//!
//! - [`server`] -- RPC endpoint + HTTP front-end.
//! - [`console`] -- Interactive terminal client.
//! - [`train`] -- Offline model training.

pub mod console;
pub mod server;
pub mod train;
