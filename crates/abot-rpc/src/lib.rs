//! # abot-rpc
//!
//! The RPC link between the abot core and its plugins.
//!
//! Messages are newline-delimited JSON over TCP. Plugins call the core's
//! endpoint ([`server::RpcServer`]) to register, subscribe and heartbeat;
//! the core calls each plugin's `respond_to` through
//! [`client::TcpPluginConnector`]. [`plugin::PluginServer`] is the plugin
//! side of that exchange.

pub mod client;
pub mod error;
pub mod plugin;
pub mod protocol;
pub mod server;

pub use client::{CoreClient, TcpPluginConnector};
pub use error::{Result, RpcError};
pub use plugin::{run_heartbeat, PluginServer, Responder};
pub use protocol::{Frame, Request, Response, MAX_FRAME_LEN};
pub use server::RpcServer;
