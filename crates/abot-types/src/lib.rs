//! # abot-types
//!
//! Core type definitions for the abot assistant framework.
//!
//! This crate is the foundation of the dependency graph -- all other
//! abot crates depend on it. It contains:
//!
//! - **[`error`]** -- [`AbotError`] and the stable [`ErrorKind`] taxonomy
//! - **[`input`]** -- [`StructuredInput`], the classified form of an utterance
//! - **[`session`]** -- Flexible user identifiers and per-user session state
//! - **[`message`]** -- The payload the core sends to a plugin
//! - **[`config`]** -- Process configuration resolved from the environment
//! - **[`env`]** -- Environment variable abstraction

pub mod config;
pub mod env;
pub mod error;
pub mod input;
pub mod message;
pub mod session;

pub use error::{AbotError, ErrorKind, Result};
pub use input::{Field, StructuredInput};
pub use message::PluginMessage;
pub use session::{FlexIdType, Session, SessionKey};
