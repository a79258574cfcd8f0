//! Error types for the abot framework.
//!
//! Provides [`AbotError`] as the top-level error type and [`ErrorKind`],
//! the stable name of each failure class. The kind string is what travels
//! on the RPC wire and what the HTTP front-end maps onto status codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for the abot framework.
///
/// Variants are grouped into caller errors (bad request, duplicate, unknown
/// plugin), recoverable runtime failures (timeout, transport) and outcomes
/// that surface to the user as a fixed reply (underflow, no handler).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AbotError {
    // ── Fatal at startup ─────────────────────────────────────────────

    /// Construction or configuration is invalid.
    #[error("invalid config: {reason}")]
    Config {
        /// What is wrong with the configuration.
        reason: String,
    },

    // ── Caller errors ────────────────────────────────────────────────

    /// Malformed HTTP parameters or RPC payload.
    #[error("bad request: {reason}")]
    BadRequest {
        /// Why the request was rejected.
        reason: String,
    },

    /// A plugin with this name is already registered.
    #[error("duplicate plugin: {name}")]
    Duplicate {
        /// The conflicting plugin name.
        name: String,
    },

    /// The plugin has not registered.
    #[error("unknown plugin: {name}")]
    UnknownPlugin {
        /// The plugin name that was not found.
        name: String,
    },

    /// The RPC method is not served by this endpoint.
    #[error("unknown method: {method}")]
    UnknownMethod {
        /// The method name received.
        method: String,
    },

    // ── Recoverable ──────────────────────────────────────────────────

    /// An operation exceeded its deadline.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Human-readable name of the operation that timed out.
        operation: String,
    },

    /// Connecting to, writing to, or reading from a plugin failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A plugin answered with an error of its own.
    #[error("plugin error: {message}")]
    Plugin {
        /// Message reported by the plugin.
        message: String,
    },

    // ── User-facing outcomes ─────────────────────────────────────────

    /// Classifier scoring produced an unrepresentable probability.
    #[error("classifier underflow")]
    Underflow,

    /// No plugin subscription matched the classified input.
    #[error("no handler for input")]
    NoHandler,

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AbotError {
    /// Shorthand for a [`AbotError::BadRequest`].
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`AbotError::Config`].
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Rebuild an error received over the wire as `(kind, message)`.
    ///
    /// Name-carrying variants take the message as the name.
    pub fn from_wire(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::Configuration => Self::Config { reason: message },
            ErrorKind::BadRequest => Self::BadRequest { reason: message },
            ErrorKind::Duplicate => Self::Duplicate { name: message },
            ErrorKind::UnknownPlugin => Self::UnknownPlugin { name: message },
            ErrorKind::UnknownMethod => Self::UnknownMethod { method: message },
            ErrorKind::Timeout => Self::Timeout { operation: message },
            ErrorKind::Transport => Self::Transport(message),
            ErrorKind::Underflow => Self::Underflow,
            ErrorKind::NoHandler => Self::NoHandler,
            ErrorKind::Plugin => Self::Plugin { message },
        }
    }

    /// The taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Configuration,
            Self::BadRequest { .. } | Self::Json(_) => ErrorKind::BadRequest,
            Self::Duplicate { .. } => ErrorKind::Duplicate,
            Self::UnknownPlugin { .. } => ErrorKind::UnknownPlugin,
            Self::UnknownMethod { .. } => ErrorKind::UnknownMethod,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transport(_) | Self::Io(_) => ErrorKind::Transport,
            Self::Plugin { .. } => ErrorKind::Plugin,
            Self::Underflow => ErrorKind::Underflow,
            Self::NoHandler => ErrorKind::NoHandler,
        }
    }
}

/// Stable, serializable name of an error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    BadRequest,
    Duplicate,
    UnknownPlugin,
    UnknownMethod,
    Timeout,
    Transport,
    Underflow,
    NoHandler,
    /// A plugin reported a failure of its own.
    Plugin,
}

impl ErrorKind {
    /// The wire name, e.g. `"unknown_plugin"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::BadRequest => "bad_request",
            Self::Duplicate => "duplicate",
            Self::UnknownPlugin => "unknown_plugin",
            Self::UnknownMethod => "unknown_method",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Underflow => "underflow",
            Self::NoHandler => "no_handler",
            Self::Plugin => "plugin",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AbotError>;
