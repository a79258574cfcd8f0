//! RPC error types.

use abot_types::{AbotError, ErrorKind};
use thiserror::Error;

/// Wire-level failures.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RpcError {
    /// Connecting, reading or writing the socket failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame was not valid JSON for the expected message.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer closed the connection, or an earlier call on it was
    /// abandoned mid-exchange and its reply can no longer be matched.
    #[error("connection closed")]
    Closed,

    /// The peer answered with an error response.
    #[error("{code}: {message}")]
    Remote { code: ErrorKind, message: String },

    /// The peer answered with a response of the wrong shape.
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl From<RpcError> for AbotError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote { code, message } => AbotError::from_wire(code, message),
            other => AbotError::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
