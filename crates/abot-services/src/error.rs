//! Service error types.

use abot_types::AbotError;
use thiserror::Error;

/// Errors produced while starting or running the service.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServiceError {
    /// A listener could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Failure from the core (configuration, model loading, ...).
    #[error(transparent)]
    Core(#[from] AbotError),

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, ServiceError>;
