//! Error taxonomy shared by the core and the session layer.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Which external collaborator an upstream failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Embedding,
    Generation,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upstream::Embedding => f.write_str("embedding"),
            Upstream::Generation => f.write_str("generation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot build an index from zero entries")]
    EmptyInput,

    #[error("document produced no chunks")]
    EmptyDocument,

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("no document has been ingested in this session")]
    NotReady,

    #[error("{operation} call timed out after {timeout:?}")]
    UpstreamTimeout {
        operation: Upstream,
        timeout: Duration,
    },

    #[error("{operation} call failed: {message}")]
    Upstream { operation: Upstream, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an opaque collaborator error, keeping its full context chain.
    pub fn upstream(operation: Upstream, err: anyhow::Error) -> Self {
        Error::Upstream {
            operation,
            message: format!("{:#}", err),
        }
    }

    /// True for errors caused by bad input or configuration from the caller.
    /// These are never retried.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfiguration(_)
                | Error::InvalidArgument(_)
                | Error::EmptyInput
                | Error::EmptyDocument
                | Error::DimensionMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
