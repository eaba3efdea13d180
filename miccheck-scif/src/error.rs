use std::time::Duration;

use thiserror::Error;

use crate::protocol::DaemonErrorCode;

/// Errors raised while talking to systoolsd
#[derive(Debug, Error)]
pub enum ScifError {
    /// libscif could not be loaded or lacks a symbol
    #[error("SCIF library unavailable: {0}")]
    LibraryUnavailable(String),

    /// A SCIF call returned -1
    #[error("{call} failed: {source}")]
    Call {
        call: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Fewer bytes than the structure size came back
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// systoolsd answered with a non-zero `card_errno`
    #[error("daemon error: {0}")]
    Daemon(DaemonErrorCode),

    /// systoolsd answered with an empty header
    #[error("systoolsd failed to respond")]
    NoResponse,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}
