//! Error types for the attenuation-control link.
//!
//! Most faults in this crate are absorbed where they occur: transport errors
//! are retried with backoff inside the adapter loops, malformed payloads are
//! logged and dropped by the channel consumers, and the facade reports plain
//! success/failure booleans. The variants here exist for the places where a
//! typed error still travels through a `Result` (dialing, recorder I/O, wire
//! decoding) and for log lines that want structured context.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for the controller link.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("invalid dataset path {path}: {reason}")]
    Path { path: PathBuf, reason: String },

    #[error("dataset {open} is already open, refusing {requested}")]
    FileConflict { open: PathBuf, requested: PathBuf },

    #[error("command '{command}' dropped while disconnected")]
    Disconnected { command: String },

    #[error("dataset file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Transport faults clear once the peer is reachable again and rejected
    /// commands can be reissued after reconnection. Everything else reflects a
    /// bad payload, a bad path, or a conflicting open; retrying the same
    /// operation unchanged will fail the same way.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Transport { .. } => true,
            LinkError::Disconnected { .. } => true,
            LinkError::Protocol { .. } => false,
            LinkError::Path { .. } => false,
            LinkError::FileConflict { .. } => false,
            LinkError::File { .. } => false,
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>) -> Self {
        LinkError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with a source.
    pub fn transport_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for path validation errors.
    pub fn path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        LinkError::Path { path: path.into(), reason: reason.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LinkError::File { path: path.into(), source }
    }

    /// Helper constructor for commands rejected while disconnected.
    pub fn disconnected(command: impl Into<String>) -> Self {
        LinkError::Disconnected { command: command.into() }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
