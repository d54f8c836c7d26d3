use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Correlation channel closed")]
    ChannelClosed,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Protocol error in {operation}: {message}")]
    Protocol { operation: String, message: String },

    #[error("{operation} timed out after {secs} seconds")]
    Timeout { operation: String, secs: u64 },

    #[error("A {operation} call is already in flight")]
    CallInFlight { operation: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    pub fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Wrap a bridge failure on a local file, keeping the I/O kind when there is one.
    pub fn local(path: impl std::fmt::Display, err: BridgeError) -> Self {
        match err {
            BridgeError::Io(source) => Self::io(path, source),
            other => Self::io(path, std::io::Error::other(other.to_string())),
        }
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
