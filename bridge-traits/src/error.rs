use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Storage {operation} failed for {path}: {cause}")]
    Storage {
        operation: String,
        path: String,
        cause: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Build a [`BridgeError::Storage`] for a failed object-store call.
    pub fn storage(
        operation: impl Into<String>,
        path: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
