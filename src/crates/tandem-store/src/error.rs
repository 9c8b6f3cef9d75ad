//! Error types for backend operations

use thiserror::Error;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while talking to a broker or storage backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker refused or could not accept a message
    #[error("Broker error: {0}")]
    Broker(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A message or embedded message did not have the expected shape
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}
