//! Error types for composition operations
//!
//! ```text
//! CompositionError
//! ├── ResultMissing    - non-blocking lookup found nothing (yet)
//! ├── ResultTimeout    - a blocking call's deadline elapsed
//! ├── Configuration    - duplicate callback, missing coordinator, bad config
//! ├── Construction     - e.g. an empty pipeline
//! ├── UnknownActor     - a worker received a message for an unregistered actor
//! ├── Store            - broker / backend failures
//! └── Serialization    - JSON errors
//! ```
//!
//! `ResultMissing` and `ResultTimeout` are expected outcomes rather than
//! faults: both can be retried with the same arguments, and neither leaves
//! any state behind.

use std::time::Duration;
use tandem_store::StoreError;
use thiserror::Error;

/// Convenience result type using [`CompositionError`]
pub type Result<T> = std::result::Result<T, CompositionError>;

/// Errors raised by the composition layer
#[derive(Error, Debug)]
pub enum CompositionError {
    /// No result is stored for the message
    #[error("Result missing for message {message_id}")]
    ResultMissing { message_id: String },

    /// A blocking retrieval ran out of time
    #[error("Timed out after {timeout:?} waiting for {target}")]
    ResultTimeout { target: String, timeout: Duration },

    /// Invalid wiring or configuration, detected before any dispatch
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A composite could not be built
    #[error("Construction error: {0}")]
    Construction(String),

    /// No actor is registered under this name
    #[error("Unknown actor: {0}")]
    UnknownActor(String),

    /// Broker or backend failure
    #[error("Backend error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CompositionError {
    /// Whether this error is a `ResultTimeout`
    pub fn is_timeout(&self) -> bool {
        matches!(self, CompositionError::ResultTimeout { .. })
    }

    /// Whether this error is a `ResultMissing`
    pub fn is_missing(&self) -> bool {
        matches!(self, CompositionError::ResultMissing { .. })
    }
}
