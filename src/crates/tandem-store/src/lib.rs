//! # tandem-store - Broker and backend contracts
//!
//! The composition layer in `tandem-core` coordinates work across worker
//! processes that share no memory. This crate defines everything those
//! processes exchange:
//!
//! - [`Message`] - the immutable unit of work, with reserved option keys
//!   for continuation metadata ([`message::options`])
//! - [`Broker`], [`ResultBackend`], [`CounterBackend`] - the collaborator
//!   contracts, all async and object safe
//! - [`SerializerProtocol`] / [`JsonSerializer`] - transport encoding
//! - In-memory reference implementations in [`memory`]
//!
//! ## Quick Start
//!
//! ```rust
//! use tandem_store::{CounterBackend, InMemoryCounterBackend};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let counters = InMemoryCounterBackend::new();
//!     counters.create("group-1", 2, Duration::from_secs(60)).await?;
//!
//!     assert_eq!(counters.decrement_and_test("group-1").await?, Some(false));
//!     assert_eq!(counters.decrement_and_test("group-1").await?, Some(true));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod message;
pub mod serializer;
pub mod traits;

// Re-export main types
pub use error::{Result, StoreError};
pub use memory::{InMemoryBroker, InMemoryCounterBackend, InMemoryResultBackend};
pub use message::Message;
pub use serializer::{JsonSerializer, SerializerProtocol};
pub use traits::{Broker, CounterBackend, ResultBackend};
