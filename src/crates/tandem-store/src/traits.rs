//! Collaborator contracts consumed by the composition layer
//!
//! The composition layer never talks to a concrete broker or store. Workers
//! share no memory, so everything that must be visible across processes goes
//! through one of the three traits defined here:
//!
//! - [`Broker`] - accepts messages for delivery to actors
//! - [`ResultBackend`] - keyed, expiring storage of actor results
//! - [`CounterBackend`] - keyed, expiring integers with an atomic
//!   decrement-and-test primitive
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  tandem-core                                              │
//! │   Pipeline::run / Group::run ──► Broker::enqueue          │
//! │   Results::get_result ────────► ResultBackend::lookup     │
//! │   CompletionCoordinator ──────► CounterBackend::*         │
//! └──────────────────────────────┬───────────────────────────┘
//!                                │ implemented by
//!              ┌─────────────────┴─────────────────┐
//!              ▼                                   ▼
//!     ┌──────────────────┐                ┌──────────────────┐
//!     │  In-Memory       │                │  Redis / SQL /   │
//!     │  (this crate)    │                │  your own        │
//!     └──────────────────┘                └──────────────────┘
//! ```
//!
//! # Implementing a counter backend
//!
//! `decrement_and_test` must be a single indivisible operation on the
//! backend. A Redis implementation would use one Lua script (or `DECR` on a
//! key created with `SET NX PX`) rather than a `GET` followed by a `SET`:
//!
//! ```rust,ignore
//! #[async_trait]
//! impl CounterBackend for RedisCounterBackend {
//!     async fn create(&self, key: &str, initial: i64, ttl: Duration) -> Result<bool> {
//!         // SET key initial NX PX ttl
//!         todo!()
//!     }
//!
//!     async fn decrement_and_test(&self, key: &str) -> Result<Option<bool>> {
//!         // EVAL "if redis.call('EXISTS', KEYS[1]) == 0 then return -1 end
//!         //       return redis.call('DECR', KEYS[1])" 1 key
//!         todo!()
//!     }
//! }
//! ```

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Accepts messages for delivery to actors
///
/// Delivery is at-least-once; the composition layer only needs `enqueue`
/// to hand over ownership of the message.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Hand a message to the broker
    async fn enqueue(&self, message: Message) -> Result<()>;
}

/// Keyed storage for actor results
///
/// Lookups must be read-after-write consistent for a key from any process.
/// A stored `null` is a result; `None` from [`lookup`](ResultBackend::lookup)
/// means no result has been stored (or it has expired).
#[async_trait]
pub trait ResultBackend: Send + Sync {
    /// Store the result of `message_id`, expiring after `ttl`
    async fn store(&self, message_id: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Look up the result of `message_id`
    async fn lookup(&self, message_id: &str) -> Result<Option<Value>>;
}

/// Expiring integers manipulated only through atomic operations
///
/// Implementations must make `decrement_and_test` linearizable across all
/// concurrent callers in all processes.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Create `key` with `initial` value and a bounded lifetime
    ///
    /// Returns `false` without modifying anything when the key already exists.
    async fn create(&self, key: &str, initial: i64, ttl: Duration) -> Result<bool>;

    /// Atomically decrement `key` and report whether it is now exactly zero
    ///
    /// Returns `None` when the key does not exist (never created, or expired).
    async fn decrement_and_test(&self, key: &str) -> Result<Option<bool>>;
}
