//! In-memory backends for development and testing
//!
//! Reference implementations of the three collaborator contracts:
//!
//! - [`InMemoryBroker`] - an unbounded queue of serialized messages
//! - [`InMemoryResultBackend`] - a map of results with per-entry expiry
//! - [`InMemoryCounterBackend`] - a map of counters with per-entry expiry
//!
//! All three are cheap to clone; clones share the same underlying storage,
//! which is how a test hands "the same backend" to several workers.
//!
//! The broker stores encoded bytes rather than `Message` values so that
//! every hop through it exercises the by-value embedding of continuation
//! messages exactly as a network transport would.
//!
//! Expiry uses `tokio::time::Instant`, so tests can drive TTLs with
//! `tokio::time::pause` and `advance`.
//!
//! # Limitations
//!
//! 1. **Single process** - nothing is shared outside the current process
//! 2. **Lazy expiry** - expired entries are dropped when next touched, and
//!    every write sweeps out the ones nobody touched again
//! 3. **No persistence** - all data is lost on restart

use crate::{
    error::{Result, StoreError},
    message::Message,
    serializer::{JsonSerializer, SerializerProtocol},
    traits::{Broker, CounterBackend, ResultBackend},
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;

/// Value with an expiry deadline
#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe in-memory result storage
#[derive(Debug, Clone, Default)]
pub struct InMemoryResultBackend {
    entries: Arc<RwLock<HashMap<String, Expiring<Value>>>>,
}

impl InMemoryResultBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live results
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every stored result
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl ResultBackend for InMemoryResultBackend {
    async fn store(&self, message_id: &str, value: Value, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(message_id.to_string(), Expiring::new(value, ttl));
        Ok(())
    }

    async fn lookup(&self, message_id: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(message_id) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // expired: drop it under the write lock, re-checking in case it was rewritten
        let mut entries = self.entries.write().await;
        if entries
            .get(message_id)
            .is_some_and(|entry| !entry.is_live(now))
        {
            entries.remove(message_id);
        }
        Ok(None)
    }
}

/// Thread-safe in-memory counters
///
/// Every operation takes the write lock for its whole duration, which makes
/// `decrement_and_test` linearizable within the process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterBackend {
    counters: Arc<RwLock<HashMap<String, Expiring<i64>>>>,
}

impl InMemoryCounterBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a live counter (inspection only)
    pub async fn peek(&self, key: &str) -> Option<i64> {
        let now = Instant::now();
        self.counters
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value)
    }

    /// Number of live counters
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.counters
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CounterBackend for InMemoryCounterBackend {
    async fn create(&self, key: &str, initial: i64, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut counters = self.counters.write().await;
        counters.retain(|_, entry| entry.is_live(now));
        if counters.contains_key(key) {
            return Ok(false);
        }
        counters.insert(key.to_string(), Expiring::new(initial, ttl));
        Ok(true)
    }

    async fn decrement_and_test(&self, key: &str) -> Result<Option<bool>> {
        let now = Instant::now();
        let mut counters = self.counters.write().await;
        match counters.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.value -= 1;
                Ok(Some(entry.value == 0))
            }
            Some(_) => {
                counters.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// In-memory message queue
///
/// `enqueue` encodes the message with the serializer; [`dequeue`](Self::dequeue)
/// decodes it again on the consuming side.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    serializer: JsonSerializer,
    enqueued: Arc<AtomicUsize>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            serializer: JsonSerializer::new(),
            enqueued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for the next message
    ///
    /// Returns `None` only if the queue has been closed, which cannot happen
    /// while this broker (or a clone of it) is alive.
    pub async fn dequeue(&self) -> Result<Option<Message>> {
        let data = self.receiver.lock().await.recv().await;
        data.map(|bytes| self.serializer.decode_message(&bytes))
            .transpose()
    }

    /// Take the next message if one is already waiting
    ///
    /// Never waits: while another consumer is parked in
    /// [`dequeue`](Self::dequeue) that consumer gets the next message, and
    /// this returns `None`.
    pub async fn try_dequeue(&self) -> Result<Option<Message>> {
        let Ok(mut receiver) = self.receiver.try_lock() else {
            return Ok(None);
        };
        match receiver.try_recv() {
            Ok(bytes) => self.serializer.decode_message(&bytes).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Total number of messages ever enqueued
    pub fn enqueued_count(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(&self, message: Message) -> Result<()> {
        let bytes = self.serializer.encode_message(&message)?;
        self.sender
            .send(bytes)
            .map_err(|_| StoreError::Broker("queue is closed".to_string()))?;
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(message_id = %message.message_id(), actor = %message.actor_name(), "Enqueued message");
        Ok(())
    }
}
