//! Exactly-once group completion across worker processes
//!
//! Children of a group finish on arbitrary workers in arbitrary order. The
//! group's completion callback must still be enqueued exactly once, after
//! the last child. The only shared state is an outstanding-counter in a
//! [`CounterBackend`]:
//!
//! 1. `Group::run` creates the counter with the number of direct children,
//!    before any child is dispatched.
//! 2. Every child's terminal message carries a [`GroupLink`] in its options.
//! 3. When that message succeeds, [`CompletionCoordinator::complete_child`]
//!    performs one atomic decrement-and-test.
//! 4. Only the caller that observes the transition to exactly zero enqueues
//!    the callback and, for a nested group, reports one completion to the
//!    enclosing group's counter.
//!
//! ```text
//!   worker A            worker B            worker C
//!   child 1 done        child 2 done        child 3 done
//!      │ DECR 3→2          │ DECR 2→1          │ DECR 1→0
//!      ▼                   ▼                   ▼
//!    nothing             nothing          enqueue callback
//!                                          └─► DECR parent
//! ```
//!
//! A counter that does not exist (never created, or expired) turns the
//! decrement into a no-op.
//!
//! # Duplicate completions
//!
//! A redelivered completion would decrement twice. With de-duplication on,
//! each child first claims a marker key through `CounterBackend::create`;
//! only the first claim goes on to decrement. The marker and the decrement
//! are two separate backend calls, so a crash between them loses that
//! child's decrement.

use crate::config::TandemConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tandem_store::message::options;
use tandem_store::{Broker, CounterBackend, Message};

/// Routing information a child carries to its group's counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupLink {
    /// Counter key of the group
    pub group_id: String,
    /// Callback to enqueue when the group completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_completion: Option<Message>,
    /// The enclosing group, when it waits on this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_parent: Option<Box<GroupLink>>,
}

impl GroupLink {
    pub fn new(
        group_id: impl Into<String>,
        group_completion: Option<Message>,
        group_parent: Option<GroupLink>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            group_completion,
            group_parent: group_parent.map(Box::new),
        }
    }

    /// Message options that attach this link to a child's terminal message
    pub fn to_options(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "group link serialized to {}",
                other
            ))
            .into()),
        }
    }

    /// The link carried by `message`, if it terminates a group child
    pub fn from_message(message: &Message) -> Result<Option<Self>> {
        if message.option(options::GROUP_ID).is_none() {
            return Ok(None);
        }

        let mut fields = Map::new();
        for key in [
            options::GROUP_ID,
            options::GROUP_COMPLETION,
            options::GROUP_PARENT,
        ] {
            if let Some(value) = message.option(key) {
                fields.insert(key.to_string(), value.clone());
            }
        }
        Ok(Some(serde_json::from_value(Value::Object(fields))?))
    }
}

/// Drives group outstanding-counters
#[derive(Clone)]
pub struct CompletionCoordinator {
    counters: Arc<dyn CounterBackend>,
    group_ttl: Duration,
    dedupe: bool,
}

impl CompletionCoordinator {
    pub fn new(counters: Arc<dyn CounterBackend>) -> Self {
        Self::from_config(counters, &TandemConfig::default())
    }

    pub fn from_config(counters: Arc<dyn CounterBackend>, config: &TandemConfig) -> Self {
        Self {
            counters,
            group_ttl: config.group_ttl,
            dedupe: config.dedupe_completions,
        }
    }

    pub fn with_group_ttl(mut self, ttl: Duration) -> Self {
        self.group_ttl = ttl;
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Backend key of a group's outstanding-counter
    pub fn counter_key(group_id: &str) -> String {
        format!("tandem:group:{}", group_id)
    }

    fn marker_key(group_id: &str, child_id: &str) -> String {
        format!("tandem:group:{}:done:{}", group_id, child_id)
    }

    /// Create the outstanding-counter for a group of `size` direct children
    pub async fn initialize(&self, group_id: &str, size: usize) -> Result<()> {
        let key = Self::counter_key(group_id);
        let created = self
            .counters
            .create(&key, size as i64, self.group_ttl)
            .await?;
        if created {
            tracing::debug!(group_id, size, "Created group counter");
        } else {
            tracing::warn!(group_id, "Group counter already exists, keeping it");
        }
        Ok(())
    }

    /// Record that `child_id` of the group behind `link` has completed
    ///
    /// Enqueues the group's callback and walks up to the enclosing group for
    /// every counter this completion brings to exactly zero.
    pub async fn complete_child(
        &self,
        broker: &dyn Broker,
        link: &GroupLink,
        child_id: &str,
    ) -> Result<()> {
        let mut current = link;
        let mut child_id = child_id.to_string();

        loop {
            if self.dedupe {
                let marker = Self::marker_key(&current.group_id, &child_id);
                if !self.counters.create(&marker, 1, self.group_ttl).await? {
                    tracing::warn!(
                        group_id = %current.group_id,
                        child_id = %child_id,
                        "Ignoring duplicate completion"
                    );
                    return Ok(());
                }
            }

            let key = Self::counter_key(&current.group_id);
            match self.counters.decrement_and_test(&key).await? {
                None => {
                    tracing::debug!(group_id = %current.group_id, "No counter for group, nothing to do");
                    return Ok(());
                }
                Some(false) => return Ok(()),
                Some(true) => {
                    self.fire_callback(broker, current).await?;
                    match current.group_parent.as_deref() {
                        Some(parent) => {
                            child_id = current.group_id.clone();
                            current = parent;
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Complete a group that has no children to wait for
    pub async fn complete_empty(&self, broker: &dyn Broker, link: &GroupLink) -> Result<()> {
        self.fire_callback(broker, link).await?;
        if let Some(parent) = link.group_parent.as_deref() {
            self.complete_child(broker, parent, &link.group_id).await?;
        }
        Ok(())
    }

    async fn fire_callback(&self, broker: &dyn Broker, link: &GroupLink) -> Result<()> {
        match &link.group_completion {
            Some(callback) => {
                tracing::info!(
                    group_id = %link.group_id,
                    callback = %callback,
                    "Group completed, enqueueing completion callback"
                );
                broker.enqueue(callback.clone()).await?;
            }
            None => tracing::debug!(group_id = %link.group_id, "Group completed"),
        }
        Ok(())
    }
}

impl std::fmt::Debug for CompletionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionCoordinator")
            .field("group_ttl", &self.group_ttl)
            .field("dedupe", &self.dedupe)
            .finish_non_exhaustive()
    }
}
