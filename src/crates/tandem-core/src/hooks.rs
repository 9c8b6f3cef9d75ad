//! Reactions to a message's successful completion
//!
//! Whatever runs actors calls every registered [`CompletionHook`], in
//! registration order, exactly once per successful outcome. Failed outcomes
//! never reach the hooks, so a failed stage stops its pipeline and a failed
//! group child keeps its group from completing.
//!
//! Register [`StoreResults`] first: later hooks enqueue follow-up work that
//! may inspect the result straight away.

use crate::completion::{CompletionCoordinator, GroupLink};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tandem_store::{Broker, Message, ResultBackend};

/// Hook invoked after an actor returned successfully
#[async_trait]
pub trait CompletionHook: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn after_success(&self, message: &Message, result: &Value) -> Result<()>;
}

/// Writes results to the result backend
pub struct StoreResults {
    backend: Arc<dyn ResultBackend>,
    ttl: Duration,
}

impl StoreResults {
    pub fn new(backend: Arc<dyn ResultBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }
}

#[async_trait]
impl CompletionHook for StoreResults {
    fn name(&self) -> &str {
        "store_results"
    }

    async fn after_success(&self, message: &Message, result: &Value) -> Result<()> {
        if !message.stores_results() {
            return Ok(());
        }
        self.backend
            .store(message.message_id(), result.clone(), self.ttl)
            .await?;
        tracing::debug!(message_id = %message.message_id(), "Stored result");
        Ok(())
    }
}

/// Enqueues the next pipeline stage
pub struct Pipelines {
    broker: Arc<dyn Broker>,
}

impl Pipelines {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl CompletionHook for Pipelines {
    fn name(&self) -> &str {
        "pipelines"
    }

    async fn after_success(&self, message: &Message, result: &Value) -> Result<()> {
        let Some(target) = message.pipe_target()? else {
            return Ok(());
        };

        let next = if target.pipe_ignore() {
            target
        } else {
            target.with_appended_arg(result.clone())
        };

        tracing::debug!(from = %message, to = %next, "Continuing pipeline");
        self.broker.enqueue(next).await?;
        Ok(())
    }
}

/// Reports group children's completions to the coordinator
pub struct GroupCallbacks {
    broker: Arc<dyn Broker>,
    coordinator: CompletionCoordinator,
}

impl GroupCallbacks {
    pub fn new(broker: Arc<dyn Broker>, coordinator: CompletionCoordinator) -> Self {
        Self {
            broker,
            coordinator,
        }
    }
}

#[async_trait]
impl CompletionHook for GroupCallbacks {
    fn name(&self) -> &str {
        "group_callbacks"
    }

    async fn after_success(&self, message: &Message, _result: &Value) -> Result<()> {
        match GroupLink::from_message(message)? {
            Some(link) => {
                self.coordinator
                    .complete_child(self.broker.as_ref(), &link, message.message_id())
                    .await
            }
            None => Ok(()),
        }
    }
}
