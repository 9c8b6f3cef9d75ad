//! In-process actors and a stub worker
//!
//! The worker pulls messages from an [`InMemoryBroker`], runs the named actor
//! and hands every successful outcome to the registered
//! [`CompletionHook`]s. Failures are logged and dropped; retrying is the
//! broker layer's business. This is enough to drive pipelines and groups end
//! to end inside one process.
//!
//! ```rust,no_run
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//! use tandem_core::config::TandemConfig;
//! use tandem_core::worker::{Actor, ActorError, ActorRegistry, Worker};
//! use tandem_store::{InMemoryBroker, InMemoryCounterBackend, InMemoryResultBackend};
//!
//! # async fn example() {
//! let add = Actor::new("add", |args: Vec<Value>, _kwargs| async move {
//!     let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
//!     Ok::<_, ActorError>(json!(sum))
//! });
//! let mut registry = ActorRegistry::new();
//! registry.register(add);
//!
//! let broker = InMemoryBroker::new();
//! let handle = Worker::standard(
//!     broker.clone(),
//!     registry,
//!     Arc::new(InMemoryResultBackend::new()),
//!     Arc::new(InMemoryCounterBackend::new()),
//!     &TandemConfig::default(),
//! )
//! .start();
//! // ... enqueue work on `broker` ...
//! handle.shutdown().await;
//! # }
//! ```

use crate::completion::CompletionCoordinator;
use crate::config::TandemConfig;
use crate::error::{CompositionError, Result};
use crate::hooks::{CompletionHook, GroupCallbacks, Pipelines, StoreResults};
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tandem_store::message::options;
use tandem_store::{CounterBackend, InMemoryBroker, Message, ResultBackend};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Failure reported by an actor
#[derive(Debug, Clone, Error)]
pub enum ActorError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    Failed(String),
}

pub type ActorResult = std::result::Result<Value, ActorError>;

pub type ActorFuture = BoxFuture<'static, ActorResult>;

/// Actor body: positional and keyword arguments in, result out
pub type ActorFn = Arc<dyn Fn(Vec<Value>, Map<String, Value>) -> ActorFuture + Send + Sync>;

/// A named unit of work
#[derive(Clone)]
pub struct Actor {
    name: String,
    store_results: bool,
    handler: ActorFn,
}

impl Actor {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActorResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            store_results: true,
            handler: Arc::new(
                move |args: Vec<Value>, kwargs: Map<String, Value>| -> ActorFuture {
                    Box::pin(handler(args, kwargs))
                },
            ),
        }
    }

    /// Whether results of this actor's messages are written to the backend
    pub fn with_store_results(mut self, store_results: bool) -> Self {
        self.store_results = store_results;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store_results(&self) -> bool {
        self.store_results
    }

    /// Build a message that invokes this actor
    pub fn message(&self, args: Vec<Value>) -> Message {
        self.message_with_options(args, Map::new())
    }

    pub fn message_with_options(&self, args: Vec<Value>, extra: Map<String, Value>) -> Message {
        let message = Message::new(&self.name, args).with_options(extra);
        if self.store_results {
            message
        } else {
            message.with_option(options::STORE_RESULTS, json!(false))
        }
    }

    pub async fn call(&self, args: Vec<Value>, kwargs: Map<String, Value>) -> ActorResult {
        (self.handler)(args, kwargs).await
    }
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.name)
            .field("store_results", &self.store_results)
            .finish_non_exhaustive()
    }
}

/// Actors known to a worker, by name
#[derive(Debug, Clone, Default)]
pub struct ActorRegistry {
    actors: HashMap<String, Actor>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor, replacing any actor of the same name
    pub fn register(&mut self, actor: Actor) {
        self.actors.insert(actor.name.clone(), actor);
    }

    pub fn get(&self, name: &str) -> Option<&Actor> {
        self.actors.get(name)
    }

    pub fn has_actor(&self, name: &str) -> bool {
        self.actors.contains_key(name)
    }

    pub fn actor_names(&self) -> Vec<String> {
        self.actors.keys().cloned().collect()
    }
}

/// Consumes an [`InMemoryBroker`] with a pool of tokio tasks
pub struct Worker {
    broker: InMemoryBroker,
    registry: ActorRegistry,
    hooks: Vec<Arc<dyn CompletionHook>>,
    concurrency: usize,
}

impl Worker {
    /// Worker without hooks
    pub fn new(broker: InMemoryBroker, registry: ActorRegistry) -> Self {
        Self {
            broker,
            registry,
            hooks: Vec::new(),
            concurrency: TandemConfig::default().worker_concurrency,
        }
    }

    /// Worker with result storage, pipeline continuation and group callbacks
    pub fn standard(
        broker: InMemoryBroker,
        registry: ActorRegistry,
        results: Arc<dyn ResultBackend>,
        counters: Arc<dyn CounterBackend>,
        config: &TandemConfig,
    ) -> Self {
        let queue = Arc::new(broker.clone());
        Self::new(broker, registry)
            .with_concurrency(config.worker_concurrency)
            .with_hook(StoreResults::new(results, config.result_ttl))
            .with_hook(Pipelines::new(queue.clone()))
            .with_hook(GroupCallbacks::new(
                queue,
                CompletionCoordinator::from_config(counters, config),
            ))
    }

    /// Append a hook; hooks run in the order they were added
    pub fn with_hook(mut self, hook: impl CompletionHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run one message to completion
    ///
    /// Returns the actor's result, or `None` when the actor failed. Hook
    /// failures are logged and do not stop the remaining hooks.
    pub async fn process(&self, message: &Message) -> Result<Option<Value>> {
        let actor = self
            .registry
            .get(message.actor_name())
            .ok_or_else(|| CompositionError::UnknownActor(message.actor_name().to_string()))?;

        let result = match actor
            .call(message.args().to_vec(), message.kwargs().clone())
            .await
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(message = %message, error = %e, "Actor failed");
                return Ok(None);
            }
        };

        for hook in &self.hooks {
            if let Err(e) = hook.after_success(message, &result).await {
                tracing::error!(
                    hook = hook.name(),
                    message = %message,
                    error = %e,
                    "Completion hook failed"
                );
            }
        }
        Ok(Some(result))
    }

    /// Spawn the consumer tasks
    pub fn start(self) -> WorkerHandle {
        let concurrency = self.concurrency;
        let worker = Arc::new(self);
        tracing::info!(concurrency, "Starting worker");

        let tasks = (0..concurrency)
            .map(|slot| {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move { worker.consume(slot).await })
            })
            .collect();

        WorkerHandle { tasks }
    }

    async fn consume(&self, slot: usize) {
        loop {
            let message = match self.broker.dequeue().await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(slot, error = %e, "Dropping undecodable message");
                    continue;
                }
            };

            tracing::debug!(slot, message = %message, "Processing message");
            if let Err(e) = self.process(&message).await {
                tracing::warn!(slot, message = %message, error = %e, "Message not processed");
            }
        }
    }
}

/// Running worker tasks; dropping the handle stops them
#[derive(Debug)]
pub struct WorkerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Stop every task and wait for them to wind down
    pub async fn shutdown(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!("Worker stopped");
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
