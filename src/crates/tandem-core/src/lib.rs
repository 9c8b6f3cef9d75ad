//! # tandem-core - Composing work across a task queue
//!
//! Build multi-step workflows out of individual messages and run them on
//! workers that share nothing but a broker, a result backend and a counter
//! store.
//!
//! - [`Pipeline`] - sequential chain; each stage receives the previous
//!   stage's result as its last positional argument
//! - [`Group`] - fan-out/fan-in over messages, pipelines and nested groups,
//!   with an optional completion callback
//! - [`Results`] - blocking and non-blocking result retrieval under a
//!   deadline
//! - [`CompletionCoordinator`] - exactly-once group completion on top of an
//!   atomic counter
//! - [`hooks`] - what a worker does after an actor succeeds
//! - [`worker`] - in-process actors and a stub worker
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use futures::TryStreamExt;
//! use tandem_core::config::TandemConfig;
//! use tandem_core::worker::{Actor, ActorError, ActorRegistry, Worker};
//! use tandem_core::{compose_pipeline, Results};
//! use tandem_store::{InMemoryBroker, InMemoryCounterBackend, InMemoryResultBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let add = Actor::new("add", |args: Vec<Value>, _kwargs| async move {
//!         Ok::<_, ActorError>(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
//!     });
//!     let mut registry = ActorRegistry::new();
//!     registry.register(add.clone());
//!
//!     let config = TandemConfig::default();
//!     let broker = InMemoryBroker::new();
//!     let backend = Arc::new(InMemoryResultBackend::new());
//!     let worker = Worker::standard(
//!         broker.clone(),
//!         registry,
//!         backend.clone(),
//!         Arc::new(InMemoryCounterBackend::new()),
//!         &config,
//!     )
//!     .start();
//!
//!     let pipe = compose_pipeline([
//!         add.message(vec![json!(1), json!(2)]),
//!         add.message(vec![json!(3)]),
//!         add.message(vec![json!(4)]),
//!     ])?;
//!     pipe.run(&broker).await?;
//!
//!     let results = Results::from_config(backend, &config);
//!     let total = pipe.get_result(&results, true, Some(Duration::from_secs(5))).await?;
//!     assert_eq!(total, json!(10));
//!
//!     let steps: Vec<Value> = pipe.get_results(&results, true, None).try_collect().await?;
//!     assert_eq!(steps, vec![json!(3), json!(6), json!(10)]);
//!
//!     worker.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod async_utils;
pub mod completion;
pub mod config;
pub mod error;
pub mod group;
pub mod hooks;
pub mod pipeline;
pub mod results;
pub mod worker;

// Re-export main types
pub use completion::{CompletionCoordinator, GroupLink};
pub use config::{ConfigBuilder, TandemConfig};
pub use error::{CompositionError, Result};
pub use group::{compose_group, Child, Group, GroupResult};
pub use hooks::{CompletionHook, GroupCallbacks, Pipelines, StoreResults};
pub use pipeline::{compose_pipeline, Composable, Pipeline};
pub use results::Results;
pub use worker::{Actor, ActorError, ActorRegistry, Worker, WorkerHandle};
