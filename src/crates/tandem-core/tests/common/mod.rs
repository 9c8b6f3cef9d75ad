#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tandem_core::config::TandemConfig;
use tandem_core::worker::{Actor, ActorError, ActorRegistry, Worker, WorkerHandle};
use tandem_core::{CompletionCoordinator, Results};
use tandem_store::{InMemoryBroker, InMemoryCounterBackend, InMemoryResultBackend};

/// Broker, backends and facades wired the way a deployment would wire them
pub struct Harness {
    pub config: TandemConfig,
    pub broker: InMemoryBroker,
    pub backend: InMemoryResultBackend,
    pub counters: InMemoryCounterBackend,
    pub results: Results,
    pub coordinator: CompletionCoordinator,
}

impl Harness {
    pub fn new() -> Self {
        let config = TandemConfig::default();
        let backend = InMemoryResultBackend::new();
        let counters = InMemoryCounterBackend::new();
        Self {
            results: Results::from_config(Arc::new(backend.clone()), &config),
            coordinator: CompletionCoordinator::from_config(Arc::new(counters.clone()), &config),
            broker: InMemoryBroker::new(),
            backend,
            counters,
            config,
        }
    }

    pub fn start(&self, registry: ActorRegistry) -> WorkerHandle {
        Worker::standard(
            self.broker.clone(),
            registry,
            Arc::new(self.backend.clone()),
            Arc::new(self.counters.clone()),
            &self.config,
        )
        .start()
    }
}

/// Sums integer arguments
pub fn add() -> Actor {
    Actor::new("add", |args: Vec<Value>, _kwargs| async move {
        let mut sum = 0;
        for arg in &args {
            sum += arg
                .as_i64()
                .ok_or_else(|| ActorError::InvalidArguments(format!("not an integer: {}", arg)))?;
        }
        Ok::<_, ActorError>(json!(sum))
    })
}

/// Sleeps for its first argument, in milliseconds, and returns null
pub fn sleep() -> Actor {
    Actor::new("sleep", |args: Vec<Value>, _kwargs| async move {
        let millis = args.first().and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok::<_, ActorError>(Value::Null)
    })
}

/// Logical clock of observed events
#[derive(Clone, Default)]
pub struct Journal {
    clock: Arc<AtomicUsize>,
    entries: Arc<Mutex<Vec<(String, usize)>>>,
}

impl Journal {
    pub fn record(&self, label: &str) {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().push((label.to_string(), tick));
    }

    pub fn ticks(&self, label: &str) -> Vec<usize> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(entry, _)| entry == label)
            .map(|(_, tick)| *tick)
            .collect()
    }

    pub fn count(&self, label: &str) -> usize {
        self.ticks(label).len()
    }

    /// Poll until `label` has been recorded `times` times
    pub async fn wait_for(&self, label: &str, times: usize, timeout: Duration) -> bool {
        let started = tokio::time::Instant::now();
        while started.elapsed() < timeout {
            if self.count(label) >= times {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.count(label) >= times
    }
}

/// Adds its arguments and records a "child" event when done
pub fn recording_add(journal: &Journal) -> Actor {
    let journal = journal.clone();
    Actor::new("add", move |args: Vec<Value>, _kwargs| {
        let journal = journal.clone();
        async move {
            let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
            tokio::time::sleep(Duration::from_millis(5 * (sum.unsigned_abs() % 4))).await;
            journal.record("child");
            Ok::<_, ActorError>(json!(sum))
        }
    })
}

/// Records a "callback" event when it starts
pub fn recording_callback(journal: &Journal) -> Actor {
    let journal = journal.clone();
    Actor::new("finalize", move |_args: Vec<Value>, _kwargs| {
        let journal = journal.clone();
        async move {
            journal.record("callback");
            Ok::<_, ActorError>(Value::Null)
        }
    })
}

pub fn registry(actors: impl IntoIterator<Item = Actor>) -> ActorRegistry {
    let mut registry = ActorRegistry::new();
    for actor in actors {
        registry.register(actor);
    }
    registry
}
