//! Time-bounded retrieval of a single message's result
//!
//! [`Results`] is the one place that reads the result backend. Pipelines and
//! groups build their inspection and retrieval on top of it.

use crate::async_utils::{poll_until, Deadline, PollPolicy};
use crate::config::TandemConfig;
use crate::error::{CompositionError, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tandem_store::ResultBackend;

/// Result facade over a [`ResultBackend`]
#[derive(Clone)]
pub struct Results {
    backend: Arc<dyn ResultBackend>,
    policy: PollPolicy,
    default_timeout: Duration,
}

impl Results {
    /// Facade with the default polling policy and timeout
    pub fn new(backend: Arc<dyn ResultBackend>) -> Self {
        Self::from_config(backend, &TandemConfig::default())
    }

    pub fn from_config(backend: Arc<dyn ResultBackend>, config: &TandemConfig) -> Self {
        Self {
            backend,
            policy: config.poll_policy(),
            default_timeout: config.default_timeout,
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Timeout applied when a blocking call is given `None`
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn backend(&self) -> &Arc<dyn ResultBackend> {
        &self.backend
    }

    /// Fetch the result of `message_id`
    ///
    /// Without `block`, a single lookup is made and absence is
    /// [`CompositionError::ResultMissing`]. With `block`, the backend is polled
    /// until the result appears or `timeout` (default: [`default_timeout`])
    /// elapses, which is [`CompositionError::ResultTimeout`].
    ///
    /// [`default_timeout`]: Results::default_timeout
    pub async fn get_result(
        &self,
        message_id: &str,
        block: bool,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if !block {
            return self
                .backend
                .lookup(message_id)
                .await?
                .ok_or_else(|| CompositionError::ResultMissing {
                    message_id: message_id.to_string(),
                });
        }

        let timeout = timeout.unwrap_or(self.default_timeout);
        let deadline = Deadline::new(timeout);
        let backend = &self.backend;
        let found = poll_until(&self.policy, &deadline, || async move {
            backend
                .lookup(message_id)
                .await
                .map_err(CompositionError::from)
        })
        .await?;

        found.ok_or_else(|| {
            tracing::debug!(message_id, ?timeout, "Result did not appear before deadline");
            CompositionError::ResultTimeout {
                target: format!("message {}", message_id),
                timeout,
            }
        })
    }

    /// Whether a result is stored for `message_id`; never blocks
    pub async fn has_result(&self, message_id: &str) -> Result<bool> {
        Ok(self.backend.lookup(message_id).await?.is_some())
    }
}

impl std::fmt::Debug for Results {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Results")
            .field("policy", &self.policy)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_store::InMemoryResultBackend;

    fn facade() -> (InMemoryResultBackend, Results) {
        let backend = InMemoryResultBackend::new();
        let results = Results::new(Arc::new(backend.clone()));
        (backend, results)
    }

    #[tokio::test]
    async fn test_non_blocking_missing() {
        let (_, results) = facade();
        let err = results.get_result("nope", false, None).await.unwrap_err();
        assert!(err.is_missing());
        assert!(!results.has_result("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_non_blocking_present() {
        let (backend, results) = facade();
        backend
            .store("m1", json!(10), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(results.get_result("m1", false, None).await.unwrap(), json!(10));
        assert!(results.has_result("m1").await.unwrap());
    }

    #[tokio::test]
    async fn test_null_is_a_result() {
        let (backend, results) = facade();
        backend
            .store("m1", Value::Null, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(results.get_result("m1", false, None).await.unwrap(), Value::Null);
        assert!(results.has_result("m1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_waits_for_late_result() {
        let (backend, results) = facade();
        let writer = backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            writer
                .store("late", json!("done"), Duration::from_secs(60))
                .await
                .unwrap();
        });

        let value = results
            .get_result("late", true, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(value, json!("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_times_out_within_budget() {
        let (_, results) = facade();
        let started = tokio::time::Instant::now();

        let err = results
            .get_result("never", true, Some(Duration::from_millis(200)))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_returns_result_stored_late_in_the_budget() {
        let (backend, results) = facade();
        let writer = backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            writer
                .store("late", json!(7), Duration::from_secs(60))
                .await
                .unwrap();
        });

        let value = results
            .get_result("late", true, Some(Duration::from_millis(1000)))
            .await
            .unwrap();
        assert_eq!(value, json!(7));
    }
}
