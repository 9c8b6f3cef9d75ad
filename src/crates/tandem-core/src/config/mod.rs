//! Runtime configuration
//!
//! [`TandemConfig`] carries every tunable of the composition layer: result and
//! counter lifetimes, the default blocking timeout, the polling backoff, the
//! duplicate-completion guard and the stub worker's concurrency. It follows
//! the [`ConfigBuilder`] pattern: defaults, environment loading, merging and
//! validation.
//!
//! # Environment
//!
//! | variable | default |
//! |----------|---------|
//! | `TANDEM_RESULT_TTL_MS` | 600000 |
//! | `TANDEM_GROUP_TTL_MS` | 86400000 |
//! | `TANDEM_DEFAULT_TIMEOUT_MS` | 10000 |
//! | `TANDEM_POLL_INITIAL_MS` | 5 |
//! | `TANDEM_POLL_MAX_MS` | 1000 |
//! | `TANDEM_DEDUPE_COMPLETIONS` | true |
//! | `TANDEM_WORKER_CONCURRENCY` | 8 |
//!
//! ```rust,no_run
//! use tandem_core::config::{ConfigBuilder, TandemConfig};
//!
//! let config = TandemConfig::from_env_with_defaults("TANDEM_")?;
//! # Ok::<(), tandem_core::CompositionError>(())
//! ```

mod env;

pub use env::{env_key, get_env, get_env_bool, get_env_millis, get_env_parse};

use crate::async_utils::PollPolicy;
use crate::error::{CompositionError, Result};
use std::time::Duration;

/// Common shape for configuration structures
pub trait ConfigBuilder: Default + Clone {
    /// Check field values and cross-field constraints
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Load from `{prefix}{FIELD}` environment variables
    fn from_env(prefix: &str) -> Result<Self>;

    /// Overlay `other` onto `self`; fields `other` left at their default are kept
    fn merge(&mut self, other: Self) -> &mut Self;

    /// Defaults, validated
    fn build() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Environment over defaults, validated
    fn from_env_with_defaults(prefix: &str) -> Result<Self> {
        let mut config = Self::default();
        config.merge(Self::from_env(prefix)?);
        config.validate()?;
        Ok(config)
    }
}

/// Configuration of the composition layer
#[derive(Debug, Clone, PartialEq)]
pub struct TandemConfig {
    /// Lifetime of stored results
    pub result_ttl: Duration,
    /// Lifetime of group outstanding-counters and completion markers
    pub group_ttl: Duration,
    /// Timeout used by blocking calls that are not given one
    pub default_timeout: Duration,
    /// First polling delay of blocking calls
    pub poll_initial: Duration,
    /// Largest polling delay of blocking calls
    pub poll_max: Duration,
    /// Skip decrements for child completions that were already counted
    pub dedupe_completions: bool,
    /// Concurrent tasks started by the stub worker
    pub worker_concurrency: usize,
}

impl Default for TandemConfig {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(600),
            group_ttl: Duration::from_secs(86_400),
            default_timeout: Duration::from_secs(10),
            poll_initial: Duration::from_millis(5),
            poll_max: Duration::from_millis(1000),
            dedupe_completions: true,
            worker_concurrency: 8,
        }
    }
}

impl TandemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    pub fn with_group_ttl(mut self, ttl: Duration) -> Self {
        self.group_ttl = ttl;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.poll_initial = initial;
        self.poll_max = max;
        self
    }

    pub fn with_dedupe_completions(mut self, dedupe: bool) -> Self {
        self.dedupe_completions = dedupe;
        self
    }

    pub fn with_worker_concurrency(mut self, concurrency: usize) -> Self {
        self.worker_concurrency = concurrency;
        self
    }

    /// Polling backoff derived from `poll_initial` and `poll_max`
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(self.poll_initial).with_max_interval(self.poll_max)
    }
}

impl ConfigBuilder for TandemConfig {
    fn validate(&self) -> Result<()> {
        if self.result_ttl.is_zero() || self.group_ttl.is_zero() {
            return Err(CompositionError::Configuration(
                "result and group TTLs must be non-zero".to_string(),
            ));
        }
        if self.poll_initial.is_zero() {
            return Err(CompositionError::Configuration(
                "poll_initial must be non-zero".to_string(),
            ));
        }
        if self.poll_max < self.poll_initial {
            return Err(CompositionError::Configuration(format!(
                "poll_max ({:?}) is smaller than poll_initial ({:?})",
                self.poll_max, self.poll_initial
            )));
        }
        if self.worker_concurrency == 0 {
            return Err(CompositionError::Configuration(
                "worker_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn from_env(prefix: &str) -> Result<Self> {
        let defaults = Self::default();
        let millis = |name: &str, fallback: Duration| -> Result<Duration> {
            Ok(get_env_millis(&env_key(prefix, name))?.unwrap_or(fallback))
        };

        Ok(Self {
            result_ttl: millis("result_ttl_ms", defaults.result_ttl)?,
            group_ttl: millis("group_ttl_ms", defaults.group_ttl)?,
            default_timeout: millis("default_timeout_ms", defaults.default_timeout)?,
            poll_initial: millis("poll_initial_ms", defaults.poll_initial)?,
            poll_max: millis("poll_max_ms", defaults.poll_max)?,
            dedupe_completions: get_env_bool(&env_key(prefix, "dedupe_completions"))?
                .unwrap_or(defaults.dedupe_completions),
            worker_concurrency: get_env_parse(&env_key(prefix, "worker_concurrency"))?
                .unwrap_or(defaults.worker_concurrency),
        })
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        let defaults = Self::default();
        if other.result_ttl != defaults.result_ttl {
            self.result_ttl = other.result_ttl;
        }
        if other.group_ttl != defaults.group_ttl {
            self.group_ttl = other.group_ttl;
        }
        if other.default_timeout != defaults.default_timeout {
            self.default_timeout = other.default_timeout;
        }
        if other.poll_initial != defaults.poll_initial {
            self.poll_initial = other.poll_initial;
        }
        if other.poll_max != defaults.poll_max {
            self.poll_max = other.poll_max;
        }
        if other.dedupe_completions != defaults.dedupe_completions {
            self.dedupe_completions = other.dedupe_completions;
        }
        if other.worker_concurrency != defaults.worker_concurrency {
            self.worker_concurrency = other.worker_concurrency;
        }
        self
    }
}
