//! Per-call options for the retry executor.

use crate::{FailureKind, RetryConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Progress report handed to `on_retry` and `on_rate_limit_wait`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryEvent {
    /// Invocations of the operation so far
    pub attempt: u32,
    /// Backoff retries consumed so far
    pub retries: u32,
    /// How long the executor is about to wait
    pub delay_ms: u64,
    /// Status extracted from the failure, if any
    pub status: Option<u16>,
    /// Classified failure kind
    pub kind: FailureKind,
    /// Consecutive rate-limit hits (0 for backoff waits)
    pub hits: u32,
    /// Normalized gate key, when one was supplied
    pub key: Option<String>,
    /// Trimmed failure message
    pub message: String,
}

/// Callback invoked before a wait.
pub type RetryCallback = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

/// Retry predicate replacing the default judgment.
pub type ShouldRetry<E> = Arc<dyn Fn(&E, Option<u16>) -> bool + Send + Sync>;

/// Everything the executor needs for one call.
///
/// ```
/// use pace_retry::{RetryConfig, RetryOptions};
///
/// let options: RetryOptions<anyhow::Error> = RetryOptions::new(RetryConfig::default())
///     .with_rate_limit_key("anthropic:claude")
///     .with_max_rate_limit_retries(3)
///     .with_context("provider", "anthropic");
/// assert_eq!(options.rate_limit_key(), Some("anthropic:claude"));
/// ```
pub struct RetryOptions<E> {
    pub(crate) config: RetryConfig,
    pub(crate) rate_limit_key: Option<String>,
    pub(crate) max_rate_limit_retries: u32,
    pub(crate) max_rate_limit_wait_ms: u64,
    pub(crate) rate_limit_base_wait_ms: u64,
    pub(crate) should_retry: Option<ShouldRetry<E>>,
    pub(crate) on_retry: Option<RetryCallback>,
    pub(crate) on_rate_limit_wait: Option<RetryCallback>,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) penalty_target: Option<(String, String)>,
    pub(crate) context: Vec<(String, String)>,
    pub(crate) seed: Option<u64>,
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            rate_limit_key: self.rate_limit_key.clone(),
            max_rate_limit_retries: self.max_rate_limit_retries,
            max_rate_limit_wait_ms: self.max_rate_limit_wait_ms,
            rate_limit_base_wait_ms: self.rate_limit_base_wait_ms,
            should_retry: self.should_retry.clone(),
            on_retry: self.on_retry.clone(),
            on_rate_limit_wait: self.on_rate_limit_wait.clone(),
            cancel: self.cancel.clone(),
            penalty_target: self.penalty_target.clone(),
            context: self.context.clone(),
            seed: self.seed,
        }
    }
}

impl<E> fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("config", &self.config)
            .field("rate_limit_key", &self.rate_limit_key)
            .field("max_rate_limit_retries", &self.max_rate_limit_retries)
            .field("max_rate_limit_wait_ms", &self.max_rate_limit_wait_ms)
            .field("rate_limit_base_wait_ms", &self.rate_limit_base_wait_ms)
            .field("should_retry", &self.should_retry.is_some())
            .field("cancel", &self.cancel)
            .field("penalty_target", &self.penalty_target)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<E> RetryOptions<E> {
    /// Options around a resolved config, with default rate-limit budgets.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            rate_limit_key: None,
            max_rate_limit_retries: 5,
            max_rate_limit_wait_ms: 60_000,
            rate_limit_base_wait_ms: 1_000,
            should_retry: None,
            on_retry: None,
            on_rate_limit_wait: None,
            cancel: None,
            penalty_target: None,
            context: Vec::new(),
            seed: None,
        }
    }

    /// Resolved retry config.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Gate key, if any.
    pub fn rate_limit_key(&self) -> Option<&str> {
        self.rate_limit_key.as_deref()
    }

    /// Replace the retry config.
    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Share rate-limit state with every call using the same key.
    pub fn with_rate_limit_key(mut self, key: impl Into<String>) -> Self {
        self.rate_limit_key = Some(key.into());
        self
    }

    /// Fast-fail once consecutive rate-limit hits exceed this.
    pub fn with_max_rate_limit_retries(mut self, max: u32) -> Self {
        self.max_rate_limit_retries = max;
        self
    }

    /// Fast-fail when a rate-limit wait would exceed this.
    pub fn with_max_rate_limit_wait_ms(mut self, max_ms: u64) -> Self {
        self.max_rate_limit_wait_ms = max_ms;
        self
    }

    /// Wait after the first rate-limit hit; doubles per further hit.
    pub fn with_rate_limit_base_wait_ms(mut self, base_ms: u64) -> Self {
        self.rate_limit_base_wait_ms = base_ms;
        self
    }

    /// Replace the default retryability judgment entirely.
    pub fn with_should_retry(
        mut self,
        predicate: impl Fn(&E, Option<u16>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Called before every backoff wait.
    pub fn with_on_retry(mut self, callback: impl Fn(&RetryEvent) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// Called before every rate-limit wait.
    pub fn with_on_rate_limit_wait(
        mut self,
        callback: impl Fn(&RetryEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_rate_limit_wait = Some(Arc::new(callback));
        self
    }

    /// Abort waits (and the call) when this token fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Raise/lower this target's penalty on failure/success.
    pub fn with_penalty_target(
        mut self,
        provider: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.penalty_target = Some((provider.into(), target.into()));
        self
    }

    /// Extra `key=value` pair for diagnostics.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// Seed the jitter source.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
