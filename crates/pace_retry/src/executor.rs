//! The retry executor.
//!
//! One call runs `ATTEMPT -> (SUCCESS | CLASSIFY) -> (RATE_LIMIT_WAIT |
//! BACKOFF_WAIT | GIVE_UP) -> ATTEMPT`. Rate-limit waits do not consume a
//! retry; only backoff waits do.

use crate::{
    FailureKind, RetryDiagnostics, RetryEvent, RetryOptions, RunError, StatusError,
    backoff_delay, classify_failure, extract_status_code, trim_error_message,
};
use pace_adaptive::PenaltyRegistry;
use pace_error::{FastFailReason, RetryError, RetryErrorKind};
use pace_rate_limit::{
    GateHitOptions, RateLimitGate, SharedClock, normalize_key, rate_limit_wait_ms,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Key reported in fast-fail errors when no gate key was supplied.
const LOCAL_KEY: &str = "<local>";

/// Length of messages handed to callbacks.
const EVENT_MESSAGE_LEN: usize = 200;

/// Sleep for `wait_ms`, or fail as soon as `cancel` fires.
async fn pause(cancel: Option<&CancellationToken>, wait_ms: u64) -> Result<(), RetryError> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(RetryError::new(RetryErrorKind::Aborted));
    }
    if wait_ms == 0 {
        return Ok(());
    }
    let sleep = tokio::time::sleep(Duration::from_millis(wait_ms));
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(RetryError::new(RetryErrorKind::Aborted)),
                () = sleep => Ok(()),
            }
        }
        None => {
            sleep.await;
            Ok(())
        }
    }
}

/// Default judgment: 429 and 5xx retry, other 4xx do not, and without a
/// status the failure kind decides.
fn default_retryable(status: Option<u16>, kind: FailureKind) -> bool {
    match status {
        Some(429) | Some(500..=599) => true,
        Some(_) => false,
        None => kind.is_retryable(),
    }
}

/// Counters for one `run` call.
#[derive(Debug, Default)]
struct Progress {
    attempts: u32,
    retries: u32,
    rate_limit_waits: u32,
    rate_limit_hits: u32,
    local_hits: u32,
    last_rate_limit_wait_ms: Option<u64>,
    rounds: HashMap<FailureKind, u32>,
}

/// Runs an operation with gated, jittered, cancellable retries.
///
/// The gate is shared: every executor built on the same `Arc<RateLimitGate>`
/// sees the same per-key windows.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    gate: Arc<RateLimitGate>,
    penalties: Option<Arc<PenaltyRegistry>>,
    clock: SharedClock,
}

impl RetryExecutor {
    /// Executor reading time from the gate's clock.
    pub fn new(gate: Arc<RateLimitGate>) -> Self {
        let clock = gate.clock().clone();
        Self {
            gate,
            penalties: None,
            clock,
        }
    }

    /// Report failures and successes to a penalty registry.
    pub fn with_penalties(mut self, penalties: Arc<PenaltyRegistry>) -> Self {
        self.penalties = Some(penalties);
        self
    }

    /// Shared rate-limit gate.
    pub fn gate(&self) -> &Arc<RateLimitGate> {
        &self.gate
    }

    /// Penalty registry, if attached.
    pub fn penalties(&self) -> Option<&Arc<PenaltyRegistry>> {
        self.penalties.as_ref()
    }

    fn fast_fail<E>(key: Option<&str>, hits: u32, wait_ms: u64, reason: FastFailReason) -> RunError<E> {
        let key = key.unwrap_or(LOCAL_KEY).to_string();
        warn!(key = %key, hits, wait_ms, %reason, "Rate limit fast-fail");
        RunError::Retry(RetryError::new(RetryErrorKind::RateLimitFastFail {
            key,
            hits,
            wait_ms,
            reason,
        }))
    }

    fn penalize<E>(&self, options: &RetryOptions<E>, kind: FailureKind) {
        let (Some(registry), Some((provider, target))) = (&self.penalties, &options.penalty_target)
        else {
            return;
        };
        if let Some(reason) = kind.penalty_reason() {
            registry.raise(provider, target, reason);
        }
    }

    fn reward<E>(&self, options: &RetryOptions<E>) {
        if let (Some(registry), Some((provider, target))) =
            (&self.penalties, &options.penalty_target)
        {
            registry.lower(provider, target);
        }
    }

    /// Run `operation` until it succeeds, gives up, fast-fails or is cancelled.
    ///
    /// # Errors
    ///
    /// - [`RunError::Operation`] with the operation's last error, verbatim,
    ///   when it is not retryable or retries are exhausted
    /// - [`RunError::Retry`] with a rate-limit fast-fail, or an abort when
    ///   the cancellation token fires (before the first attempt or mid-wait)
    #[instrument(
        skip_all,
        fields(
            key = options.rate_limit_key.as_deref().unwrap_or(LOCAL_KEY),
            max_retries = options.config.max_retries
        )
    )]
    pub async fn run<T, E, F, Fut>(
        &self,
        mut operation: F,
        options: RetryOptions<E>,
    ) -> Result<T, RunError<E>>
    where
        E: StatusError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let config = options.config.clamped();
        let key = options.rate_limit_key.as_deref().map(normalize_key);
        let cancel = options.cancel.as_ref();
        let mut rng = options.rng();
        let mut progress = Progress::default();
        let mut just_waited = false;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(attempts = progress.attempts, "Cancelled before attempt");
                return Err(RetryError::new(RetryErrorKind::Aborted).into());
            }

            // Another caller may have opened a window on this key.
            if let (Some(key), false) = (key.as_deref(), just_waited) {
                let snapshot = self.gate.snapshot(key);
                if snapshot.wait_ms > 0 {
                    if snapshot.wait_ms > options.max_rate_limit_wait_ms {
                        return Err(Self::fast_fail(
                            Some(key),
                            snapshot.hits,
                            snapshot.wait_ms,
                            FastFailReason::WaitExceeded,
                        ));
                    }
                    debug!(wait_ms = snapshot.wait_ms, "Gate closed, waiting before attempt");
                    pause(cancel, snapshot.wait_ms).await?;
                }
            }
            just_waited = false;

            progress.attempts += 1;
            let error = match operation().await {
                Ok(value) => {
                    if let Some(key) = key.as_deref() {
                        self.gate.record_success(key);
                    }
                    self.reward(&options);
                    debug!(attempts = progress.attempts, "Operation succeeded");
                    return Ok(value);
                }
                Err(error) => error,
            };

            let status = extract_status_code(&error);
            let text = error.error_text();
            let kind = classify_failure(status, &text);
            let rate_limited = status == Some(429) || kind == FailureKind::RateLimit;
            self.penalize(&options, kind);

            let retryable = match &options.should_retry {
                Some(predicate) => predicate(&error, status),
                None => default_retryable(status, kind),
            };

            if rate_limited {
                let hit_options = GateHitOptions {
                    base_wait_ms: options.rate_limit_base_wait_ms,
                    max_wait_ms: options.max_rate_limit_wait_ms,
                    retry_after_ms: error.retry_after_ms(),
                };
                let (hits, wait_ms) = match key.as_deref() {
                    Some(key) => {
                        let hit = self.gate.record_hit(key, self.clock.now_ms(), &hit_options);
                        (hit.snapshot().hits, hit.snapshot().wait_ms)
                    }
                    None => {
                        progress.local_hits = progress.local_hits.saturating_add(1);
                        let wait = rate_limit_wait_ms(
                            progress.local_hits,
                            hit_options.base_wait_ms,
                            hit_options.retry_after_ms,
                        );
                        (progress.local_hits, wait)
                    }
                };
                progress.rate_limit_hits = hits;

                if !retryable {
                    return Err(self.give_up(error, status, kind, &text, &options, progress));
                }
                if hits > options.max_rate_limit_retries {
                    return Err(Self::fast_fail(
                        key.as_deref(),
                        hits,
                        wait_ms,
                        FastFailReason::HitsExceeded,
                    ));
                }
                if wait_ms > options.max_rate_limit_wait_ms {
                    return Err(Self::fast_fail(
                        key.as_deref(),
                        hits,
                        wait_ms,
                        FastFailReason::WaitExceeded,
                    ));
                }

                progress.rate_limit_waits += 1;
                progress.last_rate_limit_wait_ms = Some(wait_ms);
                let event = RetryEvent {
                    attempt: progress.attempts,
                    retries: progress.retries,
                    delay_ms: wait_ms,
                    status,
                    kind,
                    hits,
                    key: key.clone(),
                    message: trim_error_message(&text, EVENT_MESSAGE_LEN),
                };
                if let Some(callback) = &options.on_rate_limit_wait {
                    callback(&event);
                }
                warn!(hits, wait_ms, "Rate limited, waiting before retry");
                drop(error);
                pause(cancel, wait_ms).await?;
                just_waited = true;
                continue;
            }

            if !retryable {
                return Err(self.give_up(error, status, kind, &text, &options, progress));
            }
            if options.should_retry.is_none()
                && let Some(cap) = kind.max_rounds()
                && progress.rounds.get(&kind).copied().unwrap_or(0) >= cap
            {
                debug!(%kind, cap, "Failure kind exhausted its rounds");
                return Err(self.give_up(error, status, kind, &text, &options, progress));
            }
            if progress.retries >= config.max_retries {
                return Err(self.give_up(error, status, kind, &text, &options, progress));
            }

            progress.retries += 1;
            *progress.rounds.entry(kind).or_insert(0) += 1;
            let delay_ms = backoff_delay(i64::from(progress.retries), &config, &mut rng);
            let event = RetryEvent {
                attempt: progress.attempts,
                retries: progress.retries,
                delay_ms,
                status,
                kind,
                hits: 0,
                key: key.clone(),
                message: trim_error_message(&text, EVENT_MESSAGE_LEN),
            };
            if let Some(callback) = &options.on_retry {
                callback(&event);
            }
            warn!(
                retry = progress.retries,
                delay_ms,
                status = ?status,
                %kind,
                "Operation failed, will retry"
            );
            drop(error);
            pause(cancel, delay_ms).await?;
        }
    }

    fn give_up<E>(
        &self,
        error: E,
        status: Option<u16>,
        kind: FailureKind,
        text: &str,
        options: &RetryOptions<E>,
        progress: Progress,
    ) -> RunError<E> {
        let diagnostics = RetryDiagnostics::new(
            progress.attempts,
            progress.retries,
            progress.rate_limit_waits,
            progress.rate_limit_hits,
            progress.last_rate_limit_wait_ms,
            status,
            kind,
            text,
            options.context.clone(),
        );
        warn!(diagnostics = %diagnostics, "Giving up");
        RunError::Operation { error, diagnostics }
    }
}
