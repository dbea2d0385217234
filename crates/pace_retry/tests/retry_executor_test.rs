//! Tests for the retry executor state machine.

use pace_adaptive::{AdaptiveSettings, PenaltyRegistry};
use pace_error::{FastFailReason, RetryErrorKind};
use pace_rate_limit::{Clock, GateHitOptions, ManualClock, RateLimitGate};
use pace_retry::{
    FailureKind, HttpError, JitterMode, RetryConfig, RetryExecutor, RetryOptions, TokioClock,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay_ms: 100,
        max_delay_ms: 10_000,
        multiplier: 2.0,
        jitter: JitterMode::None,
    }
}

fn executor() -> RetryExecutor {
    RetryExecutor::new(Arc::new(RateLimitGate::with_clock(Arc::new(
        TokioClock::starting_at(1_000_000),
    ))))
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_invokes_n_plus_one_times_and_returns_original_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result = executor()
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HttpError::new(500, "upstream exploded"))
                }
            },
            RetryOptions::new(config(3)).with_context("provider", "openai"),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let err = result.unwrap_err();
    let diagnostics = err.diagnostics().unwrap().clone();
    assert_eq!(*diagnostics.attempts(), 4);
    assert_eq!(*diagnostics.retries(), 3);
    assert_eq!(*diagnostics.kind(), FailureKind::Transient);
    assert!(diagnostics.summary().starts_with("provider=openai"));
    assert_eq!(
        err.into_operation_error(),
        Some(HttpError::new(500, "upstream exploded"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_grow_and_are_reported() {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let seen = delays.clone();

    let result = executor()
        .run(
            || async { Err::<(), _>(HttpError::new(503, "busy")) },
            RetryOptions::new(config(3)).with_on_retry(move |event| {
                seen.lock().unwrap().push(event.delay_ms);
            }),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(*delays.lock().unwrap(), vec![100, 200, 400]);
}

#[tokio::test(start_paused = true)]
async fn test_already_cancelled_token_skips_operation() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let token = CancellationToken::new();
    token.cancel();

    let result = executor()
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HttpError>(())
                }
            },
            RetryOptions::new(config(3)).with_cancellation(token),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(result.unwrap_err().is_aborted());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_mid_wait_aborts_pending_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let slow = RetryConfig {
        initial_delay_ms: 10_000,
        ..config(5)
    };
    let result = executor()
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HttpError::new(503, "busy"))
                }
            },
            RetryOptions::new(slow).with_cancellation(token),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let err = result.unwrap_err();
    assert!(err.is_aborted());
    assert!(err.operation_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_rate_limit_wait_aborts() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let started = tokio::time::Instant::now();

    let result = executor()
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HttpError::new(429, "slow down"))
                }
            },
            RetryOptions::new(config(3))
                .with_rate_limit_key("k")
                .with_rate_limit_base_wait_ms(10_000)
                .with_cancellation(token),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let err = result.unwrap_err();
    assert!(err.is_aborted());
    assert!(err.operation_error().is_none());
    assert!(started.elapsed() < Duration::from_millis(10_000));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_while_gate_closed_skips_first_attempt() {
    let clock = Arc::new(TokioClock::starting_at(0));
    let gate = Arc::new(RateLimitGate::with_clock(clock.clone()));
    gate.record_hit(
        "k",
        clock.now_ms(),
        &GateHitOptions {
            base_wait_ms: 10_000,
            ..GateHitOptions::default()
        },
    );
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = RetryExecutor::new(gate)
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HttpError>(())
                }
            },
            RetryOptions::new(config(3))
                .with_rate_limit_key("k")
                .with_cancellation(token),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(result.unwrap_err().is_aborted());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_waits_do_not_consume_retries() {
    let executor = executor();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let waits = Arc::new(Mutex::new(Vec::new()));
    let seen = waits.clone();

    let result = executor
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(HttpError::new(429, "slow down"))
                    } else {
                        Ok("done")
                    }
                }
            },
            RetryOptions::new(config(0))
                .with_rate_limit_key("OpenAI:GPT-4o")
                .with_on_rate_limit_wait(move |event| {
                    seen.lock().unwrap().push((event.hits, event.delay_ms));
                }),
        )
        .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(*waits.lock().unwrap(), vec![(1, 1_000), (2, 2_000)]);
    assert_eq!(executor.gate().snapshot("openai:gpt-4o").hits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fast_fail_when_hits_exceed_budget() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result = executor()
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HttpError::new(429, "slow down"))
                }
            },
            RetryOptions::new(config(3))
                .with_rate_limit_key("k")
                .with_max_rate_limit_retries(2),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let err = result.unwrap_err();
    assert!(err.is_fast_fail());
    match err.retry_error().unwrap().kind() {
        RetryErrorKind::RateLimitFastFail { key, hits, reason, .. } => {
            assert_eq!(key, "k");
            assert_eq!(*hits, 3);
            assert_eq!(*reason, FastFailReason::HitsExceeded);
        }
        other => panic!("unexpected kind: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_fast_fail_when_retry_after_exceeds_wait_cap() {
    let result = executor()
        .run(
            || async {
                Err::<(), _>(HttpError::new(429, "quota").with_retry_after_ms(120_000))
            },
            RetryOptions::new(config(3))
                .with_rate_limit_key("k")
                .with_max_rate_limit_wait_ms(60_000),
        )
        .await;

    match result.unwrap_err().retry_error().unwrap().kind() {
        RetryErrorKind::RateLimitFastFail { wait_ms, reason, .. } => {
            assert_eq!(*wait_ms, 120_000);
            assert_eq!(*reason, FastFailReason::WaitExceeded);
        }
        other => panic!("unexpected kind: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_without_key_uses_local_counter() {
    let result = executor()
        .run(
            || async { Err::<(), _>("429 Too Many Requests".to_string()) },
            RetryOptions::new(config(3)).with_max_rate_limit_retries(1),
        )
        .await;

    match result.unwrap_err().retry_error().unwrap().kind() {
        RetryErrorKind::RateLimitFastFail { key, hits, .. } => {
            assert_eq!(key, "<local>");
            assert_eq!(*hits, 2);
        }
        other => panic!("unexpected kind: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_should_retry_fully_overrides_default() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let result = executor()
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HttpError::new(500, "boom"))
                }
            },
            RetryOptions::new(config(3)).with_should_retry(|_, _| false),
        )
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(result.unwrap_err().operation_error().is_some());

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let _ = executor()
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HttpError::new(400, "bad request"))
                }
            },
            RetryOptions::new(config(2)).with_should_retry(|err: &HttpError, status| {
                status == Some(400) && err.message.contains("bad")
            }),
        )
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_client_errors_are_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result = executor()
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HttpError::new(404, "no such model"))
                }
            },
            RetryOptions::new(config(5)),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *result.unwrap_err().diagnostics().unwrap().kind(),
        FailureKind::Permanent
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_are_capped_at_two_rounds() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let _ = executor()
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("request timed out"))
                }
            },
            RetryOptions::new(config(10)),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_closed_gate_delays_first_attempt() {
    let clock = Arc::new(TokioClock::starting_at(0));
    let gate = Arc::new(RateLimitGate::with_clock(clock.clone()));
    gate.record_hit(
        "shared",
        clock.now_ms(),
        &GateHitOptions {
            base_wait_ms: 3_000,
            ..GateHitOptions::default()
        },
    );
    let executor = RetryExecutor::new(gate);
    let started = tokio::time::Instant::now();

    let result = executor
        .run(
            || async { Ok::<_, HttpError>(7) },
            RetryOptions::new(config(0)).with_rate_limit_key("shared"),
        )
        .await;

    assert_eq!(result.unwrap(), 7);
    assert!(started.elapsed() >= Duration::from_millis(3_000));
}

#[tokio::test(start_paused = true)]
async fn test_failures_and_success_feed_penalties() {
    let registry = Arc::new(PenaltyRegistry::new(
        AdaptiveSettings::default(),
        Arc::new(ManualClock::new(0)),
    ));
    let executor = executor().with_penalties(registry.clone());
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result = executor
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(HttpError::new(503, "service unavailable"))
                    } else {
                        Ok(())
                    }
                }
            },
            RetryOptions::new(config(3)).with_penalty_target("openai", "gpt-4o"),
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(registry.get("openai", "gpt-4o"), 1.0);
}
