//! Tests for the governor facade.

use pace::{
    ENV_MAX_CONCURRENCY, ENV_STABLE_MODE, FairShareCoordinator, Governor, HttpError,
    LimitInput, LimitingFactor, PaceConfig, RetryConfig, RetryOverrides, RuntimeCounters,
    TokioClock,
};
use serial_test::serial;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

fn bundled() -> PaceConfig {
    PaceConfig::bundled().expect("bundled config parses")
}

#[test]
fn test_bundled_governor_resolves_presets() {
    let governor = Governor::builder(bundled()).ignore_env().build();

    assert_eq!(*governor.retry_config(), RetryConfig::default());

    let result = governor.resolve(&LimitInput::new("Anthropic", "claude-sonnet"));
    assert_eq!(*result.effective_concurrency(), 4);
    assert_eq!(*result.effective_rpm(), 50);
    assert_eq!(*result.limiting_factor(), LimitingFactor::Preset);
    assert_eq!(result.breakdown().runtime.caps.max_total_llm, Some(16));

    let opus = governor.resolve(&LimitInput::new("anthropic", "claude-opus-4"));
    assert_eq!(*opus.effective_concurrency(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_call_feeds_gate_and_penalties() {
    let governor = Governor::builder(bundled())
        .clock(Arc::new(TokioClock::starting_at(0)))
        .ignore_env()
        .build();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result = governor
        .run(
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(HttpError::new(429, "rate limited"))
                    } else {
                        Ok("ok")
                    }
                }
            },
            governor.options("Anthropic", "Claude-Sonnet"),
        )
        .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(governor.gate().snapshot("anthropic:claude-sonnet").hits, 0);
    assert_eq!(governor.penalties().get("anthropic", "claude-sonnet"), 1.0);

    let limits = governor.resolve(&LimitInput::new("anthropic", "claude-sonnet"));
    assert_eq!(*limits.effective_concurrency(), 2);
    assert_eq!(*limits.effective_rpm(), 25);
    assert_eq!(*limits.limiting_factor(), LimitingFactor::Adaptive);

    governor.reset();
    assert_eq!(governor.penalties().get("anthropic", "claude-sonnet"), 0.0);
    assert!(governor.gate().is_empty());
}

#[test]
fn test_collaborators_are_wired_through() {
    let counters = RuntimeCounters::new();
    let governor = Governor::builder(bundled())
        .coordinator(Arc::new(FairShareCoordinator::new(2)))
        .runtime(Arc::new(counters.clone()))
        .ignore_env()
        .build();

    let state = governor.initialization_state();
    assert!(state.coordinator_registered);
    assert!(state.runtime_registered);

    let _guards: Vec<_> = (0..15).map(|_| counters.track_llm()).collect();
    let result = governor.resolve(&LimitInput::new("anthropic", "claude-sonnet"));
    assert_eq!(result.breakdown().cross_instance.concurrency, 2);
    assert_eq!(result.breakdown().runtime.available, Some(1));
    assert_eq!(*result.effective_concurrency(), 1);
    assert_eq!(*result.limiting_factor(), LimitingFactor::Runtime);
}

#[test]
fn test_retry_overrides_and_config_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        r#"
[providers.local]
default_tier = "box"

[providers.local.tiers.box]
name = "Box"
max_concurrent = 3

[retryWithBackoff]
maxRetries = 7
initialDelayMs = 50
"#
    )
    .expect("write config");

    let config = PaceConfig::from_file(file.path()).expect("config parses");
    let governor = Governor::builder(config)
        .retry_overrides(RetryOverrides::default().with_max_delay_ms(400))
        .ignore_env()
        .build();

    assert_eq!(governor.retry_config().max_retries, 7);
    assert_eq!(governor.retry_config().initial_delay_ms, 50);
    assert_eq!(governor.retry_config().max_delay_ms, 400);
    assert_eq!(
        *governor
            .resolve(&LimitInput::new("local", "anything"))
            .effective_concurrency(),
        3
    );

    let summary = governor.summary(&[LimitInput::new("local", "anything")]);
    assert!(summary.contains("concurrency=3"));
}

#[test]
#[serial]
fn test_environment_toggles_are_read_at_build() {
    // SAFETY: serialized with every other test touching the environment.
    unsafe {
        std::env::set_var(ENV_STABLE_MODE, "yes");
        std::env::set_var(ENV_MAX_CONCURRENCY, "1");
    }
    let governor = Governor::from_config(bundled());
    unsafe {
        std::env::remove_var(ENV_STABLE_MODE);
        std::env::remove_var(ENV_MAX_CONCURRENCY);
    }

    assert!(governor.penalties().is_stable());
    let result = governor.resolve(&LimitInput::new("anthropic", "claude-sonnet"));
    assert_eq!(*result.effective_concurrency(), 1);
    assert_eq!(*result.limiting_factor(), LimitingFactor::EnvOverride);

    let ignored = Governor::builder(bundled()).ignore_env().build();
    assert!(!ignored.penalties().is_stable());
}
