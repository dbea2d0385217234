//! Tests for the penalty registry and environment toggles.

use pace_adaptive::{
    AdaptiveSettings, ControllerMode, DecayStrategy, ENV_ADAPTIVE_MODE, ENV_STABLE_MODE,
    PenaltyReason, PenaltyRegistry,
};
use pace_rate_limit::{AdaptiveConfig, ManualClock};
use serial_test::serial;
use std::collections::HashMap;
use std::sync::Arc;

fn registry() -> PenaltyRegistry {
    PenaltyRegistry::new(AdaptiveSettings::default(), Arc::new(ManualClock::new(0)))
}

#[test]
fn test_targets_are_isolated_and_keys_normalized() {
    let registry = registry();

    registry.raise("Anthropic", " Claude ", PenaltyReason::RateLimit);

    assert_eq!(registry.get("anthropic", "claude"), 2.0);
    assert_eq!(registry.get("anthropic", "haiku"), 0.0);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_reads_do_not_create_state() {
    let registry = registry();

    assert_eq!(registry.get("openai", "gpt-4o"), 0.0);
    assert_eq!(registry.apply_limit("openai", "gpt-4o", 6), 6);
    let snapshot = registry.snapshot("openai", "gpt-4o");
    registry.lower("openai", "gpt-4o");

    assert_eq!(snapshot.penalty, 0.0);
    assert_eq!(snapshot.multiplier, 1.0);
    assert_eq!(snapshot.decay_strategy, Some(DecayStrategy::Hybrid));
    assert!(registry.is_empty());
}

#[test]
fn test_snapshot_reports_multiplier_and_reasons() {
    let registry = registry();
    registry.raise("gemini", "pro", PenaltyReason::Capacity);
    registry.raise("gemini", "pro", PenaltyReason::Quality);

    let snapshot = registry.snapshot("gemini", "pro");

    assert!((snapshot.penalty - 2.0).abs() < 1e-9);
    assert!((snapshot.multiplier - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(snapshot.last_reason, Some(PenaltyReason::Quality));
    assert_eq!(snapshot.reason_stats.len(), 2);
    assert_eq!(snapshot.prediction.historical_failures, 2);
    assert!((snapshot.prediction.probability - 0.2).abs() < 1e-9);
    assert_eq!(snapshot.mode, ControllerMode::Enhanced);
}

#[test]
fn test_reset_replaces_state() {
    let registry = registry();
    registry.raise("a", "x", PenaltyReason::RateLimit);
    registry.raise("a", "y", PenaltyReason::RateLimit);

    registry.reset_target("a", "x");
    assert_eq!(registry.get("a", "x"), 0.0);
    assert_eq!(registry.get("a", "y"), 2.0);

    registry.reset();
    assert!(registry.is_empty());
}

#[test]
fn test_legacy_registry_builds_legacy_controllers() {
    let settings = AdaptiveSettings {
        mode: ControllerMode::Legacy,
        ..AdaptiveSettings::default()
    };
    let registry = PenaltyRegistry::new(settings, Arc::new(ManualClock::new(0)));

    registry.raise("a", "x", PenaltyReason::RateLimit);

    assert_eq!(registry.get("a", "x"), 1.0);
    assert_eq!(registry.snapshot("a", "x").decay_strategy, None);
}

#[test]
fn test_settings_from_config_ignore_invalid_entries() {
    let config = AdaptiveConfig {
        mode: Some("LEGACY".to_string()),
        decay_strategy: Some("spiral".to_string()),
        reason_weights: HashMap::from([
            ("rate_limit".to_string(), 3.0),
            ("capacity".to_string(), -1.0),
            ("bogus".to_string(), 1.0),
        ]),
        ..AdaptiveConfig::default()
    };

    let settings = AdaptiveSettings::from_config(&config);

    assert_eq!(settings.mode, ControllerMode::Legacy);
    assert_eq!(settings.decay_strategy, DecayStrategy::Hybrid);
    assert_eq!(
        settings.reason_weights,
        HashMap::from([(PenaltyReason::RateLimit, 3.0)])
    );
}

#[test]
#[serial]
fn test_env_toggles_select_mode_and_stable() {
    // SAFETY: serialized with every other test that touches these variables.
    unsafe {
        std::env::set_var(ENV_ADAPTIVE_MODE, "legacy");
        std::env::set_var(ENV_STABLE_MODE, "true");
    }

    let settings = AdaptiveSettings::from_env();

    unsafe {
        std::env::remove_var(ENV_ADAPTIVE_MODE);
        std::env::remove_var(ENV_STABLE_MODE);
    }

    assert_eq!(settings.mode, ControllerMode::Legacy);
    assert!(settings.stable);

    let registry = PenaltyRegistry::new(settings, Arc::new(ManualClock::new(0)));
    registry.raise("a", "x", PenaltyReason::RateLimit);
    assert_eq!(registry.get("a", "x"), 0.0);
    assert_eq!(registry.apply_limit("a", "x", 5), 5);
    assert!(registry.is_empty());
}

#[test]
#[serial]
fn test_unknown_env_mode_keeps_configured_mode() {
    unsafe {
        std::env::set_var(ENV_ADAPTIVE_MODE, "turbo");
    }

    let settings = AdaptiveSettings::from_env();

    unsafe {
        std::env::remove_var(ENV_ADAPTIVE_MODE);
    }

    assert_eq!(settings.mode, ControllerMode::Enhanced);
    assert!(!settings.stable);
}
