//! Tests for the per-key rate-limit gate.

use pace_rate_limit::{GateHitOptions, ManualClock, RateLimitGate};
use std::sync::Arc;

fn options() -> GateHitOptions {
    GateHitOptions {
        base_wait_ms: 1_000,
        max_wait_ms: 60_000,
        retry_after_ms: None,
    }
}

#[test]
fn test_unknown_key_snapshot_is_zeroed_and_creates_nothing() {
    let gate = RateLimitGate::with_clock(Arc::new(ManualClock::new(5_000)));
    let snapshot = gate.snapshot("openai:gpt-4o");

    assert_eq!(snapshot.hits, 0);
    assert_eq!(snapshot.wait_ms, 0);
    assert_eq!(snapshot.until_ms, 0);
    assert!(gate.is_empty());
}

#[test]
fn test_hits_grow_wait_and_success_keeps_window() {
    let clock = Arc::new(ManualClock::new(10_000));
    let gate = RateLimitGate::with_clock(clock.clone());

    let first = gate.record_hit("k", 10_000, &options());
    let second = gate.record_hit("k", 10_000, &options());
    let third = gate.record_hit("k", 10_000, &options());

    assert_eq!(*first.required_wait_ms(), 1_000);
    assert_eq!(*second.required_wait_ms(), 2_000);
    assert_eq!(*third.required_wait_ms(), 4_000);
    assert_eq!(third.snapshot().hits, 3);
    assert_eq!(third.snapshot().until_ms, 14_000);

    gate.record_success("k");
    let after = gate.snapshot("k");
    assert_eq!(after.hits, 0);
    assert_eq!(after.until_ms, 14_000);
    assert_eq!(after.wait_ms, 4_000);

    clock.advance(5_000);
    assert_eq!(gate.snapshot("k").wait_ms, 0);
}

#[test]
fn test_keys_are_isolated() {
    let gate = RateLimitGate::with_clock(Arc::new(ManualClock::new(0)));
    let before = gate.snapshot("b");

    gate.record_hit("a", 0, &options());
    gate.record_hit("a", 0, &options());

    assert_eq!(gate.snapshot("b"), before);
    assert_eq!(gate.snapshot("a").hits, 2);
}

#[test]
fn test_keys_are_normalized() {
    let gate = RateLimitGate::with_clock(Arc::new(ManualClock::new(0)));
    gate.record_hit("  Anthropic:Claude ", 0, &options());
    assert_eq!(gate.snapshot("anthropic:claude").hits, 1);
}

#[test]
fn test_wait_over_cap_signals_fast_fail() {
    let gate = RateLimitGate::with_clock(Arc::new(ManualClock::new(0)));
    let opts = GateHitOptions {
        base_wait_ms: 1_000,
        max_wait_ms: 3_000,
        retry_after_ms: None,
    };

    assert!(!gate.record_hit("k", 0, &opts).fast_fail());
    assert!(!gate.record_hit("k", 0, &opts).fast_fail());
    assert!(*gate.record_hit("k", 0, &opts).fast_fail());
}

#[test]
fn test_window_never_moves_backwards() {
    let gate = RateLimitGate::with_clock(Arc::new(ManualClock::new(0)));
    let long = GateHitOptions {
        retry_after_ms: Some(30_000),
        ..options()
    };
    gate.record_hit("k", 0, &long);
    gate.record_success("k");

    let hit = gate.record_hit("k", 1_000, &options());
    assert_eq!(hit.snapshot().until_ms, 30_000);
}

#[test]
fn test_clear_resets_state() {
    let gate = RateLimitGate::with_clock(Arc::new(ManualClock::new(0)));
    gate.record_hit("a", 0, &options());
    gate.record_hit("b", 0, &options());

    gate.clear_key("A");
    assert_eq!(gate.snapshot("a").hits, 0);
    assert_eq!(gate.len(), 1);

    gate.clear();
    assert!(gate.is_empty());
}

#[test]
fn test_concurrent_hits_on_one_key_are_counted() {
    let gate = Arc::new(RateLimitGate::with_clock(Arc::new(ManualClock::new(0))));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gate = gate.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    gate.record_hit("shared", 0, &options());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(gate.snapshot("shared").hits, 80);
}
