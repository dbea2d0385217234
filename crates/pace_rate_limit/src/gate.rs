//! Per-key rate-limit gate.
//!
//! The gate remembers, per normalized provider/model key, how many
//! consecutive rate-limit signals were observed and until when callers must
//! hold off. Each key owns its own lock; the map lock is only held long
//! enough to find or insert the entry, so keys never contend with each other.

use crate::{SharedClock, system_clock};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Case-fold and trim a gate key.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Composite key for a provider/model pair.
pub fn gate_key(provider: &str, model: &str) -> String {
    normalize_key(&format!("{}:{}", provider.trim(), model.trim()))
}

/// Wait required after the `hits`-th consecutive rate-limit signal.
///
/// `base_wait_ms × 2^(hits-1)`, raised to the server's `retry_after_ms` hint
/// when one is present. Saturates instead of overflowing.
pub fn rate_limit_wait_ms(hits: u32, base_wait_ms: u64, retry_after_ms: Option<u64>) -> u64 {
    let exponent = hits.saturating_sub(1).min(63);
    let growth = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let computed = base_wait_ms.saturating_mul(growth);
    computed.max(retry_after_ms.unwrap_or(0))
}

/// Read-only view of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    /// Normalized key
    pub key: String,
    /// Milliseconds left before the key may be hit again
    pub wait_ms: u64,
    /// Consecutive rate-limit signals
    pub hits: u32,
    /// Absolute time (ms) before which callers must not retry
    pub until_ms: u64,
}

/// Parameters for [`RateLimitGate::record_hit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateHitOptions {
    /// Wait after the first hit; doubles with every further hit
    pub base_wait_ms: u64,
    /// Longest wait the caller is willing to sit out
    pub max_wait_ms: u64,
    /// Server-provided retry-after hint
    pub retry_after_ms: Option<u64>,
}

impl Default for GateHitOptions {
    fn default() -> Self {
        Self {
            base_wait_ms: 1_000,
            max_wait_ms: 60_000,
            retry_after_ms: None,
        }
    }
}

/// Outcome of recording a rate-limit signal.
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct GateHit {
    /// State after the hit was applied
    snapshot: GateSnapshot,
    /// Wait computed for this hit alone
    required_wait_ms: u64,
    /// True when `required_wait_ms` exceeded the caller's cap
    fast_fail: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct GateEntry {
    hits: u32,
    until_ms: u64,
}

impl GateEntry {
    fn snapshot(&self, key: &str, now_ms: u64) -> GateSnapshot {
        GateSnapshot {
            key: key.to_string(),
            wait_ms: self.until_ms.saturating_sub(now_ms),
            hits: self.hits,
            until_ms: self.until_ms,
        }
    }
}

/// Per-key rate-limit memory.
#[derive(Debug)]
pub struct RateLimitGate {
    entries: Mutex<HashMap<String, Arc<Mutex<GateEntry>>>>,
    clock: SharedClock,
}

impl Default for RateLimitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitGate {
    /// Gate driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Gate driven by an injected clock.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// The clock this gate reads for snapshots.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    fn entry(&self, key: &str) -> Option<Arc<Mutex<GateEntry>>> {
        self.entries.lock().get(key).cloned()
    }

    fn entry_or_insert(&self, key: &str) -> Arc<Mutex<GateEntry>> {
        self.entries
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Snapshot a key at the gate clock's current time.
    pub fn snapshot(&self, key: &str) -> GateSnapshot {
        self.snapshot_at(key, self.clock.now_ms())
    }

    /// Snapshot a key at an explicit time.
    ///
    /// Unknown keys produce a zeroed snapshot and no state is created.
    pub fn snapshot_at(&self, key: &str, now_ms: u64) -> GateSnapshot {
        let key = normalize_key(key);
        match self.entry(&key) {
            Some(entry) => entry.lock().snapshot(&key, now_ms),
            None => GateEntry::default().snapshot(&key, now_ms),
        }
    }

    /// Record a rate-limit signal for `key` observed at `now_ms`.
    ///
    /// Increments the hit count and pushes `until_ms` out to
    /// `now_ms + rate_limit_wait_ms(hits, ..)`. The window never moves
    /// backwards, so concurrent callers converge on the furthest deadline.
    /// When the computed wait exceeds `max_wait_ms` the result is flagged
    /// as a fast-fail.
    #[instrument(skip(self, options))]
    pub fn record_hit(&self, key: &str, now_ms: u64, options: &GateHitOptions) -> GateHit {
        let key = normalize_key(key);
        let entry = self.entry_or_insert(&key);
        let mut state = entry.lock();

        state.hits = state.hits.saturating_add(1);
        let required_wait_ms =
            rate_limit_wait_ms(state.hits, options.base_wait_ms, options.retry_after_ms);
        state.until_ms = state
            .until_ms
            .max(now_ms.saturating_add(required_wait_ms));

        let fast_fail = required_wait_ms > options.max_wait_ms;
        let snapshot = state.snapshot(&key, now_ms);
        debug!(
            hits = snapshot.hits,
            required_wait_ms,
            until_ms = snapshot.until_ms,
            fast_fail,
            "Recorded rate-limit hit"
        );

        GateHit {
            snapshot,
            required_wait_ms,
            fast_fail,
        }
    }

    /// Reset the hit count after a successful call.
    ///
    /// `until_ms` is left untouched; unknown keys are ignored.
    pub fn record_success(&self, key: &str) {
        let key = normalize_key(key);
        if let Some(entry) = self.entry(&key) {
            let mut state = entry.lock();
            if state.hits > 0 {
                debug!(key = %key, previous_hits = state.hits, "Rate-limit hits reset");
            }
            state.hits = 0;
        }
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Forget one key.
    pub fn clear_key(&self, key: &str) {
        self.entries.lock().remove(&normalize_key(key));
    }

    /// Number of keys with state.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no key has state.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_doubles_per_hit() {
        assert_eq!(rate_limit_wait_ms(1, 500, None), 500);
        assert_eq!(rate_limit_wait_ms(2, 500, None), 1_000);
        assert_eq!(rate_limit_wait_ms(4, 500, None), 4_000);
    }

    #[test]
    fn test_wait_honours_retry_after_hint() {
        assert_eq!(rate_limit_wait_ms(1, 500, Some(7_000)), 7_000);
        assert_eq!(rate_limit_wait_ms(5, 500, Some(1_000)), 8_000);
    }

    #[test]
    fn test_wait_saturates() {
        assert_eq!(rate_limit_wait_ms(200, u64::MAX / 2, None), u64::MAX);
        assert_eq!(rate_limit_wait_ms(0, 500, None), 500);
    }

    #[test]
    fn test_gate_key_normalizes() {
        assert_eq!(gate_key(" OpenAI ", "GPT-4o "), "openai:gpt-4o");
        assert_eq!(normalize_key("  MiXeD "), "mixed");
    }
}
