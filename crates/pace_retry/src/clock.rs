//! Clock that follows tokio's timer.

use pace_rate_limit::Clock;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Wall-clock milliseconds that advance with tokio time.
///
/// Under a paused runtime (`#[tokio::test(start_paused = true)]`) the clock
/// moves exactly as far as the executor's sleeps, which keeps gate windows
/// and backoff waits consistent with each other in tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
    origin_ms: u64,
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioClock {
    /// Clock anchored at the current wall time.
    pub fn new() -> Self {
        let origin_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self::starting_at(origin_ms)
    }

    /// Clock anchored at an explicit time.
    pub fn starting_at(origin_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            origin_ms,
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin_ms
            .saturating_add(self.origin.elapsed().as_millis() as u64)
    }
}
