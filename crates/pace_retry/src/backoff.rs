//! Exponential backoff with jitter.

use crate::{JitterMode, RetryConfig};
use rand::Rng;

/// Delay before jitter for `attempt`.
///
/// `initial_delay_ms × multiplier^(attempt-1)` clamped to
/// `[initial_delay_ms, max_delay_ms]`. Attempts below 1 count as 1.
pub fn base_delay(attempt: i64, config: &RetryConfig) -> u64 {
    let config = config.clamped();
    let exponent = (attempt.max(1) - 1).min(i32::MAX as i64) as i32;
    let raw = config.initial_delay_ms as f64 * config.multiplier.powi(exponent);
    let capped = if raw.is_finite() {
        raw.min(config.max_delay_ms as f64) as u64
    } else {
        config.max_delay_ms
    };
    capped.clamp(config.initial_delay_ms, config.max_delay_ms)
}

/// Jittered delay in milliseconds for `attempt`.
///
/// Deterministic for a seeded `rng`.
///
/// ```
/// use pace_retry::{JitterMode, RetryConfig, backoff_delay};
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let config = RetryConfig {
///     max_retries: 5,
///     initial_delay_ms: 100,
///     max_delay_ms: 10_000,
///     multiplier: 2.0,
///     jitter: JitterMode::None,
/// };
/// let mut rng = StdRng::seed_from_u64(7);
/// assert_eq!(backoff_delay(4, &config, &mut rng), 800);
/// assert_eq!(backoff_delay(10, &config, &mut rng), 10_000);
/// ```
pub fn backoff_delay<R: Rng + ?Sized>(attempt: i64, config: &RetryConfig, rng: &mut R) -> u64 {
    let base = base_delay(attempt, config);
    match config.jitter {
        JitterMode::Full => rng.gen_range(0..=base),
        JitterMode::Partial => rng.gen_range(base / 2..=base),
        JitterMode::None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config(jitter: JitterMode) -> RetryConfig {
        RetryConfig {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_non_positive_attempts_behave_as_first() {
        let config = config(JitterMode::None);
        assert_eq!(base_delay(0, &config), 100);
        assert_eq!(base_delay(-5, &config), 100);
        assert_eq!(base_delay(i64::MIN, &config), 100);
    }

    #[test]
    fn test_monotonic_until_cap() {
        let config = config(JitterMode::None);
        let mut previous = 0;
        for attempt in 1..40 {
            let delay = base_delay(attempt, &config);
            assert!(delay >= previous);
            assert!(delay <= config.max_delay_ms);
            previous = delay;
        }
        assert_eq!(base_delay(i64::MAX, &config), 10_000);
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 1..12 {
            let base = base_delay(attempt, &config(JitterMode::None));
            let full = backoff_delay(attempt, &config(JitterMode::Full), &mut rng);
            let partial = backoff_delay(attempt, &config(JitterMode::Partial), &mut rng);
            assert!(full <= base);
            assert!(partial >= base / 2 && partial <= base);
        }
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let config = config(JitterMode::Full);
        let first: Vec<u64> = {
            let mut rng = StdRng::seed_from_u64(9);
            (1..6).map(|a| backoff_delay(a, &config, &mut rng)).collect()
        };
        let second: Vec<u64> = {
            let mut rng = StdRng::seed_from_u64(9);
            (1..6).map(|a| backoff_delay(a, &config, &mut rng)).collect()
        };
        assert_eq!(first, second);
    }
}
