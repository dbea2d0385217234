//! Decay strategies.

use serde::{Deserialize, Serialize};

/// Penalties below this are treated as zero.
const ZERO_EPSILON: f64 = 1e-9;

/// How a penalty shrinks per elapsed decay interval.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum DecayStrategy {
    /// Minus one per interval
    Linear,
    /// Times `exponential_base` per interval
    Exponential,
    /// Exponential above `hybrid_threshold`, linear at or below it
    Hybrid,
}

/// Tuning for the decay strategies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayParams {
    /// Length of one interval in milliseconds (≥ 1)
    pub decay_ms: u64,
    /// Per-interval factor for `Exponential`, in (0, 1)
    pub exponential_base: f64,
    /// Boundary between the two `Hybrid` regimes
    pub hybrid_threshold: f64,
    /// Per-interval factor above the threshold for `Hybrid`, in (0, 1)
    pub hybrid_base: f64,
}

impl Default for DecayParams {
    fn default() -> Self {
        Self {
            decay_ms: 60_000,
            exponential_base: 0.5,
            hybrid_threshold: 5.0,
            hybrid_base: 0.7,
        }
    }
}

impl DecayParams {
    /// Clamp every field into its valid range.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let factor = |value: f64, fallback: f64| {
            if value.is_finite() && value > 0.0 && value < 1.0 {
                value
            } else {
                fallback
            }
        };
        Self {
            decay_ms: self.decay_ms.max(1),
            exponential_base: factor(self.exponential_base, defaults.exponential_base),
            hybrid_threshold: if self.hybrid_threshold.is_finite() {
                self.hybrid_threshold.max(0.0)
            } else {
                defaults.hybrid_threshold
            },
            hybrid_base: factor(self.hybrid_base, defaults.hybrid_base),
        }
    }
}

impl DecayStrategy {
    /// Penalty after `steps` whole intervals.
    ///
    /// Linear and hybrid reach exactly zero; exponential is snapped to zero
    /// once it falls below floating-point noise.
    pub fn apply(self, penalty: f64, steps: u64, params: &DecayParams) -> f64 {
        if steps == 0 || penalty <= 0.0 {
            return penalty.max(0.0);
        }

        let decayed = match self {
            DecayStrategy::Linear => penalty - steps as f64,
            DecayStrategy::Exponential => {
                let exponent = steps.min(i32::MAX as u64) as i32;
                penalty * params.exponential_base.powi(exponent)
            }
            DecayStrategy::Hybrid => {
                // Terminates quickly: the exponential regime is log-bounded
                // and the linear regime takes at most threshold + 1 steps.
                let mut value = penalty;
                let mut remaining = steps;
                while remaining > 0 && value > 0.0 {
                    if value > params.hybrid_threshold {
                        value *= params.hybrid_base;
                    } else {
                        value -= 1.0;
                    }
                    remaining -= 1;
                }
                value
            }
        };

        if decayed < ZERO_EPSILON { 0.0 } else { decayed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_reaches_zero() {
        let params = DecayParams::default();
        assert_eq!(DecayStrategy::Linear.apply(3.0, 2, &params), 1.0);
        assert_eq!(DecayStrategy::Linear.apply(3.0, 10, &params), 0.0);
    }

    #[test]
    fn test_exponential_halves() {
        let params = DecayParams::default();
        let value = DecayStrategy::Exponential.apply(8.0, 3, &params);
        assert!((value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hybrid_switches_regime() {
        let params = DecayParams::default();
        // 10 -> 7 (x0.7) -> 4.9 (x0.7) -> 3.9 (-1)
        let value = DecayStrategy::Hybrid.apply(10.0, 3, &params);
        assert!((value - 3.9).abs() < 1e-9);
        assert_eq!(DecayStrategy::Hybrid.apply(10.0, u64::MAX, &params), 0.0);
    }

    #[test]
    fn test_sanitized_rejects_bad_factors() {
        let params = DecayParams {
            decay_ms: 0,
            exponential_base: 1.5,
            hybrid_threshold: f64::NAN,
            hybrid_base: -1.0,
        }
        .sanitized();
        assert_eq!(params.decay_ms, 1);
        assert_eq!(params.exponential_base, 0.5);
        assert_eq!(params.hybrid_threshold, 5.0);
        assert_eq!(params.hybrid_base, 0.7);
    }
}
