//! Adaptive penalty settings.

use crate::{DecayParams, DecayStrategy, PenaltyReason};
use pace_rate_limit::AdaptiveConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Environment variable selecting the controller (`legacy` or `enhanced`).
pub const ENV_ADAPTIVE_MODE: &str = "PACE_ADAPTIVE_MODE";

/// Environment variable enabling stable mode (`1`, `true`, `yes`, `on`).
pub const ENV_STABLE_MODE: &str = "PACE_STABLE_MODE";

/// Which controller variant a registry builds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    /// +1 per failure, linear decay
    Legacy,
    /// Reason-weighted, selectable decay
    #[default]
    Enhanced,
}

/// Everything needed to build penalty controllers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptiveSettings {
    /// Controller variant
    pub mode: ControllerMode,
    /// Pin all penalties to zero
    pub stable: bool,
    /// Upper bound for every penalty
    pub max_penalty: f64,
    /// Decay strategy for the enhanced controller
    pub decay_strategy: DecayStrategy,
    /// Decay interval and factors
    pub decay: DecayParams,
    /// Reason entries retained per target
    pub history_size: usize,
    /// Per-reason increments for the enhanced controller
    pub reason_weights: HashMap<PenaltyReason, f64>,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            mode: ControllerMode::Enhanced,
            stable: false,
            max_penalty: 10.0,
            decay_strategy: DecayStrategy::Hybrid,
            decay: DecayParams::default(),
            history_size: 50,
            reason_weights: HashMap::new(),
        }
    }
}

impl AdaptiveSettings {
    /// Settings from the `[adaptive]` config node over the defaults.
    ///
    /// Unparseable names are logged and ignored.
    pub fn from_config(config: &AdaptiveConfig) -> Self {
        let mut settings = Self::default();

        if let Some(mode) = config.mode.as_deref() {
            match ControllerMode::from_str(mode.trim()) {
                Ok(mode) => settings.mode = mode,
                Err(_) => warn!(mode, "Unknown adaptive mode in config, keeping default"),
            }
        }
        if let Some(stable) = config.stable {
            settings.stable = stable;
        }
        if let Some(max_penalty) = config.max_penalty {
            settings.max_penalty = max_penalty;
        }
        if let Some(decay_ms) = config.decay_ms {
            settings.decay.decay_ms = decay_ms;
        }
        if let Some(strategy) = config.decay_strategy.as_deref() {
            match DecayStrategy::from_str(strategy.trim()) {
                Ok(strategy) => settings.decay_strategy = strategy,
                Err(_) => warn!(strategy, "Unknown decay strategy in config, keeping default"),
            }
        }
        if let Some(history_size) = config.history_size {
            settings.history_size = history_size;
        }
        for (name, weight) in &config.reason_weights {
            match PenaltyReason::from_str(name.trim()) {
                Ok(reason) if weight.is_finite() && *weight >= 0.0 => {
                    settings.reason_weights.insert(reason, *weight);
                }
                _ => warn!(reason = %name, weight, "Ignoring invalid reason weight"),
            }
        }

        settings
    }

    /// Apply the environment toggles on top of these settings.
    pub fn with_env(mut self) -> Self {
        if let Ok(mode) = std::env::var(ENV_ADAPTIVE_MODE) {
            match ControllerMode::from_str(mode.trim()) {
                Ok(parsed) => {
                    debug!(from = %self.mode, to = %parsed, "Adaptive mode read from environment");
                    self.mode = parsed;
                }
                Err(_) => warn!(
                    variable = ENV_ADAPTIVE_MODE,
                    value = %mode,
                    "Unknown adaptive mode, keeping configured mode"
                ),
            }
        }
        if let Ok(stable) = std::env::var(ENV_STABLE_MODE) {
            self.stable = matches!(
                stable.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
            debug!(stable = self.stable, "Stable mode read from environment");
        }
        self
    }

    /// Defaults plus environment toggles.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// `max_penalty`, made finite and non-negative.
    pub fn max_penalty(&self) -> f64 {
        if self.max_penalty.is_finite() {
            self.max_penalty.max(0.0)
        } else {
            Self::default().max_penalty
        }
    }

    /// Decay parameters clamped into range.
    pub fn decay_params(&self) -> DecayParams {
        self.decay.sanitized()
    }
}
