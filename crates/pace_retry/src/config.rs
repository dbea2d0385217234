//! Retry configuration and its layered resolution.

use pace_rate_limit::{PaceConfig, RawRetryNode};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

/// Largest accepted `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 20;

/// Largest accepted `initial_delay_ms`.
pub const MAX_INITIAL_DELAY_MS: u64 = 600_000;

/// Accepted `multiplier` range.
pub const MULTIPLIER_RANGE: (f64, f64) = (1.0, 10.0);

/// How randomness is applied to a backoff delay.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum JitterMode {
    /// Uniform in `[0, base]`
    #[default]
    Full,
    /// Uniform in `[base / 2, base]`
    Partial,
    /// Exactly `base`
    None,
}

/// Resolved retry policy for one call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt, in `[0, 20]`
    pub max_retries: u32,
    /// Delay before the first retry, in `[1, 600000]`
    pub initial_delay_ms: u64,
    /// Upper bound for any delay, never below `initial_delay_ms`
    pub max_delay_ms: u64,
    /// Growth factor per attempt, in `[1, 10]`
    pub multiplier: f64,
    /// Jitter applied after clamping
    pub jitter: JitterMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: JitterMode::Full,
        }
    }
}

/// Call-site overrides, the highest-priority layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RetryOverrides {
    /// Override for `max_retries`
    #[serde(default, alias = "maxRetries")]
    pub max_retries: Option<u32>,
    /// Override for `initial_delay_ms`
    #[serde(default, alias = "initialDelayMs")]
    pub initial_delay_ms: Option<u64>,
    /// Override for `max_delay_ms`
    #[serde(default, alias = "maxDelayMs")]
    pub max_delay_ms: Option<u64>,
    /// Override for `multiplier`
    #[serde(default)]
    pub multiplier: Option<f64>,
    /// Override for `jitter`
    #[serde(default)]
    pub jitter: Option<JitterMode>,
}

impl RetryOverrides {
    /// Override `max_retries`.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Override `initial_delay_ms`.
    pub fn with_initial_delay_ms(mut self, initial_delay_ms: u64) -> Self {
        self.initial_delay_ms = Some(initial_delay_ms);
        self
    }

    /// Override `max_delay_ms`.
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = Some(max_delay_ms);
        self
    }

    /// Override `multiplier`.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Override `jitter`.
    pub fn with_jitter(mut self, jitter: JitterMode) -> Self {
        self.jitter = Some(jitter);
        self
    }
}

/// `maxRetries`, `max_retries` and `maxretries` all become `maxretries`.
fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Finite, non-negative number truncated to an integer.
fn as_whole(value: &serde_json::Value) -> Option<u64> {
    let number = value.as_f64()?;
    if !number.is_finite() {
        return None;
    }
    Some(number.max(0.0).trunc() as u64)
}

impl RetryConfig {
    /// Clamp every field into range.
    ///
    /// A non-finite multiplier falls back to the default.
    pub fn clamped(self) -> Self {
        let initial_delay_ms = self.initial_delay_ms.clamp(1, MAX_INITIAL_DELAY_MS);
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.clamp(MULTIPLIER_RANGE.0, MULTIPLIER_RANGE.1)
        } else {
            Self::default().multiplier
        };
        Self {
            max_retries: self.max_retries.min(MAX_RETRIES_LIMIT),
            initial_delay_ms,
            max_delay_ms: self.max_delay_ms.max(initial_delay_ms),
            multiplier,
            jitter: self.jitter,
        }
    }

    /// Apply an untyped `[retry]` node on top of this config.
    ///
    /// Keys may be snake_case or camelCase. A field with the wrong type is
    /// logged and skipped, leaving the current value in place.
    pub fn merge_node(mut self, node: &RawRetryNode) -> Self {
        for (key, value) in node {
            let applied = match canonical_key(key).as_str() {
                "maxretries" => as_whole(value)
                    .map(|v| self.max_retries = v.min(u32::MAX as u64) as u32)
                    .is_some(),
                "initialdelayms" => as_whole(value)
                    .map(|v| self.initial_delay_ms = v)
                    .is_some(),
                "maxdelayms" => as_whole(value).map(|v| self.max_delay_ms = v).is_some(),
                "multiplier" => value
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .map(|v| self.multiplier = v)
                    .is_some(),
                "jitter" => value
                    .as_str()
                    .and_then(|s| JitterMode::from_str(s.trim()).ok())
                    .map(|j| self.jitter = j)
                    .is_some(),
                _ => {
                    debug!(key, "Ignoring unknown retry key");
                    true
                }
            };
            if !applied {
                warn!(key, value = %value, "Invalid retry value, keeping previous");
            }
        }
        self
    }

    /// Apply typed call-site overrides.
    pub fn merge_overrides(mut self, overrides: &RetryOverrides) -> Self {
        if let Some(v) = overrides.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = overrides.initial_delay_ms {
            self.initial_delay_ms = v;
        }
        if let Some(v) = overrides.max_delay_ms {
            self.max_delay_ms = v;
        }
        if let Some(v) = overrides.multiplier {
            self.multiplier = v;
        }
        if let Some(v) = overrides.jitter {
            self.jitter = v;
        }
        self
    }

    /// Resolve a config from every layer.
    ///
    /// Priority, lowest first: defaults, `[retry]`, `[retry_with_backoff]`,
    /// call-site overrides. The result is clamped.
    pub fn resolve(config: Option<&PaceConfig>, overrides: &RetryOverrides) -> Self {
        let mut resolved = Self::default();
        if let Some(config) = config {
            if let Some(node) = &config.retry {
                resolved = resolved.merge_node(node);
            }
            if let Some(node) = &config.retry_with_backoff {
                resolved = resolved.merge_node(node);
            }
        }
        let resolved = resolved.merge_overrides(overrides).clamped();
        debug!(
            max_retries = resolved.max_retries,
            initial_delay_ms = resolved.initial_delay_ms,
            max_delay_ms = resolved.max_delay_ms,
            multiplier = resolved.multiplier,
            jitter = %resolved.jitter,
            "Resolved retry config"
        );
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> RawRetryNode {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_clamped_bounds_every_field() {
        let config = RetryConfig {
            max_retries: 99,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 50.0,
            jitter: JitterMode::None,
        }
        .clamped();

        assert_eq!(config.max_retries, 20);
        assert_eq!(config.initial_delay_ms, 1);
        assert_eq!(config.max_delay_ms, 1);
        assert_eq!(config.multiplier, 10.0);
    }

    #[test]
    fn test_nan_multiplier_falls_back_to_default() {
        let config = RetryConfig {
            multiplier: f64::NAN,
            ..RetryConfig::default()
        }
        .clamped();
        assert_eq!(config.multiplier, 2.0);
    }

    #[test]
    fn test_node_accepts_camel_case_and_skips_bad_types() {
        let config = RetryConfig::default().merge_node(&node(json!({
            "maxRetries": 5,
            "initial_delay_ms": "fast",
            "maxDelayMs": 12000.7,
            "jitter": "PARTIAL",
        })));

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay_ms, 1_000);
        assert_eq!(config.max_delay_ms, 12_000);
        assert_eq!(config.jitter, JitterMode::Partial);
    }

    #[test]
    fn test_layers_apply_in_priority_order() {
        let pace = PaceConfig {
            retry: Some(node(json!({ "max_retries": 2, "multiplier": 3.0 }))),
            retry_with_backoff: Some(node(json!({ "max_retries": 4 }))),
            ..PaceConfig::default()
        };
        let overrides = RetryOverrides::default().with_jitter(JitterMode::None);

        let config = RetryConfig::resolve(Some(&pace), &overrides);

        assert_eq!(config.max_retries, 4);
        assert_eq!(config.multiplier, 3.0);
        assert_eq!(config.jitter, JitterMode::None);
        assert_eq!(config.initial_delay_ms, 1_000);
    }
}
