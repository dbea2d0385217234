//! Tier-aware concurrency/RPM/TPM presets per provider and model.

use crate::{PaceConfig, Tier, TierConfig};
use pace_error::PaceResult;
use serde::Serialize;
use tracing::{debug, warn};

/// Concurrency used when no tier states one.
pub const DEFAULT_CONCURRENCY: u32 = 2;

/// Requests per minute used when no tier states one.
pub const DEFAULT_RPM: u32 = 60;

/// Where a preset value came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PresetSource {
    /// Bundled preset table
    Builtin,
    /// User override configuration
    Override,
    /// Model-specific entry inside a tier
    Model,
    /// Hard-coded fallback
    Default,
}

/// Per-field source attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PresetSources {
    /// Source of the concurrency value
    pub concurrency: PresetSource,
    /// Source of the RPM value
    pub rpm: PresetSource,
    /// Source of the TPM value
    pub tpm: PresetSource,
}

/// Resolved preset limits for one (provider, model, tier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_getters::Getters)]
pub struct PresetLimits {
    /// Maximum concurrent operations (always ≥ 1)
    concurrency: u32,
    /// Requests per minute
    rpm: u32,
    /// Tokens per minute, when the tier states one
    tpm: Option<u64>,
    /// Per-field attribution
    sources: PresetSources,
    /// Resolved tier name
    tier: String,
}

/// Lookup table combining bundled presets with optional user overrides.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresetTable {
    builtin: PaceConfig,
    overrides: Option<PaceConfig>,
}

impl PresetTable {
    /// Build a table from bundled presets and optional overrides.
    pub fn new(builtin: PaceConfig, overrides: Option<PaceConfig>) -> Self {
        Self { builtin, overrides }
    }

    /// Table backed by the bundled presets only.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled configuration fails to parse.
    pub fn bundled() -> PaceResult<Self> {
        Ok(Self::new(PaceConfig::bundled()?, None))
    }

    /// Resolve preset limits.
    ///
    /// Lookup order is override config, then bundled presets; within a tier a
    /// model-specific entry wins over tier defaults. An unknown tier falls back
    /// to the provider's default tier, and an unknown provider yields the
    /// hard-coded defaults. Never fails.
    pub fn resolve_limits(&self, provider: &str, model: &str, tier: Option<&str>) -> PresetLimits {
        let layers = [
            (self.overrides.as_ref(), PresetSource::Override),
            (Some(&self.builtin), PresetSource::Builtin),
        ];

        for (config, layer_source) in layers {
            let Some(config) = config else { continue };
            let Some(provider_config) = config.provider(provider) else {
                continue;
            };

            let (tier_config, tier_name) = match config.get_tier(provider, tier) {
                Some(found) => {
                    let name = tier.unwrap_or(&provider_config.default_tier).to_string();
                    (Some(found), name)
                }
                None => {
                    if let Some(requested) = tier {
                        warn!(
                            provider,
                            tier = requested,
                            default_tier = %provider_config.default_tier,
                            "Unknown tier, falling back to provider default"
                        );
                    }
                    (
                        config.get_tier(provider, None),
                        provider_config.default_tier.clone(),
                    )
                }
            };

            if let Some(tier_config) = tier_config {
                let limits = Self::from_tier(&tier_config, model, tier_name, layer_source);
                debug!(
                    provider,
                    model,
                    tier = %limits.tier,
                    concurrency = limits.concurrency,
                    rpm = limits.rpm,
                    "Resolved preset limits"
                );
                return limits;
            }
        }

        debug!(provider, model, "No preset found, using defaults");
        PresetLimits {
            concurrency: DEFAULT_CONCURRENCY,
            rpm: DEFAULT_RPM,
            tpm: None,
            sources: PresetSources {
                concurrency: PresetSource::Default,
                rpm: PresetSource::Default,
                tpm: PresetSource::Default,
            },
            tier: tier.unwrap_or("default").to_string(),
        }
    }

    fn from_tier(
        tier_config: &TierConfig,
        model: &str,
        tier_name: String,
        layer_source: PresetSource,
    ) -> PresetLimits {
        let merged = tier_config.for_model(model);
        let model_config = tier_config.model_overrides(model);

        let pick = |from_model: bool, present: bool| {
            if from_model {
                PresetSource::Model
            } else if present {
                layer_source
            } else {
                PresetSource::Default
            }
        };

        let sources = PresetSources {
            concurrency: pick(
                model_config.is_some_and(|m| m.max_concurrent.is_some()),
                merged.max_concurrent().is_some(),
            ),
            rpm: pick(
                model_config.is_some_and(|m| m.rpm.is_some()),
                merged.rpm().is_some(),
            ),
            tpm: pick(
                model_config.is_some_and(|m| m.tpm.is_some()),
                merged.tpm().is_some(),
            ),
        };

        PresetLimits {
            concurrency: merged.max_concurrent().unwrap_or(DEFAULT_CONCURRENCY).max(1),
            rpm: merged.rpm().unwrap_or(DEFAULT_RPM),
            tpm: merged.tpm(),
            sources,
            tier: tier_name,
        }
    }
}
