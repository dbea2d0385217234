//! Configuration structures for presets, retry and adaptive settings.
//!
//! Configuration is TOML and layered:
//! - Bundled defaults (include_str! from config/presets.toml)
//! - User overrides (~/.config/pace/pace.toml, then ./pace.toml)
//!
//! Later sources override earlier ones key by key.

use crate::Tier;
use config::{Config, File, FileFormat};
use pace_error::{ConfigError, PaceError, PaceResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Bundled default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config/presets.toml");

/// Model-specific limit overrides inside a tier.
///
/// ```toml
/// [providers.anthropic.tiers.tier1.models."claude-opus-4"]
/// rpm = 25
/// max_concurrent = 2
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct ModelTierConfig {
    /// Requests per minute limit (overrides tier default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u32>,

    /// Tokens per minute limit (overrides tier default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm: Option<u64>,

    /// Maximum concurrent requests (overrides tier default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
}

/// Configuration for a specific API tier.
///
/// ```toml
/// [providers.openai.tiers.tier1]
/// name = "Tier 1"
/// rpm = 500
/// tpm = 200_000
/// max_concurrent = 8
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TierConfig {
    /// Name of the tier (e.g., "Free", "Tier 1")
    pub name: String,

    /// Requests per minute limit (tier-level default)
    #[serde(default)]
    pub rpm: Option<u32>,

    /// Tokens per minute limit (tier-level default)
    #[serde(default)]
    pub tpm: Option<u64>,

    /// Maximum concurrent requests (tier-level default)
    #[serde(default)]
    pub max_concurrent: Option<u32>,

    /// Model-specific overrides, keyed by lower-cased model name
    #[serde(default)]
    pub models: HashMap<String, ModelTierConfig>,
}

impl Tier for TierConfig {
    fn rpm(&self) -> Option<u32> {
        self.rpm
    }

    fn tpm(&self) -> Option<u64> {
        self.tpm
    }

    fn max_concurrent(&self) -> Option<u32> {
        self.max_concurrent
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl TierConfig {
    /// Model-specific overrides for `model_name`, matched case-insensitively.
    pub fn model_overrides(&self, model_name: &str) -> Option<&ModelTierConfig> {
        let wanted = model_name.trim().to_lowercase();
        self.models
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map(|(_, cfg)| cfg)
    }

    /// Get a tier configuration with model-specific overrides applied.
    ///
    /// Returns a clone of the tier-level config when the model has no
    /// overrides of its own.
    pub fn for_model(&self, model_name: &str) -> TierConfig {
        match self.model_overrides(model_name) {
            Some(model_config) => TierConfig {
                name: self.name.clone(),
                rpm: model_config.rpm.or(self.rpm),
                tpm: model_config.tpm.or(self.tpm),
                max_concurrent: model_config.max_concurrent.or(self.max_concurrent),
                models: HashMap::new(),
            },
            None => self.clone(),
        }
    }
}

/// Configuration for a specific provider.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Name of the default tier for this provider
    pub default_tier: String,

    /// Map of tier name to tier configuration
    #[serde(default)]
    pub tiers: HashMap<String, TierConfig>,
}

/// Untyped retry node (`[retry]` or `[retry_with_backoff]`).
///
/// Values stay raw so a single badly typed field falls back to its default
/// instead of failing the whole file.
pub type RawRetryNode = HashMap<String, serde_json::Value>;

/// Adaptive penalty settings as written in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct AdaptiveConfig {
    /// `legacy` or `enhanced`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Pin every penalty to zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable: Option<bool>,

    /// Upper bound for any penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_penalty: Option<f64>,

    /// Length of one decay interval in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay_ms: Option<u64>,

    /// `linear`, `exponential` or `hybrid`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay_strategy: Option<String>,

    /// Number of reason entries retained per target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_size: Option<usize>,

    /// Per-reason penalty increments for the enhanced controller
    #[serde(default)]
    pub reason_weights: HashMap<String, f64>,
}

/// Global runtime caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct RuntimeConfig {
    /// Maximum concurrently active LLM operations across the process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_llm: Option<u32>,

    /// Maximum concurrently active HTTP requests across the process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_requests: Option<u32>,
}

/// Top-level pace configuration.
///
/// # Example
///
/// ```no_run
/// use pace_rate_limit::PaceConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PaceConfig::load()?;
/// let tier = config.get_tier("anthropic", None).unwrap();
/// println!("anthropic default tier RPM: {:?}", tier.rpm);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct PaceConfig {
    /// Map of provider name to provider configuration
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Base retry settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RawRetryNode>,

    /// Retry settings that take precedence over `retry`
    #[serde(
        default,
        alias = "retryWithBackoff",
        alias = "retrywithbackoff",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_with_backoff: Option<RawRetryNode>,

    /// Adaptive penalty settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptive: Option<AdaptiveConfig>,

    /// Global runtime caps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeConfig>,
}

impl PaceConfig {
    /// Parse the bundled `config/presets.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled file does not parse, which only
    /// happens when it was edited incorrectly.
    #[instrument]
    pub fn bundled() -> PaceResult<Self> {
        debug!("Loading bundled configuration");
        Self::from_builder(
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml)),
        )
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> PaceResult<Self> {
        debug!("Loading configuration from file");
        Self::from_builder(Config::builder().add_source(File::from(path.as_ref())))
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid TOML for this schema.
    pub fn from_toml_str(toml: &str) -> PaceResult<Self> {
        Self::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    /// Load the user override files only (no bundled defaults).
    ///
    /// Returns `Ok(None)` when neither `~/.config/pace/pace.toml` nor
    /// `./pace.toml` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be parsed.
    #[instrument]
    pub fn load_user_overrides() -> PaceResult<Option<Self>> {
        let mut builder = Config::builder();
        let mut found = false;

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/pace/pace.toml");
            if home_config.exists() {
                found = true;
                builder = builder.add_source(File::from(home_config));
            }
        }

        let local = std::path::Path::new("pace.toml");
        if local.exists() {
            found = true;
            builder = builder.add_source(File::from(local));
        }

        if !found {
            debug!("No user configuration found");
            return Ok(None);
        }
        Self::from_builder(builder).map(Some)
    }

    /// Load configuration with precedence: current dir > home dir > bundled defaults.
    ///
    /// User config files are optional and silently skipped if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if any present file fails to parse.
    #[instrument]
    pub fn load() -> PaceResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/pace/pace.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("pace").required(false));

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> PaceResult<Self> {
        builder
            .build()
            .map_err(|e| {
                PaceError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                PaceError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }

    /// Provider configuration, matched case-insensitively.
    pub fn provider(&self, provider: &str) -> Option<&ProviderConfig> {
        let wanted = provider.trim().to_lowercase();
        self.providers
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map(|(_, cfg)| cfg)
    }

    /// Get tier configuration for a provider.
    ///
    /// Uses the provider's default tier when `tier_name` is `None`.
    #[instrument(skip(self))]
    pub fn get_tier(&self, provider: &str, tier_name: Option<&str>) -> Option<TierConfig> {
        let provider_config = self.provider(provider)?;
        let tier = tier_name.unwrap_or(&provider_config.default_tier);

        debug!(provider, tier, "Looking up tier configuration");

        let wanted = tier.trim().to_lowercase();
        provider_config
            .tiers
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map(|(_, cfg)| cfg.clone())
    }
}
