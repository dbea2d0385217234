//! Provider presets, configuration and the per-key rate-limit gate.
//!
//! This crate holds the static side of admission control:
//! - `PaceConfig`: TOML configuration with bundled defaults and user overrides
//! - `PresetTable`: tier-aware concurrency/RPM/TPM presets per provider and model
//! - `RateLimitGate`: per-key memory of how long to wait after a 429
//! - `Clock`: injectable millisecond clock shared by every stateful component
//!
//! ```
//! use pace_rate_limit::{ManualClock, RateLimitGate, GateHitOptions};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::new(1_000));
//! let gate = RateLimitGate::with_clock(clock.clone());
//! let hit = gate.record_hit("Anthropic:Claude", 1_000, &GateHitOptions::default());
//! assert_eq!(hit.snapshot().hits, 1);
//! assert_eq!(gate.snapshot("anthropic:claude").hits, 1);
//! ```

mod clock;
mod config;
mod gate;
mod presets;
mod tier;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use config::{
    AdaptiveConfig, ModelTierConfig, PaceConfig, ProviderConfig, RawRetryNode, RuntimeConfig,
    TierConfig,
};
pub use gate::{
    GateHit, GateHitOptions, GateSnapshot, RateLimitGate, gate_key, normalize_key,
    rate_limit_wait_ms,
};
pub use presets::{
    DEFAULT_CONCURRENCY, DEFAULT_RPM, PresetLimits, PresetSource, PresetSources, PresetTable,
};
pub use tier::Tier;
