//! Unified limit resolution.
//!
//! [`UnifiedLimitResolver`] folds four independent views of capacity into
//! one effective concurrency:
//! - the static preset for (provider, model, tier)
//! - the adaptive penalty for that target
//! - this instance's share among peer processes
//! - free slots under the global runtime caps
//!
//! An optional `PACE_MAX_CONCURRENCY` cap sits on top. The smallest value
//! wins and is reported, with a reason, as the limiting factor.
//!
//! ```
//! use pace_adaptive::{AdaptiveSettings, PenaltyRegistry};
//! use pace_limits::{LimitInput, LimitingFactor, UnifiedLimitResolver};
//! use pace_rate_limit::{ManualClock, PresetTable};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::new(0));
//! let penalties = Arc::new(PenaltyRegistry::new(AdaptiveSettings::default(), clock.clone()));
//! let resolver = UnifiedLimitResolver::new(PresetTable::default(), penalties).with_clock(clock);
//!
//! let result = resolver.resolve(&LimitInput::new("unknown", "model"));
//! assert_eq!(*result.effective_concurrency(), 2);
//! assert_eq!(*result.limiting_factor(), LimitingFactor::Preset);
//! ```

mod coordinator;
mod resolver;
mod runtime;
mod summary;

pub use coordinator::{
    CoordinatorStatus, CrossInstanceCoordinator, FairShareCoordinator, NoCoordinator,
};
pub use resolver::{
    AdaptiveBreakdown, CrossInstanceBreakdown, ENV_MAX_CONCURRENCY, InitializationState,
    LimitBreakdown, LimitInput, LimitMetadata, LimitingFactor, PresetBreakdown, RuntimeBreakdown,
    UnifiedLimitResolver, UnifiedLimitResult, max_concurrency_from_env,
};
pub use runtime::{
    ActiveGuard, NoRuntimeSnapshot, RuntimeCaps, RuntimeCounters, RuntimeSnapshot,
    RuntimeSnapshotProvider,
};
pub use summary::{all_limits_summary, format_unified_limits_result};
