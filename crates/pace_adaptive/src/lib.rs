//! Adaptive penalty controllers.
//!
//! A penalty is a decaying scalar describing how unhealthy a target looks.
//! Failures raise it, successes lower it, and the elapsed time since the last
//! mutation decays it lazily on every read. The penalty divides a base
//! concurrency limit: `max(1, floor(base / (penalty + 1)))`.
//!
//! Two controllers share the [`PenaltyController`] surface:
//! - [`LegacyPenaltyController`]: +1 per failure, linear decay
//! - [`EnhancedPenaltyController`]: per-reason weights, selectable decay
//!
//! [`PenaltyRegistry`] owns one controller per (provider, target) key and is
//! the object callers share.
//!
//! ```
//! use pace_adaptive::{AdaptiveSettings, PenaltyReason, PenaltyRegistry};
//! use pace_rate_limit::ManualClock;
//! use std::sync::Arc;
//!
//! let registry = PenaltyRegistry::new(AdaptiveSettings::default(), Arc::new(ManualClock::new(0)));
//! registry.raise("anthropic", "claude", PenaltyReason::RateLimit);
//! assert_eq!(registry.get("anthropic", "claude"), 2.0);
//! assert_eq!(registry.apply_limit("anthropic", "claude", 9), 3);
//! ```

mod controller;
mod decay;
mod reason;
mod registry;
mod settings;
mod state;

pub use controller::{EnhancedPenaltyController, LegacyPenaltyController, PenaltyController};
pub use decay::{DecayParams, DecayStrategy};
pub use reason::PenaltyReason;
pub use registry::{PenaltyRegistry, PenaltySnapshot};
pub use settings::{
    AdaptiveSettings, ControllerMode, ENV_ADAPTIVE_MODE, ENV_STABLE_MODE,
};
pub use state::{FailurePrediction, PenaltyState, ReasonEntry};
