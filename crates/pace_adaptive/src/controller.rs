//! Legacy and enhanced penalty controllers.

use crate::{
    AdaptiveSettings, ControllerMode, DecayParams, DecayStrategy, FailurePrediction,
    PenaltyReason, PenaltyState,
};
use pace_rate_limit::SharedClock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

/// Contract shared by both controller variants.
///
/// Reads take `&mut self` because decay is applied lazily on read.
pub trait PenaltyController: Send + fmt::Debug {
    /// Current penalty after decay.
    fn get(&mut self) -> f64;

    /// Raise the penalty for `reason`.
    ///
    /// The legacy controller adds 1; the enhanced controller adds the
    /// reason's configured weight.
    fn raise(&mut self, reason: PenaltyReason);

    /// Lower the penalty by 1, floored at 0.
    fn lower(&mut self);

    /// Retained reasons and how often each occurred.
    fn reason_stats(&self) -> BTreeMap<PenaltyReason, usize>;

    /// Decay strategy, for controllers that make it selectable.
    fn decay_strategy(&self) -> Option<DecayStrategy>;

    /// Failure outlook after decay.
    fn predict(&mut self) -> FailurePrediction;

    /// Underlying state (not decayed).
    fn state(&self) -> &PenaltyState;

    /// True when penalties are pinned to zero.
    fn is_stable(&self) -> bool;

    /// Which variant this is.
    fn mode(&self) -> ControllerMode;

    /// `max(1, floor(base_limit / (penalty + 1)))`, or `base_limit` in stable mode.
    fn apply_limit(&mut self, base_limit: u32) -> u32 {
        if self.is_stable() {
            return base_limit;
        }
        let penalty = self.get();
        let limited = (base_limit as f64 / (penalty + 1.0)).floor();
        (limited as u32).max(1)
    }
}

/// Fields common to both variants.
#[derive(Debug)]
struct Core {
    state: PenaltyState,
    params: DecayParams,
    stable: bool,
    clock: SharedClock,
}

impl Core {
    fn new(settings: &AdaptiveSettings, clock: SharedClock) -> Self {
        let now = clock.now_ms();
        Self {
            state: PenaltyState::new(now, settings.max_penalty(), settings.history_size),
            params: settings.decay_params(),
            stable: settings.stable,
            clock,
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }
}

/// +1 per failure, linear decay.
#[derive(Debug)]
pub struct LegacyPenaltyController {
    core: Core,
}

impl LegacyPenaltyController {
    /// Create a controller from settings.
    pub fn new(settings: &AdaptiveSettings, clock: SharedClock) -> Self {
        Self {
            core: Core::new(settings, clock),
        }
    }

    fn refresh(&mut self) -> u64 {
        let now = self.core.now();
        self.core
            .state
            .decay(now, DecayStrategy::Linear, &self.core.params);
        now
    }
}

impl PenaltyController for LegacyPenaltyController {
    fn get(&mut self) -> f64 {
        if self.core.stable {
            return 0.0;
        }
        self.refresh();
        *self.core.state.penalty()
    }

    fn raise(&mut self, reason: PenaltyReason) {
        if self.core.stable {
            return;
        }
        let now = self.refresh();
        self.core.state.add(1.0, now);
        self.core.state.record(reason, now);
        debug!(%reason, penalty = *self.core.state.penalty(), "Legacy penalty raised");
    }

    fn lower(&mut self) {
        if self.core.stable {
            return;
        }
        let now = self.refresh();
        self.core.state.subtract_one(now);
    }

    fn reason_stats(&self) -> BTreeMap<PenaltyReason, usize> {
        self.core.state.reason_stats()
    }

    fn decay_strategy(&self) -> Option<DecayStrategy> {
        None
    }

    fn predict(&mut self) -> FailurePrediction {
        if self.core.stable {
            return FailurePrediction::default();
        }
        self.refresh();
        self.core.state.predict()
    }

    fn state(&self) -> &PenaltyState {
        &self.core.state
    }

    fn is_stable(&self) -> bool {
        self.core.stable
    }

    fn mode(&self) -> ControllerMode {
        ControllerMode::Legacy
    }
}

/// Reason-weighted increments with a selectable decay strategy.
#[derive(Debug)]
pub struct EnhancedPenaltyController {
    core: Core,
    strategy: DecayStrategy,
    reason_weights: HashMap<PenaltyReason, f64>,
}

impl EnhancedPenaltyController {
    /// Create a controller from settings.
    pub fn new(settings: &AdaptiveSettings, clock: SharedClock) -> Self {
        Self {
            core: Core::new(settings, clock),
            strategy: settings.decay_strategy,
            reason_weights: settings.reason_weights.clone(),
        }
    }

    /// Raise by the weight configured for `reason`.
    pub fn raise_with_reason(&mut self, reason: PenaltyReason) {
        if self.core.stable {
            return;
        }
        let now = self.refresh();
        let weight = self.weight(reason);
        self.core.state.add(weight, now);
        self.core.state.record(reason, now);
        debug!(
            %reason,
            weight,
            penalty = *self.core.state.penalty(),
            "Enhanced penalty raised"
        );
    }

    /// Weight applied for `reason`.
    pub fn weight(&self, reason: PenaltyReason) -> f64 {
        self.reason_weights
            .get(&reason)
            .copied()
            .unwrap_or_else(|| reason.default_weight())
    }

    fn refresh(&mut self) -> u64 {
        let now = self.core.now();
        self.core.state.decay(now, self.strategy, &self.core.params);
        now
    }
}

impl PenaltyController for EnhancedPenaltyController {
    fn get(&mut self) -> f64 {
        if self.core.stable {
            return 0.0;
        }
        self.refresh();
        *self.core.state.penalty()
    }

    fn raise(&mut self, reason: PenaltyReason) {
        self.raise_with_reason(reason);
    }

    fn lower(&mut self) {
        if self.core.stable {
            return;
        }
        let now = self.refresh();
        self.core.state.subtract_one(now);
    }

    fn reason_stats(&self) -> BTreeMap<PenaltyReason, usize> {
        self.core.state.reason_stats()
    }

    fn decay_strategy(&self) -> Option<DecayStrategy> {
        Some(self.strategy)
    }

    fn predict(&mut self) -> FailurePrediction {
        if self.core.stable {
            return FailurePrediction::default();
        }
        self.refresh();
        self.core.state.predict()
    }

    fn state(&self) -> &PenaltyState {
        &self.core.state
    }

    fn is_stable(&self) -> bool {
        self.core.stable
    }

    fn mode(&self) -> ControllerMode {
        ControllerMode::Enhanced
    }
}
