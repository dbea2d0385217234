//! Registry owning one penalty controller per (provider, target).

use crate::{
    AdaptiveSettings, ControllerMode, DecayStrategy, EnhancedPenaltyController, FailurePrediction,
    LegacyPenaltyController, PenaltyController, PenaltyReason,
};
use pace_rate_limit::{SharedClock, gate_key};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument};

type SharedController = Arc<Mutex<Box<dyn PenaltyController>>>;

/// Point-in-time view of one target's penalty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PenaltySnapshot {
    /// Decayed penalty
    pub penalty: f64,
    /// `1 / (penalty + 1)`; 1.0 in stable mode
    pub multiplier: f64,
    /// Most recent reason, if any
    pub last_reason: Option<PenaltyReason>,
    /// Retained reason counts
    pub reason_stats: BTreeMap<PenaltyReason, usize>,
    /// Failure outlook
    pub prediction: FailurePrediction,
    /// Decay strategy (enhanced controllers only)
    pub decay_strategy: Option<DecayStrategy>,
    /// Controller variant
    pub mode: ControllerMode,
    /// Whether stable mode pinned the penalty
    pub stable: bool,
}

impl PenaltySnapshot {
    fn untouched(settings: &AdaptiveSettings) -> Self {
        Self {
            penalty: 0.0,
            multiplier: 1.0,
            last_reason: None,
            reason_stats: BTreeMap::new(),
            prediction: FailurePrediction::default(),
            decay_strategy: match settings.mode {
                ControllerMode::Legacy => None,
                ControllerMode::Enhanced => Some(settings.decay_strategy),
            },
            mode: settings.mode,
            stable: settings.stable,
        }
    }
}

/// Process-scoped owner of penalty state.
///
/// Each key gets its own lock; the map lock is only held while looking up
/// or inserting a controller. Replacing the registry is the reset mechanism
/// for mode/stable changes; [`PenaltyRegistry::reset`] clears penalties.
#[derive(Debug)]
pub struct PenaltyRegistry {
    settings: AdaptiveSettings,
    clock: SharedClock,
    controllers: Mutex<HashMap<String, SharedController>>,
}

impl PenaltyRegistry {
    /// Registry with explicit settings and clock.
    pub fn new(settings: AdaptiveSettings, clock: SharedClock) -> Self {
        info!(
            mode = %settings.mode,
            stable = settings.stable,
            strategy = %settings.decay_strategy,
            "Creating penalty registry"
        );
        Self {
            settings,
            clock,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// Settings the registry builds controllers from.
    pub fn settings(&self) -> &AdaptiveSettings {
        &self.settings
    }

    /// Controller variant in use.
    pub fn mode(&self) -> ControllerMode {
        self.settings.mode
    }

    /// True when every penalty is pinned to zero.
    pub fn is_stable(&self) -> bool {
        self.settings.stable
    }

    fn build(&self) -> Box<dyn PenaltyController> {
        match self.settings.mode {
            ControllerMode::Legacy => Box::new(LegacyPenaltyController::new(
                &self.settings,
                self.clock.clone(),
            )),
            ControllerMode::Enhanced => Box::new(EnhancedPenaltyController::new(
                &self.settings,
                self.clock.clone(),
            )),
        }
    }

    fn existing(&self, key: &str) -> Option<SharedController> {
        self.controllers.lock().get(key).cloned()
    }

    fn controller(&self, key: &str) -> SharedController {
        if let Some(found) = self.existing(key) {
            return found;
        }
        let mut controllers = self.controllers.lock();
        controllers
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key, "Creating penalty controller");
                Arc::new(Mutex::new(self.build()))
            })
            .clone()
    }

    /// Decayed penalty for a target (0 for unknown targets).
    pub fn get(&self, provider: &str, target: &str) -> f64 {
        match self.existing(&gate_key(provider, target)) {
            Some(controller) => controller.lock().get(),
            None => 0.0,
        }
    }

    /// Raise a target's penalty.
    #[instrument(skip(self))]
    pub fn raise(&self, provider: &str, target: &str, reason: PenaltyReason) {
        if self.settings.stable {
            return;
        }
        let controller = self.controller(&gate_key(provider, target));
        controller.lock().raise(reason);
    }

    /// Lower a target's penalty by one.
    pub fn lower(&self, provider: &str, target: &str) {
        if let Some(controller) = self.existing(&gate_key(provider, target)) {
            controller.lock().lower();
        }
    }

    /// `max(1, floor(base / (penalty + 1)))`, or `base` in stable mode.
    pub fn apply_limit(&self, provider: &str, target: &str, base_limit: u32) -> u32 {
        if self.settings.stable {
            return base_limit;
        }
        match self.existing(&gate_key(provider, target)) {
            Some(controller) => controller.lock().apply_limit(base_limit),
            None => base_limit.max(1),
        }
    }

    /// Retained reason counts for a target.
    pub fn reason_stats(&self, provider: &str, target: &str) -> BTreeMap<PenaltyReason, usize> {
        self.existing(&gate_key(provider, target))
            .map(|controller| controller.lock().reason_stats())
            .unwrap_or_default()
    }

    /// Full view of a target without creating state for it.
    pub fn snapshot(&self, provider: &str, target: &str) -> PenaltySnapshot {
        let Some(controller) = self.existing(&gate_key(provider, target)) else {
            return PenaltySnapshot::untouched(&self.settings);
        };
        let mut controller = controller.lock();
        let penalty = controller.get();
        PenaltySnapshot {
            penalty,
            multiplier: if controller.is_stable() {
                1.0
            } else {
                1.0 / (penalty + 1.0)
            },
            last_reason: *controller.state().last_reason(),
            reason_stats: controller.reason_stats(),
            prediction: controller.predict(),
            decay_strategy: controller.decay_strategy(),
            mode: controller.mode(),
            stable: controller.is_stable(),
        }
    }

    /// Number of targets with state.
    pub fn len(&self) -> usize {
        self.controllers.lock().len()
    }

    /// True when no target has state.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every target's state.
    pub fn reset(&self) {
        self.controllers.lock().clear();
    }

    /// Drop one target's state.
    pub fn reset_target(&self, provider: &str, target: &str) {
        self.controllers.lock().remove(&gate_key(provider, target));
    }
}
