//! Unified limit resolution.
//!
//! Each layer proposes a concurrency; the smallest wins and is reported as
//! the limiting factor. Layers can only shrink the preset value.

use crate::{
    CoordinatorStatus, CrossInstanceCoordinator, NoCoordinator, NoRuntimeSnapshot, RuntimeCaps,
    RuntimeSnapshot, RuntimeSnapshotProvider,
};
use pace_adaptive::{ControllerMode, DecayStrategy, FailurePrediction, PenaltyRegistry};
use pace_rate_limit::{PresetSources, PresetTable, SharedClock, system_clock};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Environment variable capping concurrency for every resolution.
pub const ENV_MAX_CONCURRENCY: &str = "PACE_MAX_CONCURRENCY";

/// Positive integer from `PACE_MAX_CONCURRENCY`, if set and valid.
pub fn max_concurrency_from_env() -> Option<u32> {
    let raw = std::env::var(ENV_MAX_CONCURRENCY).ok()?;
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(variable = ENV_MAX_CONCURRENCY, value = %raw, "Ignoring invalid concurrency override");
            None
        }
    }
}

/// What to resolve limits for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LimitInput {
    /// Provider name
    pub provider: String,
    /// Model name
    pub model: String,
    /// Tier; the provider's default tier when absent
    pub tier: Option<String>,
    /// Caller's operation label, carried into metadata
    pub operation_type: Option<String>,
    /// Caller's priority label, carried into metadata
    pub priority: Option<String>,
}

impl LimitInput {
    /// Input for a provider/model pair.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Resolve against a specific tier.
    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    /// Label the operation.
    pub fn with_operation_type(mut self, operation_type: impl Into<String>) -> Self {
        self.operation_type = Some(operation_type.into());
        self
    }

    /// Label the priority.
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }
}

/// Layer that produced the effective concurrency.
///
/// Declaration order is the tie-break order: the earliest layer wins.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LimitingFactor {
    /// Static preset
    Preset,
    /// Adaptive penalty
    Adaptive,
    /// Cross-instance fair share
    CrossInstance,
    /// Live runtime occupancy
    Runtime,
    /// `PACE_MAX_CONCURRENCY`
    EnvOverride,
}

/// Preset layer details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetBreakdown {
    /// Preset concurrency
    pub concurrency: u32,
    /// Preset RPM
    pub rpm: u32,
    /// Preset TPM
    pub tpm: Option<u64>,
    /// Per-field source
    pub sources: PresetSources,
    /// Resolved tier
    pub tier: String,
}

/// Adaptive layer details.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptiveBreakdown {
    /// Decayed penalty
    pub penalty: f64,
    /// `1 / (penalty + 1)`
    pub multiplier: f64,
    /// Preset concurrency after the penalty
    pub concurrency: u32,
    /// Controller variant
    pub mode: ControllerMode,
    /// Decay strategy, for enhanced controllers
    pub decay_strategy: Option<DecayStrategy>,
    /// Stable mode pins the penalty at zero
    pub stable: bool,
}

/// Cross-instance layer details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossInstanceBreakdown {
    /// Coordinator view
    pub status: CoordinatorStatus,
    /// This instance's share of the preset
    pub concurrency: u32,
}

/// Runtime layer details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeBreakdown {
    /// False when no snapshot provider is wired
    pub registered: bool,
    /// Snapshot, when one was available
    pub snapshot: Option<RuntimeSnapshot>,
    /// Configured caps
    pub caps: RuntimeCaps,
    /// Free slots, or `None` when uncapped
    pub available: Option<u32>,
}

/// Every layer's contribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitBreakdown {
    /// Static preset
    pub preset: PresetBreakdown,
    /// Adaptive penalty
    pub adaptive: AdaptiveBreakdown,
    /// Cross-instance share
    pub cross_instance: CrossInstanceBreakdown,
    /// Live occupancy
    pub runtime: RuntimeBreakdown,
    /// Environment override, when set
    pub env_override: Option<u32>,
    /// Failure outlook, when the target has history
    pub prediction: Option<FailurePrediction>,
}

/// Context of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitMetadata {
    /// Provider as given
    pub provider: String,
    /// Model as given
    pub model: String,
    /// Resolved tier
    pub tier: String,
    /// Caller's operation label
    pub operation_type: Option<String>,
    /// Caller's priority label
    pub priority: Option<String>,
    /// When the resolution ran (ms)
    pub resolved_at_ms: u64,
}

/// Effective limits for one provider/model.
#[derive(Debug, Clone, PartialEq, Serialize, derive_getters::Getters)]
pub struct UnifiedLimitResult {
    /// Operations that may run at once (≥ 1)
    effective_concurrency: u32,
    /// Requests per minute after the penalty
    effective_rpm: u32,
    /// Tokens per minute after the penalty
    effective_tpm: Option<u64>,
    /// Per-layer details
    breakdown: LimitBreakdown,
    /// Layer that set `effective_concurrency`
    limiting_factor: LimitingFactor,
    /// Human-readable explanation
    limiting_reason: String,
    /// Inputs and timestamp
    metadata: LimitMetadata,
}

/// Which collaborators are wired, and the degradation warnings issued.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct InitializationState {
    /// A real coordinator is wired
    pub coordinator_registered: bool,
    /// A real snapshot provider is wired
    pub runtime_registered: bool,
    /// Warnings already logged (each at most once)
    pub warnings_logged: Vec<String>,
}

const COORDINATOR_WARNING: &str =
    "cross-instance coordinator not registered; assuming a single instance";
const RUNTIME_WARNING: &str = "runtime snapshot provider not registered; runtime layer uncapped";

/// Composes presets, penalties, peers and occupancy into one decision.
///
/// Holds no limit state of its own: the result is a function of the input
/// and the collaborators' current state.
#[derive(Debug)]
pub struct UnifiedLimitResolver {
    presets: PresetTable,
    penalties: Arc<PenaltyRegistry>,
    coordinator: Arc<dyn CrossInstanceCoordinator>,
    runtime: Arc<dyn RuntimeSnapshotProvider>,
    caps: RuntimeCaps,
    env_override: Option<u32>,
    clock: SharedClock,
    warnings: Mutex<Vec<String>>,
}

impl UnifiedLimitResolver {
    /// Resolver with permissive collaborators and no caps.
    pub fn new(presets: PresetTable, penalties: Arc<PenaltyRegistry>) -> Self {
        Self {
            presets,
            penalties,
            coordinator: Arc::new(NoCoordinator),
            runtime: Arc::new(NoRuntimeSnapshot),
            caps: RuntimeCaps::default(),
            env_override: None,
            clock: system_clock(),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Wire a cross-instance coordinator.
    pub fn with_coordinator(mut self, coordinator: Arc<dyn CrossInstanceCoordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Wire a runtime snapshot provider.
    pub fn with_runtime(mut self, runtime: Arc<dyn RuntimeSnapshotProvider>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Global occupancy caps.
    pub fn with_caps(mut self, caps: RuntimeCaps) -> Self {
        self.caps = caps;
        self
    }

    /// Hard concurrency cap, usually from [`max_concurrency_from_env`].
    pub fn with_env_override(mut self, max_concurrency: Option<u32>) -> Self {
        self.env_override = max_concurrency.filter(|v| *v > 0);
        self
    }

    /// Clock used for `resolved_at_ms`.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Preset table in use.
    pub fn presets(&self) -> &PresetTable {
        &self.presets
    }

    /// Penalty registry in use.
    pub fn penalties(&self) -> &Arc<PenaltyRegistry> {
        &self.penalties
    }

    /// Coordinator in use.
    pub fn coordinator(&self) -> &Arc<dyn CrossInstanceCoordinator> {
        &self.coordinator
    }

    /// Snapshot provider in use.
    pub fn runtime(&self) -> &Arc<dyn RuntimeSnapshotProvider> {
        &self.runtime
    }

    /// Wiring and degradation warnings so far.
    pub fn initialization_state(&self) -> InitializationState {
        InitializationState {
            coordinator_registered: self.coordinator.status().registered,
            runtime_registered: self.runtime.is_registered(),
            warnings_logged: self.warnings.lock().clone(),
        }
    }

    fn warn_once(&self, message: &str) {
        let mut warnings = self.warnings.lock();
        if warnings.iter().any(|w| w == message) {
            return;
        }
        warn!("{}", message);
        warnings.push(message.to_string());
    }

    /// Resolve effective limits. Never fails.
    #[instrument(skip(self), fields(provider = %input.provider, model = %input.model))]
    pub fn resolve(&self, input: &LimitInput) -> UnifiedLimitResult {
        let provider = input.provider.as_str();
        let model = input.model.as_str();

        let limits = self
            .presets
            .resolve_limits(provider, model, input.tier.as_deref());
        let preset = PresetBreakdown {
            concurrency: *limits.concurrency(),
            rpm: *limits.rpm(),
            tpm: *limits.tpm(),
            sources: *limits.sources(),
            tier: limits.tier().clone(),
        };

        let penalty = self.penalties.snapshot(provider, model);
        let multiplier = if penalty.stable { 1.0 } else { penalty.multiplier };
        let adaptive_concurrency = if penalty.stable {
            preset.concurrency
        } else {
            ((preset.concurrency as f64 / (penalty.penalty + 1.0)).floor() as u32).max(1)
        };
        let prediction = (penalty.prediction.historical_failures > 0).then_some(penalty.prediction);
        let adaptive = AdaptiveBreakdown {
            penalty: penalty.penalty,
            multiplier,
            concurrency: adaptive_concurrency.min(preset.concurrency),
            mode: penalty.mode,
            decay_strategy: penalty.decay_strategy,
            stable: penalty.stable,
        };

        let status = self.coordinator.status();
        if !status.registered {
            self.warn_once(COORDINATOR_WARNING);
        }
        let cross_instance = CrossInstanceBreakdown {
            status,
            concurrency: self
                .coordinator
                .my_parallel_limit(provider, model, preset.concurrency)
                .min(preset.concurrency),
        };

        let registered = self.runtime.is_registered();
        if !registered {
            self.warn_once(RUNTIME_WARNING);
        }
        let snapshot = self.runtime.snapshot();
        let runtime = RuntimeBreakdown {
            registered,
            snapshot,
            caps: self.caps,
            available: snapshot.and_then(|s| self.caps.available(&s)),
        };

        let candidates = [
            (LimitingFactor::Preset, Some(preset.concurrency)),
            (LimitingFactor::Adaptive, Some(adaptive.concurrency)),
            (LimitingFactor::CrossInstance, Some(cross_instance.concurrency)),
            (LimitingFactor::Runtime, runtime.available),
            (LimitingFactor::EnvOverride, self.env_override),
        ];
        let (limiting_factor, minimum) = candidates
            .into_iter()
            .filter_map(|(factor, value)| value.map(|v| (factor, v)))
            .fold((LimitingFactor::Preset, preset.concurrency), |best, next| {
                if next.1 < best.1 { next } else { best }
            });
        let effective_concurrency = minimum.max(1);

        let effective_rpm = (preset.rpm as f64 * multiplier).floor().max(0.0) as u32;
        let effective_tpm = preset
            .tpm
            .map(|tpm| (tpm as f64 * multiplier).floor().max(0.0) as u64);

        let limiting_reason = match limiting_factor {
            LimitingFactor::Preset => format!(
                "preset limit {} for tier {} ({})",
                preset.concurrency, preset.tier, preset.sources.concurrency
            ),
            LimitingFactor::Adaptive => format!(
                "adaptive penalty {:.2} reduced {} to {}",
                adaptive.penalty, preset.concurrency, adaptive.concurrency
            ),
            LimitingFactor::CrossInstance => format!(
                "{} active instances share {}; this instance gets {}",
                cross_instance.status.active_instance_count,
                preset.concurrency,
                cross_instance.concurrency
            ),
            LimitingFactor::Runtime => format!(
                "runtime capacity leaves {} slots ({} llm / {} requests active)",
                minimum,
                snapshot.map(|s| s.total_active_llm).unwrap_or(0),
                snapshot.map(|s| s.total_active_requests).unwrap_or(0)
            ),
            LimitingFactor::EnvOverride => {
                format!("{}={} caps concurrency", ENV_MAX_CONCURRENCY, minimum)
            }
        };

        debug!(
            effective_concurrency,
            effective_rpm,
            %limiting_factor,
            "Resolved unified limits"
        );

        UnifiedLimitResult {
            effective_concurrency,
            effective_rpm,
            effective_tpm,
            breakdown: LimitBreakdown {
                env_override: self.env_override,
                preset: preset.clone(),
                adaptive,
                cross_instance,
                runtime,
                prediction,
            },
            limiting_factor,
            limiting_reason,
            metadata: LimitMetadata {
                provider: input.provider.clone(),
                model: input.model.clone(),
                tier: preset.tier,
                operation_type: input.operation_type.clone(),
                priority: input.priority.clone(),
                resolved_at_ms: self.clock.now_ms(),
            },
        }
    }
}
