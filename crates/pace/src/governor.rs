//! One owned object wiring every pacing component from a [`PaceConfig`].

use pace_adaptive::{AdaptiveSettings, PenaltyRegistry};
use pace_error::PaceResult;
use pace_limits::{
    CrossInstanceCoordinator, InitializationState, LimitInput, RuntimeCaps,
    RuntimeSnapshotProvider, UnifiedLimitResolver, UnifiedLimitResult, all_limits_summary,
    max_concurrency_from_env,
};
use pace_rate_limit::{PaceConfig, PresetTable, RateLimitGate, SharedClock, gate_key, system_clock};
use pace_retry::{RetryConfig, RetryExecutor, RetryOptions, RetryOverrides, RunError, StatusError};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument};

/// Builder for [`Governor`].
///
/// Environment toggles (`PACE_ADAPTIVE_MODE`, `PACE_STABLE_MODE`,
/// `PACE_MAX_CONCURRENCY`) are read once in [`GovernorBuilder::build`]
/// unless [`GovernorBuilder::ignore_env`] was called.
#[derive(Debug)]
pub struct GovernorBuilder {
    config: PaceConfig,
    presets: Option<PresetTable>,
    clock: Option<SharedClock>,
    coordinator: Option<Arc<dyn CrossInstanceCoordinator>>,
    runtime: Option<Arc<dyn RuntimeSnapshotProvider>>,
    retry_overrides: RetryOverrides,
    read_env: bool,
}

impl GovernorBuilder {
    /// Builder over an effective configuration.
    pub fn new(config: PaceConfig) -> Self {
        Self {
            config,
            presets: None,
            clock: None,
            coordinator: None,
            runtime: None,
            retry_overrides: RetryOverrides::default(),
            read_env: true,
        }
    }

    /// Use a preset table other than the one derived from the config.
    pub fn presets(mut self, presets: PresetTable) -> Self {
        self.presets = Some(presets);
        self
    }

    /// Clock shared by the gate, penalties and resolver.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wire a cross-instance coordinator.
    pub fn coordinator(mut self, coordinator: Arc<dyn CrossInstanceCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Wire a runtime snapshot provider.
    pub fn runtime(mut self, runtime: Arc<dyn RuntimeSnapshotProvider>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Call-site retry overrides, applied over the config nodes.
    pub fn retry_overrides(mut self, overrides: RetryOverrides) -> Self {
        self.retry_overrides = overrides;
        self
    }

    /// Do not consult environment toggles.
    pub fn ignore_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    /// Assemble the governor.
    pub fn build(self) -> Governor {
        let clock = self.clock.unwrap_or_else(system_clock);

        let mut settings = self
            .config
            .adaptive
            .as_ref()
            .map(AdaptiveSettings::from_config)
            .unwrap_or_default();
        if self.read_env {
            settings = settings.with_env();
        }
        let env_override = if self.read_env {
            max_concurrency_from_env()
        } else {
            None
        };

        let retry = RetryConfig::resolve(Some(&self.config), &self.retry_overrides);
        let caps = self.config.runtime.map(RuntimeCaps::from).unwrap_or_default();
        let presets = self
            .presets
            .unwrap_or_else(|| PresetTable::new(self.config.clone(), None));

        let gate = Arc::new(RateLimitGate::with_clock(clock.clone()));
        let penalties = Arc::new(PenaltyRegistry::new(settings, clock.clone()));

        let mut resolver = UnifiedLimitResolver::new(presets, penalties.clone())
            .with_caps(caps)
            .with_env_override(env_override)
            .with_clock(clock);
        if let Some(coordinator) = self.coordinator {
            resolver = resolver.with_coordinator(coordinator);
        }
        if let Some(runtime) = self.runtime {
            resolver = resolver.with_runtime(runtime);
        }

        let executor = RetryExecutor::new(gate.clone()).with_penalties(penalties.clone());

        info!(
            max_retries = retry.max_retries,
            mode = %penalties.mode(),
            stable = penalties.is_stable(),
            env_override,
            "Governor ready"
        );

        Governor {
            retry,
            gate,
            penalties,
            resolver,
            executor,
        }
    }
}

/// Process-scoped pacing state.
///
/// Holds the shared rate-limit gate, the penalty registry, the unified
/// resolver and the retry executor. Building a new governor is the reset
/// mechanism for configuration and environment changes.
#[derive(Debug)]
pub struct Governor {
    retry: RetryConfig,
    gate: Arc<RateLimitGate>,
    penalties: Arc<PenaltyRegistry>,
    resolver: UnifiedLimitResolver,
    executor: RetryExecutor,
}

impl Governor {
    /// Start a builder over `config`.
    pub fn builder(config: PaceConfig) -> GovernorBuilder {
        GovernorBuilder::new(config)
    }

    /// Governor with default wiring over `config`.
    pub fn from_config(config: PaceConfig) -> Self {
        GovernorBuilder::new(config).build()
    }

    /// Governor over the layered configuration files.
    ///
    /// Presets attribute user-file values to `override` and bundled values
    /// to `builtin`.
    ///
    /// # Errors
    ///
    /// Returns an error if any present configuration file fails to parse.
    #[instrument]
    pub fn load() -> PaceResult<Self> {
        let config = PaceConfig::load()?;
        let presets = PresetTable::new(PaceConfig::bundled()?, PaceConfig::load_user_overrides()?);
        Ok(GovernorBuilder::new(config).presets(presets).build())
    }

    /// Resolved retry policy.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Shared rate-limit gate.
    pub fn gate(&self) -> &Arc<RateLimitGate> {
        &self.gate
    }

    /// Shared penalty registry.
    pub fn penalties(&self) -> &Arc<PenaltyRegistry> {
        &self.penalties
    }

    /// Unified limit resolver.
    pub fn resolver(&self) -> &UnifiedLimitResolver {
        &self.resolver
    }

    /// Retry executor bound to the shared gate and penalties.
    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Effective limits for one input.
    pub fn resolve(&self, input: &LimitInput) -> UnifiedLimitResult {
        self.resolver.resolve(input)
    }

    /// Multi-line summary across inputs.
    pub fn summary(&self, inputs: &[LimitInput]) -> String {
        all_limits_summary(&self.resolver, inputs)
    }

    /// Wiring state of the resolver.
    pub fn initialization_state(&self) -> InitializationState {
        self.resolver.initialization_state()
    }

    /// Retry options for calls against `provider`/`model`.
    ///
    /// The gate key, penalty target and diagnostics context are filled in.
    pub fn options<E>(&self, provider: &str, model: &str) -> RetryOptions<E> {
        RetryOptions::new(self.retry)
            .with_rate_limit_key(gate_key(provider, model))
            .with_penalty_target(provider, model)
            .with_context("provider", provider)
            .with_context("model", model)
    }

    /// Run `operation` under the shared gate with `options`.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: F,
        options: RetryOptions<E>,
    ) -> Result<T, RunError<E>>
    where
        E: StatusError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.executor.run(operation, options).await
    }

    /// Clear gate windows and penalties.
    pub fn reset(&self) {
        self.gate.clear();
        self.penalties.reset();
    }
}
