//! Cross-instance coordination.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// What the coordinator knows about its peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoordinatorStatus {
    /// Processes competing for the same providers, including this one
    pub active_instance_count: u32,
    /// False for the permissive stand-in
    pub registered: bool,
}

/// Splits a provider limit between peer processes.
pub trait CrossInstanceCoordinator: Send + Sync + fmt::Debug {
    /// This instance's share of `preset_limit`.
    fn my_parallel_limit(&self, provider: &str, model: &str, preset_limit: u32) -> u32;

    /// Current peer view.
    fn status(&self) -> CoordinatorStatus;
}

/// Stand-in used until a real coordinator is wired: one instance, full share.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCoordinator;

impl CrossInstanceCoordinator for NoCoordinator {
    fn my_parallel_limit(&self, _provider: &str, _model: &str, preset_limit: u32) -> u32 {
        preset_limit
    }

    fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            active_instance_count: 1,
            registered: false,
        }
    }
}

/// Even split across a known number of instances.
///
/// The instance count is fed from outside (heartbeats, a lock directory,
/// an orchestrator); this type only does the arithmetic.
#[derive(Debug)]
pub struct FairShareCoordinator {
    active_instances: AtomicU32,
}

impl Default for FairShareCoordinator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl FairShareCoordinator {
    /// Coordinator seeing `active_instances` peers (at least 1).
    pub fn new(active_instances: u32) -> Self {
        Self {
            active_instances: AtomicU32::new(active_instances.max(1)),
        }
    }

    /// Update the peer count.
    pub fn set_active_instances(&self, count: u32) {
        let count = count.max(1);
        let previous = self.active_instances.swap(count, Ordering::Relaxed);
        if previous != count {
            debug!(previous, count, "Active instance count changed");
        }
    }

    /// Current peer count.
    pub fn active_instances(&self) -> u32 {
        self.active_instances.load(Ordering::Relaxed)
    }
}

impl CrossInstanceCoordinator for FairShareCoordinator {
    fn my_parallel_limit(&self, _provider: &str, _model: &str, preset_limit: u32) -> u32 {
        (preset_limit / self.active_instances()).max(1)
    }

    fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            active_instance_count: self.active_instances(),
            registered: true,
        }
    }
}
