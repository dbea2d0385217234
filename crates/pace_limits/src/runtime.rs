//! Live occupancy and global runtime caps.

use pace_rate_limit::RuntimeConfig;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// What is running right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RuntimeSnapshot {
    /// Active LLM operations across the process
    pub total_active_llm: u32,
    /// Active HTTP requests across the process
    pub total_active_requests: u32,
    /// Active sub-agents
    pub subagent_active_count: u32,
    /// Active teams
    pub team_active_count: u32,
}

/// Source of [`RuntimeSnapshot`]s.
pub trait RuntimeSnapshotProvider: Send + Sync + fmt::Debug {
    /// Current snapshot, or `None` when nothing is known.
    fn snapshot(&self) -> Option<RuntimeSnapshot>;

    /// False for the permissive stand-in.
    fn is_registered(&self) -> bool {
        true
    }
}

/// Stand-in used until a real provider is wired: no snapshot, no cap.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRuntimeSnapshot;

impl RuntimeSnapshotProvider for NoRuntimeSnapshot {
    fn snapshot(&self) -> Option<RuntimeSnapshot> {
        None
    }

    fn is_registered(&self) -> bool {
        false
    }
}

/// Global occupancy caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RuntimeCaps {
    /// Cap on concurrently active LLM operations
    pub max_total_llm: Option<u32>,
    /// Cap on concurrently active HTTP requests
    pub max_total_requests: Option<u32>,
}

impl From<RuntimeConfig> for RuntimeCaps {
    fn from(config: RuntimeConfig) -> Self {
        Self {
            max_total_llm: config.max_total_llm,
            max_total_requests: config.max_total_requests,
        }
    }
}

impl RuntimeCaps {
    /// Free slots under every cap, or `None` when no cap applies.
    pub fn available(&self, snapshot: &RuntimeSnapshot) -> Option<u32> {
        let llm = self
            .max_total_llm
            .map(|max| max.saturating_sub(snapshot.total_active_llm));
        let requests = self
            .max_total_requests
            .map(|max| max.saturating_sub(snapshot.total_active_requests));
        match (llm, requests) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    llm: AtomicU32,
    requests: AtomicU32,
    subagents: AtomicU32,
    teams: AtomicU32,
}

/// In-process occupancy counters.
///
/// Cloning shares the counters. Each `track_*` call returns a guard that
/// releases its slot when dropped.
#[derive(Debug, Clone, Default)]
pub struct RuntimeCounters {
    inner: Arc<Counters>,
}

/// Keeps one slot occupied until dropped.
#[derive(Debug)]
#[must_use = "the slot is released when the guard is dropped"]
pub struct ActiveGuard {
    inner: Arc<Counters>,
    llm: bool,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let counter = if self.llm {
            &self.inner.llm
        } else {
            &self.inner.requests
        };
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(1))
        });
    }
}

impl RuntimeCounters {
    /// Fresh counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one active LLM operation.
    pub fn track_llm(&self) -> ActiveGuard {
        self.inner.llm.fetch_add(1, Ordering::Relaxed);
        ActiveGuard {
            inner: self.inner.clone(),
            llm: true,
        }
    }

    /// Count one active HTTP request.
    pub fn track_request(&self) -> ActiveGuard {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        ActiveGuard {
            inner: self.inner.clone(),
            llm: false,
        }
    }

    /// Set the active sub-agent count.
    pub fn set_subagents(&self, count: u32) {
        self.inner.subagents.store(count, Ordering::Relaxed);
    }

    /// Set the active team count.
    pub fn set_teams(&self, count: u32) {
        self.inner.teams.store(count, Ordering::Relaxed);
    }
}

impl RuntimeSnapshotProvider for RuntimeCounters {
    fn snapshot(&self) -> Option<RuntimeSnapshot> {
        Some(RuntimeSnapshot {
            total_active_llm: self.inner.llm.load(Ordering::Relaxed),
            total_active_requests: self.inner.requests.load(Ordering::Relaxed),
            subagent_active_count: self.inner.subagents.load(Ordering::Relaxed),
            team_active_count: self.inner.teams.load(Ordering::Relaxed),
        })
    }
}
