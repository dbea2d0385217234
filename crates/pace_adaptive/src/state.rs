//! Penalty state shared by both controllers.

use crate::{DecayParams, DecayStrategy, PenaltyReason};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// One recorded failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReasonEntry {
    /// Why the penalty was raised
    pub reason: PenaltyReason,
    /// When it was raised (ms)
    pub at_ms: u64,
}

/// Failure outlook derived from the reason history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct FailurePrediction {
    /// Failures currently retained in history
    pub historical_failures: usize,
    /// Current penalty relative to the maximum, in [0, 1]
    pub probability: f64,
    /// How much history backs the estimate, in [0, 1]
    pub confidence: f64,
}

/// Mutable penalty for one (provider, target) key.
///
/// `0 ≤ penalty ≤ max_penalty` holds after every operation.
#[derive(Debug, Clone, PartialEq, Serialize, derive_getters::Getters)]
pub struct PenaltyState {
    penalty: f64,
    updated_at_ms: u64,
    reason_history: VecDeque<ReasonEntry>,
    last_reason: Option<PenaltyReason>,
    #[getter(skip)]
    max_penalty: f64,
    #[getter(skip)]
    history_size: usize,
}

impl PenaltyState {
    pub(crate) fn new(now_ms: u64, max_penalty: f64, history_size: usize) -> Self {
        Self {
            penalty: 0.0,
            updated_at_ms: now_ms,
            reason_history: VecDeque::with_capacity(history_size.min(256)),
            last_reason: None,
            max_penalty,
            history_size,
        }
    }

    /// Bring the penalty up to date with `now_ms`.
    ///
    /// Whole intervals since `updated_at_ms` are consumed and the remainder
    /// is carried, so repeated reads never lose progress.
    pub(crate) fn decay(&mut self, now_ms: u64, strategy: DecayStrategy, params: &DecayParams) {
        if self.penalty <= 0.0 {
            self.penalty = 0.0;
            self.updated_at_ms = self.updated_at_ms.max(now_ms);
            return;
        }
        if now_ms <= self.updated_at_ms {
            return;
        }

        let steps = (now_ms - self.updated_at_ms) / params.decay_ms;
        if steps == 0 {
            return;
        }

        self.penalty = strategy.apply(self.penalty, steps, params).min(self.max_penalty);
        if self.penalty <= 0.0 {
            self.penalty = 0.0;
            self.updated_at_ms = now_ms;
        } else {
            self.updated_at_ms = self
                .updated_at_ms
                .saturating_add(steps.saturating_mul(params.decay_ms));
        }
    }

    pub(crate) fn add(&mut self, amount: f64, now_ms: u64) {
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        self.penalty = (self.penalty + amount).clamp(0.0, self.max_penalty);
        self.updated_at_ms = now_ms;
    }

    pub(crate) fn subtract_one(&mut self, now_ms: u64) {
        self.penalty = (self.penalty - 1.0).max(0.0);
        self.updated_at_ms = now_ms;
    }

    pub(crate) fn record(&mut self, reason: PenaltyReason, now_ms: u64) {
        if self.history_size == 0 {
            self.last_reason = Some(reason);
            return;
        }
        while self.reason_history.len() >= self.history_size {
            self.reason_history.pop_front();
        }
        self.reason_history.push_back(ReasonEntry {
            reason,
            at_ms: now_ms,
        });
        self.last_reason = Some(reason);
    }

    pub(crate) fn reason_stats(&self) -> BTreeMap<PenaltyReason, usize> {
        let mut stats = BTreeMap::new();
        for entry in &self.reason_history {
            *stats.entry(entry.reason).or_insert(0) += 1;
        }
        stats
    }

    pub(crate) fn predict(&self) -> FailurePrediction {
        let historical_failures = self.reason_history.len();
        let probability = if self.max_penalty > 0.0 {
            (self.penalty / self.max_penalty).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let confidence = if self.history_size > 0 {
            (historical_failures as f64 / self.history_size as f64).min(1.0)
        } else {
            0.0
        };
        FailurePrediction {
            historical_failures,
            probability,
            confidence,
        }
    }
}
