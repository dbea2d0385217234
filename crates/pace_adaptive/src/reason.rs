//! Reasons a penalty is raised.

use serde::{Deserialize, Serialize};

/// Failure signal that raised a penalty.
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
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyReason {
    /// HTTP 429 or a rate-limit message
    RateLimit,
    /// Explicit capacity/overload signal
    Capacity,
    /// Request or upstream timeout
    Timeout,
    /// Empty, low-substance or schema-invalid output
    Quality,
    /// Generic 5xx or "try again"
    Transient,
    /// Anything else
    Unknown,
}

impl PenaltyReason {
    /// Increment used by the enhanced controller when no weight is configured.
    pub fn default_weight(self) -> f64 {
        match self {
            PenaltyReason::RateLimit => 2.0,
            PenaltyReason::Capacity => 1.5,
            PenaltyReason::Timeout => 1.0,
            PenaltyReason::Transient => 1.0,
            PenaltyReason::Quality => 0.5,
            PenaltyReason::Unknown => 1.0,
        }
    }
}
