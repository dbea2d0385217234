//! Failure classification.
//!
//! Everything that reads error text lives here, so a structured error model
//! can replace the heuristics without touching the executor.

use pace_adaptive::PenaltyReason;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("Valid number regex"));

/// Errors the executor can inspect for a status code.
///
/// Every method has a default, so plain error types only need the impl
/// line. Types carrying a structured status override [`status_value`].
///
/// [`status_value`]: StatusError::status_value
pub trait StatusError: fmt::Display {
    /// Status carried as a structured field, before validation.
    fn status_value(&self) -> Option<f64> {
        None
    }

    /// Server-provided retry-after hint in milliseconds.
    fn retry_after_ms(&self) -> Option<u64> {
        None
    }

    /// Text scanned for status codes and failure keywords.
    fn error_text(&self) -> String {
        self.to_string()
    }
}

/// HTTP failure with a known status code.
///
/// # Examples
///
/// ```
/// use pace_retry::{HttpError, extract_status_code};
///
/// let err = HttpError::new(503, "upstream unavailable");
/// assert_eq!(extract_status_code(&err), Some(503));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("HTTP {} error: {}", status_code, message)]
pub struct HttpError {
    /// HTTP status code
    pub status_code: u16,
    /// Error message
    pub message: String,
    /// `Retry-After` in milliseconds, if the server sent one
    pub retry_after_ms: Option<u64>,
}

impl HttpError {
    /// Failure without a retry-after hint.
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attach a retry-after hint.
    pub fn with_retry_after_ms(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }
}

impl StatusError for HttpError {
    fn status_value(&self) -> Option<f64> {
        Some(f64::from(self.status_code))
    }

    fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after_ms
    }
}

impl StatusError for anyhow::Error {
    fn status_value(&self) -> Option<f64> {
        for cause in self.chain() {
            if let Some(http) = cause.downcast_ref::<HttpError>() {
                return http.status_value();
            }
            #[cfg(feature = "reqwest")]
            if let Some(err) = cause.downcast_ref::<reqwest::Error>() {
                return err.status_value();
            }
        }
        None
    }

    fn retry_after_ms(&self) -> Option<u64> {
        self.chain()
            .find_map(|cause| cause.downcast_ref::<HttpError>())
            .and_then(|http| http.retry_after_ms)
    }

    fn error_text(&self) -> String {
        format!("{:#}", self)
    }
}

impl StatusError for std::io::Error {}

impl StatusError for String {}

impl StatusError for &'static str {}

#[cfg(feature = "reqwest")]
impl StatusError for reqwest::Error {
    fn status_value(&self) -> Option<f64> {
        self.status().map(|status| f64::from(status.as_u16()))
    }
}

/// Validate a structured status value.
///
/// Non-finite and non-positive values are rejected; fractions are truncated.
pub fn validate_status(value: f64) -> Option<u16> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let truncated = value.trunc();
    if (1.0..=999.0).contains(&truncated) {
        Some(truncated as u16)
    } else {
        None
    }
}

/// Find a 4xx/5xx status in free text.
///
/// Only whole three-digit numbers count, so `1.429` and `50000` are ignored.
/// A `429` anywhere wins over an earlier 5xx; otherwise the first match wins.
pub fn scan_status_code(text: &str) -> Option<u16> {
    let mut first = None;
    for found in NUMBER.find_iter(text) {
        let token = found.as_str();
        if token.len() != 3 || token.contains('.') {
            continue;
        }
        if text[..found.start()].ends_with('.') {
            continue;
        }
        let Ok(code) = token.parse::<u16>() else {
            continue;
        };
        if code == 429 {
            return Some(code);
        }
        if (400..=599).contains(&code) && first.is_none() {
            first = Some(code);
        }
    }
    first
}

/// Status code of an error: the structured field if valid, else a text scan.
pub fn extract_status_code<E: StatusError + ?Sized>(error: &E) -> Option<u16> {
    error
        .status_value()
        .and_then(validate_status)
        .or_else(|| scan_status_code(&error.error_text()))
}

/// Retry-relevant failure kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// HTTP 429 or a rate-limit message
    RateLimit,
    /// Explicit capacity or overload signal
    Capacity,
    /// Request or upstream timeout
    Timeout,
    /// Empty, low-substance or schema-invalid output
    Quality,
    /// Generic 5xx or "try again"
    Transient,
    /// Other 4xx, or unclassified
    Permanent,
}

impl FailureKind {
    /// Whether the kind is worth retrying at all.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::Permanent)
    }

    /// Retry rounds allowed for this kind, independent of `max_retries`.
    pub fn max_rounds(self) -> Option<u32> {
        match self {
            FailureKind::Timeout | FailureKind::Quality => Some(2),
            _ => None,
        }
    }

    /// Penalty reason raised for this kind; permanent failures raise none.
    pub fn penalty_reason(self) -> Option<PenaltyReason> {
        match self {
            FailureKind::RateLimit => Some(PenaltyReason::RateLimit),
            FailureKind::Capacity => Some(PenaltyReason::Capacity),
            FailureKind::Timeout => Some(PenaltyReason::Timeout),
            FailureKind::Quality => Some(PenaltyReason::Quality),
            FailureKind::Transient => Some(PenaltyReason::Transient),
            FailureKind::Permanent => None,
        }
    }
}

const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota exceeded",
    "resource_exhausted",
    "resource exhausted",
];

const CAPACITY_PATTERNS: &[&str] = &[
    "overloaded",
    "over capacity",
    "capacity",
    "server is busy",
];

const TIMEOUT_PATTERNS: &[&str] = &["timed out", "timeout", "deadline exceeded"];

const QUALITY_PATTERNS: &[&str] = &[
    "empty response",
    "empty output",
    "low quality",
    "schema validation",
    "invalid json",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "try again",
    "temporarily unavailable",
    "service unavailable",
    "connection reset",
    "econnreset",
    "bad gateway",
];

/// Classify a failure from its status and message.
///
/// Status 429 is always a rate limit; 529 is capacity; 408 and 504 are
/// timeouts. Message patterns come next, then any remaining 5xx is
/// transient and everything else is permanent.
pub fn classify_failure(status: Option<u16>, message: &str) -> FailureKind {
    match status {
        Some(429) => return FailureKind::RateLimit,
        Some(529) => return FailureKind::Capacity,
        Some(408 | 504) => return FailureKind::Timeout,
        _ => {}
    }

    let text = message.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| text.contains(p));
    if matches(RATE_LIMIT_PATTERNS) {
        return FailureKind::RateLimit;
    }
    if matches(CAPACITY_PATTERNS) {
        return FailureKind::Capacity;
    }
    if matches(TIMEOUT_PATTERNS) {
        return FailureKind::Timeout;
    }
    if matches(QUALITY_PATTERNS) {
        return FailureKind::Quality;
    }

    match status {
        Some(500..=599) => FailureKind::Transient,
        Some(_) => FailureKind::Permanent,
        None if matches(TRANSIENT_PATTERNS) => FailureKind::Transient,
        None => FailureKind::Permanent,
    }
}
