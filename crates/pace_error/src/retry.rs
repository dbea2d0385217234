//! Errors synthesised by the retry machinery itself.

/// Which budget a rate-limit fast-fail exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum FastFailReason {
    /// More consecutive rate-limit signals than `max_rate_limit_retries`.
    HitsExceeded,
    /// The required wait is longer than `max_rate_limit_wait_ms`.
    WaitExceeded,
}

/// Retry error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum RetryErrorKind {
    /// Refused to keep waiting on a rate-limited key.
    #[display(
        "rate limit fast-fail for '{}' ({}): hits={} wait_ms={}",
        key,
        reason,
        hits,
        wait_ms
    )]
    RateLimitFastFail {
        /// Normalized gate key (or `<local>` when no key was supplied)
        key: String,
        /// Consecutive rate-limit hits observed
        hits: u32,
        /// Wait that would have been required
        wait_ms: u64,
        /// Which budget was exceeded
        reason: FastFailReason,
    },
    /// The external cancellation signal fired.
    #[display("retry aborted by cancellation")]
    Aborted,
}

/// Retry error with location tracking.
///
/// # Examples
///
/// ```
/// use pace_error::{RetryError, RetryErrorKind};
///
/// let err = RetryError::new(RetryErrorKind::Aborted);
/// assert!(err.is_aborted());
/// assert!(format!("{}", err).contains("aborted"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Retry Error: {} at line {} in {}", kind, line, file)]
pub struct RetryError {
    kind: RetryErrorKind,
    line: u32,
    file: &'static str,
}

impl RetryError {
    /// Create a new retry error with caller location tracking.
    #[track_caller]
    pub fn new(kind: RetryErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &RetryErrorKind {
        &self.kind
    }

    /// True when the error came from external cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self.kind, RetryErrorKind::Aborted)
    }

    /// True when the error is a rate-limit fast-fail.
    pub fn is_fast_fail(&self) -> bool {
        matches!(self.kind, RetryErrorKind::RateLimitFastFail { .. })
    }
}

impl From<RetryErrorKind> for RetryError {
    #[track_caller]
    fn from(kind: RetryErrorKind) -> Self {
        Self::new(kind)
    }
}
