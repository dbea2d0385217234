//! Executor outcomes and operator diagnostics.

use crate::FailureKind;
use pace_error::RetryError;
use serde::Serialize;
use std::fmt;

/// Longest error message kept in diagnostics.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Collapse whitespace and cut `message` to at most `max_chars` characters.
pub fn trim_error_message(message: &str, max_chars: usize) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let keep = max_chars.saturating_sub(3);
    let mut trimmed: String = collapsed.chars().take(keep).collect();
    trimmed.push_str("...");
    trimmed
}

/// What the executor saw before giving up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_getters::Getters)]
pub struct RetryDiagnostics {
    /// Invocations of the operation
    attempts: u32,
    /// Backoff retries consumed
    retries: u32,
    /// Rate-limit waits sat out
    rate_limit_waits: u32,
    /// Consecutive rate-limit hits at the end
    rate_limit_hits: u32,
    /// Last rate-limit wait, if any
    last_rate_limit_wait_ms: Option<u64>,
    /// Status of the final failure
    status: Option<u16>,
    /// Kind of the final failure
    kind: FailureKind,
    /// Trimmed final failure message
    message: String,
    /// Caller-supplied `key=value` pairs
    context: Vec<(String, String)>,
}

impl RetryDiagnostics {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        attempts: u32,
        retries: u32,
        rate_limit_waits: u32,
        rate_limit_hits: u32,
        last_rate_limit_wait_ms: Option<u64>,
        status: Option<u16>,
        kind: FailureKind,
        message: &str,
        context: Vec<(String, String)>,
    ) -> Self {
        Self {
            attempts,
            retries,
            rate_limit_waits,
            rate_limit_hits,
            last_rate_limit_wait_ms,
            status,
            kind,
            message: trim_error_message(message, MAX_ERROR_MESSAGE_LEN),
            context,
        }
    }

    /// Flat `key=value` line for logs.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .context
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        parts.push(format!("attempts={}", self.attempts));
        parts.push(format!("retries={}", self.retries));
        parts.push(format!("kind={}", self.kind));
        if let Some(status) = self.status {
            parts.push(format!("status={}", status));
        }
        if self.rate_limit_hits > 0 || self.rate_limit_waits > 0 {
            parts.push(format!("rate_limit_hits={}", self.rate_limit_hits));
            parts.push(format!("rate_limit_waits={}", self.rate_limit_waits));
        }
        if let Some(wait) = self.last_rate_limit_wait_ms {
            parts.push(format!("last_wait_ms={}", wait));
        }
        parts.push(format!("error=\"{}\"", self.message));
        parts.join(" ")
    }
}

impl fmt::Display for RetryDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Why [`RetryExecutor::run`](crate::RetryExecutor::run) failed.
///
/// Ordinary failures hand back the operation's own error untouched; only
/// fast-fail and cancellation are reported as [`RetryError`].
#[derive(Debug)]
pub enum RunError<E> {
    /// The operation's last error, verbatim
    Operation {
        /// Error returned by the operation
        error: E,
        /// What happened along the way
        diagnostics: RetryDiagnostics,
    },
    /// Fast-fail or cancellation
    Retry(RetryError),
}

impl<E> RunError<E> {
    /// The operation's error, if that is what ended the call.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            RunError::Operation { error, .. } => Some(error),
            RunError::Retry(_) => None,
        }
    }

    /// Take the operation's error back.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            RunError::Operation { error, .. } => Some(error),
            RunError::Retry(_) => None,
        }
    }

    /// The executor's own error, if that is what ended the call.
    pub fn retry_error(&self) -> Option<&RetryError> {
        match self {
            RunError::Retry(err) => Some(err),
            RunError::Operation { .. } => None,
        }
    }

    /// Diagnostics, when the operation's error ended the call.
    pub fn diagnostics(&self) -> Option<&RetryDiagnostics> {
        match self {
            RunError::Operation { diagnostics, .. } => Some(diagnostics),
            RunError::Retry(_) => None,
        }
    }

    /// True for cancellation.
    pub fn is_aborted(&self) -> bool {
        self.retry_error().is_some_and(RetryError::is_aborted)
    }

    /// True for a rate-limit fast-fail.
    pub fn is_fast_fail(&self) -> bool {
        self.retry_error().is_some_and(RetryError::is_fast_fail)
    }
}

impl<E: fmt::Display> fmt::Display for RunError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Operation { error, .. } => write!(f, "{}", error),
            RunError::Retry(err) => write!(f, "{}", err),
        }
    }
}

impl<E> std::error::Error for RunError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Operation { error, .. } => std::error::Error::source(error),
            RunError::Retry(err) => std::error::Error::source(err),
        }
    }
}

impl<E> From<RetryError> for RunError<E> {
    fn from(err: RetryError) -> Self {
        RunError::Retry(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_collapses_and_cuts() {
        assert_eq!(trim_error_message("  a \n\t b  ", 10), "a b");
        assert_eq!(trim_error_message("abcdefghij", 8), "abcde...");
        assert_eq!(trim_error_message("ééééé", 4), "é...");
    }

    #[test]
    fn test_summary_is_flat_key_value() {
        let diagnostics = RetryDiagnostics::new(
            3,
            2,
            1,
            1,
            Some(2_000),
            Some(500),
            FailureKind::Transient,
            "upstream\nexploded",
            vec![("provider".into(), "openai".into())],
        );
        let summary = diagnostics.summary();
        assert!(summary.starts_with("provider=openai attempts=3 retries=2 kind=transient"));
        assert!(summary.contains("status=500"));
        assert!(summary.contains("last_wait_ms=2000"));
        assert!(summary.ends_with("error=\"upstream exploded\""));
    }
}
