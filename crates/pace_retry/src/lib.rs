//! Retry pacing for calls against rate-limited providers.
//!
//! - [`RetryConfig`]: layered retry policy (defaults, config file, overrides)
//! - [`backoff_delay`]: jittered exponential backoff
//! - [`classify_failure`] / [`extract_status_code`]: the only code that reads
//!   error text
//! - [`RetryExecutor`]: wraps one operation with the shared rate-limit gate,
//!   backoff and cancellation
//!
//! ```no_run
//! use pace_rate_limit::RateLimitGate;
//! use pace_retry::{HttpError, RetryConfig, RetryExecutor, RetryOptions};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let executor = RetryExecutor::new(Arc::new(RateLimitGate::new()));
//! let options = RetryOptions::new(RetryConfig::default()).with_rate_limit_key("openai:gpt-4o");
//! let result = executor
//!     .run(|| async { Err::<(), _>(HttpError::new(503, "busy")) }, options)
//!     .await;
//! assert!(result.is_err());
//! # }
//! ```

mod backoff;
mod classify;
mod clock;
mod config;
mod diagnostics;
mod executor;
mod options;

pub use backoff::{backoff_delay, base_delay};
pub use classify::{
    FailureKind, HttpError, StatusError, classify_failure, extract_status_code, scan_status_code,
    validate_status,
};
pub use clock::TokioClock;
pub use config::{
    JitterMode, MAX_INITIAL_DELAY_MS, MAX_RETRIES_LIMIT, MULTIPLIER_RANGE, RetryConfig,
    RetryOverrides,
};
pub use diagnostics::{MAX_ERROR_MESSAGE_LEN, RetryDiagnostics, RunError, trim_error_message};
pub use executor::RetryExecutor;
pub use options::{RetryCallback, RetryEvent, RetryOptions, ShouldRetry};
