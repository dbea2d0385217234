//! Error types for the pace workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! The retry executor only ever creates two errors of its own, both
//! represented by [`RetryErrorKind`]. Operation errors are handed back to
//! the caller untouched.
//!
//! # Examples
//!
//! ```
//! use pace_error::{ConfigError, PaceResult};
//!
//! fn load() -> PaceResult<String> {
//!     Err(ConfigError::new("missing providers table"))?
//! }
//!
//! assert!(load().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod retry;

pub use config::ConfigError;
pub use error::{PaceError, PaceErrorKind, PaceResult};
pub use retry::{FastFailReason, RetryError, RetryErrorKind};
