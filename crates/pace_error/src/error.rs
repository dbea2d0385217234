//! Top-level error wrapper types.

use crate::{ConfigError, RetryError};

/// Every error kind surfaced by the pace crates.
///
/// # Examples
///
/// ```
/// use pace_error::{ConfigError, PaceError};
///
/// let err: PaceError = ConfigError::new("bad tier").into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum PaceErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Retry machinery error (fast-fail or abort)
    #[from(RetryError)]
    Retry(RetryError),
}

/// Pace error with kind discrimination.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Pace Error: {}", _0)]
pub struct PaceError(Box<PaceErrorKind>);

impl PaceError {
    /// Create a new error from a kind.
    pub fn new(kind: PaceErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &PaceErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to PaceErrorKind
impl<T> From<T> for PaceError
where
    T: Into<PaceErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for pace operations.
pub type PaceResult<T> = std::result::Result<T, PaceError>;
