//! Tier trait for representing API rate limit constraints.

/// Represents the limits a provider tier grants.
///
/// All methods return `Option<T>` where `None` indicates the tier does not
/// state a value and the preset table should fall back to its defaults.
///
/// # Example
///
/// ```
/// use pace_rate_limit::Tier;
///
/// struct FreeTier;
///
/// impl Tier for FreeTier {
///     fn rpm(&self) -> Option<u32> { Some(10) }
///     fn tpm(&self) -> Option<u64> { Some(250_000) }
///     fn max_concurrent(&self) -> Option<u32> { Some(1) }
///     fn name(&self) -> &str { "Free" }
/// }
///
/// assert_eq!(FreeTier.max_concurrent(), Some(1));
/// ```
pub trait Tier: Send + Sync {
    /// Requests per minute limit.
    fn rpm(&self) -> Option<u32>;

    /// Tokens per minute limit.
    fn tpm(&self) -> Option<u64>;

    /// Maximum concurrent requests.
    fn max_concurrent(&self) -> Option<u32>;

    /// Name of the tier (e.g., "Free", "Tier 1").
    fn name(&self) -> &str;
}
