//! Pace - pacing for calls against rate-limited LLM providers
//!
//! Pace decides how hard a process may push a provider/model pair and how
//! it backs off when the provider pushes back.
//!
//! # Features
//!
//! - **Rate-limit gate**: per-key memory of 429 windows shared by every caller
//! - **Adaptive penalties**: failure-weighted, decaying concurrency reduction
//! - **Unified limits**: preset, penalty, peer share and runtime caps folded
//!   into one effective concurrency with a reported limiting factor
//! - **Retry executor**: jittered backoff, rate-limit waits and cancellation
//!   around any async operation, handing back the caller's own error
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pace::{Governor, HttpError, LimitInput};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let governor = Governor::load()?;
//!
//! let limits = governor.resolve(&LimitInput::new("anthropic", "claude-sonnet"));
//! println!("run {} at once", limits.effective_concurrency());
//!
//! let reply = governor
//!     .run(
//!         || async { Ok::<_, HttpError>("hello") },
//!         governor.options("anthropic", "claude-sonnet"),
//!     )
//!     .await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `pace_error` - Error types
//! - `pace_rate_limit` - Configuration, presets, the gate and the clock
//! - `pace_adaptive` - Penalty controllers and their registry
//! - `pace_retry` - Backoff, failure classification and the executor
//! - `pace_limits` - Unified limit resolution
//!
//! This crate re-exports everything and adds [`Governor`] and [`telemetry`].

mod governor;
pub mod telemetry;

pub use governor::{Governor, GovernorBuilder};
pub use pace_adaptive::*;
pub use pace_error::*;
pub use pace_limits::*;
pub use pace_rate_limit::*;
pub use pace_retry::*;
