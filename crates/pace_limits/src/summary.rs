//! Human-readable renderings of resolved limits.

use crate::{LimitInput, UnifiedLimitResolver, UnifiedLimitResult};
use std::fmt::Write;

/// Multi-line `key=value` rendering of one result.
pub fn format_unified_limits_result(result: &UnifiedLimitResult) -> String {
    let breakdown = result.breakdown();
    let metadata = result.metadata();
    let tpm = result
        .effective_tpm()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "none".to_string());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}/{} tier={}",
        metadata.provider, metadata.model, metadata.tier
    );
    let _ = writeln!(
        out,
        "  concurrency={} rpm={} tpm={}",
        result.effective_concurrency(),
        result.effective_rpm(),
        tpm
    );
    let _ = writeln!(
        out,
        "  limiting={} reason=\"{}\"",
        result.limiting_factor(),
        result.limiting_reason()
    );
    let _ = writeln!(
        out,
        "  preset={} source={}",
        breakdown.preset.concurrency, breakdown.preset.sources.concurrency
    );
    let _ = writeln!(
        out,
        "  adaptive={} penalty={:.2} multiplier={:.3} mode={} stable={}",
        breakdown.adaptive.concurrency,
        breakdown.adaptive.penalty,
        breakdown.adaptive.multiplier,
        breakdown.adaptive.mode,
        breakdown.adaptive.stable
    );
    let _ = writeln!(
        out,
        "  cross_instance={} instances={} registered={}",
        breakdown.cross_instance.concurrency,
        breakdown.cross_instance.status.active_instance_count,
        breakdown.cross_instance.status.registered
    );
    let available = breakdown
        .runtime
        .available
        .map(|v| v.to_string())
        .unwrap_or_else(|| "uncapped".to_string());
    let _ = write!(
        out,
        "  runtime={} registered={}",
        available, breakdown.runtime.registered
    );
    if let Some(cap) = breakdown.env_override {
        let _ = write!(out, "\n  env_override={}", cap);
    }
    if let Some(prediction) = breakdown.prediction {
        let _ = write!(
            out,
            "\n  failures={} failure_probability={:.2} confidence={:.2}",
            prediction.historical_failures, prediction.probability, prediction.confidence
        );
    }
    out
}

/// Resolve and render every input, one block per input.
pub fn all_limits_summary(resolver: &UnifiedLimitResolver, inputs: &[LimitInput]) -> String {
    inputs
        .iter()
        .map(|input| format_unified_limits_result(&resolver.resolve(input)))
        .collect::<Vec<_>>()
        .join("\n")
}
