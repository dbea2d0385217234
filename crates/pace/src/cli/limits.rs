//! `limits` and `retry` command handlers.

use super::OutputFormat;
use pace::{Governor, LimitInput, format_unified_limits_result};

/// Split `provider:model`; a bare name is used for both.
pub fn parse_target(target: &str, tier: Option<&str>) -> LimitInput {
    let (provider, model) = target.split_once(':').unwrap_or((target, target));
    let input = LimitInput::new(provider.trim(), model.trim());
    match tier {
        Some(tier) => input.with_tier(tier),
        None => input,
    }
}

/// Resolve and print limits for each target.
pub fn show_limits(
    governor: &Governor,
    targets: &[String],
    tier: Option<&str>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let results: Vec<_> = targets
        .iter()
        .map(|target| governor.resolve(&parse_target(target, tier)))
        .collect();

    match format {
        OutputFormat::Human => {
            let blocks: Vec<_> = results.iter().map(format_unified_limits_result).collect();
            println!("{}", blocks.join("\n"));
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
    }
    Ok(())
}

/// Print the resolved retry policy.
pub fn show_retry(governor: &Governor) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(governor.retry_config())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_splits_provider_and_model() {
        let input = parse_target("anthropic: claude-sonnet", Some("tier2"));
        assert_eq!(input.provider, "anthropic");
        assert_eq!(input.model, "claude-sonnet");
        assert_eq!(input.tier.as_deref(), Some("tier2"));

        let bare = parse_target("ollama", None);
        assert_eq!(bare.provider, "ollama");
        assert_eq!(bare.model, "ollama");
        assert_eq!(bare.tier, None);
    }
}
