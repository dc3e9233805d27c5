//! `chainmetrics list`: show the configured targets.

use crate::cli::RunOptions;
use anyhow::Result;
use chainmetrics::TargetConfig;

/// Print each target with its metrics and their strategy chains.
pub async fn run(options: &RunOptions) -> Result<()> {
    let targets = options.load_targets()?;
    for line in describe(&targets) {
        println!("{line}");
    }
    Ok(())
}

fn describe(targets: &[TargetConfig]) -> Vec<String> {
    let mut lines = Vec::new();
    for target in targets {
        lines.push(format!("{} ({})", target.key(), target.name));
        lines.push(format!("  url: {}", target.url));
        for metric in &target.metrics {
            let chain: Vec<String> = metric
                .strategies
                .iter()
                .map(|s| s.as_strategy().name().to_string())
                .collect();
            let hop = if metric.hop.is_some() { " [detail page]" } else { "" };
            lines.push(format!(
                "  - {} ({:?}, {}..{}){hop}: {}",
                metric.name,
                metric.unit,
                metric.range.min,
                metric.range.max,
                chain.join(" -> ")
            ));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_embedded_targets() {
        let targets = crate::targets::embedded().unwrap();
        let lines = describe(&targets);
        assert_eq!(lines[0], "rootstock (Rootstock)");
        assert!(lines
            .iter()
            .any(|l| l.contains("latest_transfer_fee_stx") && l.contains("[detail page]")));
        assert!(lines.iter().any(|l| l.ends_with(
            "selector_scan -> chart_probe -> text_scan -> selector_scan"
        )));
    }
}
