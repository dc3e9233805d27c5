//! Output helpers shared by every subcommand.
//!
//! Result JSON goes to stdout; everything meant for a human (summaries,
//! listings, logs) goes to stderr so stdout stays machine-readable.

use crate::orchestrator::RunSummary;
use chainmetrics::{MetricOutcome, MetricResultSet};

/// Check if quiet mode is enabled.
pub fn is_quiet() -> bool {
    std::env::var("CHAINMETRICS_QUIET").is_ok()
}

/// Check if compact JSON output is requested.
pub fn is_compact() -> bool {
    std::env::var("CHAINMETRICS_COMPACT").is_ok()
}

/// Serialize `value` pretty-printed or on one line.
pub fn render_json(value: &serde_json::Value, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    rendered.unwrap_or_else(|_| value.to_string())
}

/// Print JSON to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!("{}", render_json(value, is_compact()));
}

/// One line per metric: value (or null) with its raw text or miss reason.
pub fn metric_lines(set: &MetricResultSet) -> Vec<String> {
    set.metrics
        .iter()
        .map(|entry| match &entry.outcome {
            MetricOutcome::Found(v) => format!(
                "{:<12} {:<26} {} ({})",
                set.target, entry.name, v.value, v.raw
            ),
            MetricOutcome::Absent { reason } => format!(
                "{:<12} {:<26} null ({reason})",
                set.target, entry.name
            ),
        })
        .collect()
}

/// Human summary of a run, on stderr.
pub fn print_summary(summary: &RunSummary) {
    if is_quiet() {
        return;
    }
    let counts = &summary.summary;
    eprintln!();
    eprintln!("  Successful: {}/{}", counts.successful, counts.total);
    if counts.failed > 0 {
        eprintln!("  Failed:     {}/{}", counts.failed, counts.total);
        for (key, error) in &summary.errors {
            eprintln!("    {key}: {error}");
        }
    }
    eprintln!();
    eprintln!("  Key metrics:");
    for set in summary.data.values() {
        for line in metric_lines(set) {
            eprintln!("    {line}");
        }
    }
    eprintln!();
}

/// Human summary of one target, on stderr.
pub fn print_target(set: &MetricResultSet) {
    if is_quiet() {
        return;
    }
    eprintln!();
    for line in metric_lines(set) {
        eprintln!("  {line}");
    }
    if let Some(verdict) = set.verdict.as_ref().filter(|v| v.blocked) {
        eprintln!("  blocked: {}", verdict.reasons.join("; "));
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainmetrics::{ExtractedValue, MetricEntry};
    use chrono::Utc;

    #[test]
    fn test_render_json_modes() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(render_json(&value, true), r#"{"a":1}"#);
        assert_eq!(render_json(&value, false), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_metric_lines() {
        let set = MetricResultSet {
            target: "BOB".into(),
            timestamp: Utc::now(),
            metrics: vec![
                MetricEntry {
                    name: "avg_gas_price_gwei".into(),
                    raw_field: "avg_gas_price_raw".into(),
                    source_field: None,
                    outcome: MetricOutcome::Found(ExtractedValue {
                        metric: "avg_gas_price_gwei".into(),
                        value: 0.0021,
                        raw: "0.0021 Gwei".into(),
                        strategy: "text_scan".into(),
                        source: None,
                        observed_at: None,
                    }),
                },
                MetricEntry {
                    name: "other".into(),
                    raw_field: "other_raw".into(),
                    source_field: None,
                    outcome: MetricOutcome::absent("navigation failed"),
                },
            ],
            verdict: None,
            error: None,
        };
        let lines = metric_lines(&set);
        assert!(lines[0].ends_with("0.0021 (0.0021 Gwei)"));
        assert!(lines[1].ends_with("null (navigation failed)"));
    }
}
