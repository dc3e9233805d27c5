//! Value extraction strategies and the fallback chain.
//!
//! A metric owns an ordered list of [`StrategyConfig`]s. The chain runs them
//! in order and stops at the first candidate inside the metric's plausible
//! range. A strategy that errors (timeout, missing element, unsupported
//! capability) is a miss, never a failure of the metric.

mod chart_probe;
mod download;
mod labeled_card;
mod selector_scan;
mod table_scan;
mod text_scan;

pub use chart_probe::ChartProbe;
pub use download::{parse_rows, Download};
pub use labeled_card::{LabelProximity, LabelScope, LabeledCard};
pub use selector_scan::{Pick, SelectorScan};
pub use table_scan::TableScan;
pub use text_scan::TextScan;

use crate::config::MetricSpec;
use crate::error::PageError;
use crate::numeric::NumericMatch;
use crate::page::{Locator, PageHandle};
use crate::types::{ExtractedValue, MetricOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A value proposed by one strategy, before the chain's range gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub value: f64,
    pub raw: String,
    pub source: Option<String>,
    pub observed_at: Option<String>,
}

impl From<NumericMatch> for Candidate {
    fn from(m: NumericMatch) -> Self {
        Self {
            value: m.value,
            raw: m.matched,
            source: m.source,
            observed_at: None,
        }
    }
}

/// One way of locating a metric on a page.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Name reported in results, e.g. `chart_probe`.
    fn name(&self) -> &'static str;

    /// Try to produce a candidate. `Ok(None)` and `Err(_)` are both misses.
    async fn attempt(
        &self,
        page: &dyn PageHandle,
        metric: &MetricSpec,
    ) -> Result<Option<Candidate>, PageError>;
}

/// Declarative strategy configuration, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    LabeledCard(LabeledCard),
    LabelProximity(LabelProximity),
    SelectorScan(SelectorScan),
    ChartProbe(ChartProbe),
    TextScan(TextScan),
    Download(Download),
    TableScan(TableScan),
}

impl StrategyConfig {
    pub fn as_strategy(&self) -> &dyn Strategy {
        match self {
            Self::LabeledCard(s) => s,
            Self::LabelProximity(s) => s,
            Self::SelectorScan(s) => s,
            Self::ChartProbe(s) => s,
            Self::TextScan(s) => s,
            Self::Download(s) => s,
            Self::TableScan(s) => s,
        }
    }

    /// Check locators and patterns so bad configuration fails at load time.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::LabeledCard(s) => {
                check_locators([&s.card, &s.title, &s.value])?;
                non_empty("label", &s.label)
            }
            Self::LabelProximity(s) => {
                non_empty("label", &s.label)?;
                check_locators([&s.label])
            }
            Self::SelectorScan(s) => {
                if s.locators.is_empty() {
                    return Err("selector_scan needs at least one locator".into());
                }
                check_locators(&s.locators)
            }
            Self::ChartProbe(s) => {
                check_locators(&s.charts)?;
                if s.positions.iter().any(|p| !(0.0..=1.0).contains(p)) {
                    return Err("chart_probe positions must lie in [0, 1]".into());
                }
                Ok(())
            }
            Self::TextScan(s) => s.compile().map(|_| ()),
            Self::Download(s) => check_locators(s.triggers.iter().chain([&s.fallback])),
            Self::TableScan(s) => {
                non_empty("label", &s.label)?;
                check_locators(&s.rows)
            }
        }
    }
}

/// Run `strategies` in order against `page` for `metric`.
pub async fn run_chain(
    page: &dyn PageHandle,
    metric: &MetricSpec,
    strategies: &[&dyn Strategy],
) -> MetricOutcome {
    for strategy in strategies {
        match strategy.attempt(page, metric).await {
            Ok(Some(candidate)) if metric.range.contains(candidate.value) => {
                debug!(
                    metric = %metric.name,
                    strategy = strategy.name(),
                    value = candidate.value,
                    raw = %candidate.raw,
                    "strategy produced a value"
                );
                return MetricOutcome::Found(ExtractedValue {
                    metric: metric.name.clone(),
                    value: candidate.value,
                    raw: candidate.raw,
                    strategy: strategy.name().to_string(),
                    source: candidate.source,
                    observed_at: candidate.observed_at,
                });
            }
            Ok(Some(candidate)) => debug!(
                metric = %metric.name,
                strategy = strategy.name(),
                value = candidate.value,
                "candidate outside plausible range"
            ),
            Ok(None) => debug!(metric = %metric.name, strategy = strategy.name(), "no candidate"),
            Err(e) => debug!(
                metric = %metric.name,
                strategy = strategy.name(),
                error = %e,
                "strategy failed"
            ),
        }
    }
    let tried: Vec<&str> = strategies.iter().map(|s| s.name()).collect();
    MetricOutcome::absent(format!(
        "no strategy produced an in-range value (tried: {})",
        tried.join(", ")
    ))
}

/// Run the metric's configured chain.
pub async fn extract_metric(page: &dyn PageHandle, metric: &MetricSpec) -> MetricOutcome {
    let strategies: Vec<&dyn Strategy> = metric
        .strategies
        .iter()
        .map(StrategyConfig::as_strategy)
        .collect();
    run_chain(page, metric, &strategies).await
}

fn check_locators<'a>(locators: impl IntoIterator<Item = &'a String>) -> Result<(), String> {
    for raw in locators {
        Locator::parse(raw).regex().map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlausibleRange, UnitFamily};
    use crate::snapshot::SnapshotPage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        value: Option<f64>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(value: Option<f64>) -> Self {
            Self {
                value,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Strategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn attempt(
            &self,
            _page: &dyn PageHandle,
            _metric: &MetricSpec,
        ) -> Result<Option<Candidate>, PageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.map(|value| Candidate {
                value,
                raw: value.to_string(),
                source: None,
                observed_at: None,
            }))
        }
    }

    struct Failing;

    #[async_trait]
    impl Strategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn attempt(
            &self,
            _page: &dyn PageHandle,
            _metric: &MetricSpec,
        ) -> Result<Option<Candidate>, PageError> {
            Err(PageError::Unsupported("hover"))
        }
    }

    fn metric() -> MetricSpec {
        MetricSpec {
            name: "avg_gas_price_gwei".into(),
            raw_field: None,
            source_field: None,
            unit: UnitFamily::Gwei,
            range: PlausibleRange::new(0.0, 100.0),
            hop: None,
            strategies: Vec::new(),
        }
    }

    fn blank_page() -> SnapshotPage {
        SnapshotPage::new("https://explorer.example/", "<html><body></body></html>")
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_success() {
        let first = Fixed::new(Some(12.0));
        let second = Fixed::new(Some(13.0));
        let outcome = run_chain(&blank_page(), &metric(), &[&first, &second]).await;
        assert_eq!(outcome.value().unwrap().value, 12.0);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_and_errors_fall_through() {
        let too_big = Fixed::new(Some(150.0));
        let empty = Fixed::new(None);
        let good = Fixed::new(Some(1.5));
        let outcome =
            run_chain(&blank_page(), &metric(), &[&too_big, &Failing, &empty, &good]).await;
        let value = outcome.value().unwrap();
        assert_eq!(value.value, 1.5);
        assert_eq!(value.strategy, "fixed");
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_absent_with_reason() {
        let outcome = run_chain(&blank_page(), &metric(), &[&Failing]).await;
        match outcome {
            MetricOutcome::Absent { reason } => assert!(reason.contains("failing")),
            other => panic!("expected absent, got {other:?}"),
        }
    }

    #[test]
    fn test_config_tags() {
        let json = r#"[
            {"kind": "labeled_card", "label": "avg gas price"},
            {"kind": "selector_scan", "locators": ["h1"], "pick": "smallest"},
            {"kind": "chart_probe"},
            {"kind": "text_scan", "patterns": ["Value([\\d.]+)\\s*Gwei"]},
            {"kind": "download"},
            {"kind": "table_scan", "label": "gas"},
            {"kind": "label_proximity", "label": "text=Fee"}
        ]"#;
        let configs: Vec<StrategyConfig> = serde_json::from_str(json).unwrap();
        let names: Vec<&str> = configs.iter().map(|c| c.as_strategy().name()).collect();
        assert_eq!(
            names,
            vec![
                "labeled_card",
                "selector_scan",
                "chart_probe",
                "text_scan",
                "download",
                "table_scan",
                "label_proximity"
            ]
        );
        assert!(configs.iter().all(|c| c.validate().is_ok()));
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let config: StrategyConfig =
            serde_json::from_str(r#"{"kind": "text_scan", "patterns": ["(unclosed"]}"#).unwrap();
        assert!(config.validate().is_err());
        let config: StrategyConfig =
            serde_json::from_str(r#"{"kind": "selector_scan", "locators": []}"#).unwrap();
        assert!(config.validate().is_err());
    }
}
