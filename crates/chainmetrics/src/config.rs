//! Declarative target configuration.
//!
//! A target names one explorer page and the metrics to pull from it. Every
//! metric carries its own ordered strategy chain and a plausible range, so
//! the heuristics live in data instead of code. Configurations are plain JSON
//! and are immutable once loaded.

use crate::error::ConfigError;
use crate::strategy::StrategyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default navigation timeout (30 s, matching the explorer scrapers).
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Unit family a metric is expressed in. Decides which suffixes the numeric
/// extractor recognizes and how they convert to the canonical unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitFamily {
    /// Canonical gwei; also accepts wei.
    Gwei,
    /// Canonical STX; also accepts µSTX.
    Stx,
    /// US dollars, `$` prefix or `USD` suffix.
    Usd,
    /// Seconds, `s` / `sec` / `seconds` suffix.
    Seconds,
    /// No unit; only bare numbers.
    Plain,
}

impl UnitFamily {
    /// Keyword used to find candidate lines in free page text.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Gwei => "gwei",
            Self::Stx => "stx",
            Self::Usd => "$",
            Self::Seconds => "s",
            Self::Plain => "",
        }
    }
}

/// Exclusive `(min, max)` sanity bound for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlausibleRange {
    pub min: f64,
    pub max: f64,
}

impl PlausibleRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies strictly inside the bounds.
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value > self.min && value < self.max
    }

    /// Intersection with another range.
    pub fn narrowed(&self, other: &PlausibleRange) -> PlausibleRange {
        PlausibleRange {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }
}

impl Default for PlausibleRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: f64::MAX,
        }
    }
}

/// When the page counts as loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Wait until network traffic goes quiet.
    #[default]
    NetworkIdle,
    /// Return as soon as the DOM is parsed.
    DomContentLoaded,
}

/// Navigation instructions: policy plus timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub policy: LoadPolicy,
    pub timeout_ms: u64,
}

/// Follow a link found inside a row before extracting a metric.
///
/// Used for values that only exist on a detail page, e.g. the fee of the
/// latest transfer is read from that transaction's own page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkHop {
    /// Locator of the element that identifies the row, e.g. `text=transfer`.
    pub row: String,
    /// Locator of the link inside the row ancestor.
    pub link: String,
    /// Optional locator to wait for before looking for the row.
    #[serde(default)]
    pub wait_for: Option<String>,
    /// How many ancestor levels above `row` to search for the link.
    #[serde(default = "default_hop_depth")]
    pub depth: usize,
    #[serde(default = "default_wait_ms")]
    pub timeout_ms: u64,
}

/// One metric to extract from a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Output field name, e.g. `avg_gas_price_gwei`.
    pub name: String,
    /// Output field for the raw text; defaults to `<name>_raw`.
    #[serde(default)]
    pub raw_field: Option<String>,
    /// Output field for the reading in its source unit (e.g. integer wei).
    /// When unset the full reading goes to `<name>_source`.
    #[serde(default)]
    pub source_field: Option<String>,
    pub unit: UnitFamily,
    #[serde(default)]
    pub range: PlausibleRange,
    #[serde(default)]
    pub hop: Option<LinkHop>,
    pub strategies: Vec<StrategyConfig>,
}

impl MetricSpec {
    pub fn raw_field_name(&self) -> String {
        self.raw_field
            .clone()
            .unwrap_or_else(|| format!("{}_raw", self.name))
    }
}

/// One source site and what to extract from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Display name, e.g. `Hiro/STX`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub load: LoadPolicy,
    #[serde(default = "default_navigation_timeout")]
    pub timeout_ms: u64,
    /// Run the block-access classifier after navigation.
    #[serde(default)]
    pub detect_blocking: bool,
    /// Skip extraction entirely when the classifier reports a block.
    #[serde(default)]
    pub abort_when_blocked: bool,
    pub metrics: Vec<MetricSpec>,
}

impl TargetConfig {
    /// Stable key: lowercase with every non-alphanumeric character as `_`.
    pub fn key(&self) -> String {
        target_key(&self.name)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            policy: self.load,
            timeout_ms: self.timeout_ms,
        }
    }

    /// Reject configurations that could never produce a valid result.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |detail: String| ConfigError::Invalid {
            target: self.name.clone(),
            detail,
        };
        if url::Url::parse(&self.url).is_err() {
            return Err(invalid(format!("invalid url {}", self.url)));
        }
        if self.metrics.is_empty() {
            return Err(invalid("no metrics configured".into()));
        }
        for metric in &self.metrics {
            if metric.range.min >= metric.range.max {
                return Err(invalid(format!(
                    "metric {} has an empty range ({}, {})",
                    metric.name, metric.range.min, metric.range.max
                )));
            }
            if metric.strategies.is_empty() {
                return Err(invalid(format!("metric {} has no strategies", metric.name)));
            }
            for strategy in &metric.strategies {
                strategy
                    .validate()
                    .map_err(|e| invalid(format!("metric {}: {e}", metric.name)))?;
            }
        }
        Ok(())
    }
}

/// Normalize a display name into a result key (`Hiro/STX` → `hiro_stx`).
pub fn target_key(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Parse and validate a JSON array of targets.
pub fn parse_targets(json: &str) -> Result<Vec<TargetConfig>, ConfigError> {
    let targets: Vec<TargetConfig> = serde_json::from_str(json)?;
    for target in &targets {
        target.validate()?;
    }
    Ok(targets)
}

/// Load targets from a JSON file.
pub fn load_targets(path: &Path) -> Result<Vec<TargetConfig>, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_targets(&json)
}

/// Pick targets by name or key; an empty selection keeps them all.
pub fn select_targets(
    targets: &[TargetConfig],
    names: &[String],
) -> Result<Vec<TargetConfig>, ConfigError> {
    if names.is_empty() {
        return Ok(targets.to_vec());
    }
    names
        .iter()
        .map(|wanted| {
            let wanted_key = target_key(wanted);
            targets
                .iter()
                .find(|t| t.key() == wanted_key)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownTarget(wanted.clone()))
        })
        .collect()
}

fn default_navigation_timeout() -> u64 {
    DEFAULT_NAVIGATION_TIMEOUT_MS
}

fn default_hop_depth() -> usize {
    2
}

fn default_wait_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"[
        {
            "name": "Hiro/STX",
            "url": "https://explorer.example/token",
            "metrics": [
                {
                    "name": "stx_price",
                    "unit": "usd",
                    "range": { "min": 0, "max": 10 },
                    "strategies": [ { "kind": "text_scan" } ]
                }
            ]
        }
    ]"#;

    #[test]
    fn test_parse_minimal_target_applies_defaults() {
        let targets = parse_targets(MINIMAL).unwrap();
        assert_eq!(targets.len(), 1);
        let t = &targets[0];
        assert_eq!(t.key(), "hiro_stx");
        assert_eq!(t.load, LoadPolicy::NetworkIdle);
        assert_eq!(t.timeout_ms, DEFAULT_NAVIGATION_TIMEOUT_MS);
        assert!(!t.detect_blocking);
        assert_eq!(t.metrics[0].raw_field_name(), "stx_price_raw");
    }

    #[test]
    fn test_validate_rejects_empty_range() {
        let json = MINIMAL.replace(r#""min": 0, "max": 10"#, r#""min": 5, "max": 5"#);
        let err = parse_targets(&json).unwrap_err();
        assert!(err.to_string().contains("empty range"));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let json = MINIMAL.replace("https://explorer.example/token", "not a url");
        assert!(matches!(
            parse_targets(&json),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_range_is_exclusive() {
        let range = PlausibleRange::new(0.0, 100.0);
        assert!(range.contains(26.0656));
        assert!(!range.contains(0.0));
        assert!(!range.contains(100.0));
        assert!(!range.contains(150.0));
        assert!(!range.contains(f64::NAN));
    }

    #[test]
    fn test_select_targets_by_key_or_name() {
        let targets = parse_targets(MINIMAL).unwrap();
        assert_eq!(select_targets(&targets, &[]).unwrap().len(), 1);
        assert_eq!(
            select_targets(&targets, &["hiro_stx".into()]).unwrap()[0].name,
            "Hiro/STX"
        );
        assert_eq!(
            select_targets(&targets, &["Hiro/STX".into()]).unwrap()[0].name,
            "Hiro/STX"
        );
        assert!(matches!(
            select_targets(&targets, &["nope".into()]),
            Err(ConfigError::UnknownTarget(_))
        ));
    }
}
