//! Full-page text patterns, the last resort before giving up on a metric.

use super::{Candidate, Strategy};
use crate::config::MetricSpec;
use crate::error::PageError;
use crate::numeric;
use crate::page::PageHandle;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Match the full rendered body text against ordered patterns, most
/// specific first, then fall back to any line mentioning the unit.
///
/// Each pattern match goes through the unit-aware extractor, so a wei
/// reading inside a match still converts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextScan {
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Scan lines containing the unit keyword after the patterns.
    #[serde(default = "default_true")]
    pub keyword_lines: bool,
    #[serde(skip)]
    compiled: CompiledPatterns,
}

/// Patterns compiled on first use. Not part of equality.
#[derive(Debug, Clone, Default)]
struct CompiledPatterns(OnceLock<Result<Vec<Regex>, String>>);

impl PartialEq for CompiledPatterns {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Default for TextScan {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            keyword_lines: true,
            compiled: CompiledPatterns::default(),
        }
    }
}

impl TextScan {
    pub fn new(patterns: Vec<String>, keyword_lines: bool) -> Self {
        Self {
            patterns,
            keyword_lines,
            compiled: CompiledPatterns::default(),
        }
    }

    /// Compiled `patterns`, built once per strategy value.
    pub(crate) fn compile(&self) -> Result<&[Regex], String> {
        self.compiled
            .0
            .get_or_init(|| {
                self.patterns
                    .iter()
                    .map(|p| Regex::new(p).map_err(|e| format!("bad text_scan pattern {p:?}: {e}")))
                    .collect()
            })
            .as_deref()
            .map_err(Clone::clone)
    }
}

#[async_trait]
impl Strategy for TextScan {
    fn name(&self) -> &'static str {
        "text_scan"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        metric: &MetricSpec,
    ) -> Result<Option<Candidate>, PageError> {
        let patterns = self.compile().map_err(PageError::Script)?;
        let body = page.body_text().await?;

        for re in patterns {
            for whole in re.find_iter(&body) {
                if let Some(m) = numeric::extract(whole.as_str(), metric.unit, &metric.range) {
                    return Ok(Some(Candidate {
                        raw: whole.as_str().trim().to_string(),
                        ..Candidate::from(m)
                    }));
                }
            }
        }

        if self.keyword_lines {
            let keyword = metric.unit.keyword();
            for line in body.lines().filter(|l| l.to_lowercase().contains(keyword)) {
                if let Some(m) = numeric::extract(line, metric.unit, &metric.range) {
                    return Ok(Some(m.into()));
                }
            }
        }
        Ok(None)
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlausibleRange, UnitFamily};
    use crate::snapshot::SnapshotPage;

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

    fn value_pattern() -> TextScan {
        TextScan::new(vec![r"(?i)Value([\d.]+)\s*Gwei".into()], true)
    }

    #[tokio::test]
    async fn test_specific_pattern_wins() {
        let page = SnapshotPage::new(
            "https://explorer.example/",
            "<p>Peak 150 Gwei</p><p>Jan 5</p><p>Value0.0021 Gwei</p>",
        );
        let candidate = value_pattern().attempt(&page, &metric()).await.unwrap().unwrap();
        assert_eq!(candidate.value, 0.0021);
        assert_eq!(candidate.raw, "Value0.0021 Gwei");
    }

    #[tokio::test]
    async fn test_keyword_fallback_skips_out_of_range() {
        let page = SnapshotPage::new(
            "https://explorer.example/",
            "<p>Peak 150 Gwei</p><p>Now 3.5 gwei</p>",
        );
        let candidate = value_pattern().attempt(&page, &metric()).await.unwrap().unwrap();
        assert_eq!(candidate.value, 3.5);
    }

    #[tokio::test]
    async fn test_pattern_without_unit_uses_bare_number() {
        let page = SnapshotPage::new("https://explorer.example/", "<p>gas=42 (avg)</p>");
        let strategy = TextScan::new(vec![r"gas=(\d+)".into()], false);
        let candidate = strategy.attempt(&page, &metric()).await.unwrap().unwrap();
        assert_eq!(candidate.value, 42.0);
        assert_eq!(candidate.raw, "gas=42");
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let page = SnapshotPage::new("https://explorer.example/", "<p>No data yet</p>");
        assert!(TextScan::default()
            .attempt(&page, &metric())
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_patterns_compile_once() {
        let strategy = value_pattern();
        let first = strategy.compile().unwrap();
        let second = strategy.compile().unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_bad_pattern_reported() {
        let strategy = TextScan::new(vec!["(unclosed".into()], true);
        assert!(strategy.compile().unwrap_err().contains("bad text_scan pattern"));
    }
}
