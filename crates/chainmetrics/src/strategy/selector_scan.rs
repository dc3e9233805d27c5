//! Selector scans: walk prioritized locators and keep the first (or smallest) in-range reading.

use super::{Candidate, Strategy};
use crate::config::{MetricSpec, PlausibleRange};
use crate::error::PageError;
use crate::numeric;
use crate::page::{Locator, PageHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which candidate wins when several elements qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pick {
    /// First qualifying element in locator order, then document order.
    #[default]
    First,
    /// Smallest in-range value across every qualifying element. A heuristic
    /// for pages that show a fee next to larger amounts; it can be wrong.
    Smallest,
}

/// Scan a prioritized list of locators for an element whose text is a bare
/// number or carries the metric's unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorScan {
    pub locators: Vec<String>,
    /// Only consider elements whose text contains this (any case).
    #[serde(default)]
    pub contains: Option<String>,
    /// Only consider elements with fewer characters than this.
    #[serde(default)]
    pub max_text_len: Option<usize>,
    /// Only look at the first `limit` matches of each locator.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub pick: Pick,
    /// Tighter bounds than the metric's own range.
    #[serde(default)]
    pub within: Option<PlausibleRange>,
}

impl SelectorScan {
    fn qualifies(&self, text: &str, metric: &MetricSpec) -> bool {
        if text.is_empty() {
            return false;
        }
        if let Some(max) = self.max_text_len {
            if text.chars().count() >= max {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !text.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        numeric::mentions_unit(text, metric.unit) || numeric::is_standalone_number(text)
    }
}

#[async_trait]
impl Strategy for SelectorScan {
    fn name(&self) -> &'static str {
        "selector_scan"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        metric: &MetricSpec,
    ) -> Result<Option<Candidate>, PageError> {
        let range = match &self.within {
            Some(within) => metric.range.narrowed(within),
            None => metric.range,
        };

        let mut best: Option<Candidate> = None;
        for raw in &self.locators {
            let matches = page.query(&Locator::parse(raw)).await?;
            let limit = self.limit.unwrap_or(matches.len());
            for element in matches.iter().take(limit).filter(|e| e.visible) {
                let text = element.text.trim();
                if !self.qualifies(text, metric) {
                    continue;
                }
                let Some(m) = numeric::extract(text, metric.unit, &range) else {
                    continue;
                };
                let candidate = Candidate {
                    raw: text.to_string(),
                    ..Candidate::from(m)
                };
                match self.pick {
                    Pick::First => return Ok(Some(candidate)),
                    Pick::Smallest => {
                        if best.as_ref().map_or(true, |b| candidate.value < b.value) {
                            best = Some(candidate);
                        }
                    }
                }
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnitFamily;
    use crate::snapshot::SnapshotPage;

    fn gas_metric() -> MetricSpec {
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

    fn scan(locators: &[&str]) -> SelectorScan {
        SelectorScan {
            locators: locators.iter().map(|s| s.to_string()).collect(),
            contains: None,
            max_text_len: None,
            limit: None,
            pick: Pick::First,
            within: None,
        }
    }

    #[tokio::test]
    async fn test_locator_priority_and_shape_filter() {
        let page = SnapshotPage::new(
            "https://explorer.example/",
            r#"<html><body>
                <h1>Average gas price</h1>
                <h2>Updated daily</h2>
                <div class="gas-card" style="display:none">3 Gwei</div>
                <div class="gas-card">0.0012 Gwei</div>
                <h3>0.5</h3>
            </body></html>"#,
        );
        let candidate = scan(&["[class*=\"gas\"]", "h1", "h2", "h3"])
            .attempt(&page, &gas_metric())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(candidate.value, 0.0012);
        assert_eq!(candidate.raw, "0.0012 Gwei");
    }

    #[tokio::test]
    async fn test_standalone_number_qualifies() {
        let page = SnapshotPage::new(
            "https://explorer.example/",
            "<h1>Gas tracker v2</h1><h3>0.5</h3>",
        );
        let candidate = scan(&["h1", "h3"])
            .attempt(&page, &gas_metric())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(candidate.value, 0.5);
    }

    #[tokio::test]
    async fn test_smallest_pick_with_filters() {
        let page = SnapshotPage::new(
            "https://explorer.example/tx/0x1",
            r#"<div>
                <span>Amount 1.5 STX</span>
                <span>Fee 0.2 STX</span>
                <span>Sponsored fee 0.25 STX for a very long description that goes on and on</span>
                <span>Nonce 4</span>
            </div>"#,
        );
        let metric = MetricSpec {
            name: "latest_transfer_fee_stx".into(),
            unit: UnitFamily::Stx,
            range: PlausibleRange::new(0.0, 2.0),
            ..gas_metric()
        };
        let mut strategy = scan(&["span"]);
        strategy.contains = Some("stx".into());
        strategy.max_text_len = Some(40);
        strategy.pick = Pick::Smallest;
        let candidate = strategy.attempt(&page, &metric).await.unwrap().unwrap();
        assert_eq!(candidate.value, 0.2);
        assert_eq!(candidate.raw, "Fee 0.2 STX");
    }

    #[tokio::test]
    async fn test_within_and_limit() {
        let page = SnapshotPage::new(
            "https://explorer.example/",
            "<span>75</span><span>12</span><span>8</span>",
        );
        let mut strategy = scan(&["span"]);
        strategy.within = Some(PlausibleRange::new(0.0, 50.0));
        strategy.limit = Some(2);
        let candidate = strategy.attempt(&page, &gas_metric()).await.unwrap().unwrap();
        assert_eq!(candidate.value, 12.0);

        strategy.limit = Some(1);
        assert!(strategy.attempt(&page, &gas_metric()).await.unwrap().is_none());
    }
}
