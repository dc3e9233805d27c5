//! Table rows: find the row naming the metric and read the number after the label.

use super::{Candidate, Strategy};
use crate::config::MetricSpec;
use crate::error::PageError;
use crate::numeric;
use crate::page::{visible, Locator, PageHandle};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

/// Find the first visible table row mentioning `label` and read the metric
/// from the row's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableScan {
    pub label: String,
    #[serde(default = "default_rows")]
    pub rows: Vec<String>,
}

#[async_trait]
impl Strategy for TableScan {
    fn name(&self) -> &'static str {
        "table_scan"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        metric: &MetricSpec,
    ) -> Result<Option<Candidate>, PageError> {
        let label = RegexBuilder::new(&regex::escape(&self.label))
            .case_insensitive(true)
            .build()
            .map_err(|e| PageError::InvalidLocator {
                locator: self.label.clone(),
                detail: e.to_string(),
            })?;
        for raw in &self.rows {
            for row in visible(page, &Locator::parse(raw)).await? {
                let Some(at) = label.find(&row.text) else {
                    continue;
                };
                // Read after the label so row numbers before it are ignored.
                let after = &row.text[at.end()..];
                if let Some(m) = numeric::extract(after, metric.unit, &metric.range) {
                    return Ok(Some(m.into()));
                }
            }
        }
        Ok(None)
    }
}

fn default_rows() -> Vec<String> {
    vec!["tr".into(), "[role=row]".into()]
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

    #[tokio::test]
    async fn test_row_with_label() {
        let page = SnapshotPage::new(
            "https://explorer.example/stats",
            r#"<table>
                <tr><td>1</td><td>Block time</td><td>3s</td></tr>
                <tr><td>2</td><td>Gas price</td><td>0.05 Gwei</td></tr>
            </table>"#,
        );
        let strategy = TableScan {
            label: "gas price".into(),
            rows: default_rows(),
        };
        let candidate = strategy.attempt(&page, &metric()).await.unwrap().unwrap();
        assert_eq!(candidate.value, 0.05);
        assert_eq!(candidate.raw, "0.05 Gwei");
    }

    #[tokio::test]
    async fn test_aria_rows() {
        let page = SnapshotPage::new(
            "https://explorer.example/stats",
            r#"<div role="row"><span>7</span><span>Gas price</span><span>12</span></div>"#,
        );
        let strategy = TableScan {
            label: "gas price".into(),
            rows: default_rows(),
        };
        let candidate = strategy.attempt(&page, &metric()).await.unwrap().unwrap();
        assert_eq!(candidate.value, 12.0);
    }

    #[tokio::test]
    async fn test_non_ascii_row_reads_after_label() {
        // "İ" grows by a byte when lowercased.
        let page = SnapshotPage::new(
            "https://explorer.example/stats",
            r#"<table><tr><td>İİİİ 7</td><td>Gas price</td><td>12</td></tr></table>"#,
        );
        let strategy = TableScan {
            label: "GAS PRICE".into(),
            rows: default_rows(),
        };
        let candidate = strategy.attempt(&page, &metric()).await.unwrap().unwrap();
        assert_eq!(candidate.value, 12.0);
    }
}
