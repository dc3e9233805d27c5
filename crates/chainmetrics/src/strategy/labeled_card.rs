//! Label-anchored strategies: stat cards and "label next to value" layouts.

use super::{Candidate, Strategy};
use crate::config::MetricSpec;
use crate::error::PageError;
use crate::numeric;
use crate::page::{normalize_whitespace, Locator, PageHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A card whose title element reads exactly `label`; the value is the
/// card's value element.
///
/// ```html
/// <div class="big-data">
///   <div class="bd-title">avg gas price</div>
///   <div class="bd-data">26,065,600,000wei</div>
/// </div>
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledCard {
    /// Title text, compared case-insensitively after whitespace collapsing.
    pub label: String,
    #[serde(default = "default_card")]
    pub card: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_value")]
    pub value: String,
    /// How long to wait for a value element to become visible.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
}

#[async_trait]
impl Strategy for LabeledCard {
    fn name(&self) -> &'static str {
        "labeled_card"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        metric: &MetricSpec,
    ) -> Result<Option<Candidate>, PageError> {
        let card = Locator::parse(&self.card);
        let value = Locator::parse(&self.value);
        page.wait_for_visible(&value, Duration::from_millis(self.wait_ms))
            .await?;

        let wanted = normalize_whitespace(&self.label).to_lowercase();
        let titles = page
            .query_within(&card, 0, &Locator::parse(&self.title))
            .await?;
        let Some(index) = titles.iter().position(|group| {
            group
                .iter()
                .any(|t| normalize_whitespace(&t.text).to_lowercase() == wanted)
        }) else {
            return Ok(None);
        };

        let values = page.query_within(&card, 0, &value).await?;
        let Some(element) = values.get(index).and_then(|group| group.first()) else {
            return Ok(None);
        };
        if !element.visible {
            return Ok(None);
        }
        let text = element.text.trim();
        Ok(numeric::extract(text, metric.unit, &metric.range).map(|m| Candidate {
            raw: text.to_string(),
            ..Candidate::from(m)
        }))
    }
}

/// Which text to read around a label match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelScope {
    /// The label element's parent, which usually holds label and value.
    #[default]
    Parent,
    /// The matched element itself.
    Element,
}

/// The innermost visible element containing `label`, read together with
/// its parent (`Fee 0.2 STX`, `CORE Price $1.02`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelProximity {
    /// A locator; plain text is treated as `text=<label>`.
    pub label: String,
    #[serde(default)]
    pub scope: LabelScope,
}

impl LabelProximity {
    fn locator(&self) -> Locator {
        match Locator::parse(&self.label) {
            Locator::Css(plain) => Locator::Text(plain),
            other => other,
        }
    }
}

#[async_trait]
impl Strategy for LabelProximity {
    fn name(&self) -> &'static str {
        "label_proximity"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        metric: &MetricSpec,
    ) -> Result<Option<Candidate>, PageError> {
        let matches = page.query(&self.locator()).await?;
        for element in matches.iter().filter(|e| e.visible) {
            let text = match self.scope {
                LabelScope::Parent => element.parent_text.as_deref().unwrap_or(&element.text),
                LabelScope::Element => element.text.as_str(),
            };
            if let Some(m) = numeric::extract(text, metric.unit, &metric.range) {
                return Ok(Some(m.into()));
            }
        }
        Ok(None)
    }
}

fn default_card() -> String {
    ".big-data".into()
}

fn default_title() -> String {
    ".bd-title".into()
}

fn default_value() -> String {
    ".bd-data".into()
}

fn default_wait_ms() -> u64 {
    15_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlausibleRange, UnitFamily};
    use crate::snapshot::SnapshotPage;

    const STATS: &str = r#"<html><body>
        <div class="big-data">
            <div class="bd-title"> Avg  Block Time </div>
            <div class="bd-data">25.07s</div>
        </div>
        <div class="big-data">
            <div class="bd-title">avg gas price (24h)</div>
            <div class="bd-data">99,000,000,000wei</div>
        </div>
        <div class="big-data">
            <div class="bd-title">avg gas price</div>
            <div class="bd-data">26,065,600,000wei</div>
        </div>
    </body></html>"#;

    fn metric(name: &str, unit: UnitFamily, min: f64, max: f64) -> MetricSpec {
        MetricSpec {
            name: name.into(),
            raw_field: None,
            source_field: None,
            unit,
            range: PlausibleRange::new(min, max),
            hop: None,
            strategies: Vec::new(),
        }
    }

    fn card(label: &str) -> LabeledCard {
        serde_json::from_value(serde_json::json!({ "label": label })).unwrap()
    }

    #[tokio::test]
    async fn test_exact_title_match_reads_wei_card() {
        let page = SnapshotPage::new("https://stats.example/", STATS);
        let gas = metric("avg_gas_price_gwei", UnitFamily::Gwei, 0.0, 1000.0);
        let candidate = card("avg gas price").attempt(&page, &gas).await.unwrap().unwrap();
        assert_eq!(candidate.value, 26.0656);
        assert_eq!(candidate.raw, "26,065,600,000wei");
        assert_eq!(candidate.source.as_deref(), Some("26065600000 wei"));
    }

    #[tokio::test]
    async fn test_title_match_ignores_case_and_spacing() {
        let page = SnapshotPage::new("https://stats.example/", STATS);
        let bt = metric("blocktime_seconds", UnitFamily::Seconds, 0.0, 600.0);
        let candidate = card("avg block time").attempt(&page, &bt).await.unwrap().unwrap();
        assert_eq!(candidate.value, 25.07);
        assert_eq!(candidate.raw, "25.07s");
    }

    #[tokio::test]
    async fn test_missing_card_is_a_miss() {
        let page = SnapshotPage::new("https://stats.example/", STATS);
        let bt = metric("tps", UnitFamily::Plain, 0.0, 600.0);
        assert!(card("tps").attempt(&page, &bt).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_visible_value_times_out() {
        let page = SnapshotPage::new(
            "https://stats.example/",
            r#"<div class="big-data" hidden><div class="bd-title">avg gas price</div>
               <div class="bd-data">1wei</div></div>"#,
        );
        let gas = metric("avg_gas_price_gwei", UnitFamily::Gwei, 0.0, 1000.0);
        assert!(matches!(
            card("avg gas price").attempt(&page, &gas).await,
            Err(PageError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_label_proximity_reads_parent() {
        let page = SnapshotPage::new(
            "https://explorer.example/tx/0x1",
            r#"<html><body>
                <div><span>Nonce</span><span>12</span></div>
                <div class="row"><span>Fee</span><span>200,000 µSTX</span></div>
            </body></html>"#,
        );
        let fee = metric("latest_transfer_fee_stx", UnitFamily::Stx, 0.0, 2.0);
        let strategy = LabelProximity {
            label: "text=Fee".into(),
            scope: LabelScope::Parent,
        };
        let candidate = strategy.attempt(&page, &fee).await.unwrap().unwrap();
        assert_eq!(candidate.value, 0.2);
        assert_eq!(candidate.raw, "200,000 µSTX");
    }

    #[tokio::test]
    async fn test_label_proximity_plain_label_and_element_scope() {
        let page = SnapshotPage::new(
            "https://scan.example/",
            r#"<div><p>CORE Price $1.02</p><p>Market cap $1,020,000,000</p></div>"#,
        );
        let price = metric("core_price", UnitFamily::Usd, 0.0, 1000.0);
        let strategy = LabelProximity {
            label: "CORE Price".into(),
            scope: LabelScope::Element,
        };
        let candidate = strategy.attempt(&page, &price).await.unwrap().unwrap();
        assert_eq!(candidate.value, 1.02);
        assert_eq!(candidate.raw, "$1.02");
    }
}
