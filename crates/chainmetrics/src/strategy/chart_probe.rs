//! Chart hover probing.

use super::{Candidate, Strategy};
use crate::config::MetricSpec;
use crate::error::PageError;
use crate::numeric;
use crate::page::{visible, Locator, PageHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Hover over the right edge of a chart and read the tooltip it renders.
///
/// Charts draw their latest data point on the right, so the probe hovers at
/// a few relative x positions from right to left, lets the page settle, and
/// scans the last visible elements (where tooltips are appended) for text
/// carrying the metric's unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartProbe {
    #[serde(default = "default_charts")]
    pub charts: Vec<String>,
    #[serde(default = "default_min_width")]
    pub min_width: f64,
    #[serde(default = "default_min_height")]
    pub min_height: f64,
    /// Relative x positions, tried in order.
    #[serde(default = "default_positions")]
    pub positions: Vec<f64>,
    /// Relative y position.
    #[serde(default = "default_vertical")]
    pub vertical: f64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// How many trailing visible elements to inspect after each hover.
    #[serde(default = "default_tail")]
    pub tail: usize,
}

impl Default for ChartProbe {
    fn default() -> Self {
        Self {
            charts: default_charts(),
            min_width: default_min_width(),
            min_height: default_min_height(),
            positions: default_positions(),
            vertical: default_vertical(),
            settle_ms: default_settle_ms(),
            tail: default_tail(),
        }
    }
}

#[async_trait]
impl Strategy for ChartProbe {
    fn name(&self) -> &'static str {
        "chart_probe"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        metric: &MetricSpec,
    ) -> Result<Option<Candidate>, PageError> {
        let everything = Locator::Css("body *".into());

        for raw in &self.charts {
            for chart in visible(page, &Locator::parse(raw)).await? {
                let Some(bounds) = chart.bounds else {
                    continue;
                };
                if bounds.width <= self.min_width || bounds.height <= self.min_height {
                    continue;
                }
                debug!(chart = %raw, width = bounds.width, height = bounds.height, "probing chart");

                for fx in &self.positions {
                    let (x, y) = bounds.point_at(*fx, self.vertical);
                    page.hover(x, y).await?;
                    page.settle(Duration::from_millis(self.settle_ms)).await;

                    if !numeric::mentions_unit(&page.body_text().await?, metric.unit) {
                        continue;
                    }
                    let shown = visible(page, &everything).await?;
                    let start = shown.len().saturating_sub(self.tail);
                    for element in &shown[start..] {
                        let text = element.text.trim();
                        if !numeric::mentions_unit(text, metric.unit) {
                            continue;
                        }
                        if let Some(m) = numeric::extract(text, metric.unit, &metric.range) {
                            return Ok(Some(Candidate {
                                raw: text.to_string(),
                                ..Candidate::from(m)
                            }));
                        }
                    }
                }
            }
        }
        Ok(None)
    }
}

fn default_charts() -> Vec<String> {
    ["canvas", "svg", ".chart", "[class*=\"chart\"]"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_min_width() -> f64 {
    200.0
}

fn default_min_height() -> f64 {
    100.0
}

fn default_positions() -> Vec<f64> {
    vec![0.95, 0.90, 0.85]
}

fn default_vertical() -> f64 {
    0.5
}

fn default_settle_ms() -> u64 {
    2_000
}

fn default_tail() -> usize {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlausibleRange, UnitFamily};
    use crate::snapshot::SnapshotPage;

    const CHART: &str = r#"<html><body>
        <h1>Average gas price</h1>
        <div class="legend">Gas price (Gwei)</div>
        <canvas class="tiny" data-box="0,0,50,50"></canvas>
        <canvas class="main" data-box="100,200,1000,400"></canvas>
    </body></html>"#;

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
    async fn test_tooltip_after_hover() {
        // 95% of the main chart is x = 1050; the tooltip shows from x = 1000.
        let page = SnapshotPage::new("https://explorer.example/", CHART)
            .with_hover_reveal(1000.0, "Jan 5 Value0.0021 Gwei");
        let candidate = ChartProbe::default()
            .attempt(&page, &metric())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(candidate.value, 0.0021);
        assert_eq!(candidate.raw, "Jan 5 Value0.0021 Gwei");
    }

    #[tokio::test]
    async fn test_no_tooltip_is_a_miss() {
        let page = SnapshotPage::new("https://explorer.example/", CHART);
        assert!(ChartProbe::default()
            .attempt(&page, &metric())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_small_charts_are_skipped() {
        let page = SnapshotPage::new(
            "https://explorer.example/",
            r#"<canvas data-box="0,0,150,80"></canvas>"#,
        )
        .with_hover_reveal(0.0, "1.2 Gwei");
        assert!(ChartProbe::default()
            .attempt(&page, &metric())
            .await
            .unwrap()
            .is_none());
    }
}
