//! One target run: launch, fetch, extract, release.

use crate::fetcher;
use crate::renderer::Renderer;
use crate::stealth::ClientIdentity;
use chainmetrics::assemble;
use chainmetrics::{extract_target, MetricResultSet, TargetConfig};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};

/// Run `target` in its own browser session.
///
/// Always yields a result set. The session is closed on every path.
pub async fn run_target(
    renderer: &dyn Renderer,
    identity: &ClientIdentity,
    target: &TargetConfig,
) -> MetricResultSet {
    let started = Instant::now();
    info!(site = %target.name, renderer = renderer.name(), "starting target");

    let mut session = match renderer.launch(identity).await {
        Ok(session) => session,
        Err(e) => {
            warn!(site = %target.name, error = %format!("{e:#}"), "browser launch failed");
            return assemble::assemble(
                target,
                HashMap::new(),
                None,
                Some(format!("browser launch failed: {e:#}")),
            );
        }
    };

    let set = match fetcher::fetch(session.as_mut(), target).await {
        Ok(mut fetched) => {
            extract_target(target, fetched.page.as_mut(), &fetched.navigation).await
        }
        Err(e) => assemble::navigation_failure(target, &e),
    };

    if let Err(e) = session.close().await {
        warn!(site = %target.name, error = %format!("{e:#}"), "failed to close browser session");
    }

    info!(
        site = %target.name,
        found = set.found_count(),
        total = set.metrics.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "target finished"
    );
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::snapshot::SnapshotRenderer;
    use crate::renderer::BrowserSession;
    use async_trait::async_trait;
    use chainmetrics::{MetricOutcome, NavigationError};

    fn rootstock(url: &str) -> TargetConfig {
        serde_json::from_value(serde_json::json!({
            "name": "Rootstock",
            "url": url,
            "timeout_ms": 1000,
            "detect_blocking": true,
            "metrics": [
                {
                    "name": "blocktime_seconds",
                    "raw_field": "blocktime_raw",
                    "unit": "seconds",
                    "range": { "min": 0, "max": 600 },
                    "strategies": [{ "kind": "labeled_card", "label": "avg block time", "wait_ms": 10 }]
                },
                {
                    "name": "avg_gas_price_gwei",
                    "raw_field": "avg_gas_price_raw",
                    "unit": "gwei",
                    "range": { "min": 0, "max": 1000 },
                    "strategies": [{ "kind": "labeled_card", "label": "avg gas price", "wait_ms": 10 }]
                }
            ]
        }))
        .unwrap()
    }

    const STATS: &str = r#"<html><head><title>Rootstock Stats</title></head><body>
        <div class="big-data"><div class="bd-title">Avg Block Time</div><div class="bd-data">27.5s</div></div>
        <div class="big-data"><div class="bd-title">Avg Gas Price</div><div class="bd-data">26,065,600,000wei</div></div>
    </body></html>"#;

    #[tokio::test]
    async fn test_run_target_extracts_and_closes_session() {
        let url = "https://stats.example/";
        let renderer = SnapshotRenderer::new().with_page(url, STATS);
        let set = run_target(&renderer, &ClientIdentity::default(), &rootstock(url)).await;

        assert_eq!(set.value("blocktime_seconds"), Some(27.5));
        assert_eq!(set.value("avg_gas_price_gwei"), Some(26.0656));
        assert!(set.error.is_none());
        assert!(!set.verdict.as_ref().unwrap().blocked);
        assert_eq!(renderer.sessions_launched(), 1);
        assert_eq!(renderer.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_nulls_every_metric() {
        let url = "https://stats.example/";
        let renderer = SnapshotRenderer::new().with_failure(
            url,
            NavigationError::from_message(url, "net::ERR_CONNECTION_REFUSED"),
        );
        let set = run_target(&renderer, &ClientIdentity::default(), &rootstock(url)).await;

        assert_eq!(set.found_count(), 0);
        assert!(set.error.as_ref().unwrap().contains("ERR_CONNECTION_REFUSED"));
        assert!(matches!(
            set.outcome("blocktime_seconds"),
            Some(MetricOutcome::Absent { reason }) if reason == "navigation failed"
        ));
        assert_eq!(renderer.sessions_closed(), 1);
    }

    struct BrokenRenderer;

    #[async_trait]
    impl Renderer for BrokenRenderer {
        async fn launch(
            &self,
            _identity: &ClientIdentity,
        ) -> anyhow::Result<Box<dyn BrowserSession>> {
            anyhow::bail!("no browser here")
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_launch_failure_still_yields_result_set() {
        let set = run_target(
            &BrokenRenderer,
            &ClientIdentity::default(),
            &rootstock("https://stats.example/"),
        )
        .await;
        assert_eq!(set.metrics.len(), 2);
        assert_eq!(set.found_count(), 0);
        assert_eq!(
            set.error.as_deref(),
            Some("browser launch failed: no browser here")
        );
    }
}
