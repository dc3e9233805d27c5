//! Per-target extraction pipeline.
//!
//! Runs on an already-loaded page: classify (when enabled), then each
//! metric's strategy chain in configuration order, then assembly. A metric
//! with a detail-page hop navigates the page, extracts, and returns to the
//! entry page when more metrics follow. Network observations made during
//! extraction are folded into the verdict before assembly.

use crate::assemble;
use crate::classifier;
use crate::config::{LinkHop, LoadOptions, TargetConfig};
use crate::error::{NavigationError, PageError, ScrapeError};
use crate::page::{Locator, NavigationInfo, PageHandle};
use crate::strategy::extract_metric;
use crate::types::{BlockVerdict, MetricOutcome, MetricResultSet};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extract every metric of `target` from `page`, which must already show
/// the target's entry URL.
pub async fn extract_target(
    target: &TargetConfig,
    page: &mut dyn PageHandle,
    navigation: &NavigationInfo,
) -> MetricResultSet {
    let verdict = if target.detect_blocking {
        Some(classify(target, &*page, navigation.status).await)
    } else {
        None
    };

    if let Some(v) = verdict.as_ref().filter(|v| v.blocked) {
        let err = ScrapeError::Blocked(v.clone());
        if target.abort_when_blocked {
            warn!(site = %target.name, error = %err, "skipping extraction on blocked page");
            return assemble::blocked(target, v.clone());
        }
        warn!(site = %target.name, error = %err, "page looks blocked, extracting anyway");
    }

    let load = target.load_options();
    let mut outcomes = HashMap::new();
    let mut away_from_entry = false;

    for (i, metric) in target.metrics.iter().enumerate() {
        if away_from_entry {
            if let Err(e) = page.goto(&navigation.final_url, &load).await {
                warn!(site = %target.name, error = %e, "could not return to entry page");
                for rest in &target.metrics[i..] {
                    outcomes.insert(
                        rest.name.clone(),
                        MetricOutcome::absent(format!("entry page reload failed: {e}")),
                    );
                }
                break;
            }
            away_from_entry = false;
        }

        let outcome = match &metric.hop {
            Some(hop) => match follow_hop(page, hop, &load).await {
                Ok(detail) => {
                    away_from_entry = true;
                    debug!(metric = %metric.name, url = %detail.final_url, "followed detail link");
                    extract_metric(&*page, metric).await
                }
                Err(e) => {
                    warn!(site = %target.name, metric = %metric.name, error = %e, "detail page hop failed");
                    MetricOutcome::absent(format!("detail page hop failed: {e}"))
                }
            },
            None => extract_metric(&*page, metric).await,
        };
        outcomes.insert(metric.name.clone(), outcome);
    }

    let verdict = verdict.map(|mut v| {
        let known = v.reasons.len();
        classifier::fold_observations(&mut v, &page.observations());
        if v.reasons.len() > known {
            warn!(
                site = %target.name,
                reasons = ?&v.reasons[known..],
                "blocking signals seen during extraction"
            );
        }
        v
    });

    let set = assemble::assemble(target, outcomes, verdict, None);
    info!(
        site = %target.name,
        found = set.found_count(),
        total = set.metrics.len(),
        "extraction finished"
    );
    set
}

async fn classify(target: &TargetConfig, page: &dyn PageHandle, status: u16) -> BlockVerdict {
    match classifier::inspect(page, status).await {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(site = %target.name, error = %e, "block classifier could not read the page");
            let mut verdict = BlockVerdict::default();
            verdict.warn(format!("classifier incomplete: {e}"));
            verdict
        }
    }
}

/// Find the link inside the row identified by `hop.row`, resolve it against
/// the current URL, and navigate there.
pub async fn follow_hop(
    page: &mut dyn PageHandle,
    hop: &LinkHop,
    load: &LoadOptions,
) -> Result<NavigationInfo, ScrapeError> {
    let timeout = Duration::from_millis(hop.timeout_ms);
    if let Some(wait_for) = &hop.wait_for {
        page.wait_for_visible(&Locator::parse(wait_for), timeout)
            .await?;
    }

    let row = Locator::parse(&hop.row);
    let link = Locator::parse(&hop.link);
    let groups = page.query_within(&row, hop.depth, &link).await?;
    let href = groups
        .iter()
        .flatten()
        .find_map(|e| e.href.clone())
        .ok_or_else(|| PageError::NotFound(format!("{link} near {row}")))?;

    let base = page.current_url().await?;
    let resolved = url::Url::parse(&base)
        .and_then(|b| b.join(&href))
        .map_err(|e| NavigationError::Failed {
            url: href.clone(),
            detail: format!("cannot resolve against {base}: {e}"),
        })?;
    Ok(page.goto(resolved.as_str(), load).await?)
}
