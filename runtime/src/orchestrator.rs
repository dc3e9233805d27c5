//! Parallel run over every selected target.
//!
//! Each target runs in its own tokio task with its own browser session and
//! an overall time budget. Nothing is shared between tasks, so a hung or
//! failing target never affects the others.

use crate::renderer::Renderer;
use crate::runner::run_target;
use crate::stealth::ClientIdentity;
use chainmetrics::assemble;
use chainmetrics::{MetricResultSet, TargetConfig};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Target counts of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Aggregate output of a run, keyed by target key.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub summary: SummaryCounts,
    pub data: BTreeMap<String, MetricResultSet>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl RunSummary {
    /// Fold per-target result sets. A target with a target-level error is
    /// failed; its all-null record still appears under `data`.
    pub fn from_results(results: Vec<(String, MetricResultSet)>) -> Self {
        let total = results.len();
        let mut data = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for (key, set) in results {
            if let Some(error) = &set.error {
                errors.insert(key.clone(), error.clone());
            }
            data.insert(key, set);
        }
        let failed = errors.len();
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            summary: SummaryCounts {
                total,
                successful: total - failed,
                failed,
            },
            data,
            errors,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Run all `targets` in parallel, each bounded by `budget`.
pub async fn run_all(
    renderer: Arc<dyn Renderer>,
    identity: ClientIdentity,
    targets: Vec<TargetConfig>,
    budget: Duration,
) -> RunSummary {
    info!(targets = targets.len(), budget_secs = budget.as_secs(), "starting run");

    let tasks: Vec<_> = targets
        .into_iter()
        .map(|target| {
            let renderer = Arc::clone(&renderer);
            let identity = identity.clone();
            let spawned = target.clone();
            let handle = tokio::spawn(async move {
                let run = run_target(renderer.as_ref(), &identity, &spawned);
                match tokio::time::timeout(budget, run).await {
                    Ok(set) => set,
                    Err(_) => {
                        warn!(site = %spawned.name, budget_secs = budget.as_secs(), "target abandoned");
                        failed_run(
                            &spawned,
                            format!("abandoned after exceeding {}s budget", budget.as_secs()),
                        )
                    }
                }
            });
            (target, handle)
        })
        .collect();

    let (targets, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let joined = futures::future::join_all(handles).await;

    let results = targets
        .iter()
        .zip(joined)
        .map(|(target, joined)| {
            let set = joined.unwrap_or_else(|e| {
                warn!(site = %target.name, error = %e, "target task panicked");
                failed_run(target, format!("target run panicked: {e}"))
            });
            (target.key(), set)
        })
        .collect();

    let summary = RunSummary::from_results(results);
    info!(
        total = summary.summary.total,
        successful = summary.summary.successful,
        failed = summary.summary.failed,
        "run finished"
    );
    summary
}

fn failed_run(target: &TargetConfig, error: String) -> MetricResultSet {
    assemble::assemble(target, HashMap::new(), None, Some(error))
}
