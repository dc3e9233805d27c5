//! Result assembly.
//!
//! Folds per-metric outcomes into one [`MetricResultSet`] stamped with a
//! single UTC timestamp. Metrics are independent: one absence never hides
//! another's value. Ranges are checked again here so no result set can
//! carry an implausible value, whatever produced it.

use crate::config::TargetConfig;
use crate::error::NavigationError;
use crate::types::{BlockVerdict, MetricEntry, MetricOutcome, MetricResultSet};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Build the result set for `target` from outcomes keyed by metric name.
pub fn assemble(
    target: &TargetConfig,
    outcomes: HashMap<String, MetricOutcome>,
    verdict: Option<BlockVerdict>,
    error: Option<String>,
) -> MetricResultSet {
    assemble_at(target, outcomes, verdict, error, Utc::now())
}

pub fn assemble_at(
    target: &TargetConfig,
    mut outcomes: HashMap<String, MetricOutcome>,
    verdict: Option<BlockVerdict>,
    error: Option<String>,
    timestamp: DateTime<Utc>,
) -> MetricResultSet {
    let metrics = target
        .metrics
        .iter()
        .map(|spec| {
            let outcome = match outcomes.remove(&spec.name) {
                Some(MetricOutcome::Found(v)) if !spec.range.contains(v.value) => {
                    MetricOutcome::absent(format!(
                        "value {} outside plausible range ({}, {})",
                        v.value, spec.range.min, spec.range.max
                    ))
                }
                Some(outcome) => outcome,
                None => MetricOutcome::absent("not attempted"),
            };
            MetricEntry {
                name: spec.name.clone(),
                raw_field: spec.raw_field_name(),
                source_field: spec.source_field.clone(),
                outcome,
            }
        })
        .collect();

    MetricResultSet {
        target: target.name.clone(),
        timestamp,
        metrics,
        verdict,
        error,
    }
}

/// Every metric absent because the page never loaded.
pub fn navigation_failure(target: &TargetConfig, error: &NavigationError) -> MetricResultSet {
    let outcomes = all_absent(target, "navigation failed");
    assemble(target, outcomes, None, Some(error.to_string()))
}

/// Every metric absent because extraction was skipped on a blocked page.
pub fn blocked(target: &TargetConfig, verdict: BlockVerdict) -> MetricResultSet {
    let outcomes = all_absent(target, "access blocked");
    assemble(target, outcomes, Some(verdict), None)
}

fn all_absent(target: &TargetConfig, reason: &str) -> HashMap<String, MetricOutcome> {
    target
        .metrics
        .iter()
        .map(|m| (m.name.clone(), MetricOutcome::absent(reason)))
        .collect()
}
