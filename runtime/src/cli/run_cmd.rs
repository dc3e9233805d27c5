//! `chainmetrics run`: every selected target, in parallel.

use crate::cli::{output, RunOptions};
use crate::orchestrator::run_all;
use crate::renderer::chromium::ChromiumRenderer;
use crate::stealth::ClientIdentity;
use anyhow::Result;
use std::sync::Arc;

/// Run the selected targets (all when `names` is empty) and print the summary.
///
/// Individual target failures are reported in the output, not as an error.
pub async fn run(options: &RunOptions, names: &[String]) -> Result<()> {
    let targets = chainmetrics::select_targets(&options.load_targets()?, names)?;
    let renderer = Arc::new(ChromiumRenderer::new()?);

    let summary = run_all(renderer, ClientIdentity::default(), targets, options.budget).await;

    output::print_summary(&summary);
    output::print_json(&summary.to_json());
    Ok(())
}
