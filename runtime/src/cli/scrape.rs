//! `chainmetrics scrape NAME`: one target, one result set.

use crate::cli::{output, RunOptions};
use crate::renderer::chromium::ChromiumRenderer;
use crate::runner::run_target;
use crate::stealth::ClientIdentity;
use anyhow::{bail, Result};

/// Scrape a single target. The JSON record is printed even when the page
/// failed to load; the command then exits with an error.
pub async fn run(options: &RunOptions, name: &str) -> Result<()> {
    let target = options.load_target(name)?;
    let renderer = ChromiumRenderer::new()?;

    let identity = ClientIdentity::default();
    let run = run_target(&renderer, &identity, &target);
    let set = match tokio::time::timeout(options.budget, run).await {
        Ok(set) => set,
        Err(_) => bail!(
            "{} abandoned after exceeding {}s budget",
            target.name,
            options.budget.as_secs()
        ),
    };

    output::print_target(&set);
    output::print_json(&set.to_json());
    if let Some(error) = &set.error {
        bail!("{}: {error}", target.name);
    }
    Ok(())
}
