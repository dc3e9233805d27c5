//! `chainmetrics replay NAME --html FILE`: run the extraction pipeline on a
//! saved page without a browser.

use crate::cli::{output, RunOptions};
use crate::renderer::snapshot::SnapshotRenderer;
use crate::runner::run_target;
use crate::stealth::ClientIdentity;
use anyhow::Result;
use std::path::Path;

/// Replay `html` as the target's entry page, served with `status`.
///
/// `linked` pages (`URL=FILE`) are reachable through detail-page hops.
pub async fn run(
    options: &RunOptions,
    name: &str,
    html: &Path,
    status: u16,
    linked: &[String],
) -> Result<()> {
    let target = options.load_target(name)?;
    let mut renderer = SnapshotRenderer::new()
        .with_page_file(&target.url, html)?
        .with_status(&target.url, status);
    for entry in linked {
        let (url, file) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected URL=FILE, got {entry}"))?;
        renderer = renderer.with_page_file(url, Path::new(file))?;
    }

    let set = run_target(&renderer, &ClientIdentity::default(), &target).await;
    output::print_target(&set);
    output::print_json(&set.to_json());
    Ok(())
}
