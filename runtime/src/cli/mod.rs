//! CLI subcommand implementations for the chainmetrics binary.

pub mod doctor;
pub mod list;
pub mod output;
pub mod replay;
pub mod run_cmd;
pub mod scrape;

use crate::targets;
use anyhow::Result;
use chainmetrics::TargetConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by the subcommands that run targets.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Targets file replacing the embedded list.
    pub targets_file: Option<PathBuf>,
    /// Navigation timeout override for every target.
    pub timeout_ms: Option<u64>,
    /// Overall time allowed per target.
    pub budget: Duration,
}

impl RunOptions {
    /// Resolve the target list and apply overrides.
    pub fn load_targets(&self) -> Result<Vec<TargetConfig>> {
        let mut loaded = targets::load(self.targets_file.as_deref())?;
        targets::apply_timeout(&mut loaded, self.timeout_ms);
        Ok(loaded)
    }

    /// Resolve exactly one target by name or key.
    pub fn load_target(&self, name: &str) -> Result<TargetConfig> {
        let loaded = self.load_targets()?;
        let mut selected = chainmetrics::select_targets(&loaded, &[name.to_string()])?;
        Ok(selected.remove(0))
    }
}
