//! Target configuration loading.
//!
//! The four explorer targets ship embedded in the binary. A JSON file given
//! with `--targets` or `CHAINMETRICS_TARGETS` replaces them entirely.

use anyhow::{Context, Result};
use chainmetrics::{load_targets, parse_targets, TargetConfig};
use std::path::{Path, PathBuf};

/// Environment variable naming a targets file.
pub const TARGETS_ENV: &str = "CHAINMETRICS_TARGETS";

const EMBEDDED_TARGETS: &str = include_str!("../targets.json");

/// The built-in target list.
pub fn embedded() -> Result<Vec<TargetConfig>> {
    parse_targets(EMBEDDED_TARGETS).context("embedded target configuration is invalid")
}

/// Resolve the target list: explicit file, then environment, then embedded.
pub fn load(path: Option<&Path>) -> Result<Vec<TargetConfig>> {
    let from_env = std::env::var_os(TARGETS_ENV).map(PathBuf::from);
    match path.map(Path::to_path_buf).or(from_env) {
        Some(file) => load_targets(&file)
            .with_context(|| format!("failed to load targets from {}", file.display())),
        None => embedded(),
    }
}

/// Override every target's navigation timeout.
pub fn apply_timeout(targets: &mut [TargetConfig], timeout_ms: Option<u64>) {
    if let Some(ms) = timeout_ms {
        for target in targets {
            target.timeout_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainmetrics::{LoadPolicy, UnitFamily};

    #[test]
    fn test_embedded_targets_parse() {
        let targets = embedded().unwrap();
        let keys: Vec<String> = targets.iter().map(|t| t.key()).collect();
        assert_eq!(keys, vec!["rootstock", "hiro_stx", "core_dao", "bob"]);
        assert!(targets.iter().all(|t| t.detect_blocking));
        assert!(targets.iter().all(|t| t.load == LoadPolicy::NetworkIdle));
    }

    #[test]
    fn test_embedded_rootstock_fields() {
        let targets = embedded().unwrap();
        let rootstock = &targets[0];
        assert_eq!(rootstock.url, "https://stats.rootstock.io/");
        let gas = &rootstock.metrics[1];
        assert_eq!(gas.name, "avg_gas_price_gwei");
        assert_eq!(gas.raw_field_name(), "avg_gas_price_raw");
        assert_eq!(gas.unit, UnitFamily::Gwei);
    }

    #[test]
    fn test_embedded_hiro_fee_hops_to_detail_page() {
        let targets = embedded().unwrap();
        let fee = &targets[1].metrics[1];
        let hop = fee.hop.as_ref().unwrap();
        assert_eq!(hop.row, "text=transfer (sbtc-token)");
        assert_eq!(hop.depth, 2);
        assert_eq!(fee.strategies.len(), 2);
    }

    #[test]
    fn test_load_from_file_replaces_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(
            &path,
            r#"[{"name": "Solo", "url": "https://solo.test/",
                 "metrics": [{"name": "x", "unit": "plain", "strategies": [{"kind": "text_scan"}]}]}]"#,
        )
        .unwrap();
        let targets = load(Some(&path)).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "Solo");
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = load(Some(Path::new("/nonexistent/targets.json"))).unwrap_err();
        assert!(format!("{err:#}").contains("failed to load targets from"));
    }

    #[test]
    fn test_apply_timeout() {
        let mut targets = embedded().unwrap();
        apply_timeout(&mut targets, Some(5_000));
        assert!(targets.iter().all(|t| t.timeout_ms == 5_000));
        apply_timeout(&mut targets, None);
        assert!(targets.iter().all(|t| t.timeout_ms == 5_000));
    }
}
