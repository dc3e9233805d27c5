//! Environment readiness check.

use crate::cli::RunOptions;
use crate::renderer::chromium::find_chromium;
use crate::targets::TARGETS_ENV;
use anyhow::Result;
use std::process::Command;

/// Check Chromium availability, target configuration, and available memory.
pub async fn run(options: &RunOptions) -> Result<()> {
    println!("Chainmetrics Doctor");
    println!("===================");
    println!();

    // OS and architecture
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    // Check Chromium
    let chromium_path = find_chromium();
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Put chromium on PATH, run `npx playwright install chromium`, or set CHAINMETRICS_CHROMIUM_PATH."
        ),
    }

    // Check target configuration
    let source = match (&options.targets_file, std::env::var(TARGETS_ENV)) {
        (Some(path), _) => path.display().to_string(),
        (None, Ok(path)) => format!("{path} (from {TARGETS_ENV})"),
        (None, Err(_)) => "embedded".to_string(),
    };
    let targets_ok = match options.load_targets() {
        Ok(targets) => {
            let metrics: usize = targets.iter().map(|t| t.metrics.len()).sum();
            println!(
                "[OK] Targets: {} targets, {metrics} metrics ({source})",
                targets.len()
            );
            true
        }
        Err(e) => {
            println!("[!!] Targets invalid ({source}): {e:#}");
            false
        }
    };

    // Check available memory
    let mem_mb = get_available_memory_mb();
    match mem_mb {
        Some(mb) => {
            if mb >= 512 {
                println!("[OK] Available memory: {mb}MB (>= 512MB recommended)");
            } else {
                println!("[!!] Available memory: {mb}MB (< 512MB, parallel runs may fail)");
            }
        }
        None => println!("[??] Could not determine available memory"),
    }

    println!();
    if chromium_path.is_some() && targets_ok {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}

/// Get available memory in MB (platform-specific).
fn get_available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "macos")]
    {
        let output = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        let bytes: u64 = s.trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("free").args(["-m"]).output().ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        s.lines()
            .find(|line| line.starts_with("Mem:"))
            .and_then(|line| line.split_whitespace().nth(6))
            .and_then(|available| available.parse().ok())
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
