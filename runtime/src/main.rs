// Copyright 2026 Chainmetrics Contributors
// SPDX-License-Identifier: MIT

use anyhow::Result;
use chainmetrics_runtime::cli::{self, RunOptions};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "chainmetrics",
    about = "Chainmetrics — blockchain metrics from explorer pages, as JSON",
    version,
    after_help = "Run 'chainmetrics <command> --help' for details on each command.\nResult JSON goes to stdout; logs and summaries go to stderr."
)]
struct Cli {
    /// Suppress summaries and informational logs
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print result JSON on a single line
    #[arg(long, global = true)]
    compact: bool,

    /// Targets file replacing the built-in list (or set CHAINMETRICS_TARGETS)
    #[arg(long, global = true)]
    targets: Option<PathBuf>,

    /// Navigation timeout for every target, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Overall time allowed per target, in seconds
    #[arg(long, global = true, default_value = "120")]
    budget_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every target in parallel and print the run summary
    Run {
        /// Only run these targets (name or key). Can be repeated.
        #[arg(long = "target")]
        targets: Vec<String>,
    },
    /// Scrape one target and print its result record
    Scrape {
        /// Target name or key (e.g. "rootstock", "Hiro/STX")
        name: String,
    },
    /// Run the extraction pipeline on a saved page, offline
    Replay {
        /// Target name or key
        name: String,
        /// Saved HTML of the target's entry page
        #[arg(long)]
        html: PathBuf,
        /// HTTP status to report for the page
        #[arg(long, default_value = "200")]
        status: u16,
        /// Extra saved pages for detail-page hops, as URL=FILE. Can be repeated.
        #[arg(long = "linked")]
        linked: Vec<String>,
    },
    /// List configured targets and their strategy chains
    List,
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_logging(verbose: bool, quiet: bool, json: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("chainmetrics={level},chainmetrics_runtime={level}"))
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.quiet {
        std::env::set_var("CHAINMETRICS_QUIET", "1");
    }
    if cli.compact {
        std::env::set_var("CHAINMETRICS_COMPACT", "1");
    }
    init_logging(cli.verbose, cli.quiet, cli.json_logs);

    let options = RunOptions {
        targets_file: cli.targets,
        timeout_ms: cli.timeout_ms,
        budget: Duration::from_secs(cli.budget_secs),
    };

    let result = match cli.command {
        Commands::Run { targets } => cli::run_cmd::run(&options, &targets).await,
        Commands::Scrape { name } => cli::scrape::run(&options, &name).await,
        Commands::Replay {
            name,
            html,
            status,
            linked,
        } => cli::replay::run(&options, &name, &html, status, &linked).await,
        Commands::List => cli::list::run(&options).await,
        Commands::Doctor => cli::doctor::run(&options).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "chainmetrics", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
