#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the transit supply and equity pipeline.
//!
//! Exit codes: 0 on success, 2 when a threshold fails (outputs are still
//! written), 1 on any other error.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use transit_equity_cli_utils::{init_logger, reporters};
use transit_equity_pipeline::{
    Progress, STAGE_COUNT,
    config::{ConfigOverrides, PipelineConfig},
    context::RunContext,
    run,
};

/// Exit code for a run whose outputs were written but a threshold failed.
const THRESHOLD_EXIT_CODE: i32 = 2;

#[derive(Parser)]
#[command(
    name = "transit_equity",
    about = "Transit schedule ingestion and area-level equity metrics"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the output tables and run report
    Run {
        /// Input directory (schedules, boundaries, registry, demographics)
        #[arg(long)]
        input: PathBuf,
        /// Output directory
        #[arg(long)]
        output: PathBuf,
        /// Config file (default: `<input>/pipeline.toml`)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Comma-separated demographic source ids to merge (overrides
        /// `TRANSIT_EQUITY_DEMOGRAPHICS` env var)
        #[arg(long)]
        demographics: Option<String>,
        /// Minimum share of areas a demographic source must match
        #[arg(long)]
        min_match_rate: Option<f64>,
        /// Maximum share of stops allowed to stay unassigned
        #[arg(long)]
        max_unassigned: Option<f64>,
        /// Per-document parse timeout in seconds
        #[arg(long)]
        parse_timeout_secs: Option<u64>,
        /// Log progress lines instead of drawing progress bars
        #[arg(long)]
        no_progress: bool,
    },
    /// Print the resolved configuration and exit
    CheckConfig {
        /// Input directory
        #[arg(long)]
        input: PathBuf,
        /// Config file (default: `<input>/pipeline.toml`)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Comma-separated demographic source ids to merge
        #[arg(long)]
        demographics: Option<String>,
    },
}

fn load_config(
    input: &Path,
    config: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::load(input, config)?;
    config.apply_overrides(overrides)?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output,
            config,
            demographics,
            min_match_rate,
            max_unassigned,
            parse_timeout_secs,
            no_progress,
        } => {
            let overrides = ConfigOverrides {
                demographics,
                min_match_rate,
                max_unassigned,
                parse_timeout_secs,
            };
            let config = load_config(&input, config.as_deref(), &overrides)?;
            let ctx = RunContext::load(&config, &input, &output)?;

            let reporters = reporters(&multi, STAGE_COUNT, !no_progress);
            let progress = Progress {
                stages: reporters.stages,
                documents: reporters.documents,
            };

            let report = run(&ctx, &progress).await?;
            if !report.passed() {
                log::error!(
                    "Thresholds failed; see {}",
                    output
                        .join(transit_equity_pipeline::output::REPORT_FILE)
                        .display()
                );
                std::process::exit(THRESHOLD_EXIT_CODE);
            }
        }
        Commands::CheckConfig {
            input,
            config,
            demographics,
        } => {
            let overrides = ConfigOverrides {
                demographics,
                ..ConfigOverrides::default()
            };
            let config = load_config(&input, config.as_deref(), &overrides)?;
            print!("{}", config.resolved_against(&input).to_toml()?);
        }
    }

    Ok(())
}
