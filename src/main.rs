//! Passage Harvester main entry point
//!
//! This is the command-line interface for the passage harvester.

use clap::Parser;
use passage_harvester::config::{load_config_with_hash, Config, ContentMode};
use passage_harvester::harvester::Harvester;
use passage_harvester::output::print_summary;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Passage Harvester: a concurrent chapter harvester
///
/// Fetches every chapter of the given units for one edition, flattens or
/// rewrites the passage markup, and stores the results as CSV tables.
#[derive(Parser, Debug)]
#[command(name = "passage-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A concurrent chapter harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Units to harvest, in order (e.g. "Genesis" "Ruth")
    #[arg(value_name = "UNIT", required = true)]
    units: Vec<String>,

    /// Store rewritten markup instead of flattened text
    #[arg(long)]
    markup: bool,

    /// Resolve catalogs and show what would be harvested without fetching
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.markup {
        config.harvest.mode = ContentMode::Markup;
    }

    let harvester = match Harvester::new(config) {
        Ok(harvester) => harvester,
        Err(e) => {
            tracing::error!("Failed to prepare harvest: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&harvester, &cli.units)
    } else {
        handle_harvest(&harvester, &cli.units, cli.quiet).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("passage_harvester=info,warn"),
            1 => EnvFilter::new("passage_harvester=debug,info"),
            2 => EnvFilter::new("passage_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: resolves every unit and prints the plan
fn handle_dry_run(harvester: &Harvester, units: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config: &Config = harvester.config();
    let edition = harvester.edition();

    println!("=== Passage Harvester Dry Run ===\n");

    println!("Harvest:");
    println!("  Edition: {} ({})", edition.label, edition.id);
    println!("  Workers: {}", config.harvest.workers);
    println!("  Batch size: {}", config.harvest.batch_size);
    println!("  Mode: {:?}", config.harvest.mode);
    println!("  ASCII only: {}", config.harvest.ascii_only);

    println!("\nSource:");
    println!("  URL: {}", config.source.base_url);
    println!("  Watchdog: {}ms", config.source.watchdog_timeout_ms);
    println!("  Request timeout: {}ms", config.source.request_timeout_ms);
    match config.source.max_attempts {
        0 => println!("  Attempts per chapter: unlimited"),
        n => println!("  Attempts per chapter: {}", n),
    }

    println!("\nUnits ({}):", units.len());
    let mut total = 0;
    for unit in units {
        let plan = harvester.plan(unit)?;
        println!("  - {} ({} chapters) -> {}", plan.unit, plan.chapters, plan.target.display());
        total += plan.chapters;
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would fetch {} chapters", total);

    Ok(())
}

/// Handles the main harvest, stopping early on ctrl-c
async fn handle_harvest(
    harvester: &Harvester,
    units: &[String],
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    for unit in units {
        let report = tokio::select! {
            result = harvester.harvest_unit(unit) => match result {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!("Harvest of {} failed: {}", unit, e);
                    return Err(e.into());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, stopping harvest of {}", unit);
                return Err(passage_harvester::HarvestError::Interrupted.into());
            }
        };

        if !quiet {
            print_summary(&report.plan.unit, &report.plan.edition.id, &report.stats, report.flushes);
        }
    }

    tracing::info!("Harvest completed successfully");
    Ok(())
}
