//! Image-Harvest main entry point
//!
//! This is the command-line interface for the Image-Harvest pipeline.

use anyhow::Context;
use clap::Parser;
use image_harvest::config::{load_config_with_hash, validate, Config};
use image_harvest::output::{generate_markdown_summary, print_summary};
use image_harvest::{HarvestError, Pipeline};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Image-Harvest: a bounded-concurrency crawl-and-download pipeline
///
/// Image-Harvest starts from a listing page, follows its links through two
/// levels of pages, extracts image URLs and downloads every distinct image
/// into a local directory.
#[derive(Parser, Debug)]
#[command(name = "image-harvest")]
#[command(version)]
#[command(about = "A bounded-concurrency image harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long)]
    dry_run: bool,

    /// Override the listing page the run starts from
    #[arg(long, value_name = "URL")]
    start_page: Option<String>,

    /// Override the directory images are written to
    #[arg(long, value_name = "DIR")]
    download_dir: Option<PathBuf>,
}

/// Exit status when the run was cancelled (128 + SIGINT)
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(start_page) = cli.start_page {
        config.crawler.start_page = start_page;
    }
    if let Some(download_dir) = cli.download_dir {
        config.output.download_dir = download_dir;
    }
    validate(&config).context("Invalid command line override")?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(ExitCode::SUCCESS);
    }

    handle_harvest(config, config_hash).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("image_harvest=info,warn"),
            1 => EnvFilter::new("image_harvest=debug,info"),
            2 => EnvFilter::new("image_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Image-Harvest Dry Run ===\n");

    println!("Crawler:");
    println!("  Start page: {}", config.crawler.start_page);
    println!("  Schema: {}", config.crawler.schema);
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    if config.crawler.run_timeout_secs > 0 {
        println!("  Run timeout: {}s", config.crawler.run_timeout_secs);
    }

    println!("\nSelectors:");
    println!("  Listing: {}", config.selectors.listing);
    println!(
        "  Detail: {} (base {})",
        config.selectors.detail, config.selectors.detail_base
    );
    println!(
        "  Image: {} [{}]",
        config.selectors.image, config.selectors.image_attribute
    );

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Connect timeout: {}s", config.http.connect_timeout_secs);

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms x{} (max {}ms)",
        config.retry.base_delay_ms, config.retry.backoff_multiplier, config.retry.max_delay_ms
    );
    println!("  Retry statuses: {:?}", config.retry.retry_statuses);

    println!("\nOutput:");
    println!("  Download dir: {}", config.output.download_dir.display());
    println!("  Chunk size: {} bytes", config.output.chunk_size);
    if let Some(path) = &config.output.summary_path {
        println!("  Summary: {}", path.display());
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: String) -> anyhow::Result<ExitCode> {
    let summary_path = config.output.summary_path.clone();
    let cancel = CancellationToken::new();

    // Ctrl-C cancels the run; stages stop at their next suspension point
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            ctrl_c.cancel();
        }
    });

    let pipeline = Pipeline::new(config)?.with_cancellation(cancel);

    let mut summary = match pipeline.run().await {
        Ok(summary) => summary,
        Err(HarvestError::Cancelled) => {
            tracing::warn!("Run cancelled before the listing page was processed");
            return Ok(ExitCode::from(EXIT_CANCELLED));
        }
        Err(e) => return Err(e).context("Harvest failed"),
    };
    summary.config_hash = Some(config_hash);

    print_summary(&summary);

    if let Some(path) = summary_path {
        generate_markdown_summary(&summary, &path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        println!("\n✓ Summary exported to: {}", path.display());
    }

    if summary.cancelled {
        Ok(ExitCode::from(EXIT_CANCELLED))
    } else {
        tracing::info!(
            "Harvest completed: {} files, {} failures",
            summary.files_downloaded(),
            summary.total_failures()
        );
        Ok(ExitCode::SUCCESS)
    }
}
