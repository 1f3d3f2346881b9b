//! Sumi-Archiver main entry point
//!
//! This is the command-line interface for the Sumi-Archiver web archiver.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_archiver::config::{load_config_with_hash, Config};
use sumi_archiver::crawler::{run_crawl, HttpFetcher};
use sumi_archiver::spool::SpoolSettings;
use sumi_archiver::warc::RotatorSettings;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Archiver: a web crawler that writes what it fetches to WARC files
///
/// Sumi-Archiver crawls outward from a set of seed URLs up to a hop limit
/// and archives every request/response exchange into rotated,
/// gzip-compressed WARC segments.
#[derive(Parser, Debug)]
#[command(name = "sumi-archiver")]
#[command(version)]
#[command(about = "A web crawler that archives to WARC", long_about = None)]
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

    /// Validate config and show where output would go without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_archiver=info,warn"),
            1 => EnvFilter::new("sumi_archiver=debug,info"),
            2 => EnvFilter::new("sumi_archiver=trace,debug"),
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

/// Handles the --dry-run mode: shows what would be crawled and where it goes
fn handle_dry_run(config: &Config) {
    let rotator = RotatorSettings::from_config(config);
    let spool = SpoolSettings::from_config(config);

    println!("=== Sumi-Archiver Dry Run ===\n");

    println!("Crawl Configuration:");
    println!("  Job path: {}", config.crawl.job_path.display());
    println!("  Max hops: {}", config.crawl.max_hops);
    println!("  Workers: {}", config.crawl.workers);
    println!("  Headless: {}", config.crawl.headless);

    println!("\nWARC Output:");
    println!("  Directory: {}", rotator.output_directory.display());
    match rotator.next_free_sequence() {
        Ok(sequence) => println!("  First segment: {}", rotator.segment_file_name(sequence)),
        Err(e) => println!("  First segment: unknown ({})", e),
    }
    println!("  Max segment size: {} bytes", rotator.max_segment_size);
    if rotator.max_segment_records > 0 {
        println!("  Max segment records: {}", rotator.max_segment_records);
    }

    println!("\nSpool:");
    println!("  Directory: {}", spool.dir.display());
    println!("  Sweep every: {}s", spool.sweep_interval.as_secs());
    println!("  Grace period: {}s", spool.grace_period.as_secs());

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.crawl.headless {
        let message = "headless = true needs a browser renderer, which this binary does not ship";
        tracing::error!("{}", message);
        return Err(message.into());
    }

    let fetcher = Arc::new(HttpFetcher::new(&config.user_agent)?);

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling captures and closing the archive");
            on_signal.cancel();
        }
    });

    match run_crawl(config, fetcher, None, shutdown).await {
        Ok(summary) => {
            println!(
                "Captured {} pages ({} failed) into {} segments, {} records",
                summary.captured, summary.failed, summary.segments, summary.records
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
