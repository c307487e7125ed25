//! ASIN Harvester main entry point
//!
//! This is the command-line interface for the product and review harvester.

use asin_harvester::config::{load_config_with_hash, Config};
use asin_harvester::crawler::{resolve_base_url, resolve_market, run_harvest, run_reviews};
use asin_harvester::output::{print_report, print_review_report};
use asin_harvester::storage::rundate_for;
use asin_harvester::url::parse_asin_list;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ASIN Harvester: fetch and classify Amazon product pages
///
/// Fetches every ASIN in the input list through a rate-limited, proxy-rotating
/// pipeline, stores the raw pages by run date and exports detail batches.
#[derive(Parser, Debug)]
#[command(name = "asin-harvester")]
#[command(version = "1.0.0")]
#[command(about = "Fetch and classify Amazon product pages", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// File with one ASIN per line
    #[arg(long, value_name = "FILE")]
    asins: PathBuf,

    /// Run date partition (YYYY/MM/DD); defaults to today in the local time
    /// zone, which follows TZ (e.g. TZ=Asia/Ho_Chi_Minh, also read from .env)
    #[arg(long)]
    rundate: Option<String>,

    /// Crawl review listings instead of product pages
    #[arg(long)]
    reviews: bool,

    /// Validate config and input and show what would be fetched
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
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((config, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let content = std::fs::read_to_string(&cli.asins)?;
    let asins = parse_asin_list(&content)?;
    tracing::info!("Read {} ASINs from {}", asins.len(), cli.asins.display());

    let rundate = cli
        .rundate
        .unwrap_or_else(|| rundate_for(&chrono::Local::now()));
    tracing::info!("Run date: {}", rundate);

    if cli.dry_run {
        handle_dry_run(&config, &asins, &rundate, cli.reviews)?;
    } else if cli.reviews {
        let report = run_reviews(&config, asins, &rundate).await.map_err(|e| {
            tracing::error!("Review crawl failed: {}", e);
            e
        })?;
        print_review_report(&report);
    } else {
        let report = run_harvest(&config, asins, &rundate).await.map_err(|e| {
            tracing::error!("Harvest failed: {}", e);
            e
        })?;
        print_report(&report);
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("asin_harvester=info,warn"),
            1 => EnvFilter::new("asin_harvester=debug,info"),
            2 => EnvFilter::new("asin_harvester=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(
    config: &Config,
    asins: &[String],
    rundate: &str,
    reviews: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let market = resolve_market(config)?;

    println!("=== ASIN Harvester Dry Run ===\n");

    println!("Engine:");
    println!("  Rate: {} req/s", config.engine.rate_per_second);
    println!("  Concurrency: {}", config.engine.concurrency);
    println!("  Timeout: {}s", config.engine.timeout_secs);
    println!("  Stagnation cap: {} rounds", config.engine.stagnation_cap);

    println!("\nMarket:");
    println!("  Country: {} ({})", market.code, market.marketplace_id);
    println!("  Storefront: {}", resolve_base_url(config, &market));
    println!("  Zipcode: {}", config.market.zipcode);

    println!("\nTarget:");
    println!("  Dataset: {}", config.target.info_type);
    println!("  Expected content: {}", config.target.expected_content);
    println!("  Run date: {}", rundate);

    println!("\nOutput:");
    println!("  Backend: {:?}", config.output.backend);
    println!("  Path: {}", config.output.path);

    if reviews {
        println!("\nReviews:");
        println!("  Workers: {}", config.reviews.workers);
        println!("  Session resets per page: {}", config.reviews.max_session_resets);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would fetch {} ASINs", asins.len());

    Ok(())
}
