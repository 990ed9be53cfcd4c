//! Marketplace Crawler CLI
//!
//! Local execution entry point. Storage follows the actor local layout under
//! `--storage-dir`, so the same directory can be inspected between runs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use marketplace_crawler::{
    browser::ChromiumBrowser,
    error::Result,
    models::Config,
    pipeline::{self, SeenSet},
    storage::{DEFAULT_STORE, KeyValueStore, LocalStorage, REPORT_KEY},
    utils::http,
};

/// Marketplace Crawler - incremental search result crawler
#[derive(Parser, Debug)]
#[command(
    name = "marketplace-crawler",
    version,
    about = "Incremental marketplace crawler with cross-run deduplication"
)]
struct Cli {
    /// Path to storage directory (key-value stores and datasets)
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Path to config file (default: {storage_dir}/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl all input URLs and emit unseen listings
    Crawl {
        /// Input JSON file (default: key_value_stores/default/INPUT.json)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Validate configuration and input without crawling
    Validate {
        /// Input JSON file (default: key_value_stores/default/INPUT.json)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show seen-set size and dataset item count
    Info,

    /// Forget every listing emitted by earlier runs
    ResetSeen,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.storage_dir.join("config.toml"));
    let config = Config::load_or_default(&config_path);
    config.validate()?;

    let storage = LocalStorage::open(&cli.storage_dir, &config.storage.dataset).await?;

    match cli.command {
        Command::Crawl { input } => {
            let input = pipeline::load_input(&storage, input.as_deref()).await?;
            let client = http::create_async_client(&config.browser)?;
            let crawl = pipeline::resolve_crawl_config(&config, &input, &client).await?;

            let browser = ChromiumBrowser::launch(&config.browser, crawl.proxy.as_deref()).await?;
            let result = pipeline::run_crawler(&config, &crawl, &browser, &storage, &storage).await;
            if let Err(e) = browser.close().await {
                log::warn!("Browser did not shut down cleanly: {}", e);
            }

            let report = result?;
            log::info!(
                "Dataset now holds {} item(s) in {}",
                storage.dataset_count().await?,
                storage.root_dir().display()
            );
            for source in &report.sources {
                log::info!(
                    "  {} -> {:?}: {} emitted, {} skipped as seen",
                    source.url,
                    source.status,
                    source.emitted,
                    source.skipped_seen
                );
            }
        }

        Command::Validate { input } => {
            log::info!("Validating configuration...");
            log::info!("✓ Config OK ({})", config_path.display());

            let input = pipeline::load_input(&storage, input.as_deref()).await?;
            if let Err(e) = input.validate() {
                log::error!("Input validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Input OK ({} URL(s))", input.urls.len());

            log::info!("All validations passed!");
        }

        Command::Info => {
            let seen = SeenSet::load(&storage, &config.storage).await?;
            log::info!("Storage directory: {}", cli.storage_dir.display());
            log::info!(
                "Seen listings: {} ({}/{})",
                seen.len(),
                config.storage.seen_store,
                config.storage.seen_key
            );
            log::info!(
                "Dataset '{}': {} item(s)",
                config.storage.dataset,
                storage.dataset_count().await?
            );

            match storage.get_value(DEFAULT_STORE, REPORT_KEY).await? {
                Some(report) => {
                    if let Some(finished) = report.get("finished_at") {
                        log::info!("Last run finished: {}", finished);
                    }
                    if let Some(emitted) = report.get("emitted") {
                        log::info!("Last run emitted: {}", emitted);
                    }
                }
                None => log::info!("No run report found yet."),
            }
        }

        Command::ResetSeen => {
            let previous = SeenSet::load(&storage, &config.storage).await?;
            SeenSet::new().save(&storage, &config.storage).await?;
            log::info!("Cleared {} seen listing id(s)", previous.len());
        }
    }

    log::info!("Done!");

    Ok(())
}
