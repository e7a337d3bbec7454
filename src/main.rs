use clap::{Parser, Subcommand};
use london_rent_watcher::config::Config;
use london_rent_watcher::delivery::{DeliveryClient, RetryPolicy, Telegram};
use london_rent_watcher::fetch::HttpFetcher;
use london_rent_watcher::filter::FilterSettings;
use london_rent_watcher::ledger::DedupLedger;
use london_rent_watcher::listing::ListingId;
use london_rent_watcher::ocr::TesseractCli;
use london_rent_watcher::zoopla::Zoopla;
use london_rent_watcher::{Orchestrator, WatcherError};
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(about = "Polls rental-listing searches and pushes matches to Telegram")]
struct Cli {
    /// Path to the JSON config file
    config: PathBuf,

    /// Re-check listings already in the permanently-skipped ledger
    #[arg(long)]
    recheck_skipped: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Process one listing end-to-end without ledger writes
    Check {
        listing_id: u64,

        /// Also deliver the result to this subscriber id
        #[arg(long)]
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "info,html5ever=error,selectors=error,hyper=warn,reqwest=info,sqlx=warn".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let ledger = DedupLedger::open(&config.database_path).await?;
    let transport = Telegram::new(&config.telegram_api_key);
    let delivery = DeliveryClient::new(
        Box::new(transport),
        RetryPolicy {
            max_attempts: config.retry.max_attempts,
            backoff: Duration::from_secs(config.retry.backoff_secs),
        },
        config.max_photos,
    );
    let orchestrator = Orchestrator::new(
        Box::new(Zoopla),
        Box::new(HttpFetcher::new(&config.cache_dir, config.cache_enabled)),
        Box::new(TesseractCli::new(&config.tessdata_path, &config.work_dir)),
        ledger,
        delivery,
        FilterSettings {
            default_min_price: config.default_min_price,
            default_max_price: config.default_max_price,
            min_area_sqm: config.min_area_sqm,
        },
        cli.recheck_skipped,
    );

    match cli.command {
        Some(Command::Check { listing_id, to }) => {
            let subscriber = match to {
                Some(id) => Some(
                    config
                        .subscribers
                        .iter()
                        .find(|subscriber| subscriber.id == id)
                        .ok_or(WatcherError::UnknownSubscriber(id))?,
                ),
                None => None,
            };
            orchestrator
                .check_listing(ListingId(listing_id), subscriber)
                .await?;
        }
        None => {
            info!("Start!");
            orchestrator
                .run_cycle(&config.queries, &config.subscribers)
                .await?;
            info!("poll cycle complete");
        }
    }

    Ok(())
}
