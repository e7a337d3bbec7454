//! Drops one listing id from both ledgers so the next cycle re-checks it.

use clap::Parser;
use london_rent_watcher::config::Config;
use london_rent_watcher::ledger::DedupLedger;
use london_rent_watcher::listing::ListingId;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Remove a listing from the seen and skipped ledgers")]
struct Cli {
    /// Path to the JSON config file
    config: PathBuf,
    listing_id: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let ledger = DedupLedger::open(&config.database_path).await?;
    ledger.forget(ListingId(cli.listing_id)).await?;
    println!("Forgot {}", cli.listing_id);
    Ok(())
}
