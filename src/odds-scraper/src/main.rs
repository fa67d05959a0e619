//! NBA Odds Scraper
//!
//! Reads upcoming NBA games and player market odds from the betting exchange
//! and stores them in PostgreSQL.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    write_snapshot, BrowserOptions, ChromiumSession, Config, DataStore, Database, MemoryStore,
    PgStore,
};

mod market;
mod models;
mod pipeline;
mod site;

use market::Market;
use pipeline::OddsScraper;
use site::BetfairSource;

/// NBA Odds Scraper - player market odds from the betting exchange
#[derive(Parser, Debug)]
#[command(name = "scrape-odds")]
#[command(about = "Scrapes NBA player market odds from the betting exchange")]
struct Args {
    /// Market to scrape
    #[arg(long, value_enum, default_value_t = Market::Points)]
    market: Market,

    /// Keep results in memory instead of writing to the database
    #[arg(long)]
    dry_run: bool,

    /// Also write the run payload as JSON into this directory
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with RUST_LOG env var support (default: info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    info!("NBA odds scraper starting...");
    info!("Mode: {}", if args.dry_run { "DRY RUN" } else { "DATABASE" });

    let mut config = Config::from_env()?;
    if args.headed {
        config.headless = false;
    }

    let store: Arc<dyn DataStore> = if args.dry_run {
        Arc::new(MemoryStore::new())
    } else {
        let db = Database::connect(&config).await?;
        db.health_check().await?;
        info!("Database connected");
        Arc::new(PgStore::new(db))
    };

    let session = ChromiumSession::open(&BrowserOptions::from_config(&config)).await?;
    let source = BetfairSource::new(session, &config);

    let mut scraper = OddsScraper::new(source, store, args.market.spec());
    let report = scraper.scrape().await?;

    if let Some(dir) = &args.dump_dir {
        if let Err(e) = write_snapshot(dir, "nba_odds", &report.run) {
            warn!(dir = %dir.display(), error = %e, "Failed to write snapshot");
        }
    }

    println!("Processed {} games", report.run.total_games);
    println!("Games: {}", report.games_written);
    println!("Player odds: {}", report.odds_written);
    if report.games_skipped > 0 {
        println!("Skipped without start time: {}", report.games_skipped);
    }
    println!("Execution time: {}", report.run.execution_time);

    Ok(())
}
