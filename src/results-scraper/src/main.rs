//! NBA Results Scraper
//!
//! Reads final scores and boxscores of NBA games for a date from the results
//! site and stores them in PostgreSQL.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use chrono::{Duration, Local};
use clap::Parser;
use regex::Regex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    write_snapshot, BrowserOptions, ChromiumSession, Config, DataStore, Database, MemoryStore,
    PgStore,
};

mod boxscore;
mod models;
mod pipeline;
mod site;

use pipeline::ResultsScraper;
use site::EspnSource;

static DATE_ARG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}$").expect("valid date argument regex"));

/// NBA Results Scraper - final scores and boxscores for a date
#[derive(Parser, Debug)]
#[command(name = "scrape-results")]
#[command(about = "Scrapes NBA results and boxscores for a date")]
struct Args {
    /// Date in YYYYMMDD format (e.g. 20250315); defaults to yesterday
    date: Option<String>,

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

fn yesterday() -> String {
    (Local::now().date_naive() - Duration::days(1))
        .format("%Y%m%d")
        .to_string()
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

    let date = match &args.date {
        Some(date) if DATE_ARG_RE.is_match(date) => date.clone(),
        Some(_) => {
            eprintln!("Invalid date format. Use YYYYMMDD (e.g. 20250315)");
            std::process::exit(1);
        }
        None => {
            let date = yesterday();
            println!("No date given. Using yesterday: {date}");
            date
        }
    };

    let mut config = Config::from_env()?;
    if args.headed {
        config.headless = false;
    }

    let store: Arc<dyn DataStore> = if args.dry_run {
        info!("Mode: DRY RUN");
        Arc::new(MemoryStore::new())
    } else {
        let db = Database::connect(&config).await?;
        db.health_check().await?;
        info!("Database connected");
        Arc::new(PgStore::new(db))
    };

    println!("Scraping NBA results for {date}");

    let session = ChromiumSession::open(&BrowserOptions::from_config(&config)).await?;
    let source = EspnSource::new(session, &config);
    let url = source.listing_url(&date);
    println!("URL: {url}");

    let mut scraper = ResultsScraper::new(source, store);
    let report = match scraper.scrape(&date).await {
        Ok(report) => report,
        Err(e) => {
            let e = anyhow::Error::from(e);
            eprintln!("Error during extraction: {e}");
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            std::process::exit(1);
        }
    };

    if let Some(dir) = &args.dump_dir {
        if let Err(e) = write_snapshot(dir, "nba_results", &report.run) {
            warn!(dir = %dir.display(), error = %e, "Failed to write snapshot");
        }
    }

    if report.run.games.is_empty() {
        println!("WARNING: No games found for the given date.");
        println!("Check that the date is correct and that games were played that day.");
        println!("Try opening it manually: {url}");
        return Ok(());
    }

    println!("Extraction complete");
    println!("Total games: {}", report.run.total_games);
    println!("Games: {}", report.games_written);
    println!("Players: {}", report.players_written);
    println!("Player stats: {}", report.stats_written);
    println!("Execution time: {}", report.run.execution_time);
    println!();
    println!("Games found:");
    for (index, game) in report.run.games.iter().enumerate() {
        println!(
            "{}. {} {} @ {} {}",
            index + 1,
            game.away_team.name,
            game.away_team.score.as_deref().unwrap_or("-"),
            game.home_team.name,
            game.home_team.score.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}
