//! Common library for the NBA ingestion services.
//!
//! Provides shared functionality:
//! - Configuration loading from .env
//! - Database connection pooling and upserts
//! - Headless browser session
//! - Date/time normalization for scraped listings
//! - Shared data models

pub mod browser;
pub mod config;
pub mod datetime;
pub mod db;
pub mod models;
pub mod pairing;
pub mod repository;
pub mod snapshot;
pub mod store;

pub use browser::{wait_until_stable, BrowserError, BrowserOptions, BrowserSession, ChromiumSession};
pub use config::{Config, ConfigError};
pub use db::{Database, DbError};
pub use models::{
    BoxScoreStats, GameUpsert, NbaGameUpsert, NbaPlayerStatUpsert, NbaPlayerUpsert, PeriodScore,
    PlayerMarketOddUpsert, StatLine, LINE_TYPE_SPECIFIC,
};
pub use pairing::zip_by_index;
pub use snapshot::write_snapshot;
pub use store::{DataStore, MemoryStore, PgStore, StoreCounts, StoreError, UpsertOutcome, WriteStats};
