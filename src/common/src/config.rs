//! Configuration loading from environment variables.

use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

/// Chrome 91 on Windows; the exchange serves a degraded page to unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL (only needed when persisting to Postgres)
    database_url: Option<String>,

    /// Betting exchange NBA listing page
    pub odds_listing_url: String,

    /// Prefix joined with the relative links found on the listing page
    pub odds_site_root: String,

    /// Results listing; the `YYYYMMDD` date is appended
    pub results_base_url: String,

    /// Prefix joined with boxscore links
    pub results_site_root: String,

    /// Page load timeout
    pub navigation_timeout: Duration,

    /// Timeout for slow detail pages (tabs container on game pages)
    pub extended_timeout: Duration,

    /// Upper bound for the DOM to settle after clicking a tab
    pub tab_settle: Duration,

    /// Upper bound for the DOM to settle after a page load before extracting
    pub extract_settle: Duration,

    /// Upper bound for the DOM to settle after expanding a "show more" list
    pub show_more_settle: Duration,

    /// Run Chromium without a window
    pub headless: bool,

    /// User agent presented by the browser
    pub user_agent: String,

    /// Explicit Chromium binary; auto-detected when unset
    pub chrome_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional variables (with defaults):
    /// - DATABASE_URL: PostgreSQL connection string (required for non dry runs)
    /// - ODDS_LISTING_URL, ODDS_SITE_ROOT: betting exchange pages
    /// - RESULTS_BASE_URL, RESULTS_SITE_ROOT: results site pages
    /// - NAVIGATION_TIMEOUT_MS (60000), EXTENDED_TIMEOUT_MS (120000)
    /// - TAB_SETTLE_MS (8000), EXTRACT_SETTLE_MS (2000), SHOW_MORE_SETTLE_MS (1000)
    /// - BROWSER_HEADLESS (true), BROWSER_USER_AGENT, CHROME_PATH
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_env_only()
    }

    /// Load configuration from environment variables only (no .env file).
    /// Useful for testing.
    pub fn from_env_only() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        let odds_listing_url = url_var(
            "ODDS_LISTING_URL",
            "https://www.betfair.bet.br/apostas/basquete/nba/c-10547864",
        )?;
        let odds_site_root = url_var("ODDS_SITE_ROOT", "https://www.betfair.bet.br/apostas/")?;
        let results_base_url = url_var(
            "RESULTS_BASE_URL",
            "https://www.espn.com.br/nba/resultados/_/data/",
        )?;
        let results_site_root = url_var("RESULTS_SITE_ROOT", "https://www.espn.com.br")?;

        let headless = env::var("BROWSER_HEADLESS")
            .ok()
            .and_then(|s| parse_bool(&s))
            .unwrap_or(true);

        let user_agent =
            env::var("BROWSER_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());

        let chrome_path = env::var("CHROME_PATH").ok().filter(|s| !s.is_empty());

        Ok(Self {
            database_url,
            odds_listing_url,
            odds_site_root,
            results_base_url,
            results_site_root,
            navigation_timeout: millis_var("NAVIGATION_TIMEOUT_MS", 60_000),
            extended_timeout: millis_var("EXTENDED_TIMEOUT_MS", 120_000),
            tab_settle: millis_var("TAB_SETTLE_MS", 8_000),
            extract_settle: millis_var("EXTRACT_SETTLE_MS", 2_000),
            show_more_settle: millis_var("SHOW_MORE_SETTLE_MS", 1_000),
            headless,
            user_agent,
            chrome_path,
        })
    }

    /// The database URL, or `MissingVar` when persisting without one.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))
    }
}

fn url_var(name: &str, default: &str) -> Result<String, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    Url::parse(&value).map_err(|_| ConfigError::InvalidUrl(format!("{name}={value}")))?;
    Ok(value)
}

fn millis_var(name: &str, default: u64) -> Duration {
    let ms = env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default);
    Duration::from_millis(ms)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "DATABASE_URL",
        "ODDS_LISTING_URL",
        "RESULTS_BASE_URL",
        "NAVIGATION_TIMEOUT_MS",
        "BROWSER_HEADLESS",
    ];

    fn clear_vars() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_database_url() {
        clear_vars();

        // Use from_env_only to avoid .env file loading
        let config = Config::from_env_only().unwrap();
        let result = config.database_url();

        if let Err(ConfigError::MissingVar(var)) = result {
            assert_eq!(var, "DATABASE_URL");
        } else {
            panic!("Expected MissingVar error");
        }
    }

    #[test]
    #[serial]
    fn test_config_with_defaults() {
        clear_vars();
        env::set_var("DATABASE_URL", "postgres://localhost/test");

        let config = Config::from_env_only().unwrap();

        assert_eq!(config.database_url().unwrap(), "postgres://localhost/test");
        assert_eq!(
            config.odds_listing_url,
            "https://www.betfair.bet.br/apostas/basquete/nba/c-10547864"
        );
        assert_eq!(
            config.results_base_url,
            "https://www.espn.com.br/nba/resultados/_/data/"
        );
        assert_eq!(config.navigation_timeout, Duration::from_secs(60));
        assert_eq!(config.extended_timeout, Duration::from_secs(120));
        assert_eq!(config.tab_settle, Duration::from_secs(8));
        assert!(config.headless);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);

        // Cleanup
        env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn test_config_overrides_and_invalid_numbers() {
        clear_vars();
        env::set_var("NAVIGATION_TIMEOUT_MS", "not_a_number");
        env::set_var("BROWSER_HEADLESS", "false");

        let config = Config::from_env_only().unwrap();
        assert_eq!(config.navigation_timeout, Duration::from_secs(60)); // Falls back to default
        assert!(!config.headless);

        clear_vars();
    }

    #[test]
    #[serial]
    fn test_config_rejects_invalid_url() {
        clear_vars();
        env::set_var("ODDS_LISTING_URL", "not a url");

        let result = Config::from_env_only();
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));

        clear_vars();
    }
}
