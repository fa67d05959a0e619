//! Betting exchange page queries.
//!
//! The class names below are the exchange's generated CSS module names. They
//! change with site releases; all of them live here.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use common::browser::{wait_until_stable, BrowserError, BrowserSession};
use common::pairing::zip_by_index;
use common::Config;

use crate::market::MarketSpec;
use crate::models::{ListedGame, MarketOdds, PlayerOdds};

const MAIN_CONTAINER: &str = ".e97b8d5265087184-container";
const TABS_CONTAINER: &str = "div[class*=baf6b661cffec60b-scrollableTabsContainer]";

/// Interval between DOM probes while waiting for the page to settle.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

const DOM_SIZE_PROBE: &str = "document.getElementsByTagName('*').length";

const LISTING_SCRIPT: &str = r#"(() => {
    return Array.from(document.querySelectorAll(".e050104376d5250d-couponContainer"))
        .filter(card => !card.querySelector("._73836e21fc8d6105-status"))
        .map(card => {
            const teams = Array.from(card.querySelectorAll("._443c5e6894fef559-teamNameLabel"))
                .map(team => team.textContent.trim());
            const anchor = card.querySelector("a");
            const time = card.querySelector("time[class*=_73836e21fc8d6105-datetime]");
            return {
                homeTeam: teams[0] ?? null,
                awayTeam: teams[1] ?? null,
                link: anchor ? anchor.getAttribute("href") : null,
                gameDateTime: time ? time.getAttribute("datetime") : null
            };
        });
})()"#;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Failed to load NBA listing page")]
    ListingNotLoaded,

    #[error("Failed to load game page {0}")]
    GamePageNotLoaded(String),

    #[error("Unexpected page data: {0}")]
    UnexpectedData(#[from] serde_json::Error),
}

/// Why a market section could not be read.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Market not available for this game")]
    NoMarketAvailable,

    #[error("Market section not found")]
    SectionNotFound,

    #[error("Market card container not found")]
    ContainerNotFound,

    #[error("Player list not found")]
    PlayerListNotFound,

    #[error("No player lines found (columns: {columns:?})")]
    NoPlayerLines { columns: Vec<String> },

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Unexpected market data: {0}")]
    UnexpectedData(#[from] serde_json::Error),
}

impl MarketError {
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::NoMarketAvailable => "no_market_available",
            MarketError::SectionNotFound => "section_not_found",
            MarketError::ContainerNotFound => "container_not_found",
            MarketError::PlayerListNotFound => "player_list_not_found",
            MarketError::NoPlayerLines { .. } => "no_player_lines",
            MarketError::Browser(_) => "browser",
            MarketError::UnexpectedData(_) => "unexpected_data",
        }
    }
}

/// Page-query interface of the odds pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Non-live games on the listing page, unvalidated.
    async fn list_upcoming_games(&self) -> Result<Vec<ListedGame>, ScrapeError>;

    /// Load a game page (relative link) and wait for its tabs.
    async fn open_game(&self, link: &str) -> Result<(), ScrapeError>;

    /// Click the tab titled exactly `label`. `false` when no such tab exists.
    async fn select_tab(&self, label: &str) -> Result<bool, ScrapeError>;

    /// Read the market's odds grid on the current page.
    async fn extract_market(&self, market: &MarketSpec) -> Result<MarketOdds, MarketError>;

    async fn close(&mut self);
}

/// Betting exchange backed by a browser session.
pub struct BetfairSource<S: BrowserSession> {
    session: S,
    listing_url: String,
    site_root: String,
    navigation_timeout: Duration,
    extended_timeout: Duration,
    tab_settle: Duration,
    extract_settle: Duration,
    show_more_settle: Duration,
}

impl<S: BrowserSession> BetfairSource<S> {
    pub fn new(session: S, config: &Config) -> Self {
        Self {
            session,
            listing_url: config.odds_listing_url.clone(),
            site_root: config.odds_site_root.clone(),
            navigation_timeout: config.navigation_timeout,
            extended_timeout: config.extended_timeout,
            tab_settle: config.tab_settle,
            extract_settle: config.extract_settle,
            show_more_settle: config.show_more_settle,
        }
    }

    async fn settle(&self, probe: &str, bound: Duration) -> Result<(), BrowserError> {
        if !wait_until_stable(&self.session, probe, SETTLE_POLL_INTERVAL, bound).await? {
            debug!(?bound, "Continuing with unsettled page");
        }
        Ok(())
    }
}

fn quoted(value: &str) -> String {
    // Serializing a str cannot fail
    serde_json::to_string(value).unwrap_or_default()
}

fn tab_script(label: &str) -> String {
    format!(
        r#"(() => {{
    const label = {label};
    const tab = Array.from(document.querySelectorAll("button[class*=_2d4e28c0fbd008c6-tab]"))
        .find(tab => {{
            const title = tab.querySelector("span[class*=_2d4e28c0fbd008c6-title]");
            return title && title.textContent.trim() === label;
        }});
    if (!tab) return false;
    tab.click();
    return true;
}})()"#,
        label = quoted(label)
    )
}

fn section_selector(urn: &str) -> String {
    format!("div[data-urn^={}]", quoted(urn))
}

/// Locate the section and press "show more" when offered.
fn locate_script(urn: &str) -> String {
    format!(
        r#"(() => {{
    const section = document.querySelector({section});
    if (!section) {{
        return document.querySelector(".ad8debb7840a272d-noContentAvailableContainer")
            ? {{ status: "no_market_available" }}
            : {{ status: "section_not_found" }};
    }}
    const showMore = section.querySelector("button[class*=e938788a425ceff5-showMoreButton]");
    if (showMore) showMore.click();
    return {{ status: "found", expanded: !!showMore }};
}})()"#,
        section = quoted(&section_selector(urn))
    )
}

fn runner_count_probe(urn: &str) -> String {
    format!(
        r#"(() => {{
    const section = document.querySelector({section});
    return section ? section.querySelectorAll("div[class*=_1e758322da13703b-runnerLine]").length : -1;
}})()"#,
        section = quoted(&section_selector(urn))
    )
}

/// Read column headers and each runner's button labels, in DOM order.
fn grid_script(urn: &str) -> String {
    format!(
        r#"(() => {{
    const section = document.querySelector({section});
    if (!section) return {{ status: "section_not_found" }};
    const container = section.querySelector("div[class*=_859d54077a1da3b1-pebbleMarketCardContainer]");
    if (!container) return {{ status: "container_not_found" }};
    const grid = container.querySelector("div[class*=f951d35abcad3586-gridRunnerList]");
    if (!grid) return {{ status: "player_list_not_found" }};
    const columns = Array.from(container.querySelectorAll("span[class*=aba60753d8d80695-column]"))
        .map(col => col.textContent.trim());
    const runners = Array.from(grid.querySelectorAll("div[class*=_1e758322da13703b-runnerLine]"))
        .map(line => {{
            const name = line.querySelector("p[class*=_1e758322da13703b-runnerName]");
            const values = Array.from(line.querySelectorAll("button[class*=c84e4011151df22b-button]"))
                .map(button => {{
                    const label = button.querySelector("span[class*=c84e4011151df22b-label]");
                    return label ? label.textContent.trim() : null;
                }});
            return {{ name: name ? name.textContent.trim() : null, values }};
        }});
    return {{ status: "ok", columns, runners }};
}})()"#,
        section = quoted(&section_selector(urn))
    )
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum SectionProbe {
    Found {
        #[serde(default)]
        expanded: bool,
    },
    NoMarketAvailable,
    SectionNotFound,
}

#[derive(Debug, Deserialize)]
struct RunnerRow {
    name: Option<String>,
    #[serde(default)]
    values: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum GridProbe {
    Ok {
        columns: Vec<String>,
        runners: Vec<RunnerRow>,
    },
    SectionNotFound,
    ContainerNotFound,
    PlayerListNotFound,
}

/// Turn the grid script's output into per-player odds.
///
/// Value `i` of a runner belongs to column header `i`. Values without a
/// header, and runners left with no values, are dropped.
fn parse_market_grid(raw: Value) -> Result<MarketOdds, MarketError> {
    let (columns, runners) = match serde_json::from_value::<GridProbe>(raw)? {
        GridProbe::Ok { columns, runners } => (columns, runners),
        GridProbe::SectionNotFound => return Err(MarketError::SectionNotFound),
        GridProbe::ContainerNotFound => return Err(MarketError::ContainerNotFound),
        GridProbe::PlayerListNotFound => return Err(MarketError::PlayerListNotFound),
    };

    if runners.is_empty() {
        return Err(MarketError::NoPlayerLines { columns });
    }

    let players = runners
        .into_iter()
        .filter_map(|runner| {
            let name = runner.name.filter(|n| !n.is_empty())?;
            let odds: std::collections::BTreeMap<String, String> =
                zip_by_index(&runner.values, &columns)
                    .filter_map(|(value, column)| {
                        let value = value.as_ref()?;
                        let column = column.filter(|c| !c.is_empty())?;
                        Some((column.clone(), value.clone()))
                    })
                    .collect();
            (!odds.is_empty()).then_some(PlayerOdds { name, odds })
        })
        .collect();

    Ok(MarketOdds {
        players,
        odds_types: columns,
    })
}

#[async_trait]
impl<S: BrowserSession> OddsSource for BetfairSource<S> {
    async fn list_upcoming_games(&self) -> Result<Vec<ListedGame>, ScrapeError> {
        info!(url = %self.listing_url, "Loading NBA listing");
        self.session
            .navigate(&self.listing_url, self.navigation_timeout)
            .await?;

        if !self
            .session
            .wait_for_selector(MAIN_CONTAINER, self.navigation_timeout)
            .await
        {
            return Err(ScrapeError::ListingNotLoaded);
        }

        let raw = self.session.evaluate(LISTING_SCRIPT).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn open_game(&self, link: &str) -> Result<(), ScrapeError> {
        let url = format!("{}{}", self.site_root, link);
        info!(url = %url, "Opening game page");
        self.session.navigate(&url, self.navigation_timeout).await?;

        if !self
            .session
            .wait_for_selector(TABS_CONTAINER, self.extended_timeout)
            .await
        {
            return Err(ScrapeError::GamePageNotLoaded(url));
        }
        Ok(())
    }

    async fn select_tab(&self, label: &str) -> Result<bool, ScrapeError> {
        let clicked = self.session.evaluate(&tab_script(label)).await?;
        if clicked != Value::Bool(true) {
            return Ok(false);
        }
        self.settle(DOM_SIZE_PROBE, self.tab_settle).await?;
        Ok(true)
    }

    async fn extract_market(&self, market: &MarketSpec) -> Result<MarketOdds, MarketError> {
        self.settle(DOM_SIZE_PROBE, self.extract_settle).await?;

        let located = self.session.evaluate(&locate_script(market.urn)).await?;
        match serde_json::from_value::<SectionProbe>(located)? {
            SectionProbe::NoMarketAvailable => return Err(MarketError::NoMarketAvailable),
            SectionProbe::SectionNotFound => return Err(MarketError::SectionNotFound),
            SectionProbe::Found { expanded: true } => {
                debug!(market = market.market_type, "Expanded player list");
                self.settle(&runner_count_probe(market.urn), self.show_more_settle)
                    .await?;
            }
            SectionProbe::Found { expanded: false } => {}
        }

        let raw = self.session.evaluate(&grid_script(market.urn)).await?;
        parse_market_grid(raw)
    }

    async fn close(&mut self) {
        self.session.close().await;
    }
}
