//! Results site page queries.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use common::browser::{wait_until_stable, BrowserError, BrowserSession};
use common::Config;

use crate::boxscore::{BoxScore, TeamTable};
use crate::models::ScoreboardEntry;

const GAME_CARDS: &str = "section.Card.gameModules";

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

const DOM_SIZE_PROBE: &str = "document.getElementsByTagName('*').length";

const SCOREBOARD_SCRIPT: &str = r#"(() => {
    const text = el => el ? el.textContent.trim() : null;
    const games = [];
    document.querySelectorAll("section.Card.gameModules").forEach(card => {
        const gameDate = text(card.querySelector("h3.Card__Header__Title"));
        card.querySelectorAll("section.Scoreboard").forEach(board => {
            const competitors = board.querySelectorAll("li.ScoreboardScoreCell__Item");
            if (competitors.length !== 2) return;
            const team = item => ({
                name: text(item.querySelector("div.ScoreCell__TeamName")),
                score: text(item.querySelector("div.ScoreCell__Score"))
            });
            const periods = item => Array.from(item.querySelectorAll("div.ScoreboardScoreCell__Value"))
                .map(el => el.textContent.trim());
            const link = board.querySelector('a.Button[href*="/nba/placar/"]');
            games.push({
                gameId: board.id || null,
                gameDate,
                boxscoreLink: link ? link.getAttribute("href") : null,
                awayTeam: team(competitors[0]),
                homeTeam: team(competitors[1]),
                periodLabels: Array.from(board.querySelectorAll("div.ScoreboardScoreCell__Heading"))
                    .map(el => el.textContent.trim()),
                awayPeriods: periods(competitors[0]),
                homePeriods: periods(competitors[1])
            });
        });
    });
    return games;
})()"#;

const BOXSCORE_SCRIPT: &str = r#"(() => {
    const text = el => el ? el.textContent.trim() : null;
    return Array.from(document.querySelectorAll("div.ResponsiveTable")).map(table => {
        const names = table.querySelector("table.Table--fixed-left");
        const stats = table.querySelector("div.Table__Scroller table");
        if (!names || !stats) return null;
        return {
            names: Array.from(names.querySelectorAll("tr.Table__TR")).map(row => ({
                category: text(row.querySelector("div.Table__customHeader")),
                name: text(row.querySelector("span.Boxscore__AthleteName--long")),
                shortName: text(row.querySelector("span.Boxscore__AthleteName--short")),
                jersey: text(row.querySelector("span.playerJersey"))
            })),
            stats: Array.from(stats.querySelectorAll("tr.Table__TR")).map(row => ({
                cells: Array.from(row.querySelectorAll("td.Table__TD")).map(td => td.textContent.trim()),
                status: text(row.querySelector("td[colspan]"))
            }))
        };
    });
})()"#;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Unexpected page data: {0}")]
    UnexpectedData(#[from] serde_json::Error),
}

/// Page-query interface of the results pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultsSource: Send + Sync {
    /// Scoreboards listed for `date` (`YYYYMMDD`). Empty when the page has none.
    async fn list_completed_games(&self, date: &str) -> Result<Vec<ScoreboardEntry>, ScrapeError>;

    /// Load a boxscore page (site-relative link).
    async fn open_boxscore(&self, link: &str) -> Result<(), ScrapeError>;

    /// Read both teams' boxscore tables on the current page.
    async fn extract_box_score(&self) -> Result<BoxScore, ScrapeError>;

    async fn close(&mut self);
}

/// Results site backed by a browser session.
pub struct EspnSource<S: BrowserSession> {
    session: S,
    base_url: String,
    site_root: String,
    navigation_timeout: Duration,
    extract_settle: Duration,
}

impl<S: BrowserSession> EspnSource<S> {
    pub fn new(session: S, config: &Config) -> Self {
        Self {
            session,
            base_url: config.results_base_url.clone(),
            site_root: config.results_site_root.clone(),
            navigation_timeout: config.navigation_timeout,
            extract_settle: config.extract_settle,
        }
    }

    /// Listing URL for a `YYYYMMDD` date.
    pub fn listing_url(&self, date: &str) -> String {
        format!("{}{}", self.base_url, date)
    }

    async fn settle(&self) -> Result<(), BrowserError> {
        if !wait_until_stable(&self.session, DOM_SIZE_PROBE, SETTLE_POLL_INTERVAL, self.extract_settle)
            .await?
        {
            debug!(bound = ?self.extract_settle, "Continuing with unsettled page");
        }
        Ok(())
    }
}

#[async_trait]
impl<S: BrowserSession> ResultsSource for EspnSource<S> {
    async fn list_completed_games(&self, date: &str) -> Result<Vec<ScoreboardEntry>, ScrapeError> {
        let url = self.listing_url(date);
        info!(url = %url, "Loading results listing");
        self.session.navigate(&url, self.navigation_timeout).await?;

        if !self
            .session
            .wait_for_selector(GAME_CARDS, self.extract_settle)
            .await
        {
            return Ok(Vec::new());
        }

        let raw = self.session.evaluate(SCOREBOARD_SCRIPT).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn open_boxscore(&self, link: &str) -> Result<(), ScrapeError> {
        let url = format!("{}{}", self.site_root, link);
        info!(url = %url, "Opening boxscore");
        self.session.navigate(&url, self.navigation_timeout).await?;
        self.settle().await?;
        Ok(())
    }

    async fn extract_box_score(&self) -> Result<BoxScore, ScrapeError> {
        let raw = self.session.evaluate(BOXSCORE_SCRIPT).await?;
        let tables: Vec<Option<TeamTable>> = serde_json::from_value(raw)?;
        Ok(BoxScore::from_tables(&tables))
    }

    async fn close(&mut self) {
        self.session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boxscore_payload_deserializes_with_missing_tables() {
        let raw = json!([
            {
                "names": [
                    { "category": "titulares", "name": null, "shortName": null, "jersey": null },
                    { "category": null, "name": "Jayson Tatum", "shortName": "J. Tatum", "jersey": "#0" }
                ],
                "stats": [
                    { "cells": [], "status": null },
                    { "cells": ["36", "10-20", "4-9", "2-2", "1", "8", "9", "6", "1", "1", "2", "2", "+12", "26"], "status": null }
                ]
            },
            null
        ]);

        let tables: Vec<Option<TeamTable>> = serde_json::from_value(raw).unwrap();
        let box_score = BoxScore::from_tables(&tables);

        assert_eq!(box_score.home_team_players.len(), 1);
        assert_eq!(box_score.home_team_players[0].short_name.as_deref(), Some("J. Tatum"));
        assert!(box_score.home_team_players[0].is_starter);
        assert!(box_score.away_team_players.is_empty());
    }
}
