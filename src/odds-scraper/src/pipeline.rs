//! Odds run: listing, per-game extraction, persistence.

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tracing::{error, info, warn};

use common::datetime::{format_execution_time, format_game_date, format_game_time, format_iso8601};
use common::{DataStore, GameUpsert, PlayerMarketOddUpsert, WriteStats, LINE_TYPE_SPECIFIC};

use crate::market::MarketSpec;
use crate::models::{OddsRun, PlayerOdds, ProcessedGame, ScheduledGame};
use crate::site::{OddsSource, ScrapeError};

/// Outcome of a run: the extracted payload and what was written.
#[derive(Debug)]
pub struct OddsReport {
    pub run: OddsRun,
    pub games_written: WriteStats,
    pub odds_written: WriteStats,
    /// Games left out of persistence for lack of a start time
    pub games_skipped: usize,
}

pub struct OddsScraper<S: OddsSource> {
    source: S,
    store: Arc<dyn DataStore>,
    market: &'static MarketSpec,
}

impl<S: OddsSource> OddsScraper<S> {
    pub fn new(source: S, store: Arc<dyn DataStore>, market: &'static MarketSpec) -> Self {
        Self {
            source,
            store,
            market,
        }
    }

    /// Run once. The source is closed whether or not the run succeeds.
    pub async fn scrape(&mut self) -> Result<OddsReport, ScrapeError> {
        let started = Instant::now();
        info!(market = self.market.market_type, "Starting NBA odds scrape");

        let result = self.run(started).await;
        if let Err(e) = &result {
            error!(error = %e, "Odds scrape failed");
        }

        self.source.close().await;
        result
    }

    async fn run(&self, started: Instant) -> Result<OddsReport, ScrapeError> {
        let listed = self.source.list_upcoming_games().await?;
        info!(count = listed.len(), "Found upcoming games");

        let mut games = Vec::new();
        for row in &listed {
            let game = match row.validate() {
                Ok(game) => game,
                Err(missing_field) => {
                    warn!(missing_field, game = ?row, "Invalid game data");
                    continue;
                }
            };

            info!(
                matchup = %game.matchup(),
                start = %game.game_datetime.as_ref().map(format_iso8601).unwrap_or_default(),
                "Processing game"
            );

            match self.player_odds(&game).await {
                Ok(player_odds) => games.push(ProcessedGame {
                    game,
                    player_odds,
                }),
                Err(e) => {
                    error!(matchup = %game.matchup(), error = %e, "Failed to process game");
                }
            }
        }

        let (games_written, odds_written, games_skipped) = self.persist(&games).await;
        info!(games = %games_written, odds = %odds_written, skipped = games_skipped, "Persisted odds");

        let run = OddsRun {
            total_games: games.len(),
            games,
            execution_time: format_execution_time(started.elapsed()),
            timestamp: format_iso8601(&Local::now()),
        };

        Ok(OddsReport {
            run,
            games_written,
            odds_written,
            games_skipped,
        })
    }

    /// Visit one game. Page failures are errors; market problems give no odds.
    async fn player_odds(&self, game: &ScheduledGame) -> Result<Vec<PlayerOdds>, ScrapeError> {
        self.source.open_game(&game.link).await?;

        info!(tab = self.market.tab_label, "Looking for market tab");
        if !self.source.select_tab(self.market.tab_label).await? {
            warn!(tab = self.market.tab_label, matchup = %game.matchup(), "Market tab not found");
            return Ok(Vec::new());
        }

        match self.source.extract_market(self.market).await {
            Ok(market) if market.players.is_empty() => {
                warn!(matchup = %game.matchup(), "No players found");
                Ok(Vec::new())
            }
            Ok(market) => {
                info!(
                    matchup = %game.matchup(),
                    total_players = market.players.len(),
                    odds_types = ?market.odds_types,
                    "Odds extracted"
                );
                Ok(market.players)
            }
            Err(e) => {
                error!(
                    error = %e,
                    kind = e.kind(),
                    matchup = %game.matchup(),
                    game_date = %format_game_date(game.game_datetime.as_ref()),
                    game_time = %format_game_time(game.game_datetime.as_ref()),
                    listed_datetime = %game.listed_datetime,
                    "Failed to extract odds"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn persist(&self, games: &[ProcessedGame]) -> (WriteStats, WriteStats, usize) {
        let mut games_written = WriteStats::default();
        let mut odds_written = WriteStats::default();
        let mut skipped = 0;

        for processed in games {
            let game = &processed.game;
            let Some(game_datetime) = game.game_datetime else {
                warn!(matchup = %game.matchup(), listed_datetime = %game.listed_datetime, "Skipping game without start time");
                skipped += 1;
                continue;
            };

            let result = self
                .store
                .upsert_game(&GameUpsert {
                    home_team: game.home_team.clone(),
                    away_team: game.away_team.clone(),
                    game_datetime,
                    link: game.link.clone(),
                })
                .await;
            games_written.record(&result);

            let game_id = match result {
                Ok(outcome) => match outcome.id() {
                    Some(id) => id,
                    None => continue,
                },
                Err(e) => {
                    error!(matchup = %game.matchup(), error = %e, "Failed to save game");
                    continue;
                }
            };

            for player in &processed.player_odds {
                let result = self
                    .store
                    .upsert_player_market_odd(&PlayerMarketOddUpsert {
                        game_id,
                        player_name: player.name.clone(),
                        market_type: self.market.market_type.to_string(),
                        line_type: LINE_TYPE_SPECIFIC.to_string(),
                        odds: player.odds.clone(),
                    })
                    .await;
                if let Err(e) = &result {
                    error!(player = %player.name, matchup = %game.matchup(), error = %e, "Failed to save player odds");
                }
                odds_written.record(&result);
            }
        }

        (games_written, odds_written, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::POINTS;
    use crate::models::{ListedGame, MarketOdds};
    use crate::site::{MarketError, MockOddsSource};
    use common::{BrowserError, MemoryStore};
    use std::collections::BTreeMap;

    fn listed(home: &str, away: &str, link: &str) -> ListedGame {
        ListedGame {
            home_team: Some(home.to_string()),
            away_team: Some(away.to_string()),
            link: Some(link.to_string()),
            game_date_time: Some("2025-03-15T20:00:00-03:00".to_string()),
        }
    }

    fn market(player: &str) -> MarketOdds {
        MarketOdds {
            players: vec![PlayerOdds {
                name: player.to_string(),
                odds: BTreeMap::from([("20+".to_string(), "1.50".to_string())]),
            }],
            odds_types: vec!["20+".to_string()],
        }
    }

    #[tokio::test]
    async fn test_game_missing_field_never_reaches_persistence() {
        let mut source = MockOddsSource::new();
        source.expect_list_upcoming_games().returning(|| {
            let mut incomplete = listed("Boston Celtics", "Miami Heat", "e-1");
            incomplete.link = None;
            Ok(vec![incomplete, listed("Denver Nuggets", "Utah Jazz", "e-2")])
        });
        source
            .expect_open_game()
            .withf(|link| link.eq_ignore_ascii_case("e-2"))
            .times(1)
            .returning(|_| Ok(()));
        source.expect_select_tab().returning(|_| Ok(true));
        source
            .expect_extract_market()
            .returning(|_| Ok(market("Nikola Jokic")));
        source.expect_close().times(1).return_const(());

        let store = Arc::new(MemoryStore::new());
        let mut scraper = OddsScraper::new(source, store.clone(), &POINTS);
        let report = scraper.scrape().await.unwrap();

        assert_eq!(report.run.total_games, 1);
        let games = store.games();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].home_team, "Denver Nuggets");
        assert_eq!(report.odds_written.inserted, 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_skips_game_and_still_persists() {
        let mut source = MockOddsSource::new();
        source.expect_list_upcoming_games().returning(|| {
            Ok(vec![
                listed("Boston Celtics", "Miami Heat", "e-1"),
                listed("Denver Nuggets", "Utah Jazz", "e-2"),
            ])
        });
        source.expect_open_game().returning(|link| {
            if link == "e-1" {
                Err(ScrapeError::Browser(BrowserError::NavigationTimeout {
                    url: link.to_string(),
                    timeout: std::time::Duration::from_secs(60),
                }))
            } else {
                Ok(())
            }
        });
        source.expect_select_tab().times(1).returning(|_| Ok(true));
        source
            .expect_extract_market()
            .times(1)
            .returning(|_| Ok(market("Nikola Jokic")));
        source.expect_close().times(1).return_const(());

        let store = Arc::new(MemoryStore::new());
        let mut scraper = OddsScraper::new(source, store.clone(), &POINTS);
        let report = scraper.scrape().await.unwrap();

        assert_eq!(report.run.total_games, 1);
        assert_eq!(report.run.games[0].game.home_team, "Denver Nuggets");
        assert_eq!(store.counts().games, 1);
        assert_eq!(store.counts().player_market_odds, 1);
    }

    #[tokio::test]
    async fn test_market_error_and_missing_tab_keep_game_without_odds() {
        let mut source = MockOddsSource::new();
        source.expect_list_upcoming_games().returning(|| {
            Ok(vec![
                listed("Boston Celtics", "Miami Heat", "e-1"),
                listed("Denver Nuggets", "Utah Jazz", "e-2"),
            ])
        });
        source.expect_open_game().returning(|_| Ok(()));
        let mut tab_calls = 0;
        source.expect_select_tab().returning(move |_| {
            tab_calls += 1;
            Ok(tab_calls == 1)
        });
        source
            .expect_extract_market()
            .times(1)
            .returning(|_| Err(MarketError::NoMarketAvailable));
        source.expect_close().times(1).return_const(());

        let store = Arc::new(MemoryStore::new());
        let mut scraper = OddsScraper::new(source, store.clone(), &POINTS);
        let report = scraper.scrape().await.unwrap();

        assert_eq!(report.run.total_games, 2);
        assert!(report.run.games.iter().all(|g| g.player_odds.is_empty()));
        assert_eq!(store.counts().games, 2);
        assert_eq!(store.counts().player_market_odds, 0);
    }

    #[tokio::test]
    async fn test_unparsed_start_time_is_visited_but_not_stored() {
        let mut source = MockOddsSource::new();
        source.expect_list_upcoming_games().returning(|| {
            let mut game = listed("Boston Celtics", "Miami Heat", "e-1");
            game.game_date_time = Some("em breve".to_string());
            Ok(vec![game])
        });
        source.expect_open_game().times(1).returning(|_| Ok(()));
        source.expect_select_tab().returning(|_| Ok(true));
        source
            .expect_extract_market()
            .returning(|_| Ok(market("Jayson Tatum")));
        source.expect_close().times(1).return_const(());

        let store = Arc::new(MemoryStore::new());
        let mut scraper = OddsScraper::new(source, store.clone(), &POINTS);
        let report = scraper.scrape().await.unwrap();

        assert_eq!(report.run.total_games, 1);
        assert_eq!(report.games_skipped, 1);
        assert_eq!(store.counts().games, 0);
    }

    #[tokio::test]
    async fn test_rescrape_updates_odds_in_place() {
        let store = Arc::new(MemoryStore::new());

        for value in ["1.50", "1.65"] {
            let mut source = MockOddsSource::new();
            source
                .expect_list_upcoming_games()
                .returning(|| Ok(vec![listed("Boston Celtics", "Miami Heat", "e-1")]));
            source.expect_open_game().returning(|_| Ok(()));
            source.expect_select_tab().returning(|_| Ok(true));
            let odds = value.to_string();
            source.expect_extract_market().returning(move |_| {
                Ok(MarketOdds {
                    players: vec![PlayerOdds {
                        name: "Jayson Tatum".to_string(),
                        odds: BTreeMap::from([("20+".to_string(), odds.clone())]),
                    }],
                    odds_types: vec!["20+".to_string()],
                })
            });
            source.expect_close().times(1).return_const(());

            OddsScraper::new(source, store.clone(), &POINTS)
                .scrape()
                .await
                .unwrap();
        }

        assert_eq!(store.counts().games, 1);
        assert_eq!(store.counts().player_market_odds, 1);
        let games = store.games();
        let outcome = store.upsert_game(&games[0]).await.unwrap();
        let game_id = outcome.id().unwrap();
        let odds = store.player_odds(game_id, "Jayson Tatum", "points").unwrap();
        assert_eq!(odds.get("20+").map(String::as_str), Some("1.65"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal_and_closes_source() {
        let mut source = MockOddsSource::new();
        source
            .expect_list_upcoming_games()
            .returning(|| Err(ScrapeError::ListingNotLoaded));
        source.expect_open_game().never();
        source.expect_close().times(1).return_const(());

        let store = Arc::new(MemoryStore::new());
        let mut scraper = OddsScraper::new(source, store.clone(), &POINTS);
        let result = scraper.scrape().await;

        assert!(matches!(result, Err(ScrapeError::ListingNotLoaded)));
        assert_eq!(store.counts().games, 0);
    }
}
