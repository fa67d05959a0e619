//! Results run: scoreboards, boxscores, persistence.

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tracing::{error, info, warn};

use common::datetime::{format_execution_time, format_iso8601, parse_game_date};
use common::{DataStore, NbaGameUpsert, NbaPlayerStatUpsert, NbaPlayerUpsert, WriteStats};
use uuid::Uuid;

use crate::boxscore::{BoxScore, PlayerLine};
use crate::models::{CompletedGame, ResultsRun};
use crate::site::{ResultsSource, ScrapeError};

#[derive(Debug)]
pub struct ResultsReport {
    pub run: ResultsRun,
    pub games_written: WriteStats,
    pub players_written: WriteStats,
    pub stats_written: WriteStats,
}

#[derive(Default)]
struct PersistStats {
    games: WriteStats,
    players: WriteStats,
    stats: WriteStats,
}

pub struct ResultsScraper<S: ResultsSource> {
    source: S,
    store: Arc<dyn DataStore>,
}

impl<S: ResultsSource> ResultsScraper<S> {
    pub fn new(source: S, store: Arc<dyn DataStore>) -> Self {
        Self { source, store }
    }

    /// Run once for a `YYYYMMDD` date. The source is always closed.
    pub async fn scrape(&mut self, date: &str) -> Result<ResultsReport, ScrapeError> {
        let started = Instant::now();
        info!(date, "Starting NBA results scrape");

        let result = self.run(date, started).await;
        if let Err(e) = &result {
            error!(date, error = %e, "Results scrape failed");
        }

        self.source.close().await;
        result
    }

    async fn run(&self, date: &str, started: Instant) -> Result<ResultsReport, ScrapeError> {
        let entries = self.source.list_completed_games(date).await?;

        let listed: Vec<CompletedGame> = entries
            .into_iter()
            .filter_map(|entry| match entry.into_game() {
                Ok(game) => Some(game),
                Err(missing_field) => {
                    warn!(missing_field, "Dropping scoreboard without identity");
                    None
                }
            })
            .collect();

        if listed.is_empty() {
            warn!(date, "No games found");
        } else {
            info!(date, count = listed.len(), "Found games");
        }

        let total = listed.len();
        let mut games = Vec::with_capacity(total);
        for (index, mut game) in listed.into_iter().enumerate() {
            info!("Processing game {} of {}: {}", index + 1, total, game.matchup());

            match self.box_score(&game).await {
                Ok(Some(players)) => game.players = players,
                Ok(None) => {}
                Err(e) => {
                    // Keep the final score even without player stats
                    error!(matchup = %game.matchup(), error = %e, "Failed to process game");
                }
            }
            games.push(game);
        }

        let written = self.persist(&games).await;
        info!(
            games = %written.games,
            players = %written.players,
            stats = %written.stats,
            "Persisted results"
        );

        Ok(ResultsReport {
            run: ResultsRun {
                date: date.to_string(),
                total_games: games.len(),
                games,
                execution_time: format_execution_time(started.elapsed()),
                timestamp: format_iso8601(&Local::now()),
            },
            games_written: written.games,
            players_written: written.players,
            stats_written: written.stats,
        })
    }

    async fn box_score(&self, game: &CompletedGame) -> Result<Option<BoxScore>, ScrapeError> {
        let Some(link) = &game.boxscore_link else {
            warn!(matchup = %game.matchup(), "Boxscore link not found");
            return Ok(None);
        };

        self.source.open_boxscore(link).await?;
        let players = self.source.extract_box_score().await?;

        if players.is_empty() {
            warn!(matchup = %game.matchup(), "No player stats found");
            return Ok(None);
        }
        info!(
            home_players = players.home_team_players.len(),
            away_players = players.away_team_players.len(),
            "Player stats extracted"
        );
        Ok(Some(players))
    }

    async fn persist(&self, games: &[CompletedGame]) -> PersistStats {
        let mut written = PersistStats::default();

        for game in games {
            let record = NbaGameUpsert {
                game_id: game.game_id.clone(),
                game_date: parse_game_date(&game.game_date),
                home_team_name: game.home_team.name.clone(),
                home_team_score: game.home_team.numeric_score(),
                away_team_name: game.away_team.name.clone(),
                away_team_score: game.away_team.numeric_score(),
                periods: game.periods.clone(),
                boxscore_link: game.boxscore_link.clone(),
            };

            let result = self.store.upsert_nba_game(&record).await;
            written.games.record(&result);
            let nba_game_id = match result {
                Ok(outcome) => match outcome.id() {
                    Some(id) => id,
                    None => continue,
                },
                Err(e) => {
                    error!(game_id = %game.game_id, error = %e, "Failed to save game");
                    continue;
                }
            };

            let teams = [
                (&game.home_team.name, &game.players.home_team_players),
                (&game.away_team.name, &game.players.away_team_players),
            ];
            for (team_name, players) in teams {
                for player in players {
                    self.persist_player(nba_game_id, team_name, player, &mut written)
                        .await;
                }
            }
            info!(matchup = %game.matchup(), "Game saved");
        }

        written
    }

    async fn persist_player(
        &self,
        nba_game_id: Uuid,
        team_name: &str,
        player: &PlayerLine,
        written: &mut PersistStats,
    ) {
        let result = self
            .store
            .upsert_nba_player(&NbaPlayerUpsert {
                name: player.name.clone(),
                team_name: team_name.to_string(),
                is_starter: player.is_starter,
                jersey_number: player.jersey_number.clone(),
            })
            .await;
        written.players.record(&result);

        let nba_player_id = match result {
            Ok(outcome) => match outcome.id() {
                Some(id) => id,
                None => return,
            },
            Err(e) => {
                error!(player = %player.name, team = team_name, error = %e, "Failed to save player");
                return;
            }
        };

        let Some(line) = &player.line else {
            return;
        };
        let result = self
            .store
            .upsert_nba_player_stat(&NbaPlayerStatUpsert {
                nba_game_id,
                nba_player_id,
                line: line.clone(),
            })
            .await;
        if let Err(e) = &result {
            error!(player = %player.name, error = %e, "Failed to save player stats");
        }
        written.stats.record(&result);
    }
}
