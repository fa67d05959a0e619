//! Natural-key upserts behind a single seam.
//!
//! [`PgStore`] writes through the repository functions; [`MemoryStore`]
//! enforces the same keys in memory for dry runs and tests. A write that
//! collides with a uniqueness rule comes back as [`UpsertOutcome::Rejected`]
//! (already logged) so callers can move on to the next record.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::db::Database;
use crate::models::{
    GameUpsert, NbaGameUpsert, NbaPlayerStatUpsert, NbaPlayerUpsert, PlayerMarketOddUpsert,
    StatLine,
};
use crate::repository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Referenced {0} does not exist")]
    MissingParent(&'static str),
}

/// Result of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(Uuid),
    Updated(Uuid),
    /// Dropped by a uniqueness rule other than the upsert key.
    Rejected,
}

impl UpsertOutcome {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => Some(*id),
            UpsertOutcome::Rejected => None,
        }
    }
}

/// Tally of upsert results for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub inserted: usize,
    pub updated: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl WriteStats {
    pub fn record(&mut self, result: &Result<UpsertOutcome, StoreError>) {
        match result {
            Ok(UpsertOutcome::Inserted(_)) => self.inserted += 1,
            Ok(UpsertOutcome::Updated(_)) => self.updated += 1,
            Ok(UpsertOutcome::Rejected) => self.rejected += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// Rows written, new or refreshed.
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

impl fmt::Display for WriteStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} rejected, {} failed",
            self.inserted, self.updated, self.rejected, self.failed
        )
    }
}

/// Upsert-by-natural-key for every persisted entity.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Keyed on (home, away, datetime); one per teams and calendar day.
    async fn upsert_game(&self, game: &GameUpsert) -> Result<UpsertOutcome, StoreError>;

    /// Keyed on (game, player, market type).
    async fn upsert_player_market_odd(
        &self,
        odd: &PlayerMarketOddUpsert,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Keyed on the external game id.
    async fn upsert_nba_game(&self, game: &NbaGameUpsert) -> Result<UpsertOutcome, StoreError>;

    /// Keyed on (name, team).
    async fn upsert_nba_player(
        &self,
        player: &NbaPlayerUpsert,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Keyed on (game, player).
    async fn upsert_nba_player_stat(
        &self,
        stat: &NbaPlayerStatUpsert,
    ) -> Result<UpsertOutcome, StoreError>;
}

/// PostgreSQL-backed store.
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn settle(
    result: Result<(Uuid, bool), sqlx::Error>,
    entity: &'static str,
    key: impl FnOnce() -> String,
) -> Result<UpsertOutcome, StoreError> {
    match result {
        Ok((id, true)) => Ok(UpsertOutcome::Inserted(id)),
        Ok((id, false)) => Ok(UpsertOutcome::Updated(id)),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            error!(
                entity,
                key = %key(),
                constraint = db_err.constraint().unwrap_or("unknown"),
                "Duplicate record rejected"
            );
            Ok(UpsertOutcome::Rejected)
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DataStore for PgStore {
    async fn upsert_game(&self, game: &GameUpsert) -> Result<UpsertOutcome, StoreError> {
        let result = repository::upsert_game(self.db.pool(), game).await;
        settle(result, "game", || {
            format!("{} vs {} @ {}", game.home_team, game.away_team, game.game_datetime)
        })
    }

    async fn upsert_player_market_odd(
        &self,
        odd: &PlayerMarketOddUpsert,
    ) -> Result<UpsertOutcome, StoreError> {
        let result = repository::upsert_player_market_odd(self.db.pool(), odd).await;
        settle(result, "player_market_odd", || {
            format!("{}/{}/{}", odd.game_id, odd.player_name, odd.market_type)
        })
    }

    async fn upsert_nba_game(&self, game: &NbaGameUpsert) -> Result<UpsertOutcome, StoreError> {
        let result = repository::upsert_nba_game(self.db.pool(), game).await;
        settle(result, "nba_game", || game.game_id.clone())
    }

    async fn upsert_nba_player(
        &self,
        player: &NbaPlayerUpsert,
    ) -> Result<UpsertOutcome, StoreError> {
        let result = repository::upsert_nba_player(self.db.pool(), player).await;
        settle(result, "nba_player", || {
            format!("{} ({})", player.name, player.team_name)
        })
    }

    async fn upsert_nba_player_stat(
        &self,
        stat: &NbaPlayerStatUpsert,
    ) -> Result<UpsertOutcome, StoreError> {
        let result = repository::upsert_nba_player_stat(self.db.pool(), stat).await;
        settle(result, "nba_player_stat", || {
            format!("{}/{}", stat.nba_game_id, stat.nba_player_id)
        })
    }
}

/// Row counts per entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub games: usize,
    pub player_market_odds: usize,
    pub nba_games: usize,
    pub nba_players: usize,
    pub nba_player_stats: usize,
}

#[derive(Default)]
struct MemoryState {
    games: Vec<(Uuid, GameUpsert)>,
    odds: HashMap<(Uuid, String, String), (Uuid, PlayerMarketOddUpsert)>,
    nba_games: HashMap<String, (Uuid, NbaGameUpsert)>,
    players: HashMap<(String, String), (Uuid, NbaPlayerUpsert)>,
    stats: HashMap<(Uuid, Uuid), (Uuid, StatLine)>,
}

/// In-memory store with the same key rules as the database schema.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain maps behind; keep using them.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn counts(&self) -> StoreCounts {
        let state = self.state();
        StoreCounts {
            games: state.games.len(),
            player_market_odds: state.odds.len(),
            nba_games: state.nba_games.len(),
            nba_players: state.players.len(),
            nba_player_stats: state.stats.len(),
        }
    }

    pub fn games(&self) -> Vec<GameUpsert> {
        self.state().games.iter().map(|(_, g)| g.clone()).collect()
    }

    pub fn player_odds(
        &self,
        game_id: Uuid,
        player_name: &str,
        market_type: &str,
    ) -> Option<BTreeMap<String, String>> {
        self.state()
            .odds
            .get(&(game_id, player_name.to_string(), market_type.to_string()))
            .map(|(_, odd)| odd.odds.clone())
    }

    pub fn nba_game(&self, game_id: &str) -> Option<NbaGameUpsert> {
        self.state().nba_games.get(game_id).map(|(_, g)| g.clone())
    }

    pub fn nba_player(&self, name: &str, team_name: &str) -> Option<NbaPlayerUpsert> {
        self.state()
            .players
            .get(&(name.to_string(), team_name.to_string()))
            .map(|(_, p)| p.clone())
    }

    pub fn nba_players(&self) -> Vec<NbaPlayerUpsert> {
        self.state().players.values().map(|(_, p)| p.clone()).collect()
    }
}

fn upsert_keyed<K, V>(map: &mut HashMap<K, (Uuid, V)>, key: K, value: V) -> UpsertOutcome
where
    K: std::hash::Hash + Eq,
{
    match map.get_mut(&key) {
        Some(entry) => {
            entry.1 = value;
            UpsertOutcome::Updated(entry.0)
        }
        None => {
            let id = Uuid::new_v4();
            map.insert(key, (id, value));
            UpsertOutcome::Inserted(id)
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn upsert_game(&self, game: &GameUpsert) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state();
        let same_teams = |g: &GameUpsert| g.home_team == game.home_team && g.away_team == game.away_team;

        if let Some((id, existing)) = state
            .games
            .iter_mut()
            .find(|(_, g)| same_teams(g) && g.game_datetime == game.game_datetime)
        {
            existing.link = game.link.clone();
            return Ok(UpsertOutcome::Updated(*id));
        }

        let day = game.game_datetime.with_timezone(&Utc).date_naive();
        if state
            .games
            .iter()
            .any(|(_, g)| same_teams(g) && g.game_datetime.with_timezone(&Utc).date_naive() == day)
        {
            error!(
                entity = "game",
                home_team = %game.home_team,
                away_team = %game.away_team,
                game_datetime = %game.game_datetime,
                "Duplicate record rejected"
            );
            return Ok(UpsertOutcome::Rejected);
        }

        let id = Uuid::new_v4();
        state.games.push((id, game.clone()));
        Ok(UpsertOutcome::Inserted(id))
    }

    async fn upsert_player_market_odd(
        &self,
        odd: &PlayerMarketOddUpsert,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state();
        if !state.games.iter().any(|(id, _)| *id == odd.game_id) {
            return Err(StoreError::MissingParent("game"));
        }
        let key = (
            odd.game_id,
            odd.player_name.clone(),
            odd.market_type.clone(),
        );
        Ok(upsert_keyed(&mut state.odds, key, odd.clone()))
    }

    async fn upsert_nba_game(&self, game: &NbaGameUpsert) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state();
        Ok(upsert_keyed(
            &mut state.nba_games,
            game.game_id.clone(),
            game.clone(),
        ))
    }

    async fn upsert_nba_player(
        &self,
        player: &NbaPlayerUpsert,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state();
        let key = (player.name.clone(), player.team_name.clone());
        Ok(upsert_keyed(&mut state.players, key, player.clone()))
    }

    async fn upsert_nba_player_stat(
        &self,
        stat: &NbaPlayerStatUpsert,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state();
        if !state.nba_games.values().any(|(id, _)| *id == stat.nba_game_id) {
            return Err(StoreError::MissingParent("nba_game"));
        }
        if !state.players.values().any(|(id, _)| *id == stat.nba_player_id) {
            return Err(StoreError::MissingParent("nba_player"));
        }
        let key = (stat.nba_game_id, stat.nba_player_id);
        Ok(upsert_keyed(&mut state.stats, key, stat.line.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoxScoreStats, LINE_TYPE_SPECIFIC};
    use chrono::{DateTime, Duration, NaiveDate};

    fn game(datetime: &str) -> GameUpsert {
        GameUpsert {
            home_team: "Boston Celtics".to_string(),
            away_team: "Miami Heat".to_string(),
            game_datetime: DateTime::parse_from_rfc3339(datetime).unwrap(),
            link: "basquete/nba/celtics-x-heat/e-1".to_string(),
        }
    }

    fn odd(game_id: Uuid, line: &str, value: &str) -> PlayerMarketOddUpsert {
        PlayerMarketOddUpsert {
            game_id,
            player_name: "Jayson Tatum".to_string(),
            market_type: "points".to_string(),
            line_type: LINE_TYPE_SPECIFIC.to_string(),
            odds: BTreeMap::from([(line.to_string(), value.to_string())]),
        }
    }

    #[tokio::test]
    async fn test_game_upsert_updates_same_key() {
        let store = MemoryStore::new();
        let first = store.upsert_game(&game("2025-03-15T19:50:00-03:00")).await.unwrap();

        let mut relinked = game("2025-03-15T19:50:00-03:00");
        relinked.link = "basquete/nba/celtics-x-heat/e-2".to_string();
        let second = store.upsert_game(&relinked).await.unwrap();

        assert!(matches!(first, UpsertOutcome::Inserted(_)));
        assert_eq!(second, UpsertOutcome::Updated(first.id().unwrap()));
        assert_eq!(store.counts().games, 1);
        assert_eq!(store.games()[0].link, "basquete/nba/celtics-x-heat/e-2");
    }

    #[tokio::test]
    async fn test_game_same_teams_same_day_is_rejected() {
        let store = MemoryStore::new();
        store.upsert_game(&game("2025-03-15T19:50:00-03:00")).await.unwrap();

        let mut moved = game("2025-03-15T19:50:00-03:00");
        moved.game_datetime = moved.game_datetime + Duration::minutes(15);
        let outcome = store.upsert_game(&moved).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Rejected);
        assert_eq!(store.counts().games, 1);

        // Next day is a different game
        let next_day = store.upsert_game(&game("2025-03-16T19:50:00-03:00")).await.unwrap();
        assert!(matches!(next_day, UpsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn test_second_player_odd_updates_mapping_in_place() {
        let store = MemoryStore::new();
        let game_id = store
            .upsert_game(&game("2025-03-15T19:50:00-03:00"))
            .await
            .unwrap()
            .id()
            .unwrap();

        let first = store.upsert_player_market_odd(&odd(game_id, "20+", "1.50")).await.unwrap();
        let second = store.upsert_player_market_odd(&odd(game_id, "25+", "2.10")).await.unwrap();

        assert_eq!(second, UpsertOutcome::Updated(first.id().unwrap()));
        assert_eq!(store.counts().player_market_odds, 1);
        let odds = store.player_odds(game_id, "Jayson Tatum", "points").unwrap();
        assert_eq!(odds, BTreeMap::from([("25+".to_string(), "2.10".to_string())]));
    }

    #[tokio::test]
    async fn test_player_odd_requires_existing_game() {
        let store = MemoryStore::new();
        let result = store.upsert_player_market_odd(&odd(Uuid::new_v4(), "20+", "1.50")).await;
        assert!(matches!(result, Err(StoreError::MissingParent("game"))));
    }

    #[tokio::test]
    async fn test_boxscore_upserts_are_idempotent() {
        let store = MemoryStore::new();
        let nba_game = NbaGameUpsert {
            game_id: "401705555".to_string(),
            game_date: NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
            home_team_name: "Celtics".to_string(),
            home_team_score: Some(110),
            away_team_name: "Heat".to_string(),
            away_team_score: Some(101),
            periods: vec![],
            boxscore_link: None,
        };
        let player = NbaPlayerUpsert {
            name: "Jayson Tatum".to_string(),
            team_name: "Celtics".to_string(),
            is_starter: true,
            jersey_number: Some("0".to_string()),
        };

        for _ in 0..2 {
            let game_id = store.upsert_nba_game(&nba_game).await.unwrap().id().unwrap();
            let player_id = store.upsert_nba_player(&player).await.unwrap().id().unwrap();
            let stat = NbaPlayerStatUpsert {
                nba_game_id: game_id,
                nba_player_id: player_id,
                line: StatLine::Played(BoxScoreStats::default()),
            };
            store.upsert_nba_player_stat(&stat).await.unwrap();
        }

        let counts = store.counts();
        assert_eq!(counts.nba_games, 1);
        assert_eq!(counts.nba_players, 1);
        assert_eq!(counts.nba_player_stats, 1);
    }

    #[test]
    fn test_write_stats_tally() {
        let mut stats = WriteStats::default();
        stats.record(&Ok(UpsertOutcome::Inserted(Uuid::new_v4())));
        stats.record(&Ok(UpsertOutcome::Updated(Uuid::new_v4())));
        stats.record(&Ok(UpsertOutcome::Rejected));
        stats.record(&Err(StoreError::MissingParent("game")));

        assert_eq!(stats.written(), 2);
        assert_eq!(stats.to_string(), "1 inserted, 1 updated, 1 rejected, 1 failed");
    }
}
