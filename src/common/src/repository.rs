//! Database repository functions for games, odds and boxscores.
//!
//! Every write is an `INSERT ... ON CONFLICT DO UPDATE` on the record's
//! natural key and returns `(id, inserted)`, where `inserted` is false when an
//! existing row was refreshed.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    GameUpsert, NbaGameUpsert, NbaPlayerStatUpsert, NbaPlayerUpsert, PlayerMarketOddUpsert,
    StatLine,
};

/// Upsert a game on (home_team, away_team, game_datetime).
///
/// A second game for the same teams on the same UTC day violates
/// `games_teams_day_key` and surfaces as a unique violation.
pub async fn upsert_game(pool: &PgPool, game: &GameUpsert) -> Result<(Uuid, bool), sqlx::Error> {
    sqlx::query_as::<_, (Uuid, bool)>(
        r#"
        INSERT INTO games (home_team, away_team, game_datetime, betfair_link)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (home_team, away_team, game_datetime) DO UPDATE SET
            betfair_link = EXCLUDED.betfair_link,
            updated_at = NOW()
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(&game.home_team)
    .bind(&game.away_team)
    .bind(game.game_datetime.with_timezone(&Utc))
    .bind(&game.link)
    .fetch_one(pool)
    .await
}

/// Upsert a player's odds on (game_id, player_name, market_type), replacing the mapping.
pub async fn upsert_player_market_odd(
    pool: &PgPool,
    odd: &PlayerMarketOddUpsert,
) -> Result<(Uuid, bool), sqlx::Error> {
    sqlx::query_as::<_, (Uuid, bool)>(
        r#"
        INSERT INTO player_market_odds (game_id, player_name, market_type, line_type, odds_data)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (game_id, player_name, market_type) DO UPDATE SET
            line_type = EXCLUDED.line_type,
            odds_data = EXCLUDED.odds_data,
            updated_at = NOW()
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(odd.game_id)
    .bind(&odd.player_name)
    .bind(&odd.market_type)
    .bind(&odd.line_type)
    .bind(Json(&odd.odds))
    .fetch_one(pool)
    .await
}

/// Upsert a completed game on its external game id.
pub async fn upsert_nba_game(
    pool: &PgPool,
    game: &NbaGameUpsert,
) -> Result<(Uuid, bool), sqlx::Error> {
    sqlx::query_as::<_, (Uuid, bool)>(
        r#"
        INSERT INTO nba_games (game_id, game_date, home_team_name, home_team_score,
                               away_team_name, away_team_score, periods, boxscore_link)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (game_id) DO UPDATE SET
            game_date = EXCLUDED.game_date,
            home_team_name = EXCLUDED.home_team_name,
            home_team_score = EXCLUDED.home_team_score,
            away_team_name = EXCLUDED.away_team_name,
            away_team_score = EXCLUDED.away_team_score,
            periods = EXCLUDED.periods,
            boxscore_link = EXCLUDED.boxscore_link,
            updated_at = NOW()
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(&game.game_id)
    .bind(game.game_date)
    .bind(&game.home_team_name)
    .bind(game.home_team_score)
    .bind(&game.away_team_name)
    .bind(game.away_team_score)
    .bind(Json(&game.periods))
    .bind(&game.boxscore_link)
    .fetch_one(pool)
    .await
}

/// Upsert a player on (name, team_name).
pub async fn upsert_nba_player(
    pool: &PgPool,
    player: &NbaPlayerUpsert,
) -> Result<(Uuid, bool), sqlx::Error> {
    sqlx::query_as::<_, (Uuid, bool)>(
        r#"
        INSERT INTO nba_players (name, team_name, is_starter, jersey_number)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name, team_name) DO UPDATE SET
            is_starter = EXCLUDED.is_starter,
            jersey_number = EXCLUDED.jersey_number,
            updated_at = NOW()
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(&player.name)
    .bind(&player.team_name)
    .bind(player.is_starter)
    .bind(&player.jersey_number)
    .fetch_one(pool)
    .await
}

/// Upsert a boxscore line on (nba_game_id, nba_player_id).
///
/// A status line clears the counting stats and vice versa.
pub async fn upsert_nba_player_stat(
    pool: &PgPool,
    stat: &NbaPlayerStatUpsert,
) -> Result<(Uuid, bool), sqlx::Error> {
    let (stats, status) = match &stat.line {
        StatLine::Played(stats) => (stats.clone(), None),
        StatLine::Status(status) => (Default::default(), Some(status.as_str())),
    };

    sqlx::query_as::<_, (Uuid, bool)>(
        r#"
        INSERT INTO nba_player_stats (
            nba_game_id, nba_player_id, minutes, field_goals, three_points, free_throws,
            off_rebounds, def_rebounds, total_rebounds, assists, steals, blocks,
            turnovers, personal_fouls, plus_minus, points, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT (nba_game_id, nba_player_id) DO UPDATE SET
            minutes = EXCLUDED.minutes,
            field_goals = EXCLUDED.field_goals,
            three_points = EXCLUDED.three_points,
            free_throws = EXCLUDED.free_throws,
            off_rebounds = EXCLUDED.off_rebounds,
            def_rebounds = EXCLUDED.def_rebounds,
            total_rebounds = EXCLUDED.total_rebounds,
            assists = EXCLUDED.assists,
            steals = EXCLUDED.steals,
            blocks = EXCLUDED.blocks,
            turnovers = EXCLUDED.turnovers,
            personal_fouls = EXCLUDED.personal_fouls,
            plus_minus = EXCLUDED.plus_minus,
            points = EXCLUDED.points,
            status = EXCLUDED.status,
            updated_at = NOW()
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(stat.nba_game_id)
    .bind(stat.nba_player_id)
    .bind(stats.minutes)
    .bind(stats.field_goals)
    .bind(stats.three_points)
    .bind(stats.free_throws)
    .bind(stats.off_rebounds)
    .bind(stats.def_rebounds)
    .bind(stats.total_rebounds)
    .bind(stats.assists)
    .bind(stats.steals)
    .bind(stats.blocks)
    .bind(stats.turnovers)
    .bind(stats.personal_fouls)
    .bind(stats.plus_minus)
    .bind(stats.points)
    .bind(status)
    .fetch_one(pool)
    .await
}
