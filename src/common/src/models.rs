//! Records written by the pipelines, one struct per upsert.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Line-type tag stored with every player market odd.
pub const LINE_TYPE_SPECIFIC: &str = "specific_line";

/// Scheduled game on the betting exchange.
///
/// Upserted on (home, away, datetime); at most one per teams and calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameUpsert {
    pub home_team: String,
    pub away_team: String,
    pub game_datetime: DateTime<FixedOffset>,
    pub link: String,
}

/// One player's odds for one market of a game, keyed on (game, player, market).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMarketOddUpsert {
    pub game_id: Uuid,
    pub player_name: String,
    pub market_type: String,
    pub line_type: String,
    /// Line label (e.g. "20+") to odds value as displayed
    pub odds: BTreeMap<String, String>,
}

/// Score of both teams in one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodScore {
    pub period: String,
    pub home_score: Option<String>,
    pub away_score: Option<String>,
}

/// Completed game result, keyed on the results site's game id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NbaGameUpsert {
    pub game_id: String,
    pub game_date: NaiveDate,
    pub home_team_name: String,
    pub home_team_score: Option<i32>,
    pub away_team_name: String,
    pub away_team_score: Option<i32>,
    pub periods: Vec<PeriodScore>,
    pub boxscore_link: Option<String>,
}

/// Player scoped to the team they played for, keyed on (name, team).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NbaPlayerUpsert {
    pub name: String,
    pub team_name: String,
    pub is_starter: bool,
    pub jersey_number: Option<String>,
}

/// Counting stats of a boxscore row, in site column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxScoreStats {
    pub minutes: Option<String>,
    pub field_goals: Option<String>,
    pub three_points: Option<String>,
    pub free_throws: Option<String>,
    pub off_rebounds: Option<i32>,
    pub def_rebounds: Option<i32>,
    pub total_rebounds: Option<i32>,
    pub assists: Option<i32>,
    pub steals: Option<i32>,
    pub blocks: Option<i32>,
    pub turnovers: Option<i32>,
    pub personal_fouls: Option<i32>,
    pub plus_minus: Option<String>,
    pub points: Option<i32>,
}

impl BoxScoreStats {
    /// Map stats cells by position: MIN, FG, 3PT, FT, OREB, DREB, REB, AST,
    /// STL, BLK, TO, PF, +/-, PTS.
    pub fn from_cells(cells: &[String]) -> Self {
        let text = |i: usize| {
            cells
                .get(i)
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(str::to_string)
        };
        let number = |i: usize| cells.get(i).and_then(|c| c.trim().parse::<i32>().ok());

        Self {
            minutes: text(0),
            field_goals: text(1),
            three_points: text(2),
            free_throws: text(3),
            off_rebounds: number(4),
            def_rebounds: number(5),
            total_rebounds: number(6),
            assists: number(7),
            steals: number(8),
            blocks: number(9),
            turnovers: number(10),
            personal_fouls: number(11),
            plus_minus: text(12),
            points: number(13),
        }
    }
}

/// A player's boxscore line: stats, or the reason they did not play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatLine {
    Played(BoxScoreStats),
    Status(String),
}

/// Boxscore line of one player in one game, keyed on (game, player).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NbaPlayerStatUpsert {
    pub nba_game_id: Uuid,
    pub nba_player_id: Uuid,
    pub line: StatLine,
}
