//! Listing rows and per-game results of an odds run.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use common::datetime::adjust_game_datetime;

/// A coupon card as read from the listing page. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedGame {
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub game_date_time: Option<String>,
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl ListedGame {
    /// Check that every field is present and non-empty.
    ///
    /// Returns the name of the first missing field on failure.
    pub fn validate(&self) -> Result<ScheduledGame, &'static str> {
        let home_team = required(&self.home_team).ok_or("homeTeam")?;
        let away_team = required(&self.away_team).ok_or("awayTeam")?;
        let link = required(&self.link).ok_or("link")?;
        let listed_datetime = required(&self.game_date_time).ok_or("gameDateTime")?;

        Ok(ScheduledGame {
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            link: link.to_string(),
            listed_datetime: listed_datetime.to_string(),
            game_datetime: adjust_game_datetime(Some(listed_datetime)),
        })
    }
}

/// A validated listing row.
///
/// `game_datetime` is the adjusted tip-off, `None` when the listed value did
/// not parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledGame {
    pub home_team: String,
    pub away_team: String,
    pub link: String,
    #[serde(skip)]
    pub listed_datetime: String,
    #[serde(rename = "gameDateTime")]
    pub game_datetime: Option<DateTime<FixedOffset>>,
}

impl ScheduledGame {
    pub fn matchup(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

/// One player's line label to odds mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerOdds {
    pub name: String,
    pub odds: BTreeMap<String, String>,
}

/// Everything read from one market section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOdds {
    pub players: Vec<PlayerOdds>,
    pub odds_types: Vec<String>,
}

/// A game after its page was visited.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedGame {
    #[serde(flatten)]
    pub game: ScheduledGame,
    pub player_odds: Vec<PlayerOdds>,
}

/// Payload of a completed odds run.
#[derive(Debug, Clone, Serialize)]
pub struct OddsRun {
    pub games: Vec<ProcessedGame>,
    pub total_games: usize,
    pub execution_time: String,
    pub timestamp: String,
}
