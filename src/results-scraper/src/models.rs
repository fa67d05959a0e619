//! Scoreboard entries and completed games of a results run.

use serde::{Deserialize, Serialize};

use common::pairing::zip_by_index;
use common::PeriodScore;

use crate::boxscore::BoxScore;

/// One team's side of a scoreboard, as read from the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TeamScore {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub score: Option<String>,
}

/// A scoreboard on the results listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardEntry {
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub game_date: Option<String>,
    #[serde(default)]
    pub boxscore_link: Option<String>,
    pub home_team: TeamScore,
    pub away_team: TeamScore,
    #[serde(default)]
    pub period_labels: Vec<String>,
    #[serde(default)]
    pub home_periods: Vec<String>,
    #[serde(default)]
    pub away_periods: Vec<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ScoreboardEntry {
    /// Build the game, or name the first missing identifying field.
    pub fn into_game(self) -> Result<CompletedGame, &'static str> {
        let game_id = present(&self.game_id).ok_or("gameId")?;
        let home_name = present(&self.home_team.name).ok_or("homeTeam.name")?;
        let away_name = present(&self.away_team.name).ok_or("awayTeam.name")?;
        let periods = build_periods(&self.period_labels, &self.home_periods, &self.away_periods);

        Ok(CompletedGame {
            game_id,
            game_date: self.game_date.unwrap_or_default(),
            boxscore_link: present(&self.boxscore_link),
            home_team: Team {
                name: home_name,
                score: present(&self.home_team.score),
            },
            away_team: Team {
                name: away_name,
                score: present(&self.away_team.score),
            },
            periods,
            players: BoxScore::default(),
        })
    }
}

/// Pair period labels with both teams' values by index.
///
/// The last heading is the total column and is left out.
pub fn build_periods(labels: &[String], home: &[String], away: &[String]) -> Vec<PeriodScore> {
    let labels = match labels.len() {
        0 | 1 => labels,
        n => &labels[..n - 1],
    };

    zip_by_index(labels, home)
        .zip(zip_by_index(labels, away))
        .map(|((label, home_score), (_, away_score))| PeriodScore {
            period: label.clone(),
            home_score: home_score.cloned(),
            away_score: away_score.cloned(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    pub name: String,
    pub score: Option<String>,
}

impl Team {
    pub fn numeric_score(&self) -> Option<i32> {
        self.score.as_deref().and_then(|s| s.parse().ok())
    }
}

/// A finished game with its boxscore, when one could be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedGame {
    pub game_id: String,
    /// Card header as printed, e.g. "sábado, 15 de março, 2025"
    pub game_date: String,
    pub boxscore_link: Option<String>,
    pub home_team: Team,
    pub away_team: Team,
    pub periods: Vec<PeriodScore>,
    pub players: BoxScore,
}

impl CompletedGame {
    pub fn matchup(&self) -> String {
        format!("{} vs {}", self.away_team.name, self.home_team.name)
    }
}

/// Payload of a completed results run.
#[derive(Debug, Clone, Serialize)]
pub struct ResultsRun {
    pub date: String,
    pub games: Vec<CompletedGame>,
    pub total_games: usize,
    pub execution_time: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_periods_drop_total_column() {
        let periods = build_periods(
            &strings(&["1", "2", "3", "4", "T"]),
            &strings(&["30", "25", "28", "27", "110"]),
            &strings(&["22", "31", "20", "28", "101"]),
        );

        assert_eq!(periods.len(), 4);
        assert_eq!(periods[0].period, "1");
        assert_eq!(periods[0].home_score.as_deref(), Some("30"));
        assert_eq!(periods[0].away_score.as_deref(), Some("22"));
        assert_eq!(periods[3].period, "4");
    }

    #[test]
    fn test_periods_with_missing_values() {
        let periods = build_periods(&strings(&["1", "2", "T"]), &strings(&["30"]), &[]);
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[1].home_score, None);
        assert_eq!(periods[0].away_score, None);
    }

    #[test]
    fn test_entry_without_game_id_is_rejected() {
        let entry = ScoreboardEntry {
            home_team: TeamScore {
                name: Some("Celtics".to_string()),
                score: Some("110".to_string()),
            },
            away_team: TeamScore {
                name: Some("Heat".to_string()),
                score: Some("101".to_string()),
            },
            ..Default::default()
        };
        assert_eq!(entry.into_game().unwrap_err(), "gameId");
    }

    #[test]
    fn test_entry_deserializes_and_builds_game() {
        let entry: ScoreboardEntry = serde_json::from_str(
            r#"{
                "gameId": "401705555",
                "gameDate": "sábado, 15 de março, 2025",
                "boxscoreLink": "/nba/placar/_/jogoId/401705555",
                "homeTeam": { "name": "Celtics", "score": "110" },
                "awayTeam": { "name": "Heat", "score": "101" },
                "periodLabels": ["1", "T"],
                "homePeriods": ["30", "110"],
                "awayPeriods": ["22", "101"]
            }"#,
        )
        .unwrap();

        let game = entry.into_game().unwrap();
        assert_eq!(game.game_id, "401705555");
        assert_eq!(game.home_team.numeric_score(), Some(110));
        assert_eq!(game.periods.len(), 1);
        assert_eq!(game.matchup(), "Heat vs Celtics");
    }
}
