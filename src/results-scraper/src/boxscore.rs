//! Boxscore tables folded into player lines.
//!
//! Each team table is split into a fixed names column and a scrolling stats
//! table whose rows only line up by index. Category rows ("Titulares",
//! "Reservas") in the names column set the starter flag for the rows below.

use serde::{Deserialize, Serialize};

use common::pairing::zip_by_index;
use common::{BoxScoreStats, StatLine};

/// A row of the names column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameRow {
    /// Set on category header rows
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub jersey: Option<String>,
}

/// A row of the stats table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatsRow {
    #[serde(default)]
    pub cells: Vec<String>,
    /// Text of a spanning cell, e.g. "NJ-Decisão do técnico"
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TeamTable {
    #[serde(default)]
    pub names: Vec<NameRow>,
    #[serde(default)]
    pub stats: Vec<StatsRow>,
}

/// One player's row of a boxscore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLine {
    pub name: String,
    pub short_name: Option<String>,
    pub jersey_number: Option<String>,
    pub is_starter: bool,
    /// `None` when the stats row had no cells
    pub line: Option<StatLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxScore {
    pub home_team_players: Vec<PlayerLine>,
    pub away_team_players: Vec<PlayerLine>,
}

impl BoxScore {
    /// First table is the home team, second the away team.
    ///
    /// Fewer than two tables on the page gives an empty boxscore.
    pub fn from_tables(tables: &[Option<TeamTable>]) -> Self {
        if tables.len() < 2 {
            return Self::default();
        }
        let players = |index: usize| {
            tables[index]
                .as_ref()
                .map(|table| fold_players(&table.names, &table.stats))
                .unwrap_or_default()
        };
        Self {
            home_team_players: players(0),
            away_team_players: players(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.home_team_players.is_empty() && self.away_team_players.is_empty()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn stat_line(row: &StatsRow) -> Option<StatLine> {
    if row.cells.is_empty() {
        return None;
    }
    Some(match non_empty(&row.status) {
        Some(status) => StatLine::Status(status),
        None => StatLine::Played(BoxScoreStats::from_cells(&row.cells)),
    })
}

/// Pair names with stats rows and carry the starter flag through categories.
///
/// Rows with neither a category nor a player name (team totals) are skipped,
/// as are players without a matching stats row.
pub fn fold_players(names: &[NameRow], stats: &[StatsRow]) -> Vec<PlayerLine> {
    let (_, players) = zip_by_index(names, stats).fold(
        (false, Vec::new()),
        |(is_starter, mut players), (row, stats_row)| {
            if let Some(category) = non_empty(&row.category) {
                return (category.to_lowercase() == "titulares", players);
            }

            let (Some(name), Some(stats_row)) = (non_empty(&row.name), stats_row) else {
                return (is_starter, players);
            };

            players.push(PlayerLine {
                name,
                short_name: non_empty(&row.short_name),
                jersey_number: non_empty(&row.jersey)
                    .map(|j| j.trim_start_matches('#').trim().to_string())
                    .filter(|j| !j.is_empty()),
                is_starter,
                line: stat_line(stats_row),
            });
            (is_starter, players)
        },
    );
    players
}
