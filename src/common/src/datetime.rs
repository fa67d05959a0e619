//! Date and time normalization for scraped listings.
//!
//! The results site prints long Portuguese dates ("sábado, 15 de março, 2025")
//! and the exchange publishes ISO timestamps that are ten minutes later than
//! the actual tip-off, sometimes followed by a parenthesised note.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::{debug, error, warn};

/// Offset between the exchange's listed start time and actual tip-off.
pub const LISTED_START_OFFSET_MINUTES: i64 = 10;

static LONG_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) de (\w+), (\d+)").expect("valid long date regex"));

static PAREN_NOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*\)").expect("valid annotation regex"));

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "janeiro" => 1,
        "fevereiro" => 2,
        "março" | "marco" => 3,
        "abril" => 4,
        "maio" => 5,
        "junho" => 6,
        "julho" => 7,
        "agosto" => 8,
        "setembro" => 9,
        "outubro" => 10,
        "novembro" => 11,
        "dezembro" => 12,
        _ => return None,
    };
    Some(month)
}

/// Parse a long Portuguese date, or `None` if it does not match.
pub fn try_parse_game_date(date_string: &str) -> Option<NaiveDate> {
    let caps = LONG_DATE_RE.captures(date_string)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a long Portuguese date, falling back to today's local date.
pub fn parse_game_date(date_string: &str) -> NaiveDate {
    match try_parse_game_date(date_string) {
        Some(date) => date,
        None => {
            error!(date_string, "Could not parse game date, using today");
            Local::now().date_naive()
        }
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive).into());
        }
    }
    None
}

/// Strip parenthesised notes and shift the listed start back to tip-off.
///
/// Returns `None` for missing or unparseable input.
pub fn adjust_game_datetime(date_time: Option<&str>) -> Option<DateTime<FixedOffset>> {
    let raw = date_time.filter(|s| !s.is_empty())?;
    let cleaned = PAREN_NOTE_RE.replace_all(raw, "");
    let cleaned = cleaned.trim();

    match parse_timestamp(cleaned) {
        Some(listed) => {
            let adjusted = listed - chrono::Duration::minutes(LISTED_START_OFFSET_MINUTES);
            debug!(
                listed = cleaned,
                adjusted = %format_iso8601(&adjusted),
                "Adjusted game start time"
            );
            Some(adjusted)
        }
        None => {
            warn!(datetime = raw, "Could not parse game start time");
            None
        }
    }
}

/// ISO 8601 with a numeric offset, e.g. `2025-03-15T19:50:00-03:00`.
pub fn format_iso8601<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

pub fn format_game_date(dt: Option<&DateTime<FixedOffset>>) -> String {
    dt.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "Invalid date".to_string())
}

pub fn format_game_time(dt: Option<&DateTime<FixedOffset>>) -> String {
    dt.map(|d| d.format("%H:%M").to_string())
        .unwrap_or_else(|| "Invalid time".to_string())
}

/// Format a run duration as `HH:MM:SS`.
pub fn format_execution_time(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64().round() as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_portuguese_long_date() {
        let date = parse_game_date("sábado, 15 de março, 2025");
        assert_eq!(date.to_string(), "2025-03-15");
    }

    #[test]
    fn test_parse_date_pads_single_digit_day() {
        let date = parse_game_date("domingo, 2 de Fevereiro, 2025");
        assert_eq!(date.to_string(), "2025-02-02");
    }

    #[test]
    fn test_unparseable_date_falls_back_to_today() {
        assert_eq!(parse_game_date("yesterday-ish"), Local::now().date_naive());
        // Known pattern, unknown month
        assert_eq!(
            parse_game_date("sábado, 15 de brumário, 2025"),
            Local::now().date_naive()
        );
        assert!(try_parse_game_date("31 de fevereiro, 2025").is_none());
    }

    #[test]
    fn test_adjust_strips_note_and_subtracts_offset() {
        let adjusted = adjust_game_datetime(Some("2025-03-15T20:00:00-03:00 (some note)"))
            .expect("should parse");
        assert_eq!(format_iso8601(&adjusted), "2025-03-15T19:50:00-03:00");
    }

    #[test]
    fn test_adjust_crosses_day_boundary() {
        let adjusted = adjust_game_datetime(Some("2025-03-16T00:05:00Z")).unwrap();
        assert_eq!(format_iso8601(&adjusted), "2025-03-15T23:55:00+00:00");
    }

    #[test]
    fn test_adjust_accepts_naive_timestamp_as_utc() {
        let adjusted = adjust_game_datetime(Some("2025-03-15 20:00:00")).unwrap();
        assert_eq!(format_iso8601(&adjusted), "2025-03-15T19:50:00+00:00");
    }

    #[test]
    fn test_adjust_failure_yields_none() {
        assert!(adjust_game_datetime(None).is_none());
        assert!(adjust_game_datetime(Some("")).is_none());
        assert!(adjust_game_datetime(Some("amanhã às 20h")).is_none());
    }

    #[test]
    fn test_format_game_date_and_time() {
        let dt = adjust_game_datetime(Some("2025-03-15T20:00:00-03:00")).unwrap();
        assert_eq!(format_game_date(Some(&dt)), "15/03/2025");
        assert_eq!(format_game_time(Some(&dt)), "19:50");
        assert_eq!(format_game_date(None), "Invalid date");
        assert_eq!(format_game_time(None), "Invalid time");
    }

    #[test]
    fn test_format_execution_time() {
        assert_eq!(format_execution_time(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_execution_time(Duration::from_millis(59_600)), "00:01:00");
        assert_eq!(format_execution_time(Duration::from_secs(3_725)), "01:02:05");
    }
}
