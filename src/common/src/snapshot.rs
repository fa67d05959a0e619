//! JSON snapshots of a run's payload for debugging.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::info;

/// Write `payload` pretty-printed to `dir/<prefix>_<YYYY-mm-dd_HHMMSS>.json`.
///
/// Creates `dir` when it does not exist.
pub fn write_snapshot<T: Serialize>(dir: &Path, prefix: &str, payload: &T) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let filename = format!("{}_{}.json", prefix, Local::now().format("%Y-%m-%d_%H%M%S"));
    let path = dir.join(filename);

    let json = serde_json::to_string_pretty(payload)?;
    fs::write(&path, json)?;

    info!(file = %path.display(), "Snapshot saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_write_snapshot_creates_dir_and_file() {
        let dir = std::env::temp_dir()
            .join(format!("snapshot-test-{}", uuid::Uuid::new_v4()))
            .join("nested");
        let payload = json!({ "total_games": 2, "team": "São Paulo" });

        let path = write_snapshot(&dir, "nba_odds", &payload).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("nba_odds_"));
        assert!(name.ends_with(".json"));
        // nba_odds_ + YYYY-mm-dd_HHMMSS + .json
        assert_eq!(name.len(), "nba_odds_".len() + 17 + ".json".len());

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, payload);

        fs::remove_dir_all(dir.parent().unwrap()).ok();
    }
}
