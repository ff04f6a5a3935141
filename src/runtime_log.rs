use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CaptureError, Result};
use crate::settings_store::app_config_dir;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeLogEntry {
    pub timestamp_unix_ms: u128,
    pub level: String,
    pub event: String,
    pub message: String,
}

pub fn default_log_path() -> PathBuf {
    app_config_dir().join("runtime.log")
}

pub fn append(path: &Path, level: &str, event: &str, message: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| CaptureError::Settings("log path has no parent directory".to_string()))?;
    fs::create_dir_all(parent)?;

    let timestamp_unix_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| CaptureError::Settings(error.to_string()))?
        .as_millis();

    let line = serde_json::to_string(&RuntimeLogEntry {
        timestamp_unix_ms,
        level: level.to_string(),
        event: event.to_string(),
        message: message.to_string(),
    })
    .map_err(|error| CaptureError::Settings(error.to_string()))?;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Appends an entry, reporting failures through `log` instead of the caller.
pub fn record(path: &Path, level: &str, event: &str, message: &str) {
    if let Err(error) = append(path, level, event, message) {
        log::warn!("failed to write runtime log entry {event}: {error}");
    }
}

pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = fs::read_to_string(path)?;
    let lines = contents.lines().collect::<Vec<_>>();
    let take = lines.len().min(limit);
    Ok(lines[lines.len() - take..]
        .iter()
        .map(|line| (*line).to_string())
        .collect())
}

pub fn parse_entry(line: &str) -> Option<RuntimeLogEntry> {
    serde_json::from_str(line).ok()
}

pub fn clear(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    fs::remove_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be set")
            .as_nanos();
        std::env::temp_dir().join(format!("voice-capture-runtime-{name}-{nanos}.log"))
    }

    #[test]
    fn appends_and_reads_recent_logs() {
        let path = temp_file("append");
        append(&path, "info", "capture.start", "recording started").expect("first log should write");
        append(&path, "info", "capture.stop", "4095 samples").expect("second log should write");

        let recent = read_recent(&path, 1).expect("recent logs should read");
        assert_eq!(recent.len(), 1);
        let entry = parse_entry(&recent[0]).expect("entry should parse");
        assert_eq!(entry.event, "capture.stop");
        assert_eq!(entry.message, "4095 samples");

        let _ = clear(&path);
    }

    #[test]
    fn clear_removes_log_file() {
        let path = temp_file("clear");
        append(&path, "info", "capture.start", "recording started").expect("log should write");
        clear(&path).expect("clear should remove file");
        assert!(!path.exists());
    }

    #[test]
    fn missing_log_reads_empty() {
        let path = temp_file("missing");
        assert!(read_recent(&path, 10).expect("missing log is fine").is_empty());
        assert!(clear(&path).is_ok());
    }
}
