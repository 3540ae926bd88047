//! Status artifact read by external status consumers.
//!
//! A small JSON document rewritten once per cycle. The last good fix
//! survives align and test cycles and failed solves: only a solve-mode cycle
//! that produced coordinates replaces it.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::common::utils::{private_path, write_atomic};
use crate::model::{Mode, SolveResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusRecord {
    /// When the current fix was obtained
    pub timestamp: Option<DateTime<Local>>,
    pub mode: Option<Mode>,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub confidence: Option<f64>,
    /// Why the latest cycle failed, if it did
    pub error: Option<String>,
}

impl StatusRecord {
    /// Fold one cycle's outcome into the record.
    pub fn apply(&mut self, mode: Mode, result: Option<&SolveResult>, error: Option<String>) {
        self.mode = Some(mode);
        self.error = error;

        if mode != Mode::Solve {
            return;
        }
        if let Some(result) = result
            && let Some(coords) = result.coords
        {
            self.timestamp = Some(result.solved_at);
            self.ra = Some(coords.ra_deg);
            self.dec = Some(coords.dec_deg);
            self.confidence = result.confidence;
        }
    }
}

/// Load the status artifact; a missing file reads as an empty record.
pub fn read(path: &Path) -> Result<StatusRecord> {
    if !path.exists() {
        return Ok(StatusRecord::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read status file {}", private_path(path)))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse status file {}", private_path(path)))
}

/// Keeps the in-memory record and rewrites the file after every cycle.
#[derive(Debug)]
pub struct StatusWriter {
    path: PathBuf,
    record: StatusRecord,
}

impl StatusWriter {
    /// Start from whatever the file already holds so a restart keeps the
    /// last fix.
    pub fn open(path: PathBuf) -> Self {
        let record = match read(&path) {
            Ok(record) => record,
            Err(e) => {
                log_warning!("Ignoring unreadable status file: {e:#}");
                StatusRecord::default()
            }
        };
        Self { path, record }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point the writer at a new file, carrying the current record over.
    pub fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    pub fn current(&self) -> &StatusRecord {
        &self.record
    }

    pub fn record(
        &mut self,
        mode: Mode,
        result: Option<&SolveResult>,
        error: Option<String>,
    ) -> Result<()> {
        self.record.apply(mode, result, error);
        let json = serde_json::to_string_pretty(&self.record)
            .context("Failed to serialize status record")?;
        write_atomic(&self.path, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Equatorial;
    use tempfile::TempDir;

    fn fix(ra: f64, dec: f64) -> SolveResult {
        SolveResult::solved(Equatorial::new(ra, dec), None, None, Some(0.8))
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let record = read(&dir.path().join("status.json")).unwrap();
        assert_eq!(record, StatusRecord::default());
    }

    #[test]
    fn test_solve_with_coordinates_replaces_fix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        let mut writer = StatusWriter::open(path.clone());

        let result = fix(83.82, -5.39);
        writer.record(Mode::Solve, Some(&result), None).unwrap();

        let stored = read(&path).unwrap();
        assert_eq!(stored.mode, Some(Mode::Solve));
        assert_eq!(stored.ra, Some(83.82));
        assert_eq!(stored.dec, Some(-5.39));
        assert_eq!(stored.confidence, Some(0.8));
        assert_eq!(stored.timestamp, Some(result.solved_at));
        assert!(stored.error.is_none());
    }

    #[test]
    fn test_other_cycles_preserve_last_fix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        let mut writer = StatusWriter::open(path.clone());
        writer.record(Mode::Solve, Some(&fix(10.0, 20.0)), None).unwrap();
        let fixed = read(&path).unwrap();

        writer
            .record(Mode::Align, Some(&SolveResult::unknown()), None)
            .unwrap();
        writer.record(Mode::Test, None, None).unwrap();
        writer
            .record(
                Mode::Solve,
                Some(&SolveResult::failed()),
                Some("no solution".to_string()),
            )
            .unwrap();

        let stored = read(&path).unwrap();
        assert_eq!(stored.mode, Some(Mode::Solve));
        assert_eq!(stored.error.as_deref(), Some("no solution"));
        assert_eq!(stored.ra, fixed.ra);
        assert_eq!(stored.dec, fixed.dec);
        assert_eq!(stored.confidence, fixed.confidence);
        assert_eq!(stored.timestamp, fixed.timestamp);
    }

    #[test]
    fn test_align_coordinates_are_ignored() {
        let mut record = StatusRecord::default();
        record.apply(Mode::Align, Some(&fix(1.0, 2.0)), None);
        assert_eq!(record.mode, Some(Mode::Align));
        assert!(record.ra.is_none());
    }

    #[test]
    fn test_reopen_keeps_previous_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        StatusWriter::open(path.clone())
            .record(Mode::Solve, Some(&fix(10.0, 20.0)), None)
            .unwrap();

        let reopened = StatusWriter::open(path);
        assert_eq!(reopened.current().ra, Some(10.0));
    }

    #[test]
    fn test_corrupt_file_is_an_error_for_readers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(read(&path).is_err());
        assert_eq!(StatusWriter::open(path).current(), &StatusRecord::default());
    }
}
