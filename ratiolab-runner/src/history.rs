//! Search history — JSONL append-only log of analysis results.
//!
//! One JSON object per line: the trial that produced the result, when it was
//! recorded, and the full `AnalysisResult`. A partially written last line is
//! skipped on read, so an interrupted search never corrupts earlier entries.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use ratiolab_core::AnalysisResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub trial: u64,
    pub recorded_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

/// JSONL history file manager.
#[derive(Debug, Clone)]
pub struct ResultHistory {
    path: PathBuf,
}

impl ResultHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append every result of one trial.
    pub fn append(&self, trial: u64, results: &[AnalysisResult]) -> io::Result<()> {
        if results.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);
        let recorded_at = Utc::now();

        for result in results {
            let entry = HistoryEntry {
                trial,
                recorded_at,
                result: result.clone(),
            };
            let json = serde_json::to_string(&entry)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(out, "{json}")?;
        }
        out.flush()
    }

    /// Get the current file size in bytes.
    pub fn file_size_bytes(&self) -> io::Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Read all entries. Malformed lines are logged and skipped.
    pub fn read_all(&self) -> io::Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut entries = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = idx + 1, error = %e, "skipping malformed history line"),
            }
        }

        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratiolab_core::domain::{parse_timestamp, HoldingRatio, OwnedAsset};

    fn result(cadence_days: u32) -> AnalysisResult {
        AnalysisResult {
            ratios: vec![HoldingRatio::new("BTC", 1.0, true)],
            cadence_days,
            start: parse_timestamp("2018-03-01").unwrap(),
            end: parse_timestamp("2018-04-01").unwrap(),
            initial_assets: vec![OwnedAsset::new("BTC", 1.0, 0.0)],
            final_assets: vec![OwnedAsset::new("BTC", 1.0, 0.0)],
            initial_value_btc: 1.0,
            final_value_btc: 1.0,
            report_currency: "USD".into(),
            final_value_report: 9000.0,
            steps: 31,
        }
    }

    #[test]
    fn append_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let history = ResultHistory::new(dir.path().join("runs").join("history.jsonl"));

        assert_eq!(history.file_size_bytes().unwrap(), 0);
        assert!(history.read_all().unwrap().is_empty());

        history.append(0, &[result(1), result(2)]).unwrap();
        history.append(1, &[result(3)]).unwrap();

        let entries = history.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].trial, 1);
        assert_eq!(entries[2].result, result(3));
        assert!(history.file_size_bytes().unwrap() > 0);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let history = ResultHistory::new(dir.path().join("history.jsonl"));
        history.append(0, &[result(1)]).unwrap();

        let mut file = OpenOptions::new().append(true).open(history.path()).unwrap();
        writeln!(file, "{{\"trial\": 1, \"recorded").unwrap();
        writeln!(file).unwrap();
        drop(file);
        history.append(2, &[result(5)]).unwrap();

        let entries = history.read_all().unwrap();
        let trials: Vec<u64> = entries.iter().map(|e| e.trial).collect();
        assert_eq!(trials, vec![0, 2]);
    }

    #[test]
    fn empty_append_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let history = ResultHistory::new(dir.path().join("history.jsonl"));
        history.append(0, &[]).unwrap();
        assert!(!history.path().exists());
    }
}
