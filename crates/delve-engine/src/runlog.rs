//! Run summaries and the sinks that persist them.
//!
//! A [`RunSummary`] is emitted when a run ends, by death or by victory. Sinks
//! may fail; the world logs the failure and carries on.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::content::PlayerClass;
use crate::session::RunStats;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    Death { cause: String, depth: u32 },
    Victory,
}

/// Immutable record of one finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub class: PlayerClass,
    pub outcome: RunOutcome,
    pub deepest_floor: u32,
    pub turns: u64,
    pub kills: u32,
    pub items_used: u32,
    pub damage_dealt: u64,
    pub damage_taken: u64,
    /// Gold earned over the run.
    pub gold: u32,
    /// World tick at which the run ended.
    pub ended_at_tick: u64,
}

impl RunSummary {
    pub fn new(name: &str, class: PlayerClass, outcome: RunOutcome, stats: &RunStats, tick: u64) -> Self {
        Self {
            name: name.to_string(),
            class,
            outcome,
            deepest_floor: stats.deepest_floor,
            turns: stats.turns,
            kills: stats.kills,
            items_used: stats.items_used,
            damage_dealt: stats.damage_dealt,
            damage_taken: stats.damage_taken,
            gold: stats.gold_earned,
            ended_at_tick: tick,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunLogError {
    #[error("run log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("run summary could not be encoded: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only destination for run summaries.
pub trait RunLogSink: Send {
    fn record(&mut self, summary: &RunSummary) -> Result<(), RunLogError>;
}

/// One JSON object per line, appended to a file.
#[derive(Debug, Clone)]
pub struct JsonLinesRunLog {
    path: PathBuf,
}

impl JsonLinesRunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunLogSink for JsonLinesRunLog {
    fn record(&mut self, summary: &RunSummary) -> Result<(), RunLogError> {
        let mut line = serde_json::to_vec(summary)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }
}

/// Keeps summaries in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryRunLog {
    records: Arc<Mutex<Vec<RunSummary>>>,
}

impl MemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RunSummary> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RunLogSink for MemoryRunLog {
    fn record(&mut self, summary: &RunSummary) -> Result<(), RunLogError> {
        match self.records.lock() {
            Ok(mut records) => records.push(summary.clone()),
            Err(poisoned) => poisoned.into_inner().push(summary.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(outcome: RunOutcome) -> RunSummary {
        let stats = RunStats {
            deepest_floor: 3,
            turns: 120,
            kills: 9,
            ..RunStats::default()
        };
        RunSummary::new("ada", PlayerClass::Mage, outcome, &stats, 500)
    }

    #[test]
    fn json_lines_appends_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let mut log = JsonLinesRunLog::new(&path);
        log.record(&summary(RunOutcome::Victory)).unwrap();
        log.record(&summary(RunOutcome::Death {
            cause: "rat".into(),
            depth: 2,
        }))
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: RunSummary = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.outcome, RunOutcome::Victory);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["outcome"]["kind"], "death");
        assert_eq!(second["class"], "Mage");
    }

    #[test]
    fn unwritable_path_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = JsonLinesRunLog::new(dir.path().join("missing").join("runs.jsonl"));
        assert!(matches!(log.record(&summary(RunOutcome::Victory)), Err(RunLogError::Io(_))));
    }

    #[test]
    fn memory_log_clones_share_records() {
        let log = MemoryRunLog::new();
        let mut writer = log.clone();
        writer.record(&summary(RunOutcome::Victory)).unwrap();
        assert_eq!(log.records().len(), 1);
    }
}
