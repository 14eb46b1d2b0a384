//! Append-only, fsync'ed JSON-lines decision log (spec §3, §4.4, §6:
//! "every track selection, relaxation, and error must be logged").
//!
//! One file per playlist at `{decision_log_dir}/{playlist-id}.jsonl`. Each
//! `append` call opens in append mode, writes one line, and fsyncs before
//! returning, so a crash mid-batch leaves a log consistent with whatever
//! decisions were durably recorded.

use crate::error::Result;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use wavelist_common::model::{DecisionLogEntry, DecisionType};
use wavelist_common::Usd;

pub struct DecisionLogger {
    dir: PathBuf,
}

impl DecisionLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, playlist_id: Uuid) -> PathBuf {
        self.dir.join(format!("{playlist_id}.jsonl"))
    }

    /// Append one entry, fsync'd before returning.
    pub fn append(&self, entry: &DecisionLogEntry) -> Result<()> {
        let path = self.path_for(entry.playlist_id);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Convenience wrapper building and appending an entry in one call.
    pub fn record(
        &self,
        playlist_id: Uuid,
        decision_type: DecisionType,
        decision_data: serde_json::Value,
        cost_incurred: Usd,
        execution_time_ms: u64,
    ) -> Result<DecisionLogEntry> {
        let entry = DecisionLogEntry::new(
            playlist_id,
            decision_type,
            decision_data,
            cost_incurred,
            execution_time_ms,
        );
        self.append(&entry)?;
        Ok(entry)
    }

    /// Read back every entry for a playlist, in append order.
    pub fn read(&self, playlist_id: Uuid) -> Result<Vec<DecisionLogEntry>> {
        let path = self.path_for(playlist_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    /// Sum of `cost_incurred` across every entry logged for a playlist, the
    /// authoritative source for `Playlist.cost_actual` (spec §3).
    pub fn cost_summary(&self, playlist_id: Uuid) -> Result<Usd> {
        Ok(self.read(playlist_id)?.into_iter().map(|e| e.cost_incurred).sum())
    }

    pub fn log_dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DecisionLogger::new(dir.path()).unwrap();
        let playlist_id = Uuid::new_v4();

        logger
            .record(
                playlist_id,
                DecisionType::TrackSelection,
                json!({"track_id": "t1"}),
                Usd::from_str_strict("0.0010").unwrap(),
                120,
            )
            .unwrap();
        logger
            .record(
                playlist_id,
                DecisionType::Relaxation,
                json!({"step": 1}),
                Usd::ZERO,
                5,
            )
            .unwrap();

        let entries = logger.read(playlist_id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].decision_type, DecisionType::TrackSelection);
        assert_eq!(entries[1].decision_type, DecisionType::Relaxation);
    }

    #[test]
    fn cost_summary_sums_all_entries() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DecisionLogger::new(dir.path()).unwrap();
        let playlist_id = Uuid::new_v4();
        for _ in 0..3 {
            logger
                .record(
                    playlist_id,
                    DecisionType::TrackSelection,
                    json!({}),
                    Usd::from_str_strict("0.1000").unwrap(),
                    1,
                )
                .unwrap();
        }
        assert_eq!(logger.cost_summary(playlist_id).unwrap().to_string(), "0.3000");
    }

    #[test]
    fn unknown_playlist_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DecisionLogger::new(dir.path()).unwrap();
        assert!(logger.read(Uuid::new_v4()).unwrap().is_empty());
    }
}
