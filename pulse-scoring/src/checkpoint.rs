// Pulse Scoring - Online anomaly scoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Engine checkpoints.
//!
//! Baselines live in memory; a checkpoint externalizes them so a restart
//! does not send every stream back through warm-up.

use crate::baseline::ScoringState;
use crate::config::ScoringModel;
use chrono::{DateTime, Utc};
use pulse::StreamId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Checkpoint errors.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Unsupported checkpoint version {found} (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u32 },

    #[error("Checkpoint was taken with model {found:?}, engine runs {expected:?}")]
    ModelMismatch {
        expected: ScoringModel,
        found: ScoringModel,
    },
}

/// Serialized baselines of every stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCheckpoint {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub model: ScoringModel,
    pub streams: BTreeMap<StreamId, ScoringState>,
}

impl EngineCheckpoint {
    pub fn new(model: ScoringModel, streams: BTreeMap<StreamId, ScoringState>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            saved_at: Utc::now(),
            model,
            streams,
        }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Write the checkpoint as JSON.
    ///
    /// The file is written next to `path` and renamed over it, so a crash
    /// mid-write leaves the previous checkpoint intact.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let bytes = serde_json::to_vec(self)?;
        let tmp = temp_path(path);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read a checkpoint written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let bytes = fs::read(path)?;
        let checkpoint: Self = serde_json::from_slice(&bytes)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                expected: CHECKPOINT_VERSION,
                found: checkpoint.version,
            });
        }
        Ok(checkpoint)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use pulse::MetricRecord;
    use tempfile::tempdir;

    fn sample() -> EngineCheckpoint {
        let config = ScoringConfig::default();
        let mut state = ScoringState::new(&config.model);
        for (t, v) in [(1, 10.0), (2, 11.0), (3, 10.0)] {
            let record = MetricRecord::at_epoch(StreamId::default(), t, v).unwrap();
            state.observe(&record, &config);
        }
        let mut streams = BTreeMap::new();
        streams.insert(StreamId::default(), state);
        EngineCheckpoint::new(config.model, streams)
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("baselines.json");

        let checkpoint = sample();
        checkpoint.save(&path).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded = EngineCheckpoint::load(&path).unwrap();
        assert_eq!(loaded, checkpoint);
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("baselines.json");

        EngineCheckpoint::new(ScoringModel::default(), BTreeMap::new())
            .save(&path)
            .unwrap();
        sample().save(&path).unwrap();

        assert_eq!(EngineCheckpoint::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = EngineCheckpoint::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CheckpointError::Io(_)));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("baselines.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            EngineCheckpoint::load(&path).unwrap_err(),
            CheckpointError::Format(_)
        ));
    }

    #[test]
    fn test_load_rejects_future_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("baselines.json");
        let mut checkpoint = sample();
        checkpoint.version = 99;
        checkpoint.save(&path).unwrap();

        assert!(matches!(
            EngineCheckpoint::load(&path).unwrap_err(),
            CheckpointError::UnsupportedVersion { found: 99, .. }
        ));
    }
}
