//! Durable snapshots of accumulation state
//!
//! A [`CheckpointRecord`] captures every pipeline: accumulator state, active
//! bucket, cursor and results held for their output period, together with
//! the fingerprint of the frequency configuration that produced them.
//! Floats are stored as IEEE-754 bit patterns, so a restored pipeline
//! continues bit-for-bit like one that never stopped.
//!
//! [`CheckpointStore`] persists one record per engine as a single JSON
//! document. Writes go to a temporary file that is synced and renamed over
//! the previous checkpoint, so a crash mid-write leaves the old one intact.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::accumulator::{Accumulator, StatKind};
use crate::buckets::Bucket;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, PipelineState};
use crate::result::StatResult;

/// Format version written by this build
pub const CHECKPOINT_VERSION: u32 = 1;

/// File name used when the checkpoint path is a directory
pub const CHECKPOINT_FILE: &str = "onepass_checkpoint.json";

/// Persisted state of one (variable, statistic kind) pipeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub variable: String,
    pub kind: StatKind,
    pub dims: Vec<String>,
    pub accumulator: Accumulator,
    pub bucket: Option<Bucket>,
    pub cursor: Option<NaiveDateTime>,
    pub pending: Vec<StatResult>,
    pub pending_period: Option<(NaiveDateTime, NaiveDateTime)>,
}

/// Snapshot of a whole engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub version: u32,
    /// xxh3 fingerprint of the frequency configuration
    pub fingerprint: u64,
    /// Readable form of the fingerprinted configuration
    pub frequency: String,
    pub pipelines: Vec<PipelineSnapshot>,
}

impl CheckpointRecord {
    /// Copy the state of every pipeline.
    ///
    /// Takes shared borrows only, so no pipeline can change while the copy
    /// is made.
    pub fn capture<'a>(config: &EngineConfig, pipelines: impl IntoIterator<Item = &'a Pipeline>) -> Self {
        let pipelines = pipelines
            .into_iter()
            .map(|p| PipelineSnapshot {
                variable: p.variable.clone(),
                kind: p.kind,
                dims: p.dims.clone(),
                accumulator: p.accumulator.clone(),
                bucket: p.bucket.clone(),
                cursor: p.cursor,
                pending: p.pending.clone(),
                pending_period: p.pending_period,
            })
            .collect();

        Self {
            version: CHECKPOINT_VERSION,
            fingerprint: config.frequency().fingerprint(),
            frequency: config.frequency().describe(),
            pipelines,
        }
    }

    /// Rebuild live pipelines, validating everything before returning any.
    ///
    /// Fails with `UnsupportedCheckpointVersion` or
    /// `CheckpointConfigMismatch` when the record was written under
    /// different semantics than `config` describes.
    pub fn restore(self, config: &EngineConfig) -> Result<Vec<Pipeline>> {
        if self.version != CHECKPOINT_VERSION {
            return Err(Error::UnsupportedCheckpointVersion {
                expected: CHECKPOINT_VERSION,
                found: self.version,
            });
        }
        if self.fingerprint != config.frequency().fingerprint() {
            return Err(Error::CheckpointConfigMismatch {
                expected: config.frequency().describe(),
                found: self.frequency,
            });
        }

        let mut restored = Vec::with_capacity(self.pipelines.len());
        for snapshot in self.pipelines {
            if !config.variables().contains(&snapshot.variable) || !config.statistics().contains(&snapshot.kind) {
                return Err(Error::CheckpointConfigMismatch {
                    expected: format!("variables {:?} with statistics {:?}", config.variables(), config.statistics()),
                    found: format!("{} {}", snapshot.variable, snapshot.kind),
                });
            }
            let fresh = Accumulator::new(snapshot.kind, config.settings())?;
            if snapshot.accumulator.kind() != snapshot.kind || !snapshot.accumulator.parameters_match(&fresh) {
                return Err(Error::CheckpointConfigMismatch {
                    expected: format!("{} accumulator configured as {:?}", snapshot.kind, config.settings()),
                    found: format!("{} accumulator with different parameters", snapshot.accumulator.kind()),
                });
            }

            restored.push(Pipeline {
                variable: snapshot.variable,
                kind: snapshot.kind,
                dims: snapshot.dims,
                accumulator: snapshot.accumulator,
                bucket: snapshot.bucket,
                cursor: snapshot.cursor,
                pending: snapshot.pending,
                pending_period: snapshot.pending_period,
                state: PipelineState::Resuming,
                max_gap_steps: config.max_gap_steps(),
            });
        }
        Ok(restored)
    }
}

/// Reads and writes the checkpoint document
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// A `.json` path is used as the checkpoint file; any other path is
    /// treated as a directory holding [`CHECKPOINT_FILE`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = if path.extension().is_some_and(|ext| ext == "json") {
            path.to_path_buf()
        } else {
            path.join(CHECKPOINT_FILE)
        };
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Atomically replace the stored checkpoint with `record`
    pub fn save(&self, record: &CheckpointRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.temp_path();
        {
            let file = File::create(&temp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, record)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        info!(
            path = %self.path.display(),
            pipelines = record.pipelines.len(),
            "checkpoint written"
        );
        Ok(())
    }

    /// The stored checkpoint, if there is one.
    ///
    /// The version is checked before the rest of the document is decoded.
    pub fn load(&self) -> Result<Option<CheckpointRecord>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no checkpoint to load");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let document: serde_json::Value = serde_json::from_slice(&bytes)?;
        let version = document
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;
        if version != CHECKPOINT_VERSION {
            return Err(Error::UnsupportedCheckpointVersion {
                expected: CHECKPOINT_VERSION,
                found: version,
            });
        }

        let record: CheckpointRecord = serde_json::from_value(document)?;
        info!(
            path = %self.path.display(),
            pipelines = record.pipelines.len(),
            "checkpoint loaded"
        );
        Ok(Some(record))
    }

    /// Delete the stored checkpoint; returns whether one existed
    pub fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(step: u32) -> EngineConfig {
        EngineConfig::from_value(json!({
            "statistics": ["mean", "max"],
            "statistic_frequency": "daily",
            "output_frequency": "daily",
            "time_step_minutes": step,
            "variables": ["tas"],
            "bias_correction": false
        }))
        .unwrap()
    }

    fn pipelines(config: &EngineConfig) -> Vec<Pipeline> {
        config
            .statistics()
            .iter()
            .map(|&kind| Pipeline::new("tas", kind, config.settings(), None).unwrap())
            .collect()
    }

    #[test]
    fn test_store_paths() {
        let store = CheckpointStore::new("/tmp/run");
        assert_eq!(store.path(), Path::new("/tmp/run/onepass_checkpoint.json"));
        let store = CheckpointStore::new("/tmp/run/state.json");
        assert_eq!(store.path(), Path::new("/tmp/run/state.json"));
    }

    #[test]
    fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load().unwrap().is_none());

        let config = config(60);
        let record = CheckpointRecord::capture(&config, &pipelines(&config));
        store.save(&record).unwrap();
        assert!(!store.temp_path().exists());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, record);

        assert!(store.remove().unwrap());
        assert!(!store.remove().unwrap());
    }

    #[test]
    fn test_fingerprint_mismatch_rejected() {
        let hourly = config(60);
        let record = CheckpointRecord::capture(&hourly, &pipelines(&hourly));
        let err = record.restore(&config(30)).unwrap_err();
        assert!(matches!(err, Error::CheckpointConfigMismatch { .. }));
        assert!(err.to_string().contains("step=30m"), "{}", err);
    }

    #[test]
    fn test_unknown_statistic_rejected() {
        let config = config(60);
        let mut record = CheckpointRecord::capture(&config, &pipelines(&config));
        record.pipelines[0].kind = StatKind::Min;
        assert!(matches!(record.restore(&config), Err(Error::CheckpointConfigMismatch { .. })));
    }

    #[test]
    fn test_future_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state.json"));
        fs::write(store.path(), r#"{"version": 99, "layout": "unknown"}"#).unwrap();
        assert!(matches!(
            store.load(),
            Err(Error::UnsupportedCheckpointVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_restored_pipelines_are_resuming() {
        let config = config(60);
        let record = CheckpointRecord::capture(&config, &pipelines(&config));
        let restored = record.restore(&config).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(restored.iter().all(|p| p.state() == PipelineState::Resuming));
    }
}
