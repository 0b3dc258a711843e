use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ErrorContext, ErrorKind, PipelineError, Result};

/// Local experiment tracker. Each training invocation gets one run
/// directory holding copied artifacts and a `run.json` record.
pub struct ExperimentTracker {
    base_dir: PathBuf,
}

/// The persisted run document.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub name: String,
    pub status: RunStatus,
    pub started_at: u64,
    pub ended_at: Option<u64>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Finished,
}

/// An open run. Parameters, metrics, and artifacts accumulate in memory and
/// on disk until `finish` seals the record.
pub struct Run {
    dir: PathBuf,
    record: RunRecord,
}

impl ExperimentTracker {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn start_run(&self, name: &str) -> Result<Run> {
        let run_id = Uuid::new_v4().simple().to_string();
        let dir = self.base_dir.join(&run_id);
        fs::create_dir_all(&dir).wrap(ErrorKind::Tracking, "failed to create run directory")?;

        let record = RunRecord {
            run_id,
            name: name.to_string(),
            status: RunStatus::Running,
            started_at: unix_now(),
            ended_at: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
        };
        let run = Run { dir, record };
        run.write_record()?;
        info!(run_id = %run.record.run_id, "started tracked run");
        Ok(run)
    }
}

impl Run {
    pub fn id(&self) -> &str {
        &self.record.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.record.params.insert(key.into(), value.into());
    }

    pub fn log_params<I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in pairs {
            self.log_param(key, value);
        }
    }

    pub fn log_metric(&mut self, key: impl Into<String>, value: f64) {
        self.record.metrics.insert(key.into(), value);
    }

    pub fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) {
        for (key, value) in metrics {
            self.log_metric(key.clone(), *value);
        }
    }

    /// Copy a file into the run's artifact store under `artifact_dir`.
    pub fn log_artifact(&mut self, source: &Path, artifact_dir: &str) -> Result<()> {
        let file_name = source.file_name().ok_or_else(|| {
            PipelineError::new(
                ErrorKind::InvalidInput,
                format!("artifact source {} has no file name", source.display()),
            )
        })?;
        let dest_dir = self.dir.join("artifacts").join(artifact_dir);
        fs::create_dir_all(&dest_dir)
            .wrap(ErrorKind::Tracking, "failed to create artifact directory")?;
        fs::copy(source, dest_dir.join(file_name)).wrap(
            ErrorKind::Tracking,
            &format!("failed to copy artifact {}", source.display()),
        )?;

        let entry = format!("{}/{}", artifact_dir, file_name.to_string_lossy());
        debug!(artifact = %entry, "artifact logged");
        self.record.artifacts.push(entry);
        Ok(())
    }

    /// Seal the run: stamp the end time and rewrite `run.json`.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.record.status = RunStatus::Finished;
        self.record.ended_at = Some(unix_now());
        self.write_record()?;
        info!(run_id = %self.record.run_id, "run finished");
        Ok(self.record_path())
    }

    fn record_path(&self) -> PathBuf {
        self.dir.join("run.json")
    }

    fn write_record(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.record)
            .wrap(ErrorKind::Tracking, "failed to serialize run record")?;
        fs::write(self.record_path(), json)
            .wrap(ErrorKind::Tracking, "failed to write run record")
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
