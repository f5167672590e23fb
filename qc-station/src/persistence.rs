//! Storage of finalized run reports.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use qc_core::results::RunReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize run report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("result store rejected the report: {0}")]
    Rejected(String),
}

/// Document written for one completed run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    #[serde(flatten)]
    pub report: RunReport,
    pub device_name: Option<String>,
    pub device_address: Option<String>,
    pub recorded_at: DateTime<Utc>,
    /// Session log lines joined with `\n`.
    pub session_log: String,
}

/// Destination for finalized runs.
pub trait ResultStore: Send {
    /// Persists `run`, returning where it was stored.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] when the run could not be stored; the
    /// caller keeps the report and may retry.
    fn save(
        &mut self,
        run: &StoredRun,
    ) -> impl Future<Output = Result<String, PersistenceError>> + Send;
}

/// Writes one pretty-printed JSON document per run into a directory.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run: &StoredRun) -> PathBuf {
        self.dir.join(format!("{}.json", run.report.session_id))
    }
}

/// Writes go through `tokio::fs`, which runs them on the blocking pool.
impl ResultStore for JsonFileStore {
    async fn save(&mut self, run: &StoredRun) -> Result<String, PersistenceError> {
        let path = self.path_for(run);
        let document = serde_json::to_string_pretty(run)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;
        fs::write(&path, document).await.map_err(io_error(&path))?;

        log::info!("Results saved to {}", path.display());
        Ok(path.display().to_string())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError {
    let path = path.to_path_buf();
    move |source| PersistenceError::Io { path, source }
}

/// In-memory store that can be told to fail.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    runs: Arc<Mutex<Vec<StoredRun>>>,
    failing: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent saves fail with `reason`, or succeed again with `None`.
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = reason.map(str::to_string);
    }

    #[must_use]
    pub fn runs(&self) -> Vec<StoredRun> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ResultStore for MemoryStore {
    async fn save(&mut self, run: &StoredRun) -> Result<String, PersistenceError> {
        if let Some(reason) = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(PersistenceError::Rejected(reason));
        }

        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        runs.push(run.clone());
        Ok(format!("memory://{}", run.report.session_id))
    }
}
