//! Durable storage for finished artifacts.
//!
//! The orchestrator asks the store where an owner's artifacts live, moves
//! the merged PDF there, and calls [`JobStore::save`] once per successful
//! owned job. [`JobStore::list`] backs the history query. Nothing else
//! reads the store.

use crate::config::AssemblyConfig;
use crate::error::AssemblyError;
use crate::job::{JobId, OwnerId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Name of the per-owner index file.
const INDEX_FILE: &str = "jobs.json";

/// One finished job as recorded in durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredJob {
    pub owner: OwnerId,
    pub job_id: JobId,
    /// Download name of the artifact.
    pub filename: String,
    pub path: PathBuf,
    pub total_pages: usize,
    /// Unix seconds.
    pub created_at: u64,
}

impl StoredJob {
    pub fn new(
        owner: OwnerId,
        job_id: JobId,
        filename: impl Into<String>,
        path: impl Into<PathBuf>,
        total_pages: usize,
    ) -> Self {
        Self {
            owner,
            job_id,
            filename: filename.into(),
            path: path.into(),
            total_pages,
            created_at: unix_now(),
        }
    }
}

/// Storage collaborator used at job completion.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Directory artifacts are relocated into; `None` for owner-less jobs.
    fn artifact_dir(&self, owner: Option<&OwnerId>) -> PathBuf;

    /// Record a finished job.
    async fn save(&self, job: StoredJob) -> Result<(), AssemblyError>;

    /// Prior jobs of `owner`, newest first.
    async fn list(&self, owner: &OwnerId) -> Result<Vec<StoredJob>, AssemblyError>;
}

/// Filesystem store: one directory per owner holding the artifacts and a
/// JSON index.
///
/// ```text
/// <root>/<owner>/jobs.json
/// <root>/<owner>/<artifact>.pdf
/// <shared>/<artifact>.pdf      owner-less jobs
/// ```
#[derive(Debug)]
pub struct DirectoryJobStore {
    root: PathBuf,
    shared: PathBuf,
    index_lock: tokio::sync::Mutex<()>,
}

impl DirectoryJobStore {
    pub fn new(root: impl Into<PathBuf>, shared: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            shared: shared.into(),
            index_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Store rooted at `config.data_dir`, keeping owner-less artifacts in
    /// `config.artifact_dir`.
    pub fn from_config(config: &AssemblyConfig) -> Self {
        Self::new(&config.data_dir, &config.artifact_dir)
    }

    fn owner_dir(&self, owner: &OwnerId) -> PathBuf {
        self.root.join(owner_dir_name(owner))
    }

    async fn read_index(path: &Path) -> Result<Vec<StoredJob>, AssemblyError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AssemblyError::Storage(format!("corrupt index {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AssemblyError::Storage(format!("cannot read {}: {e}", path.display()))),
        }
    }

    async fn write_index(path: &Path, jobs: &[StoredJob]) -> Result<(), AssemblyError> {
        let body = serde_json::to_vec_pretty(jobs)
            .map_err(|e| AssemblyError::Storage(format!("cannot encode index: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        let write_err = |e: std::io::Error| AssemblyError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        };
        tokio::fs::write(&tmp, body).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_err)
    }
}

#[async_trait]
impl JobStore for DirectoryJobStore {
    fn artifact_dir(&self, owner: Option<&OwnerId>) -> PathBuf {
        match owner {
            Some(owner) => self.owner_dir(owner),
            None => self.shared.clone(),
        }
    }

    async fn save(&self, job: StoredJob) -> Result<(), AssemblyError> {
        let dir = self.owner_dir(&job.owner);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AssemblyError::OutputWriteFailed {
                path: dir.clone(),
                source: e,
            })?;
        let index = dir.join(INDEX_FILE);

        let _guard = self.index_lock.lock().await;
        let mut jobs = Self::read_index(&index).await?;
        jobs.retain(|j| j.job_id != job.job_id);
        debug!("Recording job {} for owner {}", job.job_id, job.owner);
        jobs.insert(0, job);
        Self::write_index(&index, &jobs).await
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<StoredJob>, AssemblyError> {
        let _guard = self.index_lock.lock().await;
        Self::read_index(&self.owner_dir(owner).join(INDEX_FILE)).await
    }
}

/// In-process store; records vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    dir: PathBuf,
    jobs: Mutex<HashMap<OwnerId, Vec<StoredJob>>>,
}

impl MemoryJobStore {
    /// Artifacts of every owner are kept under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    fn artifact_dir(&self, owner: Option<&OwnerId>) -> PathBuf {
        match owner {
            Some(owner) => self.dir.join(owner_dir_name(owner)),
            None => self.dir.clone(),
        }
    }

    async fn save(&self, job: StoredJob) -> Result<(), AssemblyError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|e| AssemblyError::Internal(format!("job store lock poisoned: {e}")))?;
        let list = jobs.entry(job.owner.clone()).or_default();
        list.retain(|j| j.job_id != job.job_id);
        list.insert(0, job);
        Ok(())
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<StoredJob>, AssemblyError> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|e| AssemblyError::Internal(format!("job store lock poisoned: {e}")))?;
        Ok(jobs.get(owner).cloned().unwrap_or_default())
    }
}

/// Filesystem-safe directory name for an owner id.
fn owner_dir_name(owner: &OwnerId) -> String {
    let name: String = owner
        .as_str()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "_".to_string()
    } else {
        name
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
