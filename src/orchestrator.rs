//! Job orchestration: a registry of background assembly runs.
//!
//! Each job owns a [`tokio::sync::watch`] channel carrying its latest
//! [`JobSnapshot`]. The worker replaces the snapshot on every transition;
//! [`Orchestrator::status`] clones whatever is current and never waits on
//! the worker.
//!
//! ## Lifecycle
//!
//! ```text
//! preview ──confirm──▶ found ──▶ convert ──▶ merge ──▶ done
//!                        ▲                     └─────▶ error
//! submit ────────────────┘
//! ```
//!
//! Jobs stay registered until [`Orchestrator::discard`] or
//! [`Orchestrator::prune_finished`] removes them.

use crate::backend::{BackendKind, ConversionChain};
use crate::config::{AssemblyConfig, RetryPolicy};
use crate::document::{Document, MergeResult};
use crate::error::AssemblyError;
use crate::job::{JobId, JobSnapshot, JobStage, OwnerId, PreviewEntry, PreviewResponse};
use crate::mover;
use crate::pipeline::assemble::assemble;
use crate::pipeline::order::{apply_order, OrderResolver};
use crate::pipeline::source::{discover, DocumentSource, Workspace};
use crate::progress::{AssemblyProgressCallback, ProgressCallback};
use crate::storage::{JobStore, StoredJob};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{error, info, info_span, warn, Instrument};

/// A finished artifact ready for download.
#[derive(Debug, Clone)]
pub struct JobArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Where a finished job's artifact lives.
#[derive(Debug, Clone)]
struct ArtifactRecord {
    filename: String,
    path: PathBuf,
}

/// Documents resolved by `preview`, waiting for `confirm`.
struct PendingPreview {
    documents: Vec<Document>,
    workspace: Workspace,
    artifact_name: String,
}

struct JobHandle {
    id: JobId,
    owner: Option<OwnerId>,
    state: watch::Sender<JobSnapshot>,
    pending: Mutex<Option<PendingPreview>>,
    artifact: OnceLock<ArtifactRecord>,
    created_at: Instant,
    finished_at: OnceLock<Instant>,
}

impl JobHandle {
    fn new(owner: Option<OwnerId>, stage: JobStage) -> Arc<Self> {
        let (state, _) = watch::channel(JobSnapshot::new(stage));
        Arc::new(Self {
            id: JobId::generate(),
            owner,
            state,
            pending: Mutex::new(None),
            artifact: OnceLock::new(),
            created_at: Instant::now(),
            finished_at: OnceLock::new(),
        })
    }

    fn snapshot(&self) -> JobSnapshot {
        self.state.borrow().clone()
    }

    fn update(&self, f: impl FnOnce(&mut JobSnapshot)) {
        self.state.send_modify(f);
    }

    /// Terminal for longer than `max_age`, or still waiting for `confirm`
    /// more than `max_age` after the preview was created.
    fn is_stale(&self, max_age: Duration) -> bool {
        match self.finished_at.get() {
            Some(at) => at.elapsed() >= max_age,
            None => {
                self.created_at.elapsed() >= max_age
                    && self.pending.try_lock().is_ok_and(|p| p.is_some())
            }
        }
    }

    fn check_owner(&self, caller: Option<&OwnerId>) -> Result<(), AssemblyError> {
        match &self.owner {
            Some(owner) if caller != Some(owner) => Err(AssemblyError::Forbidden {
                id: self.id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn succeed(&self, record: ArtifactRecord, result: &MergeResult) {
        let filename = record.filename.clone();
        let _ = self.artifact.set(record);
        let _ = self.finished_at.set(Instant::now());
        self.update(|s| s.finish(filename, result.total_pages, result.failed.clone()));
    }

    fn fail(&self, message: String) {
        let _ = self.finished_at.set(Instant::now());
        self.update(|s| s.fail(message));
    }
}

/// Feeds pipeline events into a job's snapshot, then to an optional
/// outer observer.
struct JobTracker {
    handle: Arc<JobHandle>,
    forward: Option<ProgressCallback>,
}

impl AssemblyProgressCallback for JobTracker {
    fn on_documents_found(&self, total: usize) {
        self.handle.update(|s| s.apply_progress(0, total, ""));
        if let Some(cb) = &self.forward {
            cb.on_documents_found(total);
        }
    }

    fn on_document_start(&self, index: usize, total: usize, name: &str) {
        self.handle
            .update(|s| s.apply_progress(index as i64, total, name));
        if let Some(cb) = &self.forward {
            cb.on_document_start(index, total, name);
        }
    }

    fn on_document_complete(&self, index: usize, total: usize, backend: BackendKind) {
        if let Some(cb) = &self.forward {
            cb.on_document_complete(index, total, backend);
        }
    }

    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        self.handle.update(|s| {
            if let Some(name) = s.current_file.clone() {
                s.record_failure(&name);
            }
        });
        if let Some(cb) = &self.forward {
            cb.on_document_error(index, total, error);
        }
    }

    fn on_merge_start(&self, total: usize) {
        self.handle.update(|s| s.apply_progress(-1, total, ""));
        if let Some(cb) = &self.forward {
            cb.on_merge_start(total);
        }
    }

    fn on_assembly_complete(&self, total_pages: usize, converted: usize, failed: usize) {
        if let Some(cb) = &self.forward {
            cb.on_assembly_complete(total_pages, converted, failed);
        }
    }
}

struct Inner {
    chain: ConversionChain,
    resolver: OrderResolver,
    retry: RetryPolicy,
    store: Arc<dyn JobStore>,
    forward: Option<ProgressCallback>,
    jobs: RwLock<HashMap<JobId, Arc<JobHandle>>>,
}

/// Runs assembly jobs in the background and answers the preview/confirm
/// protocol. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Build an orchestrator with the backend chain `config` prescribes.
    pub fn new(config: &AssemblyConfig, store: Arc<dyn JobStore>) -> Result<Self, AssemblyError> {
        let chain = ConversionChain::from_config(&config.backends)?;
        Self::with_chain(config, chain, store)
    }

    /// Build an orchestrator around an explicit chain.
    pub fn with_chain(
        config: &AssemblyConfig,
        chain: ConversionChain,
        store: Arc<dyn JobStore>,
    ) -> Result<Self, AssemblyError> {
        Ok(Self {
            inner: Arc::new(Inner {
                chain,
                resolver: OrderResolver::new(&config.order)?,
                retry: config.retry,
                store,
                forward: config.progress_callback.clone(),
                jobs: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Single-phase mode: register a job and start it immediately.
    ///
    /// Discovery happens on the worker, so a source without documents
    /// shows up as stage `error` rather than as an `Err` here.
    pub async fn submit(
        &self,
        source: DocumentSource,
        owner: Option<OwnerId>,
    ) -> Result<JobId, AssemblyError> {
        let workspace = Workspace::new()?;
        let handle = JobHandle::new(owner, JobStage::Found);
        let id = handle.id.clone();
        self.register(&handle).await;
        info!("Job {id} submitted: {}", source.describe());

        let inner = Arc::clone(&self.inner);
        let span = info_span!("job", id = %id);
        tokio::spawn(
            async move {
                let artifact_name = source.artifact_name();
                match discover(&source, &workspace, &inner.resolver).await {
                    Ok(documents) => inner.run(handle, documents, workspace, artifact_name).await,
                    Err(e) => {
                        warn!("Discovery failed: {e}");
                        handle.fail(e.to_string());
                        release(workspace).await;
                    }
                }
            }
            .instrument(span),
        );
        Ok(id)
    }

    /// Two-phase mode, step one: discover and order, but do not convert.
    pub async fn preview(
        &self,
        source: DocumentSource,
        owner: Option<OwnerId>,
    ) -> Result<PreviewResponse, AssemblyError> {
        let workspace = Workspace::new()?;
        let documents = match discover(&source, &workspace, &self.inner.resolver).await {
            Ok(docs) => docs,
            Err(e) => {
                release(workspace).await;
                return Err(e);
            }
        };

        let handle = JobHandle::new(owner, JobStage::Preview);
        let files = PreviewEntry::list(&documents);
        handle.update(|s| s.total = documents.len());
        *handle.pending.lock().await = Some(PendingPreview {
            documents,
            workspace,
            artifact_name: source.artifact_name(),
        });
        self.register(&handle).await;
        info!("Job {} awaiting confirmation of {} file(s)", handle.id, files.len());

        Ok(PreviewResponse {
            job_id: handle.id.clone(),
            stage: JobStage::Preview,
            files,
        })
    }

    /// Two-phase mode, step two: convert in the caller's order.
    ///
    /// `order` holds indices into the preview list; out-of-range entries
    /// are dropped and repeats are kept. An empty result is rejected and
    /// the job stays in `preview`.
    pub async fn confirm(
        &self,
        id: &JobId,
        order: &[i64],
        caller: Option<&OwnerId>,
    ) -> Result<(), AssemblyError> {
        let handle = self.lookup(id).await?;
        handle.check_owner(caller)?;

        let mut slot = handle.pending.lock().await;
        let Some(pending) = slot.as_ref() else {
            return Err(AssemblyError::JobNotInPreview {
                id: id.to_string(),
                stage: handle.snapshot().stage,
            });
        };
        let documents = apply_order(&pending.documents, order)?;
        let Some(pending) = slot.take() else {
            return Err(AssemblyError::Internal("pending preview vanished".into()));
        };
        drop(slot);

        info!("Job {id} confirmed with {} file(s)", documents.len());
        let inner = Arc::clone(&self.inner);
        let span = info_span!("job", id = %id);
        tokio::spawn(
            async move {
                inner
                    .run(handle, documents, pending.workspace, pending.artifact_name)
                    .await;
            }
            .instrument(span),
        );
        Ok(())
    }

    /// The job's current snapshot.
    pub async fn status(&self, id: &JobId) -> Result<JobSnapshot, AssemblyError> {
        Ok(self.lookup(id).await?.snapshot())
    }

    /// A receiver that sees every snapshot the worker publishes from now on.
    pub async fn subscribe(&self, id: &JobId) -> Result<watch::Receiver<JobSnapshot>, AssemblyError> {
        Ok(self.lookup(id).await?.state.subscribe())
    }

    /// The artifact of a finished job.
    pub async fn result(&self, id: &JobId, caller: Option<&OwnerId>) -> Result<JobArtifact, AssemblyError> {
        let handle = self.lookup(id).await?;
        handle.check_owner(caller)?;

        let snapshot = handle.snapshot();
        let record = match (snapshot.stage, handle.artifact.get()) {
            (JobStage::Done, Some(record)) => record.clone(),
            (stage, _) => {
                return Err(AssemblyError::ResultNotReady {
                    id: id.to_string(),
                    stage,
                })
            }
        };

        match tokio::fs::read(&record.path).await {
            Ok(bytes) => Ok(JobArtifact {
                filename: record.filename,
                bytes,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssemblyError::ArtifactMissing { path: record.path })
            }
            Err(e) => Err(AssemblyError::Storage(format!(
                "cannot read {}: {e}",
                record.path.display()
            ))),
        }
    }

    /// Prior jobs of `owner`, newest first.
    pub async fn history(&self, owner: &OwnerId) -> Result<Vec<StoredJob>, AssemblyError> {
        self.inner.store.list(owner).await
    }

    /// Forget a job. A pending preview's workspace is removed; a running
    /// worker finishes on its own but can no longer be polled.
    pub async fn discard(&self, id: &JobId) -> Result<(), AssemblyError> {
        let handle = self
            .inner
            .jobs
            .write()
            .await
            .remove(id)
            .ok_or_else(|| AssemblyError::JobNotFound { id: id.to_string() })?;
        if let Some(pending) = handle.pending.lock().await.take() {
            release(pending.workspace).await;
        }
        info!("Job {id} discarded");
        Ok(())
    }

    /// Drop terminal jobs that finished more than `max_age` ago, and
    /// previews left unconfirmed for longer than `max_age` (their
    /// workspaces are removed). Running jobs are never touched.
    /// Returns how many jobs were removed.
    pub async fn prune_finished(&self, max_age: Duration) -> usize {
        let mut stale = Vec::new();
        {
            let mut jobs = self.inner.jobs.write().await;
            jobs.retain(|_, h| {
                if h.is_stale(max_age) {
                    stale.push(Arc::clone(h));
                    false
                } else {
                    true
                }
            });
        }
        for handle in &stale {
            if let Some(pending) = handle.pending.lock().await.take() {
                release(pending.workspace).await;
            }
        }
        if !stale.is_empty() {
            info!("Pruned {} stale job(s)", stale.len());
        }
        stale.len()
    }

    async fn register(&self, handle: &Arc<JobHandle>) {
        self.inner
            .jobs
            .write()
            .await
            .insert(handle.id.clone(), Arc::clone(handle));
    }

    async fn lookup(&self, id: &JobId) -> Result<Arc<JobHandle>, AssemblyError> {
        self.inner
            .jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AssemblyError::JobNotFound { id: id.to_string() })
    }
}

impl Inner {
    /// Worker body: assemble, relocate, record. Always ends in a terminal stage.
    async fn run(
        &self,
        handle: Arc<JobHandle>,
        documents: Vec<Document>,
        workspace: Workspace,
        artifact_name: String,
    ) {
        let tracker = JobTracker {
            handle: Arc::clone(&handle),
            forward: self.forward.clone(),
        };

        let outcome = match assemble(
            &documents,
            &self.chain,
            &workspace.pdf_dir(),
            &workspace.merged_path(),
            &tracker,
        )
        .await
        {
            Ok(result) => self
                .store_artifact(&handle, &workspace, &artifact_name, result.total_pages)
                .await
                .map(|record| (record, result)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((record, result)) => {
                info!(
                    "Done: {} ({} pages, {} not converted)",
                    record.filename,
                    result.total_pages,
                    result.failed.len()
                );
                handle.succeed(record, &result);
            }
            Err(e) => {
                error!("Job failed: {e}");
                handle.fail(e.to_string());
            }
        }
        release(workspace).await;
    }

    /// Move the merged PDF into durable storage and record owned jobs.
    async fn store_artifact(
        &self,
        handle: &JobHandle,
        workspace: &Workspace,
        artifact_name: &str,
        total_pages: usize,
    ) -> Result<ArtifactRecord, AssemblyError> {
        let dir = self.store.artifact_dir(handle.owner.as_ref());
        let destination = mover::reserve_destination(&dir, artifact_name)
            .await
            .map_err(|e| AssemblyError::OutputWriteFailed {
                path: dir.join(artifact_name),
                source: e,
            })?;
        if let Err(e) = mover::relocate(&workspace.merged_path(), &destination, self.retry).await {
            let _ = tokio::fs::remove_file(&destination).await;
            return Err(AssemblyError::OutputWriteFailed {
                path: destination,
                source: e,
            });
        }

        let Some(owner) = &handle.owner else {
            return Ok(ArtifactRecord {
                filename: artifact_name.to_string(),
                path: destination,
            });
        };

        let filename = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| artifact_name.to_string());
        self.store
            .save(StoredJob::new(
                owner.clone(),
                handle.id.clone(),
                filename.clone(),
                destination.clone(),
                total_pages,
            ))
            .await?;
        Ok(ArtifactRecord {
            filename,
            path: destination,
        })
    }
}

/// Remove a workspace off the async threads; errors are ignored.
async fn release(workspace: Workspace) {
    let _ = tokio::task::spawn_blocking(move || workspace.cleanup()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::PdfBackend;
    use crate::pipeline::merge::page_count;
    use crate::storage::MemoryJobStore;
    use std::path::Path;
    use tempfile::TempDir;

    fn orchestrator(store_dir: &Path) -> Orchestrator {
        let config = AssemblyConfig::default();
        let chain = ConversionChain::new(vec![Arc::new(PdfBackend)]);
        Orchestrator::with_chain(&config, chain, Arc::new(MemoryJobStore::new(store_dir))).unwrap()
    }

    fn folder(root: &Path, names: &[&str]) -> DocumentSource {
        let dir = root.join("in");
        std::fs::create_dir_all(&dir).unwrap();
        for name in names {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        DocumentSource::Folder(dir)
    }

    async fn wait_done(orch: &Orchestrator, id: &JobId) -> JobSnapshot {
        let mut rx = orch.subscribe(id).await.unwrap();
        let snap = rx.wait_for(|s| s.done).await.unwrap().clone();
        snap
    }

    #[tokio::test]
    async fn submit_runs_to_done() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir.path().join("store"));
        let source = folder(dir.path(), &["стр 2.docx", "стр 1.docx", "bad стр 3.docx"]);

        let id = orch.submit(source, None).await.unwrap();
        let snap = wait_done(&orch, &id).await;

        assert_eq!(snap.stage, JobStage::Done);
        assert_eq!(snap.total, 3);
        assert_eq!(snap.total_pages, 4);
        assert_eq!(snap.seen_files, vec!["стр 1.docx", "стр 2.docx", "bad стр 3.docx"]);
        assert_eq!(snap.failed_files, vec!["bad стр 3.docx"]);

        let artifact = orch.result(&id, None).await.unwrap();
        assert_eq!(artifact.filename, "merged.pdf");
        assert!(artifact.bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn submit_without_documents_ends_in_error() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(dir.path());
        let id = orch.submit(folder(dir.path(), &["notes.txt"]), None).await.unwrap();

        let snap = wait_done(&orch, &id).await;
        assert_eq!(snap.stage, JobStage::Error);
        assert!(snap.error.unwrap().contains("No Word documents"));
        assert!(matches!(
            orch.result(&id, None).await,
            Err(AssemblyError::ResultNotReady { .. })
        ));
    }

    #[tokio::test]
    async fn all_failures_end_in_error_listing_names() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(dir.path());
        let id = orch
            .submit(folder(dir.path(), &["bad1.docx", "bad2.docx"]), None)
            .await
            .unwrap();
        let snap = wait_done(&orch, &id).await;
        assert_eq!(snap.stage, JobStage::Error);
        let msg = snap.error.unwrap();
        assert!(msg.contains("bad1.docx") && msg.contains("bad2.docx"));
    }

    #[tokio::test]
    async fn confirm_uses_caller_order() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir.path().join("store"));
        let preview = orch
            .preview(folder(dir.path(), &["стр 1.docx", "стр 2.docx"]), None)
            .await
            .unwrap();
        assert_eq!(preview.stage, JobStage::Preview);
        assert_eq!(preview.files[0].name, "стр 1.docx");
        assert_eq!(preview.files[1].inferred_page, 2);
        assert_eq!(orch.status(&preview.job_id).await.unwrap().stage, JobStage::Preview);

        orch.confirm(&preview.job_id, &[1, 0, 7], None).await.unwrap();
        let snap = wait_done(&orch, &preview.job_id).await;
        assert_eq!(snap.stage, JobStage::Done);
        assert_eq!(snap.seen_files, vec!["стр 2.docx", "стр 1.docx"]);
    }

    #[tokio::test]
    async fn empty_order_keeps_job_in_preview() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(dir.path());
        let preview = orch
            .preview(folder(dir.path(), &["a.docx"]), None)
            .await
            .unwrap();

        assert!(matches!(
            orch.confirm(&preview.job_id, &[5, -1], None).await,
            Err(AssemblyError::EmptyOrder)
        ));
        assert_eq!(orch.status(&preview.job_id).await.unwrap().stage, JobStage::Preview);

        orch.confirm(&preview.job_id, &[0], None).await.unwrap();
        assert!(matches!(
            orch.confirm(&preview.job_id, &[0], None).await,
            Err(AssemblyError::JobNotInPreview { .. })
        ));
        wait_done(&orch, &preview.job_id).await;
    }

    #[tokio::test]
    async fn owned_jobs_are_saved_and_guarded() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir.path().join("store"));
        let alice = OwnerId::from("alice");
        let bob = OwnerId::from("bob");

        let preview = orch
            .preview(folder(dir.path(), &["a.docx"]), Some(alice.clone()))
            .await
            .unwrap();
        assert!(matches!(
            orch.confirm(&preview.job_id, &[0], Some(&bob)).await,
            Err(AssemblyError::Forbidden { .. })
        ));
        orch.confirm(&preview.job_id, &[0], Some(&alice)).await.unwrap();
        wait_done(&orch, &preview.job_id).await;

        assert!(matches!(
            orch.result(&preview.job_id, None).await,
            Err(AssemblyError::Forbidden { .. })
        ));
        let artifact = orch.result(&preview.job_id, Some(&alice)).await.unwrap();
        assert_eq!(artifact.filename, "merged.pdf");

        let history = orch.history(&alice).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].job_id, preview.job_id);
        assert_eq!(history[0].total_pages, 2);
        assert_eq!(page_count(&history[0].path).unwrap(), 2);
    }

    #[tokio::test]
    async fn colliding_artifacts_get_a_prefix() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir.path().join("store"));
        let owner = OwnerId::from("u1");

        let mut names = Vec::new();
        for _ in 0..2 {
            let id = orch
                .submit(folder(dir.path(), &["a.docx"]), Some(owner.clone()))
                .await
                .unwrap();
            wait_done(&orch, &id).await;
            names.push(orch.result(&id, Some(&owner)).await.unwrap().filename);
        }
        assert_eq!(names[0], "merged.pdf");
        assert!(names[1].ends_with("_merged.pdf"));
        assert_ne!(names[0], names[1]);
    }

    #[tokio::test]
    async fn stages_never_regress() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(dir.path());
        let preview = orch
            .preview(folder(dir.path(), &["стр 1.docx", "стр 2.docx", "стр 3.docx"]), None)
            .await
            .unwrap();
        let mut rx = orch.subscribe(&preview.job_id).await.unwrap();
        orch.confirm(&preview.job_id, &[0, 1, 2], None).await.unwrap();

        let mut ranks = vec![rx.borrow_and_update().stage.rank()];
        while rx.changed().await.is_ok() {
            let snap = rx.borrow_and_update().clone();
            ranks.push(snap.stage.rank());
            if snap.done {
                break;
            }
        }
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]), "{ranks:?}");
        assert_eq!(*ranks.last().unwrap(), JobStage::Done.rank());
    }

    #[tokio::test]
    async fn discard_and_prune() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(dir.path());

        let preview = orch
            .preview(folder(dir.path(), &["a.docx"]), None)
            .await
            .unwrap();
        orch.discard(&preview.job_id).await.unwrap();
        assert!(matches!(
            orch.status(&preview.job_id).await,
            Err(AssemblyError::JobNotFound { .. })
        ));

        let id = orch.submit(folder(dir.path(), &["a.docx"]), None).await.unwrap();
        wait_done(&orch, &id).await;
        assert_eq!(orch.prune_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(orch.prune_finished(Duration::ZERO).await, 1);
        assert!(orch.status(&id).await.is_err());
    }

    #[tokio::test]
    async fn prune_sweeps_unconfirmed_previews() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(dir.path());
        let preview = orch
            .preview(folder(dir.path(), &["a.docx"]), None)
            .await
            .unwrap();
        let handle = orch.lookup(&preview.job_id).await.unwrap();
        let workspace = handle
            .pending
            .lock()
            .await
            .as_ref()
            .map(|p| p.workspace.root().to_path_buf())
            .unwrap();
        assert!(workspace.is_dir());

        assert_eq!(orch.prune_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(orch.prune_finished(Duration::ZERO).await, 1);
        assert!(!workspace.exists());
        assert!(matches!(
            orch.confirm(&preview.job_id, &[0], None).await,
            Err(AssemblyError::JobNotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_jobs_get_distinct_artifacts() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir.path().join("store"));

        let mut ids = Vec::new();
        for n in 1..=8usize {
            let input = dir.path().join(format!("in{n}"));
            std::fs::create_dir_all(&input).unwrap();
            for p in 1..=n {
                std::fs::write(input.join(format!("стр {p}.docx")), b"x").unwrap();
            }
            ids.push(orch.submit(DocumentSource::Folder(input), None).await.unwrap());
        }

        let mut paths = std::collections::HashSet::new();
        for (i, id) in ids.iter().enumerate() {
            let snap = wait_done(&orch, id).await;
            assert_eq!(snap.stage, JobStage::Done, "{:?}", snap.error);
            assert_eq!(snap.total_pages, 2 * (i + 1));

            let artifact = orch.result(id, None).await.unwrap();
            let doc = lopdf::Document::load_mem(&artifact.bytes).unwrap();
            assert_eq!(doc.get_pages().len(), snap.total_pages);

            let handle = orch.lookup(id).await.unwrap();
            let record = handle.artifact.get().unwrap();
            assert!(paths.insert(record.path.clone()), "{:?}", record.path);
        }
    }

    #[tokio::test]
    async fn unknown_job_is_reported() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(dir.path());
        let id = JobId::from("missing");
        assert!(matches!(
            orch.status(&id).await,
            Err(AssemblyError::JobNotFound { .. })
        ));
        assert!(matches!(
            orch.confirm(&id, &[0], None).await,
            Err(AssemblyError::JobNotFound { .. })
        ));
    }
}
