//! Error types for the docmerge library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`AssemblyError`] (**fatal**): a run or a protocol call cannot proceed
//!   (no documents found, nothing converted, merge failed, unknown job id).
//!   Returned as `Err(AssemblyError)` from the top-level entry points and
//!   from the [`crate::orchestrator::Orchestrator`] protocol methods.
//!
//! * [`DocumentError`] (**non-fatal**): one document could not be converted
//!   by any backend. Stored inside [`crate::document::ConversionResult`];
//!   the batch carries on.
//!
//! * [`BackendError`]: one attempt by one engine. The conversion chain
//!   collects these and moves on to the next engine; they surface only as
//!   the reasons listed inside a [`DocumentError`].
//!
//! An unresolved order key is not an error at all: documents whose page
//! position cannot be inferred sort last (see [`crate::document::OrderKey`]).

use crate::job::JobStage;
use std::path::PathBuf;
use thiserror::Error;

/// How many failed filenames are spelled out in a user-facing message.
pub const FAILED_NAMES_SHOWN: usize = 5;

/// Join at most [`FAILED_NAMES_SHOWN`] names, appending `…` when truncated.
pub fn summarize_names(names: &[String]) -> String {
    let mut shown = names
        .iter()
        .take(FAILED_NAMES_SHOWN)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > FAILED_NAMES_SHOWN {
        shown.push_str(&format!(" … (+{} more)", names.len() - FAILED_NAMES_SHOWN));
    }
    shown
}

/// All fatal errors returned by the docmerge library.
#[derive(Debug, Error)]
pub enum AssemblyError {
    // ── Source errors ─────────────────────────────────────────────────────
    /// Input path does not exist.
    #[error("Source not found: '{path}'")]
    SourceNotFound { path: PathBuf },

    /// Input exists but is neither a directory nor a `.zip` archive.
    #[error("Unsupported source '{path}': {reason}")]
    InvalidSource { path: PathBuf, reason: String },

    /// The zip archive could not be opened or extracted.
    #[error("Failed to extract archive '{path}': {detail}")]
    Archive { path: PathBuf, detail: String },

    /// Harvesting found no `.doc`/`.docx` files.
    #[error("No Word documents (.doc/.docx) found in {source_desc}")]
    NoDocuments { source_desc: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Every document failed conversion; there is nothing to merge.
    #[error("Failed to build the PDF: none of {total} documents converted. Not converted: {}", summarize_names(.failed))]
    AllConversionsFailed { total: usize, failed: Vec<String> },

    /// The merge step failed; no partial artifact is kept.
    #[error("Failed to merge {converted} converted documents ({failed} others failed to convert): {detail}")]
    MergeFailed {
        converted: usize,
        failed: usize,
        detail: String,
    },

    // ── Protocol errors ───────────────────────────────────────────────────
    /// No job with this id is registered.
    #[error("Job '{id}' not found")]
    JobNotFound { id: String },

    /// `confirm` was called on a job that is not waiting in `preview`.
    #[error("Job '{id}' is in stage '{stage}', expected 'preview' (already started or stale)")]
    JobNotInPreview { id: String, stage: JobStage },

    /// The confirmed order contained no in-range index.
    #[error("Order is empty after dropping out-of-range indices; select at least one file")]
    EmptyOrder,

    /// The caller does not own this job.
    #[error("Access to job '{id}' denied")]
    Forbidden { id: String },

    /// `result` was called before the job reached `done` with an artifact.
    #[error("Job '{id}' has no artifact yet (stage '{stage}')")]
    ResultNotReady { id: String, stage: JobStage },

    /// The artifact was recorded but is gone from disk.
    #[error("Artifact '{path}' no longer exists")]
    ArtifactMissing { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create, write, or move an output file.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The durable storage collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, poisoned lock).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
///
/// Stored alongside [`crate::document::ConversionResult`] when every backend
/// in the applicable chain failed. The run continues unless ALL documents
/// fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The source file vanished between harvest and conversion.
    #[error("{file}: source file is missing")]
    SourceMissing { file: String },

    /// Every attempted backend failed.
    #[error("{file}: conversion failed ({})", .attempts.join("; "))]
    ConversionFailed { file: String, attempts: Vec<String> },
}

/// The outcome of a single backend attempt.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The engine's runtime (host application, executable, credentials) is missing.
    #[error("{backend}: unavailable: {reason}")]
    Unavailable { backend: &'static str, reason: String },

    /// The engine ran and reported a failure.
    #[error("{backend}: {detail}")]
    Failed { backend: &'static str, detail: String },

    /// The engine exceeded its time budget.
    #[error("{backend}: timed out after {secs}s")]
    TimedOut { backend: &'static str, secs: u64 },
}
