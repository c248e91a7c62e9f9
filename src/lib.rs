//! # docmerge
//!
//! Assemble a pile of Word documents into one PDF, in page order.
//!
//! ## Why this crate?
//!
//! Reports often arrive as a zip of `.docx` files, one per page or section,
//! named by hand: `стр 3.docx`, `Раздел 2 стр. 12-14.docx`,
//! `Титульный лист.docx`, `005_Report.docx`. This crate infers each file's
//! position from its name, converts every document to PDF through whichever
//! engine is available, and merges the results into a single artifact.
//!
//! ## Pipeline Overview
//!
//! ```text
//! zip / folder / file list / uploads
//!  │
//!  ├─ 1. Source    extract or locate the input (spawn_blocking)
//!  ├─ 2. Harvest   recursive .doc/.docx discovery, path dedup
//!  ├─ 3. Order     page keys from filenames, (key, name) dedup
//!  ├─ 4. Convert   native automation │ cloud service → office suite
//!  ├─ 5. Merge     lopdf page concatenation (spawn_blocking)
//!  └─ 6. Relocate  retry-safe move into durable storage
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docmerge::{assemble_source, AssemblyConfig, DocumentSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Backends configured from MS_GRAPH_* / DOCMERGE_* variables
//!     let config = AssemblyConfig::from_env()?;
//!     let source = DocumentSource::from_path("reports.zip")?;
//!     let result = assemble_source(source, "reports.pdf", &config).await?;
//!     eprintln!("{} pages, {} not converted", result.total_pages, result.failed.len());
//!     Ok(())
//! }
//! ```
//!
//! For background jobs with a preview/confirm step, see
//! [`orchestrator::Orchestrator`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docmerge` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docmerge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod job;
pub mod mover;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{BackendKind, ConversionBackend, ConversionChain};
pub use config::{
    AssemblyConfig, AssemblyConfigBuilder, BackendConfig, GraphCredentials, OrderRules, RetryPolicy,
};
pub use convert::{assemble_source, assemble_sync, prepare_source, PreparedRun};
pub use document::{ConversionResult, Document, MergeResult, OrderKey};
pub use error::{AssemblyError, BackendError, DocumentError};
pub use job::{JobId, JobSnapshot, JobStage, OwnerId, PreviewEntry, PreviewResponse};
pub use orchestrator::{JobArtifact, Orchestrator};
pub use pipeline::source::{DocumentSource, Upload};
pub use progress::{AssemblyProgressCallback, NoopProgressCallback, ProgressCallback};
pub use storage::{DirectoryJobStore, JobStore, MemoryJobStore, StoredJob};
