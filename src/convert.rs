//! One-shot entry points: assemble a source into a PDF and wait for it.
//!
//! ## Why one-shot vs. the orchestrator?
//!
//! These functions run the whole pipeline in the caller's task and return
//! the result directly. Use [`crate::orchestrator::Orchestrator`] instead
//! when runs must go to the background and be polled, or when the order
//! has to be confirmed by someone else between discovery and conversion.

use crate::backend::ConversionChain;
use crate::config::AssemblyConfig;
use crate::document::{Document, MergeResult};
use crate::error::AssemblyError;
use crate::job::PreviewEntry;
use crate::mover;
use crate::pipeline::assemble::assemble;
use crate::pipeline::order::{apply_order, OrderResolver};
use crate::pipeline::source::{discover, DocumentSource, Workspace};
use crate::progress::{AssemblyProgressCallback, NoopProgressCallback};
use std::path::Path;
use tracing::info;

/// Discovered and ordered documents, not yet converted.
///
/// Holds the scratch workspace archives were extracted into; dropping it
/// removes the workspace.
#[derive(Debug)]
pub struct PreparedRun {
    documents: Vec<Document>,
    workspace: Workspace,
    artifact_name: String,
}

impl PreparedRun {
    /// Documents in the order they will be merged.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// The preview list a caller picks indices from.
    pub fn preview(&self) -> Vec<PreviewEntry> {
        PreviewEntry::list(&self.documents)
    }

    /// Suggested artifact filename for this source.
    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// Replace the merge order with indices into [`Self::documents`].
    /// Out-of-range indices are dropped; an empty result is an error and
    /// leaves the order unchanged.
    pub fn reorder(&mut self, order: &[i64]) -> Result<(), AssemblyError> {
        self.documents = apply_order(&self.documents, order)?;
        Ok(())
    }

    /// Convert and merge into `output` using the chain `config` prescribes.
    pub async fn assemble(
        self,
        output: impl AsRef<Path>,
        config: &AssemblyConfig,
    ) -> Result<MergeResult, AssemblyError> {
        let chain = ConversionChain::from_config(&config.backends)?;
        self.assemble_with_chain(output, config, &chain).await
    }

    /// Like [`Self::assemble`] with an explicit chain.
    pub async fn assemble_with_chain(
        self,
        output: impl AsRef<Path>,
        config: &AssemblyConfig,
        chain: &ConversionChain,
    ) -> Result<MergeResult, AssemblyError> {
        let output = output.as_ref();
        let noop = NoopProgressCallback;
        let progress: &dyn AssemblyProgressCallback = match &config.progress_callback {
            Some(cb) => cb.as_ref(),
            None => &noop,
        };

        let outcome = async {
            let result = assemble(
                &self.documents,
                chain,
                &self.workspace.pdf_dir(),
                &self.workspace.merged_path(),
                progress,
            )
            .await?;
            mover::relocate(&self.workspace.merged_path(), output, config.retry)
                .await
                .map_err(|e| AssemblyError::OutputWriteFailed {
                    path: output.to_path_buf(),
                    source: e,
                })?;
            Ok(result)
        }
        .await;

        self.workspace.cleanup();
        if let Ok(result) = &outcome {
            info!("Wrote {} ({} pages)", output.display(), result.total_pages);
        }
        outcome
    }
}

/// Discover the documents of `source` and resolve their order without
/// converting anything.
///
/// # Example
/// ```rust,no_run
/// use docmerge::{prepare_source, AssemblyConfig, DocumentSource};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AssemblyConfig::default();
/// let run = prepare_source(DocumentSource::from_path("reports.zip")?, &config).await?;
/// for entry in run.preview() {
///     println!("{:>3}  p.{:<4} {}", entry.index, entry.inferred_page, entry.name);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn prepare_source(
    source: DocumentSource,
    config: &AssemblyConfig,
) -> Result<PreparedRun, AssemblyError> {
    let resolver = OrderResolver::new(&config.order)?;
    let workspace = Workspace::new()?;
    let documents = match discover(&source, &workspace, &resolver).await {
        Ok(docs) => docs,
        Err(e) => {
            workspace.cleanup();
            return Err(e);
        }
    };
    Ok(PreparedRun {
        documents,
        workspace,
        artifact_name: source.artifact_name(),
    })
}

/// Assemble `source` into one PDF at `output`.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(MergeResult)` on success, even if some documents failed
/// (check `result.failed`).
///
/// # Errors
/// Returns `Err(AssemblyError)` only for fatal errors:
/// - source missing or holding no Word documents
/// - no document converted
/// - the merge or the final write failed
pub async fn assemble_source(
    source: DocumentSource,
    output: impl AsRef<Path>,
    config: &AssemblyConfig,
) -> Result<MergeResult, AssemblyError> {
    info!("Starting assembly: {}", source.describe());
    prepare_source(source, config).await?.assemble(output, config).await
}

/// Synchronous wrapper around [`assemble_source`].
///
/// Creates a temporary tokio runtime internally.
pub fn assemble_sync(
    source: DocumentSource,
    output: impl AsRef<Path>,
    config: &AssemblyConfig,
) -> Result<MergeResult, AssemblyError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AssemblyError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(assemble_source(source, output, config))
}
