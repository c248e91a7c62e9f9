//! Convert every document in order, then merge the results.
//!
//! Documents are converted one after another; a failed document is
//! recorded and skipped. The run is fatal only when nothing converted or
//! when the merge itself fails.

use crate::backend::ConversionChain;
use crate::document::{Document, MergeResult};
use crate::error::AssemblyError;
use crate::pipeline::merge;
use crate::progress::AssemblyProgressCallback;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Run the convert-and-merge pipeline over `documents` (already in merge
/// order), writing per-document PDFs into `pdf_dir` and the artifact to
/// `output`.
pub async fn assemble(
    documents: &[Document],
    chain: &ConversionChain,
    pdf_dir: &Path,
    output: &Path,
    progress: &dyn AssemblyProgressCallback,
) -> Result<MergeResult, AssemblyError> {
    let start = Instant::now();
    let total = documents.len();
    progress.on_documents_found(total);

    tokio::fs::create_dir_all(pdf_dir)
        .await
        .map_err(|e| AssemblyError::OutputWriteFailed {
            path: pdf_dir.to_path_buf(),
            source: e,
        })?;

    let mut conversions = Vec::with_capacity(total);
    let mut failed = Vec::new();

    // ── Convert ──────────────────────────────────────────────────────────
    for (i, doc) in documents.iter().enumerate() {
        let index = i + 1;
        progress.on_document_start(index, total, &doc.filename);

        let target = pdf_dir.join(doc.pdf_name(index));
        let result = chain.convert(doc, &target).await;

        match (&result.error, result.backend) {
            (None, Some(kind)) => progress.on_document_complete(index, total, kind),
            (Some(e), _) => {
                warn!("Not converted: {} ({e})", doc.filename);
                progress.on_document_error(index, total, &e.to_string());
                failed.push(doc.filename.clone());
            }
            (None, None) => failed.push(doc.filename.clone()),
        }
        conversions.push(result);
    }

    let inputs: Vec<PathBuf> = conversions
        .iter()
        .filter_map(|c| c.pdf_path().map(Path::to_path_buf))
        .collect();
    if inputs.is_empty() {
        error!("None of {total} documents converted");
        return Err(AssemblyError::AllConversionsFailed { total, failed });
    }

    // ── Merge ────────────────────────────────────────────────────────────
    progress.on_merge_start(total);
    let converted = inputs.len();
    let stats = merge::merge(inputs, output.to_path_buf())
        .await
        .map_err(|e| {
            error!("Merge failed: {e}");
            AssemblyError::MergeFailed {
                converted,
                failed: failed.len(),
                detail: e.to_string(),
            }
        })?;

    info!(
        "Assembled {} pages from {}/{} documents in {}ms",
        stats.total_pages,
        converted,
        total,
        start.elapsed().as_millis()
    );
    progress.on_assembly_complete(stats.total_pages, converted, failed.len());

    Ok(MergeResult {
        success: true,
        total_pages: stats.total_pages,
        failed,
        conversions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::PdfBackend;
    use crate::document::OrderKey;
    use crate::pipeline::merge::page_count;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl AssemblyProgressCallback for Events {
        fn on_documents_found(&self, total: usize) {
            self.0.lock().unwrap().push(format!("found {total}"));
        }
        fn on_document_start(&self, index: usize, total: usize, name: &str) {
            self.0.lock().unwrap().push(format!("start {index}/{total} {name}"));
        }
        fn on_document_error(&self, index: usize, _total: usize, _error: &str) {
            self.0.lock().unwrap().push(format!("error {index}"));
        }
        fn on_merge_start(&self, _total: usize) {
            self.0.lock().unwrap().push("merge".into());
        }
        fn on_assembly_complete(&self, pages: usize, converted: usize, failed: usize) {
            self.0
                .lock()
                .unwrap()
                .push(format!("done {pages} {converted} {failed}"));
        }
    }

    fn docs(dir: &Path, names: &[&str]) -> Vec<Document> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let path = dir.join(name);
                std::fs::write(&path, b"doc").unwrap();
                Document {
                    path,
                    filename: name.to_string(),
                    order_key: OrderKey::Page(i as u32 + 1),
                    logical_name: name.to_string(),
                }
            })
            .collect()
    }

    fn chain() -> ConversionChain {
        ConversionChain::new(vec![Arc::new(PdfBackend)])
    }

    #[tokio::test]
    async fn failed_documents_are_skipped_and_listed() {
        let dir = TempDir::new().unwrap();
        let documents = docs(dir.path(), &["a.docx", "bad.docx", "c.docx"]);
        let out = dir.path().join("merged.pdf");
        let events = Events::default();

        let result = assemble(&documents, &chain(), &dir.path().join("pdfs"), &out, &events)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.total_pages, 4);
        assert_eq!(result.failed, vec!["bad.docx"]);
        assert_eq!(result.converted_count(), 2);
        assert_eq!(page_count(&out).unwrap(), 4);
        assert_eq!(
            *events.0.lock().unwrap(),
            vec![
                "found 3",
                "start 1/3 a.docx",
                "start 2/3 bad.docx",
                "error 2",
                "start 3/3 c.docx",
                "merge",
                "done 4 2 1",
            ]
        );
    }

    #[tokio::test]
    async fn nothing_converted_is_fatal() {
        let dir = TempDir::new().unwrap();
        let documents = docs(dir.path(), &["bad1.docx", "bad2.docx"]);
        let events = Events::default();

        let err = assemble(
            &documents,
            &chain(),
            &dir.path().join("pdfs"),
            &dir.path().join("merged.pdf"),
            &events,
        )
        .await
        .unwrap_err();

        match err {
            AssemblyError::AllConversionsFailed { total, failed } => {
                assert_eq!(total, 2);
                assert_eq!(failed, vec!["bad1.docx", "bad2.docx"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!events.0.lock().unwrap().contains(&"merge".to_string()));
    }

    #[tokio::test]
    async fn merge_failure_reports_counts() {
        let dir = TempDir::new().unwrap();
        let documents = docs(dir.path(), &["a.docx", "bad.docx"]);
        // A directory where the artifact should go makes the final rename fail.
        let out = dir.path().join("merged.pdf");
        std::fs::create_dir_all(out.join("occupied")).unwrap();

        let err = assemble(&documents, &chain(), &dir.path().join("pdfs"), &out, &Events::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::MergeFailed {
                converted: 1,
                failed: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_chain_fails_every_document() {
        let dir = TempDir::new().unwrap();
        let documents = docs(dir.path(), &["a.docx"]);
        let err = assemble(
            &documents,
            &ConversionChain::new(vec![]),
            &dir.path().join("pdfs"),
            &dir.path().join("m.pdf"),
            &Events::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AssemblyError::AllConversionsFailed { total: 1, .. }));
    }
}
