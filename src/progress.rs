//! Progress-callback trait for assembly events.
//!
//! Inject an [`Arc<dyn AssemblyProgressCallback>`] via
//! [`crate::config::AssemblyConfigBuilder::progress_callback`] (one-shot
//! runs) or let the [`crate::orchestrator::Orchestrator`] install its own
//! job tracker. Each pipeline transition fires exactly one method.
//!
//! The orchestrator folds these events into the integer
//! `(current, total, name)` form of [`crate::job::JobSnapshot::apply_progress`]:
//! `0` when documents are found, `1..=total` per document, `-1` for the merge.
//!
//! # Example
//!
//! ```rust
//! use docmerge::{AssemblyProgressCallback, AssemblyConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl AssemblyProgressCallback for Counter {
//!     fn on_document_start(&self, index: usize, total: usize, name: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{index}/{total}: {name}");
//!     }
//! }
//!
//! let config = AssemblyConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::backend::BackendKind;
use std::sync::Arc;

/// Called by the assembly pipeline as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Documents are converted one after another within a
/// run, but the orchestrator runs several jobs at once, so implementations
/// must be `Send + Sync`.
pub trait AssemblyProgressCallback: Send + Sync {
    /// Called once the resolved document list is known.
    fn on_documents_found(&self, total: usize) {
        let _ = total;
    }

    /// Called before a document is handed to the conversion chain.
    ///
    /// # Arguments
    /// * `index`: 1-based position in merge order
    /// * `total`: number of documents in the run
    /// * `name`: the document's filename
    fn on_document_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a backend produced the document's PDF.
    fn on_document_complete(&self, index: usize, total: usize, backend: BackendKind) {
        let _ = (index, total, backend);
    }

    /// Called when every backend failed for a document.
    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once before the merge step begins.
    fn on_merge_start(&self, total: usize) {
        let _ = total;
    }

    /// Called after a successful merge.
    fn on_assembly_complete(&self, total_pages: usize, converted: usize, failed: usize) {
        let _ = (total_pages, converted, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AssemblyProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AssemblyConfig`].
pub type ProgressCallback = Arc<dyn AssemblyProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        found: AtomicUsize,
        merges: AtomicUsize,
        names: Mutex<Vec<String>>,
    }

    impl AssemblyProgressCallback for Recorder {
        fn on_documents_found(&self, total: usize) {
            self.found.store(total, Ordering::SeqCst);
        }

        fn on_document_start(&self, _index: usize, _total: usize, name: &str) {
            self.names.lock().unwrap().push(name.to_string());
        }

        fn on_merge_start(&self, _total: usize) {
            self.merges.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_documents_found(3);
        cb.on_document_start(1, 3, "a.docx");
        cb.on_document_complete(1, 3, BackendKind::OfficeSuite);
        cb.on_document_error(2, 3, "boom");
        cb.on_merge_start(3);
        cb.on_assembly_complete(10, 2, 1);
    }

    #[test]
    fn overridden_methods_see_events_through_arc_dyn() {
        let rec = Arc::new(Recorder::default());
        let cb: ProgressCallback = rec.clone();
        cb.on_documents_found(2);
        cb.on_document_start(1, 2, "a.docx");
        cb.on_document_complete(1, 2, BackendKind::OfficeSuite);
        cb.on_document_start(2, 2, "b.docx");
        cb.on_merge_start(2);

        assert_eq!(rec.found.load(Ordering::SeqCst), 2);
        assert_eq!(*rec.names.lock().unwrap(), vec!["a.docx", "b.docx"]);
        assert_eq!(rec.merges.load(Ordering::SeqCst), 1);
    }
}
