//! Core data model: documents, order keys, and per-step results.

use crate::backend::BackendKind;
use crate::error::DocumentError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Page position inferred from a filename.
///
/// A real tri-state rather than a magic number: `Unresolved` compares
/// greater than every `Page(_)`, so unresolved documents always sort last
/// no matter how many documents a run contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKey {
    /// A 1-based page number.
    Page(u32),
    /// No rule matched.
    Unresolved,
}

impl OrderKey {
    /// The wire representation: the page number, or `0` when unresolved.
    pub fn as_number(self) -> u32 {
        match self {
            OrderKey::Page(n) => n,
            OrderKey::Unresolved => 0,
        }
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (OrderKey::Page(a), OrderKey::Page(b)) => a.cmp(b),
            (OrderKey::Page(_), OrderKey::Unresolved) => Ordering::Less,
            (OrderKey::Unresolved, OrderKey::Page(_)) => Ordering::Greater,
            (OrderKey::Unresolved, OrderKey::Unresolved) => Ordering::Equal,
        }
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKey::Page(n) => write!(f, "p.{n}"),
            OrderKey::Unresolved => f.write_str("?"),
        }
    }
}

/// A harvested Word document with its resolved ordering data.
///
/// Immutable once built by [`crate::pipeline::order::OrderResolver::resolve_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Final path component.
    pub filename: String,
    /// Inferred page position.
    pub order_key: OrderKey,
    /// Filename with a leading `digits_` prefix removed; used for dedup only.
    pub logical_name: String,
}

impl Document {
    /// Output PDF name for this document inside a job's `pdfs/` directory.
    ///
    /// The position prefix keeps two `report.docx` files from different
    /// sub-folders from overwriting each other.
    pub fn pdf_name(&self, position: usize) -> String {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        format!("{position:04}_{stem}.pdf")
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Per-document conversion outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub source: Document,
    /// Set only on success.
    pub pdf_path: Option<PathBuf>,
    /// The engine that produced the PDF, or the last one tried on failure.
    pub backend: Option<BackendKind>,
    pub error: Option<DocumentError>,
}

impl ConversionResult {
    pub fn succeeded(source: Document, pdf_path: PathBuf, backend: BackendKind) -> Self {
        Self {
            source,
            pdf_path: Some(pdf_path),
            backend: Some(backend),
            error: None,
        }
    }

    pub fn failed(source: Document, backend: Option<BackendKind>, error: DocumentError) -> Self {
        Self {
            source,
            pdf_path: None,
            backend,
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.pdf_path.is_some() && self.error.is_none()
    }

    pub fn pdf_path(&self) -> Option<&Path> {
        self.pdf_path.as_deref()
    }
}

/// Outcome of a whole convert-and-merge run.
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub success: bool,
    pub total_pages: usize,
    /// Filenames of documents that could not be converted.
    pub failed: Vec<String>,
    /// Every per-document outcome, in merge order.
    #[serde(skip)]
    pub conversions: Vec<ConversionResult>,
}

impl MergeResult {
    pub fn converted_count(&self) -> usize {
        self.conversions.iter().filter(|c| c.success()).count()
    }
}
