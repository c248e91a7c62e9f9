//! Merge engine: concatenate per-document PDFs into one artifact.
//!
//! Each input is loaded with lopdf, its objects renumbered past the ones
//! already collected, and its pages appended under a single page tree in
//! input order. Attributes a page inherits from its ancestors (`MediaBox`,
//! `Resources`, …) are copied onto the page itself, since the ancestors do
//! not survive the merge.
//!
//! The artifact is written once at the end through a `.part` file and a
//! rename. Any error fails the whole merge: no partial artifact is left
//! behind.

use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Page attributes that may be inherited through the page tree.
const INHERITABLE: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Depth guard for walking `Parent` links in malformed files.
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no input PDF exists")]
    NothingToMerge,

    #[error("cannot read '{path}': {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("'{path}' has no page tree")]
    NoPageTree { path: PathBuf },

    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("merge task failed: {0}")]
    Task(String),
}

/// What a successful merge produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub total_pages: usize,
    /// Inputs that contributed pages.
    pub merged_files: usize,
    /// Inputs skipped because they were missing on disk.
    pub skipped_files: usize,
}

/// Async wrapper running [`merge_pdfs`] on the blocking pool.
pub async fn merge(inputs: Vec<PathBuf>, output: PathBuf) -> Result<MergeStats, MergeError> {
    tokio::task::spawn_blocking(move || merge_pdfs(&inputs, &output))
        .await
        .map_err(|e| MergeError::Task(e.to_string()))?
}

/// Merge `inputs` in order into `output`, skipping inputs missing on disk.
pub fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<MergeStats, MergeError> {
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut merged_files = 0;
    let mut skipped_files = 0;

    for path in inputs {
        if !path.is_file() {
            warn!("Skipping missing PDF: {}", path.display());
            skipped_files += 1;
            continue;
        }
        let mut doc = Document::load(path).map_err(|source| MergeError::Load {
            path: path.clone(),
            source,
        })?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(MergeError::NoPageTree { path: path.clone() });
        }
        for id in &page_ids {
            pages.push((*id, flattened_page(&doc, *id)));
        }
        debug!("{}: {} page(s)", path.display(), page_ids.len());

        objects.extend(std::mem::take(&mut doc.objects));
        merged_files += 1;
    }

    if pages.is_empty() {
        return Err(MergeError::NothingToMerge);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut pages_root: Option<ObjectId> = None;

    for (id, object) in objects {
        match type_of(&object).unwrap_or(b"") {
            b"Catalog" => {
                if catalog.is_none() {
                    if let Ok(dict) = object.as_dict() {
                        catalog = Some((id, dict.clone()));
                    }
                }
            }
            b"Pages" => {
                pages_root.get_or_insert(id);
            }
            b"Page" | b"Outlines" | b"Outline" => {}
            _ => {
                merged.objects.insert(id, object);
            }
        }
    }

    let first_input = inputs.first().cloned().unwrap_or_default();
    let pages_root = pages_root.ok_or_else(|| MergeError::NoPageTree {
        path: first_input.clone(),
    })?;
    let (catalog_id, mut catalog) = catalog.ok_or(MergeError::NoPageTree { path: first_input })?;

    let total_pages = pages.len();
    let mut kids = Vec::with_capacity(total_pages);
    for (id, mut page) in pages {
        page.set("Parent", pages_root);
        merged.objects.insert(id, Object::Dictionary(page));
        kids.push(Object::Reference(id));
    }

    let mut root = Dictionary::new();
    root.set("Type", Object::Name(b"Pages".to_vec()));
    root.set("Count", Object::Integer(total_pages as i64));
    root.set("Kids", Object::Array(kids));
    merged.objects.insert(pages_root, Object::Dictionary(root));

    catalog.set("Pages", pages_root);
    catalog.remove(b"Outlines");
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));
    merged.trailer.set("Root", catalog_id);

    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.compress();

    write_atomically(&mut merged, output)?;
    info!(
        "Merged {} file(s), {} page(s) → {}",
        merged_files,
        total_pages,
        output.display()
    );

    Ok(MergeStats {
        total_pages,
        merged_files,
        skipped_files,
    })
}

/// Count the pages of a PDF on disk.
pub fn page_count(path: &Path) -> Result<usize, MergeError> {
    Document::load(path)
        .map(|d| d.get_pages().len())
        .map_err(|source| MergeError::Load {
            path: path.to_path_buf(),
            source,
        })
}

/// The `/Type` name of a dictionary or stream object.
fn type_of(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(d) => d,
        Object::Stream(s) => &s.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(Object::as_name).ok()
}

/// The page dictionary with inherited attributes made explicit.
fn flattened_page(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut page = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .cloned()
        .unwrap_or_else(|_| Dictionary::new());

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_object(parent_id).and_then(Object::as_dict) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    page
}

fn write_atomically(doc: &mut Document, output: &Path) -> Result<(), MergeError> {
    let write_err = |source| MergeError::Write {
        path: output.to_path_buf(),
        source,
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut part = output.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let result = (|| {
        let file = File::create(&part)?;
        let mut writer = BufWriter::new(file);
        doc.save_to(&mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        std::fs::rename(&part, output)
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&part);
        return Err(write_err(e));
    }
    Ok(())
}
