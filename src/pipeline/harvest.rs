//! File harvesting: recursive discovery of Word documents under a root.
//!
//! Traversal is sorted by file name at every level so the "first
//! encountered" rule used by deduplication is reproducible across
//! platforms. Symlinks are followed and every hit is canonicalised, so a
//! file reachable through two paths is reported once.

use crate::error::AssemblyError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions accepted as Word documents (compared case-insensitively).
pub const WORD_EXTENSIONS: &[&str] = &["doc", "docx"];

/// True for `.doc`/`.docx` names that are not editor lock files or
/// AppleDouble resource forks.
pub fn is_word_document(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    if name.starts_with("~$") || name.starts_with("._") {
        return false;
    }
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| WORD_EXTENSIONS.contains(&e.as_str()))
}

/// Collect every Word document under `root`, in traversal order.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn harvest(root: &Path) -> Result<Vec<PathBuf>, AssemblyError> {
    if !root.exists() {
        return Err(AssemblyError::SourceNotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(AssemblyError::InvalidSource {
            path: root.to_path_buf(),
            reason: "not a directory".into(),
        });
    }

    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_word_document(entry.path()) {
            continue;
        }

        let canonical = std::fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path().to_path_buf());
        if !seen.insert(canonical.clone()) {
            debug!("Already harvested: {}", entry.path().display());
            continue;
        }
        found.push(canonical);
    }

    debug!("Harvested {} document(s) under {}", found.len(), root.display());
    Ok(found)
}
