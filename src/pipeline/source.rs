//! Document sources and the per-job working directory.
//!
//! Every entry point (zip archive, plain folder, explicit file list,
//! in-memory uploads) is reduced to a list of document paths by
//! [`prepare`]; the rest of the pipeline never knows where they came from.

use super::harvest::{harvest, is_word_document};
use super::order::OrderResolver;
use crate::document::Document;
use crate::error::AssemblyError;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Longest archive stem (in characters) kept in an artifact name.
const ARTIFACT_STEM_MAX: usize = 50;

/// One uploaded file held in memory.
#[derive(Clone)]
pub struct Upload {
    /// Client-supplied name, possibly with directories (`a\b.docx` or `a/b.docx`).
    pub name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Where a run's documents come from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// A `.zip` archive, extracted into the job workspace.
    Archive(PathBuf),
    /// A directory searched in place.
    Folder(PathBuf),
    /// Explicit documents, converted in exactly this order.
    Files(Vec<PathBuf>),
    /// Files received from a client, written into the job workspace.
    Uploads(Vec<Upload>),
}

impl DocumentSource {
    /// Classify a filesystem path as an archive or a folder.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, AssemblyError> {
        let path = path.into();
        if !path.exists() {
            return Err(AssemblyError::SourceNotFound { path });
        }
        if path.is_dir() {
            return Ok(DocumentSource::Folder(path));
        }
        let is_zip = path
            .extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case("zip"));
        if is_zip {
            Ok(DocumentSource::Archive(path))
        } else {
            Err(AssemblyError::InvalidSource {
                path,
                reason: "expected a .zip archive or a folder".into(),
            })
        }
    }

    /// Explicit lists keep the caller's order; everything else is ordered by filename.
    pub fn preserves_order(&self) -> bool {
        matches!(self, DocumentSource::Files(_))
    }

    /// Human-readable description for messages.
    pub fn describe(&self) -> String {
        match self {
            DocumentSource::Archive(p) => format!("archive '{}'", p.display()),
            DocumentSource::Folder(p) => format!("folder '{}'", p.display()),
            DocumentSource::Files(list) => format!("{} listed file(s)", list.len()),
            DocumentSource::Uploads(list) => format!("{} uploaded file(s)", list.len()),
        }
    }

    /// Default artifact filename: the archive stem (at most 50 characters),
    /// `report.pdf` for an archive without a usable stem, `merged.pdf` otherwise.
    pub fn artifact_name(&self) -> String {
        match self {
            DocumentSource::Archive(p) => {
                let stem: String = p
                    .file_stem()
                    .map(|s| s.to_string_lossy().trim().to_string())
                    .unwrap_or_default()
                    .chars()
                    .take(ARTIFACT_STEM_MAX)
                    .collect();
                let stem = stem.trim();
                if stem.is_empty() {
                    "report.pdf".to_string()
                } else {
                    format!("{stem}.pdf")
                }
            }
            _ => "merged.pdf".to_string(),
        }
    }
}

/// Scratch space owned by one job; removed when dropped.
///
/// ```text
/// <tmp>/docmerge-XXXX/
///   source/    extracted or uploaded documents
///   pdfs/      one PDF per converted document
///   merged.pdf the artifact before it is relocated
/// ```
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self, AssemblyError> {
        let dir = tempfile::Builder::new()
            .prefix("docmerge-")
            .tempdir()
            .map_err(|e| AssemblyError::Internal(format!("cannot create work dir: {e}")))?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_dir(&self) -> PathBuf {
        self.dir.path().join("source")
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.dir.path().join("pdfs")
    }

    pub fn merged_path(&self) -> PathBuf {
        self.dir.path().join("merged.pdf")
    }

    /// Remove the directory now, ignoring errors.
    pub fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            debug!("Work dir {} not fully removed: {e}", path.display());
        }
    }
}

/// Turn a source into candidate document paths, materialising archives
/// and uploads under `scratch` (normally [`Workspace::source_dir`]).
///
/// Blocking (archive extraction, directory walk); call from
/// `spawn_blocking` inside async code.
pub fn prepare(source: &DocumentSource, scratch: &Path) -> Result<Vec<PathBuf>, AssemblyError> {
    let paths = match source {
        DocumentSource::Archive(archive) => {
            extract_archive(archive, scratch)?;
            harvest(scratch)?
        }
        DocumentSource::Folder(folder) => harvest(folder)?,
        DocumentSource::Files(files) => explicit_files(files),
        DocumentSource::Uploads(uploads) => {
            write_uploads(uploads, scratch)?;
            harvest(scratch)?
        }
    };

    if paths.is_empty() {
        return Err(AssemblyError::NoDocuments {
            source_desc: source.describe(),
        });
    }
    Ok(paths)
}

/// Prepare `source` and resolve the merge order of what it yields.
///
/// Explicit file lists keep the caller's order (each file still gets its
/// inferred key for display); everything else is sorted and deduplicated.
pub async fn discover(
    source: &DocumentSource,
    workspace: &Workspace,
    resolver: &OrderResolver,
) -> Result<Vec<Document>, AssemblyError> {
    let owned = source.clone();
    let scratch = workspace.source_dir();
    let paths = tokio::task::spawn_blocking(move || prepare(&owned, &scratch))
        .await
        .map_err(|e| AssemblyError::Internal(format!("discovery task failed: {e}")))??;

    let documents = if source.preserves_order() {
        paths.into_iter().map(|p| resolver.resolve_document(p)).collect()
    } else {
        resolver.resolve_order(paths)
    };
    info!("Resolved {} document(s) from {}", documents.len(), source.describe());
    Ok(documents)
}

fn explicit_files(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    files
        .iter()
        .map(|p| std::path::absolute(p).unwrap_or_else(|_| p.clone()))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Relative path from an untrusted entry name, or `None` if the name could
/// land outside the destination.
fn safe_relative(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut out = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// Extract the Word documents of a zip archive into `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize, AssemblyError> {
    let archive_err = |detail: String| AssemblyError::Archive {
        path: archive.to_path_buf(),
        detail,
    };

    let file = File::open(archive).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AssemblyError::SourceNotFound {
            path: archive.to_path_buf(),
        },
        _ => archive_err(e.to_string()),
    })?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| archive_err(e.to_string()))?;

    ensure_dir(dest)?;
    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut entry = match zip.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable archive entry #{i} in {}: {e}", archive.display());
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let raw_name = entry.name().to_string();
        let Some(rel) = safe_relative(&raw_name) else {
            warn!("Skipping archive entry outside the work dir: {raw_name}");
            continue;
        };
        if !is_word_document(&rel) {
            continue;
        }
        if entry.encrypted() {
            warn!("Skipping encrypted archive entry: {raw_name}");
            continue;
        }

        let out_path = dest.join(&rel);
        if let Some(parent) = out_path.parent() {
            ensure_dir(parent)?;
        }
        let mut out = File::create(&out_path).map_err(|e| AssemblyError::OutputWriteFailed {
            path: out_path.clone(),
            source: e,
        })?;
        std::io::copy(&mut entry, &mut out).map_err(|e| archive_err(format!("{raw_name}: {e}")))?;
        extracted += 1;
    }

    debug!("Extracted {extracted} document(s) from {}", archive.display());
    Ok(extracted)
}

/// Write the Word documents among `uploads` into `dest`.
pub fn write_uploads(uploads: &[Upload], dest: &Path) -> Result<usize, AssemblyError> {
    ensure_dir(dest)?;
    let mut written = 0;
    for upload in uploads {
        let Some(rel) = safe_relative(&upload.name) else {
            warn!("Skipping upload with unsafe name: {}", upload.name);
            continue;
        };
        if !is_word_document(&rel) {
            debug!("Skipping non-Word upload: {}", upload.name);
            continue;
        }
        let out_path = dest.join(&rel);
        if let Some(parent) = out_path.parent() {
            ensure_dir(parent)?;
        }
        std::fs::write(&out_path, &upload.bytes).map_err(|e| AssemblyError::OutputWriteFailed {
            path: out_path.clone(),
            source: e,
        })?;
        written += 1;
    }
    Ok(written)
}

fn ensure_dir(dir: &Path) -> Result<(), AssemblyError> {
    std::fs::create_dir_all(dir).map_err(|e| AssemblyError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source: e,
    })
}
