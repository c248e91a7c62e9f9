//! Job records: stages, the pollable progress snapshot, and preview entries.
//!
//! A [`JobSnapshot`] is an immutable value as far as pollers are concerned:
//! the worker mutates its own copy and publishes the whole record in one
//! step (see [`crate::orchestrator`]). The transition helpers here enforce
//! that the stage only moves forward.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage of a job.
///
/// `preview → found → convert → merge → done | error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    /// Harvested and ordered; waiting for `confirm`.
    Preview,
    Found,
    Convert,
    Merge,
    Done,
    Error,
}

impl JobStage {
    /// Position in the stage sequence; `done` and `error` share the last slot.
    pub fn rank(self) -> u8 {
        match self {
            JobStage::Preview => 0,
            JobStage::Found => 1,
            JobStage::Convert => 2,
            JobStage::Merge => 3,
            JobStage::Done | JobStage::Error => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Done | JobStage::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Preview => "preview",
            JobStage::Found => "found",
            JobStage::Convert => "convert",
            JobStage::Merge => "merge",
            JobStage::Done => "done",
            JobStage::Error => "error",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque job identifier (32 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque caller identity issued by an external account system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a status poll returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub stage: JobStage,
    pub total: usize,
    pub current: usize,
    pub current_file: Option<String>,
    /// Every filename handed to conversion so far, in order.
    pub seen_files: Vec<String>,
    /// Filenames that no backend could convert.
    pub failed_files: Vec<String>,
    pub total_pages: usize,
    /// Artifact filename; present exactly when `stage == done`.
    pub artifact: Option<String>,
    pub error: Option<String>,
    pub done: bool,
}

impl JobSnapshot {
    pub fn new(stage: JobStage) -> Self {
        Self {
            stage,
            total: 0,
            current: 0,
            current_file: None,
            seen_files: Vec::new(),
            failed_files: Vec::new(),
            total_pages: 0,
            artifact: None,
            error: None,
            done: false,
        }
    }

    /// Move to `stage` if that is not a step backwards.
    ///
    /// Returns `false` (and changes nothing) for regressions and for any
    /// transition out of a terminal stage.
    pub fn advance(&mut self, stage: JobStage) -> bool {
        if self.stage.is_terminal() || stage.rank() < self.stage.rank() {
            return false;
        }
        self.stage = stage;
        true
    }

    /// Apply the `(current, total, name)` progress contract.
    ///
    /// * `0` → `found`, records `total`
    /// * `1..=total` → `convert`, records index and name, appends to `seen_files`
    /// * `-1` → `merge`
    pub fn apply_progress(&mut self, current: i64, total: usize, name: &str) {
        match current {
            0 => {
                if self.advance(JobStage::Found) {
                    self.total = total;
                }
            }
            -1 => {
                self.advance(JobStage::Merge);
            }
            n if n > 0 && (n as u64) <= total as u64 => {
                if self.advance(JobStage::Convert) {
                    self.total = total;
                    self.current = n as usize;
                    self.current_file = Some(name.to_string());
                    self.seen_files.push(name.to_string());
                }
            }
            _ => {}
        }
    }

    pub fn record_failure(&mut self, name: &str) {
        if !self.stage.is_terminal() {
            self.failed_files.push(name.to_string());
        }
    }

    /// Terminal success.
    pub fn finish(&mut self, artifact: String, total_pages: usize, failed: Vec<String>) {
        if self.advance(JobStage::Done) {
            self.artifact = Some(artifact);
            self.total_pages = total_pages;
            self.failed_files = failed;
            self.current_file = None;
            self.done = true;
        }
    }

    /// Terminal failure; no artifact.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.advance(JobStage::Error) {
            self.error = Some(message.into());
            self.artifact = None;
            self.current_file = None;
            self.done = true;
        }
    }
}

/// One line of the preview list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewEntry {
    /// Index into the resolved list; what `confirm` refers to.
    pub index: usize,
    pub name: String,
    /// Inferred page, `0` when unresolved.
    pub inferred_page: u32,
}

impl PreviewEntry {
    pub fn list(documents: &[Document]) -> Vec<PreviewEntry> {
        documents
            .iter()
            .enumerate()
            .map(|(index, d)| PreviewEntry {
                index,
                name: d.filename.clone(),
                inferred_page: d.order_key.as_number(),
            })
            .collect()
    }
}

/// Returned by a two-phase submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub job_id: JobId,
    pub stage: JobStage,
    pub files: Vec<PreviewEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::OrderKey;
    use std::path::PathBuf;

    #[test]
    fn stage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStage::Convert).unwrap(), "\"convert\"");
        assert_eq!(JobStage::Error.to_string(), "error");
    }

    #[test]
    fn progress_contract_drives_stages() {
        let mut s = JobSnapshot::new(JobStage::Found);
        s.apply_progress(0, 2, "");
        assert_eq!((s.stage, s.total), (JobStage::Found, 2));

        s.apply_progress(1, 2, "a.docx");
        s.apply_progress(2, 2, "b.docx");
        assert_eq!(s.stage, JobStage::Convert);
        assert_eq!(s.current, 2);
        assert_eq!(s.current_file.as_deref(), Some("b.docx"));
        assert_eq!(s.seen_files, vec!["a.docx", "b.docx"]);

        s.apply_progress(-1, 2, "");
        assert_eq!(s.stage, JobStage::Merge);
    }

    #[test]
    fn stage_never_regresses() {
        let mut s = JobSnapshot::new(JobStage::Preview);
        assert!(s.advance(JobStage::Merge));
        assert!(!s.advance(JobStage::Convert));
        s.apply_progress(0, 5, "");
        assert_eq!(s.stage, JobStage::Merge);
        assert_eq!(s.total, 0);
    }

    #[test]
    fn terminal_is_final() {
        let mut s = JobSnapshot::new(JobStage::Found);
        s.fail("boom");
        assert!(s.done);
        s.finish("x.pdf".into(), 3, vec![]);
        assert_eq!(s.stage, JobStage::Error);
        assert!(s.artifact.is_none());
        assert_eq!(s.error.as_deref(), Some("boom"));
    }

    #[test]
    fn artifact_only_when_done() {
        let mut s = JobSnapshot::new(JobStage::Found);
        assert!(s.artifact.is_none());
        s.finish("merged.pdf".into(), 12, vec!["bad.docx".into()]);
        assert_eq!(s.stage, JobStage::Done);
        assert_eq!(s.artifact.as_deref(), Some("merged.pdf"));
        assert_eq!(s.failed_files, vec!["bad.docx"]);
    }

    #[test]
    fn preview_entries_use_wire_page_number() {
        let docs = vec![
            Document {
                path: PathBuf::from("/w/Title.docx"),
                filename: "Title.docx".into(),
                order_key: OrderKey::Page(1),
                logical_name: "Title.docx".into(),
            },
            Document {
                path: PathBuf::from("/w/notes.docx"),
                filename: "notes.docx".into(),
                order_key: OrderKey::Unresolved,
                logical_name: "notes.docx".into(),
            },
        ];
        let entries = PreviewEntry::list(&docs);
        assert_eq!(entries[0].inferred_page, 1);
        assert_eq!(entries[1].index, 1);
        assert_eq!(entries[1].inferred_page, 0);
    }

    #[test]
    fn job_ids_are_unique_hex() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
