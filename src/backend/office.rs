//! Headless office-suite engine (LibreOffice `--convert-to`).
//!
//! LibreOffice names its output after the input stem and writes it into
//! `--outdir`, so each call gets a private scratch directory next to the
//! target; the produced file is then renamed into place. The scratch
//! directory also holds a throwaway user profile, which lets several
//! conversions run at once without fighting over the profile lock.

use super::{BackendKind, ConversionBackend};
use crate::config::BackendConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const NAME: &str = "office-suite";

/// PDF export filter: maximum image quality, lossless compression, no
/// downsampling, empty pages suppressed, standard fonts embedded.
pub const EXPORT_FILTER: &str = concat!(
    "pdf:writer_pdf_Export:{",
    r#""Quality":{"type":"long","value":"100"},"#,
    r#""UseLosslessCompression":{"type":"boolean","value":"true"},"#,
    r#""ReduceImageResolution":{"type":"boolean","value":"false"},"#,
    r#""IsSkipEmptyPages":{"type":"boolean","value":"true"},"#,
    r#""EmbedStandardFonts":{"type":"boolean","value":"true"}"#,
    "}"
);

#[derive(Debug, Clone)]
pub struct OfficeSuiteBackend {
    command: PathBuf,
    timeout: Duration,
}

impl OfficeSuiteBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            command: config.office_command(),
            timeout: Duration::from_secs(config.office_timeout_secs),
        }
    }

    fn failed(detail: impl Into<String>) -> BackendError {
        BackendError::Failed {
            backend: NAME,
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl ConversionBackend for OfficeSuiteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OfficeSuite
    }

    async fn convert(&self, source: &Path, target: &Path) -> Result<(), BackendError> {
        let source = std::path::absolute(source).map_err(|e| Self::failed(e.to_string()))?;
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Self::failed(format!("cannot create {}: {e}", parent.display())))?;

        let scratch = tempfile::Builder::new()
            .prefix(".office-")
            .tempdir_in(parent)
            .map_err(|e| Self::failed(format!("scratch dir: {e}")))?;
        let out_dir = scratch.path().join("out");
        let profile = scratch.path().join("profile");
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| Self::failed(e.to_string()))?;

        debug!("{} --convert-to pdf {}", self.command.display(), source.display());
        let child = Command::new(&self.command)
            .args(convert_args(&source, &out_dir, &profile))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => BackendError::Unavailable {
                    backend: NAME,
                    reason: format!("'{}' not found", self.command.display()),
                },
                _ => Self::failed(e.to_string()),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(out) => out.map_err(|e| Self::failed(e.to_string()))?,
            Err(_) => {
                return Err(BackendError::TimedOut {
                    backend: NAME,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::failed(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim().chars().take(300).collect::<String>()
            )));
        }

        let produced = out_dir.join(expected_output_name(&source));
        if !produced.is_file() {
            return Err(Self::failed(format!(
                "expected output '{}' was not produced",
                produced.file_name().unwrap_or_default().to_string_lossy()
            )));
        }
        tokio::fs::rename(&produced, target)
            .await
            .map_err(|e| Self::failed(format!("cannot move output into place: {e}")))?;
        Ok(())
    }
}

/// `{input stem}.pdf`, the name LibreOffice chooses.
fn expected_output_name(source: &Path) -> OsString {
    let mut name = source.file_stem().unwrap_or_default().to_os_string();
    name.push(".pdf");
    name
}

fn convert_args(source: &Path, out_dir: &Path, profile: &Path) -> Vec<OsString> {
    vec![
        format!("-env:UserInstallation={}", file_url(profile)).into(),
        "--headless".into(),
        "--convert-to".into(),
        EXPORT_FILTER.into(),
        "--outdir".into(),
        out_dir.as_os_str().to_os_string(),
        source.as_os_str().to_os_string(),
    ]
}

fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}
