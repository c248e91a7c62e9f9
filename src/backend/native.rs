//! Native office automation (Word over COM, driven through PowerShell).
//!
//! The automation host cannot serve concurrent requests, so every
//! conversion in the process goes through one process-wide lock. Other
//! engines are not affected by it.
//!
//! Per document the script opens the file read-only without touching the
//! recent-files list, exports it as PDF (two export signatures, then a
//! save-as fallback), closes it without saving, and quits the host. Any
//! failure surfaces as a non-zero exit.

use super::{BackendKind, ConversionBackend};
use crate::config::BackendConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use base64::Engine as _;
use once_cell::sync::Lazy;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

const NAME: &str = "native-automation";
const POWERSHELL: &str = "powershell";

/// wdExportFormatPDF / wdFormatPDF
const PDF_FORMAT: u32 = 17;

/// Process-wide single-flight lock for the automation host.
static AUTOMATION_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Run `f` while holding the automation lock.
pub async fn single_flight<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    let _guard = AUTOMATION_LOCK.lock().await;
    f.await
}

#[derive(Debug, Clone)]
pub struct NativeAutomationBackend {
    timeout: Duration,
}

impl NativeAutomationBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.native_timeout_secs),
        }
    }

    async fn run(&self, source: &Path, target: &Path) -> Result<(), BackendError> {
        let script = export_script(source, target);
        let child = Command::new(POWERSHELL)
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-EncodedCommand",
            ])
            .arg(encode_command(&script))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => BackendError::Unavailable {
                    backend: NAME,
                    reason: format!("'{POWERSHELL}' not found"),
                },
                _ => BackendError::Failed {
                    backend: NAME,
                    detail: e.to_string(),
                },
            })?;

        // Dropping the child on timeout kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(out) => out.map_err(|e| BackendError::Failed {
                backend: NAME,
                detail: e.to_string(),
            })?,
            Err(_) => {
                return Err(BackendError::TimedOut {
                    backend: NAME,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Failed {
                backend: NAME,
                detail: format!(
                    "automation host exited with {}: {}",
                    output.status,
                    stderr.trim().chars().take(300).collect::<String>()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ConversionBackend for NativeAutomationBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeAutomation
    }

    async fn convert(&self, source: &Path, target: &Path) -> Result<(), BackendError> {
        let source = std::path::absolute(source).map_err(|e| BackendError::Failed {
            backend: NAME,
            detail: e.to_string(),
        })?;
        let target = std::path::absolute(target).map_err(|e| BackendError::Failed {
            backend: NAME,
            detail: e.to_string(),
        })?;

        single_flight(async {
            debug!("Automation lock acquired for {}", source.display());
            self.run(&source, &target).await
        })
        .await
    }
}

/// Quote a path as a PowerShell single-quoted literal.
fn ps_literal(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "''"))
}

fn export_script(source: &Path, target: &Path) -> String {
    let src = ps_literal(source);
    let dst = ps_literal(target);
    format!(
        r#"$ErrorActionPreference = 'Stop'
$word = $null
$doc = $null
try {{
    $word = New-Object -ComObject Word.Application
    try {{ $word.Visible = $false }} catch {{ }}
    $word.DisplayAlerts = 0
    $doc = $word.Documents.Open({src}, $false, $true, $false)
    try {{
        $doc.ExportAsFixedFormat({dst}, {fmt}, $false, 0)
    }} catch {{
        try {{
            $doc.ExportAsFixedFormat({dst}, {fmt})
        }} catch {{
            $doc.SaveAs2({dst}, {fmt})
        }}
    }}
}} finally {{
    if ($doc -ne $null) {{ try {{ $doc.Close(0) }} catch {{ }} }}
    if ($word -ne $null) {{
        try {{ $word.Quit() }} catch {{ }}
        [void][System.Runtime.InteropServices.Marshal]::ReleaseComObject($word)
    }}
}}
"#,
        fmt = PDF_FORMAT
    )
}

/// `-EncodedCommand` takes base64 of the UTF-16LE script.
fn encode_command(script: &str) -> String {
    let bytes: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
