//! Document → PDF conversion engines and the fallback chain that drives them.
//!
//! Three engines implement [`ConversionBackend`]:
//!
//! | Engine | Module | Available when |
//! |--------|--------|----------------|
//! | native office automation | [`native`] | host supports it and not overridden |
//! | cloud conversion service | [`cloud`] | a complete credential flow is configured |
//! | headless office suite | [`office`] | always (the executable may still be missing) |
//!
//! Which engines make up a chain is decided by [`select_backends`], a pure
//! function of [`BackendConfig`]. The native engine is exclusive: when it is
//! selected nothing runs below it. Otherwise the cloud engine (if configured)
//! is tried before the office suite.
//!
//! A [`ConversionChain`] tries its engines in order and stops at the first
//! success. Every engine failure is caught, logged, and recorded; a document
//! is failed only if every engine in its chain failed.

pub mod cloud;
pub mod native;
pub mod office;

use crate::config::BackendConfig;
use crate::document::{ConversionResult, Document};
use crate::error::{AssemblyError, BackendError, DocumentError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifies a conversion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    NativeAutomation,
    CloudService,
    OfficeSuite,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::NativeAutomation => "native-automation",
            BackendKind::CloudService => "cloud-service",
            BackendKind::OfficeSuite => "office-suite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One document → PDF engine.
///
/// Implementations write the PDF to exactly `target` and must not leave a
/// file there when they return `Err`.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn convert(&self, source: &Path, target: &Path) -> Result<(), BackendError>;
}

/// Engines to try for a given configuration, in order.
pub fn select_backends(config: &BackendConfig) -> Vec<BackendKind> {
    if config.use_native() {
        return vec![BackendKind::NativeAutomation];
    }
    let mut kinds = Vec::with_capacity(2);
    if config.cloud_configured() {
        kinds.push(BackendKind::CloudService);
    }
    kinds.push(BackendKind::OfficeSuite);
    kinds
}

/// An ordered list of engines with first-success semantics.
#[derive(Clone)]
pub struct ConversionChain {
    backends: Vec<Arc<dyn ConversionBackend>>,
}

impl fmt::Debug for ConversionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

impl ConversionChain {
    /// A chain over explicit engines; used by tests and embedders with their own engines.
    pub fn new(backends: Vec<Arc<dyn ConversionBackend>>) -> Self {
        Self { backends }
    }

    /// Build the chain [`select_backends`] prescribes.
    pub fn from_config(config: &BackendConfig) -> Result<Self, AssemblyError> {
        let mut backends: Vec<Arc<dyn ConversionBackend>> = Vec::new();
        for kind in select_backends(config) {
            match kind {
                BackendKind::NativeAutomation => {
                    backends.push(Arc::new(native::NativeAutomationBackend::new(config)));
                }
                BackendKind::CloudService => {
                    if let Some(cloud) = cloud::CloudBackend::from_config(config)? {
                        backends.push(Arc::new(cloud));
                    }
                }
                BackendKind::OfficeSuite => {
                    backends.push(Arc::new(office::OfficeSuiteBackend::new(config)));
                }
            }
        }
        info!(
            "Conversion chain: {}",
            backends
                .iter()
                .map(|b| b.kind().name())
                .collect::<Vec<_>>()
                .join(" → ")
        );
        Ok(Self { backends })
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Convert one document, trying each engine until one succeeds.
    ///
    /// Never returns an error: failures end up in
    /// [`ConversionResult::error`].
    pub async fn convert(&self, document: &Document, target: &Path) -> ConversionResult {
        if !document.exists() {
            warn!("Source vanished before conversion: {}", document.path.display());
            return ConversionResult::failed(
                document.clone(),
                None,
                DocumentError::SourceMissing {
                    file: document.filename.clone(),
                },
            );
        }

        let mut attempts = Vec::with_capacity(self.backends.len());
        let mut last_kind = None;

        for backend in &self.backends {
            let kind = backend.kind();
            last_kind = Some(kind);
            debug!("{}: converting {}", kind, document.filename);

            let outcome = match backend.convert(&document.path, target).await {
                Ok(()) if has_output(target).await => Ok(()),
                Ok(()) => Err(BackendError::Failed {
                    backend: kind.name(),
                    detail: "reported success but produced no PDF".into(),
                }),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    debug!("{}: converted {}", kind, document.filename);
                    return ConversionResult::succeeded(document.clone(), target.to_path_buf(), kind);
                }
                Err(e) => {
                    warn!("{} failed for {}: {}", kind, document.filename, e);
                    let _ = tokio::fs::remove_file(target).await;
                    attempts.push(e.to_string());
                }
            }
        }

        if attempts.is_empty() {
            attempts.push("no conversion engine enabled".into());
        }
        ConversionResult::failed(
            document.clone(),
            last_kind,
            DocumentError::ConversionFailed {
                file: document.filename.clone(),
                attempts,
            },
        )
    }
}

async fn has_output(target: &Path) -> bool {
    tokio::fs::metadata(target)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
