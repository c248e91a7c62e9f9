//! Configuration types for document assembly.
//!
//! All behaviour is controlled through [`AssemblyConfig`], built via its
//! [`AssemblyConfigBuilder`] or read from the environment with
//! [`AssemblyConfig::from_env`]. Backend settings live in the nested
//! [`BackendConfig`]; the core only interprets them as "engine available or
//! not" and hands the rest to the engine that needs it.

use crate::error::AssemblyError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Configuration for an assembly run and for the job orchestrator.
///
/// # Example
/// ```rust
/// use docmerge::AssemblyConfig;
///
/// let config = AssemblyConfig::builder()
///     .force_office_suite(true)
///     .office_command("/usr/bin/soffice")
///     .office_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert!(config.backends.force_office_suite);
/// ```
#[derive(Clone)]
pub struct AssemblyConfig {
    /// Which conversion engines to use and how to reach them.
    pub backends: BackendConfig,

    /// Labels and markers used to infer page order from filenames.
    pub order: OrderRules,

    /// Retry policy for moving artifacts into durable storage.
    pub retry: RetryPolicy,

    /// Where finished artifacts of owner-less jobs are kept. Default: `$TMP/docmerge-artifacts`.
    pub artifact_dir: PathBuf,

    /// Root of the per-owner durable storage. Default: `data/outputs`.
    pub data_dir: PathBuf,

    /// Optional progress observer for one-shot runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            backends: BackendConfig::default(),
            order: OrderRules::default(),
            retry: RetryPolicy::default(),
            artifact_dir: std::env::temp_dir().join("docmerge-artifacts"),
            data_dir: PathBuf::from("data/outputs"),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AssemblyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyConfig")
            .field("backends", &self.backends)
            .field("order", &self.order)
            .field("retry", &self.retry)
            .field("artifact_dir", &self.artifact_dir)
            .field("data_dir", &self.data_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AssemblyProgressCallback>"),
            )
            .finish()
    }
}

impl AssemblyConfig {
    /// Create a new builder for `AssemblyConfig`.
    pub fn builder() -> AssemblyConfigBuilder {
        AssemblyConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a configuration from environment variables.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `MS_GRAPH_CLIENT_ID`, `MS_GRAPH_CLIENT_SECRET` | cloud backend app registration |
    /// | `MS_GRAPH_REFRESH_TOKEN` | personal-account flow |
    /// | `MS_GRAPH_TENANT_ID`, `MS_GRAPH_USER_ID` | work-account flow |
    /// | `DOCMERGE_OFFICE_PATH` | office-suite executable |
    /// | `DOCMERGE_FORCE_OFFICE` | skip native automation even where available |
    /// | `DOCMERGE_DATA_DIR` | durable storage root |
    /// | `DOCMERGE_ARTIFACT_DIR` | owner-less artifact directory |
    pub fn from_env() -> Result<Self, AssemblyError> {
        let mut builder = Self::builder();

        if let Some(creds) = GraphCredentials::from_env() {
            builder = builder.graph_credentials(creds);
        }
        if let Some(path) = env_non_empty("DOCMERGE_OFFICE_PATH") {
            builder = builder.office_command(path);
        }
        if let Some(flag) = env_non_empty("DOCMERGE_FORCE_OFFICE") {
            builder = builder.force_office_suite(parse_flag(&flag));
        }
        if let Some(dir) = env_non_empty("DOCMERGE_DATA_DIR") {
            builder = builder.data_dir(dir);
        }
        if let Some(dir) = env_non_empty("DOCMERGE_ARTIFACT_DIR") {
            builder = builder.artifact_dir(dir);
        }

        builder.build()
    }
}

/// Builder for [`AssemblyConfig`].
#[derive(Debug)]
pub struct AssemblyConfigBuilder {
    config: AssemblyConfig,
}

impl AssemblyConfigBuilder {
    pub fn backends(mut self, backends: BackendConfig) -> Self {
        self.config.backends = backends;
        self
    }

    pub fn native_automation(mut self, enabled: bool) -> Self {
        self.config.backends.native_automation = enabled;
        self
    }

    pub fn force_office_suite(mut self, v: bool) -> Self {
        self.config.backends.force_office_suite = v;
        self
    }

    pub fn graph_credentials(mut self, creds: GraphCredentials) -> Self {
        self.config.backends.graph = Some(creds);
        self
    }

    pub fn office_command(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.config.backends.office_command = Some(cmd.into());
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.backends.office_timeout_secs = secs;
        self
    }

    pub fn native_timeout_secs(mut self, secs: u64) -> Self {
        self.config.backends.native_timeout_secs = secs;
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.backends.http_timeout_secs = secs;
        self
    }

    pub fn order_rules(mut self, rules: OrderRules) -> Self {
        self.config.order = rules;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.artifact_dir = dir.into();
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssemblyConfig, AssemblyError> {
        let c = &self.config;
        if c.backends.office_timeout_secs == 0 || c.backends.native_timeout_secs == 0 {
            return Err(AssemblyError::InvalidConfig(
                "Engine timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.backends.http_timeout_secs == 0 {
            return Err(AssemblyError::InvalidConfig(
                "HTTP timeout must be ≥ 1 second".into(),
            ));
        }
        if c.retry.max_attempts == 0 {
            return Err(AssemblyError::InvalidConfig(
                "Retry policy needs at least one attempt".into(),
            ));
        }
        if c.order.page_labels.iter().any(|l| l.trim().is_empty()) {
            return Err(AssemblyError::InvalidConfig(
                "Page labels must not be blank".into(),
            ));
        }
        if let Some(ref creds) = c.backends.graph {
            if creds.client_id.is_empty() || creds.client_secret.is_empty() {
                return Err(AssemblyError::InvalidConfig(
                    "Cloud credentials need both a client id and a client secret".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Backend configuration ────────────────────────────────────────────────

/// Which conversion engines are enabled and how to reach them.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Host supports native office automation. Default: `true` on Windows.
    pub native_automation: bool,

    /// Skip native automation even where available. Default: false.
    pub force_office_suite: bool,

    /// Cloud conversion credentials; the cloud engine is skipped when `None`.
    pub graph: Option<GraphCredentials>,

    /// Office-suite executable. Default: `libreoffice` on `PATH`.
    pub office_command: Option<PathBuf>,

    /// Office-suite process budget per document. Default: 120.
    pub office_timeout_secs: u64,

    /// Native automation budget per document. Default: 300.
    pub native_timeout_secs: u64,

    /// Upload / download timeout for the cloud engine. Default: 120.
    pub http_timeout_secs: u64,

    /// Token endpoint timeout. Default: 30.
    pub token_timeout_secs: u64,

    /// Timeout for the best-effort remote cleanup. Default: 10.
    pub cleanup_timeout_secs: u64,

    /// Identity endpoint base. Default: `https://login.microsoftonline.com`.
    pub login_base_url: String,

    /// Drive API base. Default: `https://graph.microsoft.com/v1.0`.
    pub graph_base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            native_automation: cfg!(windows),
            force_office_suite: false,
            graph: None,
            office_command: None,
            office_timeout_secs: 120,
            native_timeout_secs: 300,
            http_timeout_secs: 120,
            token_timeout_secs: 30,
            cleanup_timeout_secs: 10,
            login_base_url: "https://login.microsoftonline.com".to_string(),
            graph_base_url: "https://graph.microsoft.com/v1.0".to_string(),
        }
    }
}

impl BackendConfig {
    /// True when native automation should be the whole chain.
    pub fn use_native(&self) -> bool {
        self.native_automation && !self.force_office_suite
    }

    /// True when at least one cloud credential flow is complete.
    pub fn cloud_configured(&self) -> bool {
        self.graph
            .as_ref()
            .is_some_and(|g| !g.flows().is_empty())
    }

    pub fn office_command(&self) -> PathBuf {
        self.office_command
            .clone()
            .unwrap_or_else(|| PathBuf::from("libreoffice"))
    }
}

/// App registration and account data for the cloud conversion service.
#[derive(Clone, Default)]
pub struct GraphCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Personal account: delegated refresh token.
    pub refresh_token: Option<String>,
    /// Work account: directory tenant.
    pub tenant_id: Option<String>,
    /// Work account: the user whose drive holds temporary uploads.
    pub user_id: Option<String>,
}

/// One way of obtaining a bearer token and a drive to upload into.
#[derive(Clone, PartialEq, Eq)]
pub enum GraphFlow {
    /// Refresh-token grant against the `common` endpoint; uploads to `/me/drive`.
    Personal { refresh_token: String },
    /// Client-credentials grant against the tenant; uploads to `/users/{id}/drive`.
    Work { tenant_id: String, user_id: String },
}

impl fmt::Debug for GraphFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphFlow::Personal { .. } => f.write_str("Personal { refresh_token: <redacted> }"),
            GraphFlow::Work { tenant_id, user_id } => f
                .debug_struct("Work")
                .field("tenant_id", tenant_id)
                .field("user_id", user_id)
                .finish(),
        }
    }
}

impl GraphCredentials {
    /// Read `MS_GRAPH_*` variables. Returns `None` without client id and secret.
    pub fn from_env() -> Option<Self> {
        let client_id = env_non_empty("MS_GRAPH_CLIENT_ID")?;
        let client_secret = env_non_empty("MS_GRAPH_CLIENT_SECRET")?;
        Some(Self {
            client_id,
            client_secret,
            refresh_token: env_non_empty("MS_GRAPH_REFRESH_TOKEN"),
            tenant_id: env_non_empty("MS_GRAPH_TENANT_ID"),
            user_id: env_non_empty("MS_GRAPH_USER_ID"),
        })
    }

    /// Complete flows in preference order: personal first, then work.
    pub fn flows(&self) -> Vec<GraphFlow> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Vec::new();
        }
        let mut flows = Vec::with_capacity(2);
        if let Some(token) = self.refresh_token.as_deref().map(str::trim) {
            if !token.is_empty() {
                flows.push(GraphFlow::Personal {
                    refresh_token: token.to_string(),
                });
            }
        }
        if let (Some(tenant), Some(user)) = (self.tenant_id.as_deref(), self.user_id.as_deref()) {
            if !tenant.trim().is_empty() && !user.trim().is_empty() {
                flows.push(GraphFlow::Work {
                    tenant_id: tenant.trim().to_string(),
                    user_id: user.trim().to_string(),
                });
            }
        }
        flows
    }
}

impl fmt::Debug for GraphCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("tenant_id", &self.tenant_id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

// ── Order rules ──────────────────────────────────────────────────────────

/// Words that anchor page numbers and mark the title page in filenames.
///
/// Matching is case-insensitive; labels are compared against the
/// lower-cased filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRules {
    /// Page labels, e.g. `стр` in `Раздел стр. 12-14.docx`.
    pub page_labels: Vec<String>,
    /// Title-page markers; a match yields page 1.
    pub title_markers: Vec<String>,
}

impl Default for OrderRules {
    fn default() -> Self {
        Self {
            page_labels: vec!["стр".to_string(), "page".to_string()],
            title_markers: vec!["титул".to_string(), "title".to_string()],
        }
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// Bounded retry for the artifact mover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Atomic copy attempts before the streaming fallback. Default: 15.
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds. Default: 500.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            delay_ms: 500,
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> GraphCredentials {
        GraphCredentials {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_build() {
        let config = AssemblyConfig::builder().build().unwrap();
        assert_eq!(config.backends.office_timeout_secs, 120);
        assert_eq!(config.retry.max_attempts, 15);
        assert_eq!(config.retry.delay_ms, 500);
        assert!(config.backends.graph.is_none());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = AssemblyConfig::builder().office_timeout_secs(0).build();
        assert!(matches!(err, Err(AssemblyError::InvalidConfig(_))));
    }

    #[test]
    fn flows_need_client_pair() {
        let mut c = creds();
        c.refresh_token = Some("rt".into());
        assert_eq!(c.flows().len(), 1);
        c.client_secret.clear();
        assert!(c.flows().is_empty());
    }

    #[test]
    fn personal_flow_precedes_work_flow() {
        let mut c = creds();
        c.refresh_token = Some("rt".into());
        c.tenant_id = Some("tenant".into());
        c.user_id = Some("user".into());
        let flows = c.flows();
        assert!(matches!(flows[0], GraphFlow::Personal { .. }));
        assert!(matches!(flows[1], GraphFlow::Work { .. }));
    }

    #[test]
    fn work_flow_needs_user_id() {
        let mut c = creds();
        c.tenant_id = Some("tenant".into());
        assert!(c.flows().is_empty());
        let backends = BackendConfig {
            graph: Some(c),
            ..Default::default()
        };
        assert!(!backends.cloud_configured());
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut c = creds();
        c.refresh_token = Some("super-secret-token".into());
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("\"secret\""));
        assert!(!dbg.contains("super-secret-token"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn force_office_disables_native() {
        let b = BackendConfig {
            native_automation: true,
            force_office_suite: true,
            ..Default::default()
        };
        assert!(!b.use_native());
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }
}
