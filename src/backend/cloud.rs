//! Cloud conversion through the Microsoft Graph drive API.
//!
//! The document is uploaded under a random name to a temporary folder of
//! the configured drive, fetched back with `?format=pdf` (the service
//! answers with a redirect to a pre-signed URL, which reqwest follows), and
//! the temporary upload is deleted whatever happened.
//!
//! Two credential flows are supported and tried in this order:
//!
//! 1. **Personal**: refresh-token grant on the `common` endpoint, drive `/me/drive`.
//! 2. **Work**: client-credentials grant on the tenant, drive `/users/{id}/drive`.

use super::{BackendKind, ConversionBackend};
use crate::config::{BackendConfig, GraphCredentials, GraphFlow};
use crate::error::{AssemblyError, BackendError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const NAME: &str = "cloud-service";
const REMOTE_FOLDER: &str = "AppTemp";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CloudBackend {
    client: reqwest::Client,
    credentials: GraphCredentials,
    login_base: String,
    graph_base: String,
    token_timeout: Duration,
    transfer_timeout: Duration,
    cleanup_timeout: Duration,
}

impl CloudBackend {
    /// `Ok(None)` when no complete credential flow is configured.
    pub fn from_config(config: &BackendConfig) -> Result<Option<Self>, AssemblyError> {
        let Some(credentials) = config.graph.clone().filter(|g| !g.flows().is_empty()) else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AssemblyError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Some(Self {
            client,
            credentials,
            login_base: config.login_base_url.trim_end_matches('/').to_string(),
            graph_base: config.graph_base_url.trim_end_matches('/').to_string(),
            token_timeout: Duration::from_secs(config.token_timeout_secs),
            transfer_timeout: Duration::from_secs(config.http_timeout_secs),
            cleanup_timeout: Duration::from_secs(config.cleanup_timeout_secs),
        }))
    }

    fn token_url(&self, flow: &GraphFlow) -> String {
        match flow {
            GraphFlow::Personal { .. } => format!("{}/common/oauth2/v2.0/token", self.login_base),
            GraphFlow::Work { tenant_id, .. } => {
                format!("{}/{}/oauth2/v2.0/token", self.login_base, tenant_id)
            }
        }
    }

    fn drive_root(&self, flow: &GraphFlow) -> String {
        match flow {
            GraphFlow::Personal { .. } => format!("{}/me/drive/root", self.graph_base),
            GraphFlow::Work { user_id, .. } => {
                format!("{}/users/{}/drive/root", self.graph_base, user_id)
            }
        }
    }

    async fn token(&self, flow: &GraphFlow) -> Result<String, BackendError> {
        let creds = &self.credentials;
        let form: Vec<(&str, &str)> = match flow {
            GraphFlow::Personal { refresh_token } => vec![
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ],
            GraphFlow::Work { .. } => vec![
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ],
        };

        let response = self
            .client
            .post(self.token_url(flow))
            .timeout(self.token_timeout)
            .form(&form)
            .send()
            .await
            .map_err(|e| http_error("token request", e, self.token_timeout))?;

        let response = check_status("token request", response).await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("token response: {e}")))?;
        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| failed("token response carried no access_token"))
    }

    async fn convert_with(
        &self,
        flow: &GraphFlow,
        source: &Path,
        ext: &str,
        target: &Path,
    ) -> Result<(), BackendError> {
        let token = self.token(flow).await?;
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| failed(format!("cannot read source: {e}")))?;

        let item = format!(
            "{}:/{}/{}{}",
            self.drive_root(flow),
            REMOTE_FOLDER,
            uuid::Uuid::new_v4().simple(),
            ext
        );

        let upload = self
            .client
            .put(format!("{item}:/content"))
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .timeout(self.transfer_timeout)
            .body(bytes)
            .send()
            .await
            .map_err(|e| http_error("upload", e, self.transfer_timeout));
        let upload = match upload {
            Ok(r) => check_status("upload", r).await,
            Err(e) => Err(e),
        };
        if let Err(e) = upload {
            // The upload may have landed even if the response was lost.
            self.cleanup(&item, &token).await;
            return Err(e);
        }

        let result = self.download_pdf(&item, &token, target).await;
        self.cleanup(&item, &token).await;
        result
    }

    async fn download_pdf(&self, item: &str, token: &str, target: &Path) -> Result<(), BackendError> {
        let response = self
            .client
            .get(format!("{item}:/content?format=pdf"))
            .bearer_auth(token)
            .timeout(self.transfer_timeout)
            .send()
            .await
            .map_err(|e| http_error("convert", e, self.transfer_timeout))?;
        let response = check_status("convert", response).await?;
        let pdf = response
            .bytes()
            .await
            .map_err(|e| http_error("convert", e, self.transfer_timeout))?;
        if pdf.is_empty() {
            return Err(failed("convert returned an empty body"));
        }
        tokio::fs::write(target, &pdf)
            .await
            .map_err(|e| failed(format!("cannot write '{}': {e}", target.display())))
    }

    /// Best-effort removal of the temporary upload; failures are only logged.
    async fn cleanup(&self, item: &str, token: &str) {
        let outcome = self
            .client
            .delete(item)
            .bearer_auth(token)
            .timeout(self.cleanup_timeout)
            .send()
            .await;
        match outcome {
            Ok(r) if r.status().is_success() => debug!("Removed temporary upload"),
            Ok(r) => debug!("Temporary upload cleanup returned HTTP {}", r.status()),
            Err(e) => debug!("Temporary upload cleanup failed: {e}"),
        }
    }
}

#[async_trait]
impl ConversionBackend for CloudBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::CloudService
    }

    async fn convert(&self, source: &Path, target: &Path) -> Result<(), BackendError> {
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if ext != ".doc" && ext != ".docx" {
            return Err(failed(format!("unsupported extension '{ext}'")));
        }

        let flows = self.credentials.flows();
        let mut last_err = BackendError::Unavailable {
            backend: NAME,
            reason: "no credential flow configured".into(),
        };
        for flow in &flows {
            match self.convert_with(flow, source, &ext, target).await {
                Ok(()) => {
                    info!("{}: converted via the {} flow", NAME, flow_name(flow));
                    return Ok(());
                }
                Err(e) => {
                    warn!("{} ({}) failed: {}", NAME, flow_name(flow), e);
                    let _ = tokio::fs::remove_file(target).await;
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

fn flow_name(flow: &GraphFlow) -> &'static str {
    match flow {
        GraphFlow::Personal { .. } => "personal",
        GraphFlow::Work { .. } => "work",
    }
}

fn failed(detail: impl Into<String>) -> BackendError {
    BackendError::Failed {
        backend: NAME,
        detail: detail.into(),
    }
}

fn http_error(stage: &str, e: reqwest::Error, timeout: Duration) -> BackendError {
    if e.is_timeout() {
        BackendError::TimedOut {
            backend: NAME,
            secs: timeout.as_secs(),
        }
    } else {
        failed(format!("{stage}: {e}"))
    }
}

async fn check_status(stage: &str, response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(failed(format!(
        "{stage}: HTTP {status}: {}",
        body.chars().take(300).collect::<String>()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ITEM: &str = r"^/me/drive/root:/AppTemp/[0-9a-f]{32}\.docx";

    fn backend(server: &MockServer, creds: GraphCredentials) -> CloudBackend {
        let config = BackendConfig {
            native_automation: false,
            graph: Some(creds),
            login_base_url: server.uri(),
            graph_base_url: server.uri(),
            ..Default::default()
        };
        CloudBackend::from_config(&config).unwrap().unwrap()
    }

    fn personal() -> GraphCredentials {
        GraphCredentials {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            refresh_token: Some("rt".into()),
            ..Default::default()
        }
    }

    fn source(dir: &TempDir, name: &str) -> std::path::PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, b"PK fake docx").unwrap();
        p
    }

    async fn mount_token(server: &MockServer, at: &str, grant: &str, status: u16) {
        let template = if status == 200 {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "tok"}))
        } else {
            ResponseTemplate::new(status).set_body_string("invalid_grant")
        };
        Mock::given(method("POST"))
            .and(path(at))
            .and(body_string_contains(grant))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[test]
    fn not_configured_yields_none() {
        let config = BackendConfig::default();
        assert!(CloudBackend::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn personal_flow_round_trip() {
        let server = MockServer::start().await;
        mount_token(&server, "/common/oauth2/v2.0/token", "grant_type=refresh_token", 200).await;
        Mock::given(method("PUT"))
            .and(path_regex(format!("{ITEM}:/content$")))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(format!("{ITEM}:/content$")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 cloud".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(format!("{ITEM}$")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.pdf");
        backend(&server, personal())
            .convert(&source(&dir, "Глава.docx"), &target)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.7 cloud");
    }

    #[tokio::test]
    async fn failed_conversion_still_cleans_up() {
        let server = MockServer::start().await;
        mount_token(&server, "/common/oauth2/v2.0/token", "grant_type=refresh_token", 200).await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("conversion exploded"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.pdf");
        let err = backend(&server, personal())
            .convert(&source(&dir, "a.docx"), &target)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("conversion exploded"), "{err}");
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn failed_upload_skips_download() {
        let server = MockServer::start().await;
        mount_token(&server, "/common/oauth2/v2.0/token", "grant_type=refresh_token", 200).await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF".to_vec()))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = backend(&server, personal())
            .convert(&source(&dir, "a.docx"), &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("upload: HTTP 403"), "{err}");
    }

    #[tokio::test]
    async fn work_flow_is_tried_after_personal_fails() {
        let server = MockServer::start().await;
        mount_token(&server, "/common/oauth2/v2.0/token", "grant_type=refresh_token", 400).await;
        mount_token(&server, "/t1/oauth2/v2.0/token", "grant_type=client_credentials", 200).await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/users/u1/drive/root:/AppTemp/[0-9a-f]{32}\.doc:/content$"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/users/u1/drive/root:/AppTemp/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 work".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let mut creds = personal();
        creds.tenant_id = Some("t1".into());
        creds.user_id = Some("u1".into());

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.pdf");
        backend(&server, creds)
            .convert(&source(&dir, "Legacy.DOC"), &target)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.4 work");
    }

    #[tokio::test]
    async fn unsupported_extension_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = backend(&server, personal())
            .convert(&source(&dir, "notes.txt"), &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported extension"));
    }
}
