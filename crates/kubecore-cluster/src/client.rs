//! Cluster API access: a narrow async trait plus an HTTP implementation
//! with in-cluster/kubeconfig authentication, health-checked connection
//! reuse and retry with exponential backoff.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use kubecore_core::{KubeCoreError, ResourceKind, Result};
use parking_lot::{Mutex, RwLock};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::plural::plural_form;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Parameters for a list operation.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: usize,
}

impl ListParams {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

/// Result of a list operation.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub items: Vec<Value>,
    pub continue_token: Option<String>,
}

/// The narrow cluster surface the discovery engines consume.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get(
        &self,
        api_version: &str,
        kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Value>;

    async fn list(
        &self,
        api_version: &str,
        kind: &ResourceKind,
        params: ListParams,
    ) -> Result<ListResult>;
}

/// Fetcher tuning knobs.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub health_check_interval: Duration,
    pub pool_max_idle: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(30),
            pool_max_idle: 10,
        }
    }
}

/// Resolved credentials for one cluster endpoint.
#[derive(Debug, Clone)]
pub struct ClusterCredentials {
    pub server: String,
    pub token: Option<String>,
    pub ca_cert: Option<Vec<u8>>,
    pub accept_invalid_certs: bool,
}

impl ClusterCredentials {
    /// In-cluster service-account credentials first, developer
    /// kubeconfig as the fallback.
    pub fn discover() -> Result<Self> {
        match Self::in_cluster() {
            Ok(creds) => {
                info!("using in-cluster credentials");
                Ok(creds)
            }
            Err(_) => {
                let creds = Self::from_kubeconfig()?;
                info!("using kubeconfig credentials");
                Ok(creds)
            }
        }
    }

    pub fn in_cluster() -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| KubeCoreError::Unauthorized("not running in-cluster".to_string()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = std::fs::read_to_string(dir.join("token"))?;
        let ca_cert = std::fs::read(dir.join("ca.crt")).ok();
        Ok(Self {
            server: format!("https://{}:{}", host, port),
            token: Some(token.trim().to_string()),
            ca_cert,
            accept_invalid_certs: false,
        })
    }

    pub fn from_kubeconfig() -> Result<Self> {
        let path = kubeconfig_path().ok_or_else(|| {
            KubeCoreError::Unauthorized("no kubeconfig available".to_string())
        })?;
        let raw = std::fs::read_to_string(&path)?;
        let config: Kubeconfig = serde_yaml::from_str(&raw).map_err(|e| {
            KubeCoreError::Configuration(format!("invalid kubeconfig {}: {}", path.display(), e))
        })?;
        config.into_credentials()
    }
}

fn kubeconfig_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KUBECONFIG") {
        return Some(PathBuf::from(path));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".kube").join("config"))
        .filter(|path| path.exists())
}

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(rename = "current-context", default)]
    current_context: String,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextSpec,
}

#[derive(Debug, Deserialize)]
struct ContextSpec {
    cluster: String,
    #[serde(default)]
    user: String,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterSpec,
}

#[derive(Debug, Deserialize)]
struct ClusterSpec {
    server: String,
    #[serde(rename = "certificate-authority-data", default)]
    certificate_authority_data: Option<String>,
    #[serde(rename = "certificate-authority", default)]
    certificate_authority: Option<String>,
    #[serde(rename = "insecure-skip-tls-verify", default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: UserSpec,
}

#[derive(Debug, Deserialize, Default)]
struct UserSpec {
    #[serde(default)]
    token: Option<String>,
}

impl Kubeconfig {
    fn into_credentials(self) -> Result<ClusterCredentials> {
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == self.current_context)
            .or_else(|| self.contexts.first())
            .ok_or_else(|| {
                KubeCoreError::Configuration("kubeconfig has no contexts".to_string())
            })?;

        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .ok_or_else(|| {
                KubeCoreError::Configuration(format!(
                    "kubeconfig context references unknown cluster {}",
                    context.context.cluster
                ))
            })?;

        let token = self
            .users
            .iter()
            .find(|u| u.name == context.context.user)
            .and_then(|u| u.user.token.clone());

        let ca_cert = match (
            &cluster.cluster.certificate_authority_data,
            &cluster.cluster.certificate_authority,
        ) {
            (Some(data), _) => Some(general_purpose::STANDARD.decode(data).map_err(|e| {
                KubeCoreError::Configuration(format!("invalid CA data: {}", e))
            })?),
            (None, Some(path)) => Some(std::fs::read(path)?),
            (None, None) => None,
        };

        Ok(ClusterCredentials {
            server: cluster.cluster.server.clone(),
            token,
            ca_cert,
            accept_invalid_certs: cluster.cluster.insecure_skip_tls_verify,
        })
    }
}

struct Connection {
    http: reqwest::Client,
    server: String,
    token: Option<String>,
}

impl Connection {
    fn establish(credentials: &ClusterCredentials, config: &FetcherConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .pool_max_idle_per_host(config.pool_max_idle);

        if let Some(ca) = &credentials.ca_cert {
            let cert = reqwest::Certificate::from_pem(ca)
                .map_err(|e| KubeCoreError::Configuration(format!("invalid CA cert: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        if credentials.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| KubeCoreError::Connection(format!("client build failed: {}", e)))?;

        Ok(Self {
            http,
            server: credentials.server.clone(),
            token: credentials.token.clone(),
        })
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.http.get(url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

/// HTTP fetcher against the cluster API. Connections are revalidated at
/// `health_check_interval` and reconnected under a single-flight lock.
pub struct HttpClusterClient {
    config: FetcherConfig,
    connection: RwLock<Option<Arc<Connection>>>,
    reconnect_lock: tokio::sync::Mutex<()>,
    last_health_check: Mutex<Option<Instant>>,
}

impl HttpClusterClient {
    pub fn new(config: FetcherConfig) -> Self {
        Self {
            config,
            connection: RwLock::new(None),
            reconnect_lock: tokio::sync::Mutex::new(()),
            last_health_check: Mutex::new(None),
        }
    }

    /// Authentication probe: establishes the connection eagerly.
    pub async fn connect(&self) -> Result<()> {
        self.reconnect().await.map(|_| ())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    async fn ensure_connected(&self) -> Result<Arc<Connection>> {
        let current = self.connection.read().clone();
        if let Some(conn) = current {
            let due = {
                let last = self.last_health_check.lock();
                last.map(|at| at.elapsed() > self.config.health_check_interval)
                    .unwrap_or(true)
            };
            if !due {
                return Ok(conn);
            }
            match self.probe(&conn).await {
                Ok(()) => {
                    *self.last_health_check.lock() = Some(Instant::now());
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(error = %e, "health check failed, reconnecting");
                }
            }
        }
        self.reconnect().await
    }

    async fn reconnect(&self) -> Result<Arc<Connection>> {
        let _guard = self.reconnect_lock.lock().await;

        // Another task may have reconnected while this one waited.
        let current = self.connection.read().clone();
        if let Some(conn) = current {
            let fresh = self
                .last_health_check
                .lock()
                .map(|at| at.elapsed() < self.config.health_check_interval)
                .unwrap_or(false);
            if fresh {
                return Ok(conn);
            }
        }

        let credentials = ClusterCredentials::discover()?;
        let conn = Arc::new(Connection::establish(&credentials, &self.config)?);
        self.probe(&conn).await?;

        *self.connection.write() = Some(conn.clone());
        *self.last_health_check.lock() = Some(Instant::now());
        info!(server = %conn.server, "connected to cluster");
        Ok(conn)
    }

    async fn probe(&self, conn: &Connection) -> Result<()> {
        let url = format!("{}/api/v1/namespaces?limit=1", conn.server);
        let response = conn
            .request(url)
            .send()
            .await
            .map_err(|e| KubeCoreError::Connection(format!("probe failed: {}", e)))?;
        classify_status(response.status(), "connection probe")?;
        Ok(())
    }

    fn resource_url(
        &self,
        server: &str,
        api_version: &str,
        kind: &ResourceKind,
        name: Option<&str>,
        namespace: Option<&str>,
    ) -> String {
        let plural = plural_form(&kind.to_string());
        let base = match api_version.split_once('/') {
            Some((group, version)) => format!("{}/apis/{}/{}", server, group, version),
            None => format!("{}/api/{}", server, api_version),
        };
        let mut url = match namespace {
            Some(ns) => format!("{}/namespaces/{}/{}", base, ns, plural),
            None => format!("{}/{}", base, plural),
        };
        if let Some(name) = name {
            url.push('/');
            url.push_str(name);
        }
        url
    }

    async fn execute_with_retry<F, Fut>(&self, operation: &str, mut call: F) -> Result<Value>
    where
        F: FnMut(Arc<Connection>) -> Fut,
        Fut: std::future::Future<Output = Result<Value>>,
    {
        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            let conn = self.ensure_connected().await?;
            match call(conn).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay * 2u32.pow(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "request failed, retrying"
                    );
                    // 5xx-class failures often mean a stale connection.
                    if matches!(e, KubeCoreError::Transient(_)) {
                        *self.last_health_check.lock() = None;
                    }
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            KubeCoreError::Connection(format!("{} failed with no attempts", operation))
        }))
    }
}

fn classify_status(status: StatusCode, what: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let message = format!("{}: HTTP {}", what, status);
    Err(match status {
        StatusCode::NOT_FOUND => KubeCoreError::NotFound(message),
        StatusCode::UNAUTHORIZED => KubeCoreError::Unauthorized(message),
        StatusCode::FORBIDDEN => KubeCoreError::Forbidden(message),
        _ => KubeCoreError::Transient(message),
    })
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn get(
        &self,
        api_version: &str,
        kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Value> {
        let api_version = api_version.to_string();
        let kind = kind.clone();
        let name = name.to_string();
        let namespace = namespace.map(str::to_string);

        self.execute_with_retry("get", move |conn| {
            let url = self.resource_url(
                &conn.server,
                &api_version,
                &kind,
                Some(name.as_str()),
                namespace.as_deref(),
            );
            let what = format!("get {}/{}", kind, name);
            async move {
                let response = conn
                    .request(url)
                    .send()
                    .await
                    .map_err(|e| KubeCoreError::Connection(e.to_string()))?;
                classify_status(response.status(), &what)?;
                response
                    .json::<Value>()
                    .await
                    .map_err(|e| KubeCoreError::Transient(format!("{}: bad body: {}", what, e)))
            }
        })
        .await
    }

    async fn list(
        &self,
        api_version: &str,
        kind: &ResourceKind,
        params: ListParams,
    ) -> Result<ListResult> {
        let api_version = api_version.to_string();
        let kind = kind.clone();
        let params = params.clone();

        let body = self
            .execute_with_retry("list", move |conn| {
                let mut url = self.resource_url(
                    &conn.server,
                    &api_version,
                    &kind,
                    None,
                    params.namespace.as_deref(),
                );
                let mut query = vec![format!("limit={}", params.limit.max(1))];
                if let Some(selector) = &params.label_selector {
                    query.push(format!("labelSelector={}", selector));
                }
                if let Some(selector) = &params.field_selector {
                    query.push(format!("fieldSelector={}", selector));
                }
                url.push('?');
                url.push_str(&query.join("&"));

                let what = format!("list {}", kind);
                async move {
                    let response = conn
                        .request(url)
                        .send()
                        .await
                        .map_err(|e| KubeCoreError::Connection(e.to_string()))?;
                    classify_status(response.status(), &what)?;
                    response
                        .json::<Value>()
                        .await
                        .map_err(|e| KubeCoreError::Transient(format!("{}: bad body: {}", what, e)))
                }
            })
            .await?;

        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let continue_token = body
            .pointer("/metadata/continue")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        debug!(count = items.len(), "list completed");
        Ok(ListResult {
            items,
            continue_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses_into_error_kinds() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "x"),
            Err(KubeCoreError::NotFound(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "x"),
            Err(KubeCoreError::Forbidden(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "x"),
            Err(KubeCoreError::Unauthorized(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, "x"),
            Err(KubeCoreError::Transient(_))
        ));
        assert!(classify_status(StatusCode::OK, "x").is_ok());
    }

    #[test]
    fn builds_group_and_core_urls() {
        let client = HttpClusterClient::new(FetcherConfig::default());
        let url = client.resource_url(
            "https://cluster",
            "platform.kubecore.io/v1alpha1",
            &ResourceKind::XKubEnv,
            Some("demo-dev"),
            Some("test"),
        );
        assert_eq!(
            url,
            "https://cluster/apis/platform.kubecore.io/v1alpha1/namespaces/test/xkubenvs/demo-dev"
        );

        let core = client.resource_url(
            "https://cluster",
            "v1",
            &ResourceKind::Other("ConfigMap".to_string()),
            None,
            None,
        );
        assert_eq!(core, "https://cluster/api/v1/configmaps");
    }

    #[test]
    fn kubeconfig_parses_minimal_document() {
        let raw = r#"
apiVersion: v1
kind: Config
current-context: dev
contexts:
  - name: dev
    context:
      cluster: dev-cluster
      user: dev-user
clusters:
  - name: dev-cluster
    cluster:
      server: https://127.0.0.1:6443
      insecure-skip-tls-verify: true
users:
  - name: dev-user
    user:
      token: sekret
"#;
        let config: Kubeconfig = serde_yaml::from_str(raw).unwrap();
        let creds = config.into_credentials().unwrap();
        assert_eq!(creds.server, "https://127.0.0.1:6443");
        assert_eq!(creds.token.as_deref(), Some("sekret"));
        assert!(creds.accept_invalid_certs);
        assert!(creds.ca_cert.is_none());
    }
}
