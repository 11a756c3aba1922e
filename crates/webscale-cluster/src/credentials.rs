//! API server credentials.
//!
//! Two ways to reach the cluster:
//!
//! - **local**: an operator-supplied API server URL, typically
//!   `kubectl proxy` on `http://127.0.0.1:8001`, which signs requests with
//!   the operator's own kubeconfig. An optional bearer token and CA file
//!   cover direct `https` access.
//! - **in-cluster**: the pod's service account. Token, CA bundle and
//!   namespace come from the files Kubernetes mounts into every pod.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ClusterError, ClusterResult};
use crate::transport::Endpoint;

/// Where Kubernetes mounts the service-account credentials.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// `kubectl proxy`'s default listen address.
pub const DEFAULT_LOCAL_API_SERVER: &str = "http://127.0.0.1:8001";

pub const DEFAULT_NAMESPACE: &str = "default";

/// Upper bound on one API request, connect through last body byte.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved connection settings for the API server.
#[derive(Clone)]
pub struct KubeConfig {
    pub endpoint: Endpoint,
    pub token: Option<String>,
    pub tls: Option<Arc<rustls::ClientConfig>>,
    /// Namespace the workload runs in.
    pub namespace: String,
    pub request_timeout: Duration,
}

impl fmt::Debug for KubeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls.is_some())
            .field("namespace", &self.namespace)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl KubeConfig {
    /// Credentials supplied by the operator.
    pub fn local(
        api_server: &str,
        token: Option<String>,
        ca_file: Option<&Path>,
        namespace: Option<String>,
    ) -> ClusterResult<Self> {
        let endpoint = Endpoint::parse(api_server)?;

        let tls = match ca_file {
            Some(path) => Some(tls_config_from_pem(&read_file(path)?)?),
            None if endpoint.https => {
                return Err(ClusterError::Credentials(format!(
                    "{api_server} uses https; a CA file is required"
                )));
            }
            None => None,
        };

        let config = Self {
            endpoint,
            token,
            tls,
            namespace: namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        info!(endpoint = %config.endpoint.authority(), namespace = %config.namespace, "using local credentials");
        Ok(config)
    }

    /// Service-account credentials, reading `KUBERNETES_SERVICE_HOST` and
    /// `KUBERNETES_SERVICE_PORT` for the API server address.
    pub fn in_cluster(namespace: Option<String>) -> ClusterResult<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .unwrap_or_else(|_| "kubernetes.default.svc".to_string());
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        Self::in_cluster_from(Path::new(SERVICE_ACCOUNT_DIR), &host, &port, namespace)
    }

    /// Service-account credentials from an explicit mount directory.
    pub fn in_cluster_from(
        dir: &Path,
        host: &str,
        port: &str,
        namespace: Option<String>,
    ) -> ClusterResult<Self> {
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        let endpoint = Endpoint::parse(&format!("https://{host}:{port}"))?;

        let token = String::from_utf8_lossy(&read_file(&dir.join("token"))?)
            .trim()
            .to_string();
        if token.is_empty() {
            return Err(ClusterError::Credentials(format!(
                "service account token in {} is empty",
                dir.display()
            )));
        }

        let tls = tls_config_from_pem(&read_file(&dir.join("ca.crt"))?)?;

        let namespace = namespace
            .or_else(|| read_namespace(dir))
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        info!(endpoint = %endpoint.authority(), %namespace, "using in-cluster credentials");
        Ok(Self {
            endpoint,
            token: Some(token),
            tls: Some(tls),
            namespace,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Bound every API request by `timeout` instead of the default.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// The namespace file of a service-account mount, if present and
/// non-empty.
pub fn read_namespace(dir: &Path) -> Option<String> {
    let path: PathBuf = dir.join("namespace");
    match std::fs::read_to_string(&path) {
        Ok(ns) if !ns.trim().is_empty() => Some(ns.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no service account namespace");
            None
        }
    }
}

/// Build a rustls client config trusting the certificates in `pem`.
pub fn tls_config_from_pem(pem: &[u8]) -> ClusterResult<Arc<rustls::ClientConfig>> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut &pem[..]) {
        let cert = cert.map_err(|e| ClusterError::Credentials(format!("invalid CA bundle: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| ClusterError::Credentials(format!("invalid CA certificate: {e}")))?;
    }
    if roots.is_empty() {
        return Err(ClusterError::Credentials(
            "CA bundle contains no certificates".to_string(),
        ));
    }

    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| ClusterError::Tls(format!("tls protocol version error: {e}")))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(Arc::new(config))
}

fn read_file(path: &Path) -> ClusterResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| ClusterError::Credentials(format!("{}: {e}", path.display())))
}
