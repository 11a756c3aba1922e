//! HTTP dataset probe.
//!
//! Opens a fresh HTTP/1 connection per probe, the same way the health
//! checks of the web tier are made, and bounds the whole exchange with a
//! timeout.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use serde::Deserialize;
use tracing::{debug, warn};

use webscale_engine::DatasetProbe;

use crate::error::{ProbeError, ProbeResult};

/// Admin port the web replicas serve dataset info on.
pub const DEFAULT_PROBE_PORT: u16 = 20610;

/// Dataset info endpoint.
pub const DEFAULT_PROBE_PATH: &str = "/admin/datasets-info";

/// Body of the dataset info endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatasetsInfo {
    #[serde(rename = "numDataSets")]
    pub num_datasets: u64,
    /// Opaque last-access marker; logged, never interpreted.
    #[serde(rename = "lastTimeAccess", default)]
    pub last_time_access: Option<serde_json::Value>,
}

/// Probes replicas over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDatasetProbe {
    port: u16,
    path: String,
    timeout: Duration,
}

impl Default for HttpDatasetProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_PORT, Duration::from_secs(2))
    }
}

impl HttpDatasetProbe {
    /// Probe `port` on each replica with the default path.
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            port,
            path: DEFAULT_PROBE_PATH.to_string(),
            timeout,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch and decode the dataset info of the replica at `ip`.
    pub async fn fetch(&self, ip: &str) -> ProbeResult<DatasetsInfo> {
        let authority = authority(ip, self.port);

        tokio::time::timeout(self.timeout, self.fetch_inner(&authority))
            .await
            .map_err(|_| ProbeError::Timeout)?
    }

    async fn fetch_inner(&self, authority: &str) -> ProbeResult<DatasetsInfo> {
        debug!(%authority, path = %self.path, "probing datasets");

        let stream = tokio::net::TcpStream::connect(authority)
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "probe connection closed with error");
            }
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(self.path.as_str())
            .header("host", authority)
            .header("accept", "application/json")
            .header("user-agent", "webscale-probe/0.1")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?
            .to_bytes();

        debug!(%authority, body = %String::from_utf8_lossy(&body), "probe response");

        serde_json::from_slice(&body).map_err(|e| ProbeError::Decode(e.to_string()))
    }
}

impl DatasetProbe for HttpDatasetProbe {
    async fn probe_load(&self, address: &str) -> Option<u64> {
        match self.fetch(address).await {
            Ok(info) => {
                debug!(
                    %address,
                    datasets = info.num_datasets,
                    last_access = ?info.last_time_access,
                    "replica dataset info"
                );
                Some(info.num_datasets)
            }
            Err(e) => {
                warn!(%address, error = %e, "dataset probe failed");
                None
            }
        }
    }
}

/// `host:port`, bracketing IPv6 literals.
fn authority(ip: &str, port: u16) -> String {
    if ip.contains(':') && !ip.starts_with('[') {
        format!("[{ip}]:{port}")
    } else {
        format!("{ip}:{port}")
    }
}
