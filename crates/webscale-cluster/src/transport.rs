//! HTTP/1 transport to the Kubernetes API server.
//!
//! One connection per request, like the probes: the scale loop makes a
//! handful of calls per tick, so pooling buys nothing. Every request is
//! bounded by the configured timeout so a silent API server fails the
//! tick instead of stalling it.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::credentials::KubeConfig;
use crate::error::{ClusterError, ClusterResult};

pub const JSON: &str = "application/json";
pub const JSON_PATCH: &str = "application/json-patch+json";
pub const MERGE_PATCH: &str = "application/merge-patch+json";

/// Where the API server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub https: bool,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `http(s)://host[:port]`. Any path component is ignored.
    pub fn parse(url: &str) -> ClusterResult<Self> {
        let uri: http::Uri = url
            .parse()
            .map_err(|e| ClusterError::Credentials(format!("invalid api server url {url:?}: {e}")))?;

        let https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            other => {
                return Err(ClusterError::Credentials(format!(
                    "unsupported api server scheme {other:?} in {url:?}"
                )));
            }
        };

        let host = uri
            .host()
            .ok_or_else(|| ClusterError::Credentials(format!("api server url {url:?} has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });

        Ok(Self { https, host, port })
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Sends authenticated requests to the API server.
#[derive(Clone)]
pub struct ApiTransport {
    endpoint: Endpoint,
    token: Option<String>,
    tls: Option<TlsConnector>,
    timeout: Duration,
}

impl ApiTransport {
    pub fn new(config: &KubeConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
            tls: config.tls.clone().map(TlsConnector::from),
            timeout: config.request_timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run `fut` under the request timeout.
    async fn bounded<T>(
        &self,
        method: &Method,
        path: &str,
        fut: impl Future<Output = ClusterResult<T>>,
    ) -> ClusterResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ClusterError::Timeout {
                method: method.to_string(),
                path: path.to_string(),
                timeout: self.timeout,
            })?
    }

    /// Send a request and return the raw response, whatever its status.
    /// Only the response head is covered by the timeout.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> ClusterResult<Response<Incoming>> {
        self.bounded(&method, path, self.send_unbounded(method.clone(), path, content_type, body))
            .await
    }

    async fn send_unbounded(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> ClusterResult<Response<Incoming>> {
        let authority = self.endpoint.authority();

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(path)
            .header("host", authority.as_str())
            .header("accept", JSON)
            .header("user-agent", "webscale/0.1");
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        if let Some(token) = &self.token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let req = builder
            .body(Full::new(body))
            .map_err(|e| ClusterError::Http(e.to_string()))?;

        debug!(%method, %path, "api request");

        let stream = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(|e| ClusterError::Connect(format!("{authority}: {e}")))?;

        if self.endpoint.https {
            let connector = self.tls.as_ref().ok_or_else(|| {
                ClusterError::Tls("https api server without a tls configuration".to_string())
            })?;
            let server_name = rustls::pki_types::ServerName::try_from(self.endpoint.host.clone())
                .map_err(|e| ClusterError::Tls(e.to_string()))?;
            let tls = connector
                .connect(server_name, stream)
                .await
                .map_err(|e| ClusterError::Tls(e.to_string()))?;
            exchange(hyper_util::rt::TokioIo::new(tls), req).await
        } else {
            exchange(hyper_util::rt::TokioIo::new(stream), req).await
        }
    }

    /// Send a request, fail on non-2xx, and return the body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> ClusterResult<Bytes> {
        let (status, bytes) = self
            .bounded(&method, path, async {
                let resp = self.send_unbounded(method.clone(), path, content_type, body).await?;
                let status = resp.status();
                Ok::<_, ClusterError>((status, collect(resp).await?))
            })
            .await?;

        if !status.is_success() {
            return Err(ClusterError::Status {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes)
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &'static str) -> ClusterResult<T> {
        let bytes = self.request(Method::GET, path, None, Bytes::new()).await?;
        serde_json::from_slice(&bytes).map_err(|e| ClusterError::Decode {
            what,
            reason: e.to_string(),
        })
    }

    /// PATCH `path` with a JSON document of the given patch type.
    pub async fn patch(&self, path: &str, patch_type: &str, patch: &serde_json::Value) -> ClusterResult<()> {
        let body = serde_json::to_vec(patch).map_err(|e| ClusterError::Http(e.to_string()))?;
        self.request(Method::PATCH, path, Some(patch_type), Bytes::from(body))
            .await?;
        Ok(())
    }

    /// GET a streaming endpoint and hand back the open body.
    pub async fn stream(&self, path: &str) -> ClusterResult<Incoming> {
        let resp = self.send(Method::GET, path, None, Bytes::new()).await?;
        let status = resp.status();
        if !status.is_success() {
            let bytes = self
                .bounded(&Method::GET, path, collect(resp))
                .await
                .unwrap_or_default();
            return Err(ClusterError::Status {
                method: Method::GET.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(resp.into_body())
    }
}

async fn exchange<I>(io: I, req: Request<Full<Bytes>>) -> ClusterResult<Response<Incoming>>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ClusterError::Connect(e.to_string()))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "api connection closed with error");
        }
    });

    sender
        .send_request(req)
        .await
        .map_err(|e| ClusterError::Http(e.to_string()))
}

async fn collect(resp: Response<Incoming>) -> ClusterResult<Bytes> {
    Ok(resp
        .into_body()
        .collect()
        .await
        .map_err(|e| ClusterError::Http(e.to_string()))?
        .to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_http_endpoint() {
        let ep = Endpoint::parse("http://127.0.0.1:8001").unwrap();
        assert_eq!(
            ep,
            Endpoint {
                https: false,
                host: "127.0.0.1".to_string(),
                port: 8001
            }
        );
        assert_eq!(ep.authority(), "127.0.0.1:8001");
    }

    #[test]
    fn defaults_port_from_scheme() {
        assert_eq!(Endpoint::parse("https://kubernetes.default.svc").unwrap().port, 443);
        assert_eq!(Endpoint::parse("http://localhost/").unwrap().port, 80);
    }

    #[test]
    fn strips_ipv6_brackets() {
        let ep = Endpoint::parse("https://[fd00::1]:6443").unwrap();
        assert_eq!(ep.host, "fd00::1");
        assert_eq!(ep.authority(), "[fd00::1]:6443");
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(
            Endpoint::parse("ftp://example.com"),
            Err(ClusterError::Credentials(_))
        ));
        assert!(Endpoint::parse("127.0.0.1:8001").is_err());
    }
}
