//! Readiness watch.
//!
//! A `PodWatcher` lists the workload's pods, publishes the serving
//! addresses as a `PodEvent::Reset`, then follows the watch stream from
//! the list's resource version and turns each change into a `PodEvent`.
//! Every reconnect starts over with a fresh list, so pods that went away
//! while disconnected drop out of the set. Events travel over an mpsc channel to a
//! single applier task, the only writer of `ReadyAddresses`. The scale
//! loop reads the set for logging; its decisions still come from fresh
//! snapshots.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use http_body_util::BodyExt;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::KubeClient;
use crate::error::{ClusterError, ClusterResult};
use crate::model::{Pod, WatchEvent};
use crate::pods::{is_serving, serving_pods};

/// Default pause before re-opening a dropped watch.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// A change in the set of serving replica addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodEvent {
    Added(String),
    Removed(String),
    /// Every serving address, replacing whatever was known before.
    Reset(Vec<String>),
}

/// Map one watch notification to a readiness change.
///
/// `ADDED` and `MODIFIED` pods that are serving are added. A `MODIFIED`
/// pod that stopped serving, or a `DELETED` pod, is removed. Pods
/// without an IP produce nothing.
pub fn pod_event(kind: &str, pod: &Pod, container: &str) -> Option<PodEvent> {
    let ip = pod.status.pod_ip.clone()?;
    match kind {
        "ADDED" if is_serving(pod, container) => Some(PodEvent::Added(ip)),
        "MODIFIED" if is_serving(pod, container) => Some(PodEvent::Added(ip)),
        "MODIFIED" | "DELETED" => Some(PodEvent::Removed(ip)),
        _ => None,
    }
}

/// Addresses of currently serving replicas. Clones share the set.
#[derive(Debug, Clone, Default)]
pub struct ReadyAddresses {
    inner: Arc<RwLock<BTreeSet<String>>>,
}

impl ReadyAddresses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns whether the set changed.
    pub async fn apply(&self, event: PodEvent) -> bool {
        let mut set = self.inner.write().await;
        match event {
            PodEvent::Added(ip) => set.insert(ip),
            PodEvent::Removed(ip) => set.remove(&ip),
            PodEvent::Reset(ips) => {
                let next: BTreeSet<String> = ips.into_iter().collect();
                if *set == next {
                    false
                } else {
                    *set = next;
                    true
                }
            }
        }
    }

    /// Sorted copy of the current addresses.
    pub async fn snapshot(&self) -> Vec<String> {
        self.inner.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn contains(&self, address: &str) -> bool {
        self.inner.read().await.contains(address)
    }
}

/// Drain `events` into `addresses` until every sender is gone.
pub async fn run_applier(mut events: mpsc::Receiver<PodEvent>, addresses: ReadyAddresses) {
    while let Some(event) = events.recv().await {
        let description = format!("{event:?}");
        if addresses.apply(event).await {
            let ready = addresses.len().await;
            debug!(event = %description, ready, "ready addresses updated");
        }
    }
    debug!("readiness applier stopped");
}

/// Splits a chunked body into newline-terminated lines.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, without its terminator.
    fn next_line(&mut self) -> Option<BytesMut> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line = self.buf.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }
        Some(line)
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}

/// Follows the workload's pods and emits `PodEvent`s.
pub struct PodWatcher {
    client: KubeClient,
    events: mpsc::Sender<PodEvent>,
    retry_interval: Duration,
}

impl PodWatcher {
    pub fn new(client: KubeClient, events: mpsc::Sender<PodEvent>) -> Self {
        Self {
            client,
            events,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Watch until shutdown is signalled or the applier goes away,
    /// re-opening the stream after each disconnect.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(namespace = %self.client.namespace(), "pod watcher started");

        loop {
            if self.events.is_closed() {
                debug!("readiness applier gone, pod watcher stopping");
                return;
            }

            tokio::select! {
                result = self.watch_once() => match result {
                    Ok(()) => debug!("pod watch stream ended"),
                    Err(e) => warn!(error = %e, "pod watch failed"),
                },
                _ = shutdown.changed() => {
                    debug!("pod watcher shutting down");
                    return;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.retry_interval) => {}
                _ = shutdown.changed() => {
                    debug!("pod watcher shutting down");
                    return;
                }
            }
        }
    }

    /// List, publish the serving set, then follow one watch stream to its
    /// end.
    async fn watch_once(&self) -> ClusterResult<()> {
        let pods = self.client.pods().await?;
        let serving: Vec<String> = serving_pods(&pods.items, &self.client.workload().container)
            .into_iter()
            .map(|(_, ip)| ip)
            .collect();
        debug!(listed = pods.items.len(), serving = serving.len(), "pod list before watch");
        if self.events.send(PodEvent::Reset(serving)).await.is_err() {
            return Ok(());
        }

        let mut path = format!("{}&watch=true", self.client.pods_path());
        if let Some(version) = &pods.metadata.resource_version {
            path.push_str("&resourceVersion=");
            path.push_str(version);
        }
        let mut body = self.client.transport().stream(&path).await?;
        let mut lines = LineBuffer::default();

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| ClusterError::Http(e.to_string()))?;
            let Ok(data) = frame.into_data() else {
                continue;
            };
            lines.push(&data);

            while let Some(line) = lines.next_line() {
                if line.is_empty() {
                    continue;
                }
                if !self.handle_line(&line).await? {
                    return Ok(());
                }
            }
        }

        if lines.remaining() > 0 {
            debug!(bytes = lines.remaining(), "pod watch ended mid-line");
        }
        Ok(())
    }

    /// Returns `false` when the stream should be abandoned.
    async fn handle_line(&self, line: &[u8]) -> ClusterResult<bool> {
        let event: WatchEvent = serde_json::from_slice(line).map_err(|e| ClusterError::Decode {
            what: "watch event",
            reason: e.to_string(),
        })?;

        if event.kind == "ERROR" {
            warn!(status = %event.object, "pod watch reported an error");
            return Ok(false);
        }

        let pod: Pod = serde_json::from_value(event.object).map_err(|e| ClusterError::Decode {
            what: "watched pod",
            reason: e.to_string(),
        })?;

        let Some(change) = pod_event(&event.kind, &pod, &self.client.workload().container) else {
            return Ok(true);
        };

        debug!(pod = %pod.metadata.name, kind = %event.kind, change = ?change, "pod readiness change");
        Ok(self.events.send(change).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerStatus, ObjectMeta, PodCondition, PodStatus};

    fn pod(ready: bool, ip: Option<&str>) -> Pod {
        let flag = if ready { "True" } else { "False" };
        Pod {
            metadata: ObjectMeta {
                name: "web-1".to_string(),
                ..Default::default()
            },
            status: PodStatus {
                pod_ip: ip.map(str::to_string),
                conditions: vec![PodCondition {
                    kind: "Ready".to_string(),
                    status: flag.to_string(),
                }],
                container_statuses: vec![ContainerStatus {
                    name: "web".to_string(),
                    ready,
                }],
            },
        }
    }

    #[test]
    fn added_ready_pod_is_added() {
        assert_eq!(
            pod_event("ADDED", &pod(true, Some("10.0.0.1")), "web"),
            Some(PodEvent::Added("10.0.0.1".to_string()))
        );
    }

    #[test]
    fn added_unready_pod_is_ignored() {
        assert_eq!(pod_event("ADDED", &pod(false, Some("10.0.0.1")), "web"), None);
    }

    #[test]
    fn modified_pod_follows_readiness() {
        assert_eq!(
            pod_event("MODIFIED", &pod(true, Some("10.0.0.1")), "web"),
            Some(PodEvent::Added("10.0.0.1".to_string()))
        );
        assert_eq!(
            pod_event("MODIFIED", &pod(false, Some("10.0.0.1")), "web"),
            Some(PodEvent::Removed("10.0.0.1".to_string()))
        );
    }

    #[test]
    fn deleted_pod_is_removed_even_if_ready() {
        assert_eq!(
            pod_event("DELETED", &pod(true, Some("10.0.0.1")), "web"),
            Some(PodEvent::Removed("10.0.0.1".to_string()))
        );
    }

    #[test]
    fn pod_without_ip_is_ignored() {
        assert_eq!(pod_event("DELETED", &pod(true, None), "web"), None);
        assert_eq!(pod_event("BOOKMARK", &pod(true, Some("10.0.0.1")), "web"), None);
    }

    #[test]
    fn container_name_matters() {
        assert_eq!(pod_event("ADDED", &pod(true, Some("10.0.0.1")), "sidecar"), None);
    }

    #[tokio::test]
    async fn ready_addresses_apply() {
        let set = ReadyAddresses::new();
        assert!(set.apply(PodEvent::Added("10.0.0.2".to_string())).await);
        assert!(set.apply(PodEvent::Added("10.0.0.1".to_string())).await);
        assert!(!set.apply(PodEvent::Added("10.0.0.1".to_string())).await);
        assert_eq!(set.snapshot().await, vec!["10.0.0.1", "10.0.0.2"]);

        assert!(set.apply(PodEvent::Removed("10.0.0.2".to_string())).await);
        assert!(!set.apply(PodEvent::Removed("10.0.0.9".to_string())).await);
        assert_eq!(set.len().await, 1);
        assert!(set.contains("10.0.0.1").await);
    }

    #[tokio::test]
    async fn reset_replaces_the_set() {
        let set = ReadyAddresses::new();
        set.apply(PodEvent::Added("10.0.0.1".to_string())).await;
        set.apply(PodEvent::Added("10.0.0.2".to_string())).await;

        let changed = set
            .apply(PodEvent::Reset(vec!["10.0.0.3".to_string(), "10.0.0.2".to_string()]))
            .await;
        assert!(changed);
        assert_eq!(set.snapshot().await, vec!["10.0.0.2", "10.0.0.3"]);

        let changed = set
            .apply(PodEvent::Reset(vec!["10.0.0.2".to_string(), "10.0.0.3".to_string()]))
            .await;
        assert!(!changed);

        assert!(set.apply(PodEvent::Reset(Vec::new())).await);
        assert!(set.is_empty().await);
    }

    #[tokio::test]
    async fn applier_drains_channel() {
        let set = ReadyAddresses::new();
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(run_applier(rx, set.clone()));

        tx.send(PodEvent::Added("10.0.0.1".to_string())).await.unwrap();
        tx.send(PodEvent::Added("10.0.0.2".to_string())).await.unwrap();
        tx.send(PodEvent::Removed("10.0.0.1".to_string())).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(set.snapshot().await, vec!["10.0.0.2"]);
    }

    #[test]
    fn line_buffer_joins_split_chunks() {
        let mut lines = LineBuffer::default();
        lines.push(b"{\"a\":");
        assert!(lines.next_line().is_none());

        lines.push(b"1}\r\n{\"b\":2}\n{\"c\"");
        assert_eq!(&lines.next_line().unwrap()[..], b"{\"a\":1}");
        assert_eq!(&lines.next_line().unwrap()[..], b"{\"b\":2}");
        assert!(lines.next_line().is_none());
        assert_eq!(lines.remaining(), 4);
    }
}
