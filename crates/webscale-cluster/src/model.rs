//! The slices of Kubernetes API objects webscale reads.
//!
//! Every field is optional on the wire; missing fields decode to their
//! defaults so partially populated objects (pending pods, deployments
//! without requests) still parse.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.labels.get(key).is_some_and(|v| v == value)
    }
}

// ── Deployments ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Deployment {
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeploymentSpec {
    pub replicas: Option<u32>,
    pub template: PodTemplateSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PodTemplateSpec {
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PodSpec {
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Container {
    pub name: String,
    pub resources: ResourceRequirements,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceRequirements {
    pub requests: BTreeMap<String, String>,
}

impl Deployment {
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.spec.template.spec.containers.iter().find(|c| c.name == name)
    }
}

// ── Pods ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PodList {
    pub metadata: ListMeta,
    pub items: Vec<Pod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListMeta {
    /// Version to start a watch from so it picks up right after the list.
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(rename = "podIP")]
    pub pod_ip: Option<String>,
    pub conditions: Vec<PodCondition>,
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
}

// ── metrics.k8s.io ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PodMetricsList {
    pub items: Vec<PodMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    pub containers: Vec<ContainerMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContainerMetrics {
    pub name: String,
    pub usage: BTreeMap<String, String>,
}

// ── Watch ────────────────────────────────────────────────────────

/// One line of a `?watch=true` stream.
///
/// `object` stays untyped because `ERROR` events carry a `Status`
/// rather than a pod.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub object: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_deployment_requests() {
        let json = r#"{
            "metadata": {"name": "web", "namespace": "prod"},
            "spec": {
                "replicas": 3,
                "template": {"spec": {"containers": [
                    {"name": "sidecar"},
                    {"name": "web", "resources": {"requests": {"cpu": "100m", "memory": "1Gi"}}}
                ]}}
            }
        }"#;
        let deployment: Deployment = serde_json::from_str(json).unwrap();
        assert_eq!(deployment.spec.replicas, Some(3));
        let web = deployment.container("web").unwrap();
        assert_eq!(web.resources.requests.get("cpu").map(String::as_str), Some("100m"));
        assert!(deployment.container("sidecar").unwrap().resources.requests.is_empty());
        assert!(deployment.container("missing").is_none());
    }

    #[test]
    fn decodes_pod_status() {
        let json = r#"{
            "metadata": {"name": "web-1", "namespace": "prod", "labels": {"app": "my_app", "role": "web"}},
            "status": {
                "podIP": "10.0.0.7",
                "conditions": [{"type": "Ready", "status": "True"}],
                "containerStatuses": [{"name": "web", "ready": true, "restartCount": 0}]
            }
        }"#;
        let pod: Pod = serde_json::from_str(json).unwrap();
        assert_eq!(pod.status.pod_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(pod.status.conditions[0].kind, "Ready");
        assert!(pod.status.container_statuses[0].ready);
        assert!(pod.metadata.has_label("role", "web"));
        assert!(!pod.metadata.has_label("role", "worker"));
    }

    #[test]
    fn decodes_pending_pod_without_status() {
        let pod: Pod = serde_json::from_str(r#"{"metadata": {"name": "web-2"}}"#).unwrap();
        assert!(pod.status.pod_ip.is_none());
        assert!(pod.status.conditions.is_empty());
    }

    #[test]
    fn decodes_pod_list_resource_version() {
        let json = r#"{"metadata": {"resourceVersion": "4711"}, "items": [{"metadata": {"name": "web-1"}}]}"#;
        let list: PodList = serde_json::from_str(json).unwrap();
        assert_eq!(list.metadata.resource_version.as_deref(), Some("4711"));
        assert_eq!(list.items.len(), 1);

        let bare: PodList = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(bare.metadata.resource_version.is_none());
    }

    #[test]
    fn decodes_pod_metrics() {
        let json = r#"{"items": [{
            "metadata": {"name": "web-1"},
            "containers": [{"name": "web", "usage": {"cpu": "1234567n", "memory": "10Mi"}}]
        }]}"#;
        let list: PodMetricsList = serde_json::from_str(json).unwrap();
        assert_eq!(list.items[0].containers[0].usage["cpu"], "1234567n");
    }
}
