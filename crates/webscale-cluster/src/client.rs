//! Cluster operations the scale loop depends on.
//!
//! `ClusterClient` is the seam between the loop driver and the
//! orchestrator; `KubeClient` implements it against the Kubernetes REST
//! API. Every call is a single request; failures surface as
//! `ClusterError` and are handled at the tick boundary.

use std::collections::HashMap;
use std::future::Future;

use tracing::{debug, warn};

use webscale_engine::ReplicaObservation;

use crate::credentials::KubeConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::model::{Deployment, PodList, PodMetricsList};
use crate::pods::{label_selector, serving_pods};
use crate::quantity::{parse_cpu_millicores, parse_cpu_request_millicores};
use crate::transport::{ApiTransport, JSON_PATCH, MERGE_PATCH};

/// Annotation the ReplicaSet controller reads to pick which pods to
/// remove first when scaling down.
pub const POD_DELETION_COST_ANNOTATION: &str = "controller.kubernetes.io/pod-deletion-cost";

/// A ready replica: pod name and pod IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaRef {
    pub id: String,
    pub address: String,
}

impl ReplicaRef {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

/// Read and mutate the scaled workload.
pub trait ClusterClient {
    /// CPU request of one replica, in millicores.
    fn requested_cpu_millicores(&self) -> impl Future<Output = ClusterResult<u64>> + Send;

    /// Replica count the deployment currently asks for.
    fn current_replica_count(&self) -> impl Future<Output = ClusterResult<u32>> + Send;

    /// Ready replicas in a stable order.
    fn ready_replicas(&self) -> impl Future<Output = ClusterResult<Vec<ReplicaRef>>> + Send;

    /// Current CPU usage of each replica, in the order given.
    fn cpu_usage(
        &self,
        replicas: &[ReplicaRef],
    ) -> impl Future<Output = ClusterResult<Vec<ReplicaObservation>>> + Send;

    /// Set the deployment's replica count.
    fn set_replica_count(&self, target: u32) -> impl Future<Output = ClusterResult<()>> + Send;

    /// Annotate a replica with a removal priority cost.
    fn mark_for_removal(
        &self,
        replica_id: &str,
        priority_cost: i32,
    ) -> impl Future<Output = ClusterResult<()>> + Send;
}

/// Names identifying the scaled workload inside its namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    /// Deployment whose replica count we manage.
    pub deployment: String,
    /// Container whose CPU request, usage and readiness count.
    pub container: String,
    /// `app` label of the workload's pods.
    pub app: String,
    /// `role` label of the workload's pods.
    pub role: String,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            deployment: "web".to_string(),
            container: "web".to_string(),
            app: "my_app".to_string(),
            role: "web".to_string(),
        }
    }
}

/// `ClusterClient` backed by the Kubernetes REST API.
#[derive(Clone)]
pub struct KubeClient {
    transport: ApiTransport,
    namespace: String,
    workload: Workload,
}

impl KubeClient {
    pub fn new(config: &KubeConfig, workload: Workload) -> Self {
        Self {
            transport: ApiTransport::new(config),
            namespace: config.namespace.clone(),
            workload,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    pub(crate) fn transport(&self) -> &ApiTransport {
        &self.transport
    }

    fn deployment_path(&self) -> String {
        format!(
            "/apis/apps/v1/namespaces/{}/deployments/{}",
            self.namespace, self.workload.deployment
        )
    }

    fn selector(&self) -> String {
        label_selector(&self.workload.app, &self.workload.role)
    }

    /// Pod list path for the workload's label selector.
    pub(crate) fn pods_path(&self) -> String {
        format!(
            "/api/v1/namespaces/{}/pods?labelSelector={}",
            self.namespace,
            self.selector()
        )
    }

    /// Fetch the deployment; `None` when it does not exist.
    pub async fn deployment(&self) -> ClusterResult<Option<Deployment>> {
        match self
            .transport
            .get_json::<Deployment>(&self.deployment_path(), "deployment")
            .await
        {
            Ok(d) => Ok(Some(d)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// All pods matching the workload's labels, as listed by the API.
    pub async fn pods(&self) -> ClusterResult<PodList> {
        self.transport.get_json(&self.pods_path(), "pod list").await
    }

    async fn pod_metrics(&self) -> ClusterResult<PodMetricsList> {
        let path = format!(
            "/apis/metrics.k8s.io/v1beta1/namespaces/{}/pods?labelSelector={}",
            self.namespace,
            self.selector()
        );
        self.transport.get_json(&path, "pod metrics").await
    }
}

impl ClusterClient for KubeClient {
    async fn requested_cpu_millicores(&self) -> ClusterResult<u64> {
        let Some(deployment) = self.deployment().await? else {
            warn!(deployment = %self.workload.deployment, namespace = %self.namespace, "deployment not found, assuming no cpu request");
            return Ok(0);
        };

        let container = deployment.container(&self.workload.container).ok_or_else(|| {
            ClusterError::ContainerNotFound {
                deployment: self.workload.deployment.clone(),
                container: self.workload.container.clone(),
            }
        })?;

        match container.resources.requests.get("cpu") {
            Some(cpu) => parse_cpu_request_millicores(cpu),
            None => {
                warn!(container = %self.workload.container, "container has no cpu request");
                Ok(0)
            }
        }
    }

    async fn current_replica_count(&self) -> ClusterResult<u32> {
        match self.deployment().await? {
            // The API server defaults an unset count to 1.
            Some(deployment) => Ok(deployment.spec.replicas.unwrap_or(1)),
            None => {
                warn!(deployment = %self.workload.deployment, namespace = %self.namespace, "deployment not found, assuming 0 replicas");
                Ok(0)
            }
        }
    }

    async fn ready_replicas(&self) -> ClusterResult<Vec<ReplicaRef>> {
        let pods = self.pods().await?;
        let ready: Vec<ReplicaRef> = serving_pods(&pods.items, &self.workload.container)
            .into_iter()
            .map(|(id, address)| ReplicaRef { id, address })
            .collect();

        debug!(listed = pods.items.len(), ready = ready.len(), "ready replicas");
        Ok(ready)
    }

    async fn cpu_usage(&self, replicas: &[ReplicaRef]) -> ClusterResult<Vec<ReplicaObservation>> {
        let metrics = self.pod_metrics().await?;

        let mut usage: HashMap<&str, f64> = HashMap::new();
        for pod in &metrics.items {
            for container in &pod.containers {
                if container.name != self.workload.container {
                    continue;
                }
                if let Some(cpu) = container.usage.get("cpu") {
                    usage.insert(pod.metadata.name.as_str(), parse_cpu_millicores(cpu)?);
                }
            }
        }

        Ok(replicas
            .iter()
            .map(|r| {
                let cpu = usage.get(r.id.as_str()).copied().unwrap_or_else(|| {
                    debug!(replica = %r.id, "no cpu metrics for replica, counting 0");
                    0.0
                });
                debug!(replica = %r.id, address = %r.address, cpu_millicores = cpu, "replica cpu");
                ReplicaObservation::new(r.id.clone(), r.address.clone(), cpu)
            })
            .collect())
    }

    async fn set_replica_count(&self, target: u32) -> ClusterResult<()> {
        let patch = serde_json::json!([
            {"op": "replace", "path": "/spec/replicas", "value": target}
        ]);
        self.transport
            .patch(&format!("{}/scale", self.deployment_path()), JSON_PATCH, &patch)
            .await?;
        debug!(target, deployment = %self.workload.deployment, "replica count set");
        Ok(())
    }

    async fn mark_for_removal(&self, replica_id: &str, priority_cost: i32) -> ClusterResult<()> {
        let patch = serde_json::json!({
            "metadata": {"annotations": {(POD_DELETION_COST_ANNOTATION): priority_cost.to_string()}}
        });
        self.transport
            .patch(
                &format!("/api/v1/namespaces/{}/pods/{}", self.namespace, replica_id),
                MERGE_PATCH,
                &patch,
            )
            .await?;
        debug!(replica = %replica_id, priority_cost, "replica annotated for removal");
        Ok(())
    }
}
