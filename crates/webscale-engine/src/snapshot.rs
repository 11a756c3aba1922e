//! Per-tick view of the scaled workload.

/// One ready replica as observed at the start of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaObservation {
    /// Orchestrator identifier (pod name).
    pub id: String,
    /// Network address used by the dataset probe (pod IP).
    pub address: String,
    /// CPU usage in millicores.
    pub cpu_usage_millicores: f64,
}

impl ReplicaObservation {
    pub fn new(id: impl Into<String>, address: impl Into<String>, cpu_usage_millicores: f64) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            cpu_usage_millicores,
        }
    }
}

/// Everything a single decision needs to know about the cluster.
///
/// Built once per tick and never modified while a decision runs. The
/// order of `ready_replicas` is the order in which scale-down candidates
/// are probed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterSnapshot {
    pub ready_replicas: Vec<ReplicaObservation>,
    /// CPU request of one replica, in millicores.
    pub requested_cpu_per_replica_millicores: u64,
    /// Replica count the deployment currently asks for.
    pub current_replica_count: u32,
}

impl ClusterSnapshot {
    /// Number of ready replicas.
    pub fn num_ready(&self) -> u32 {
        u32::try_from(self.ready_replicas.len()).unwrap_or(u32::MAX)
    }

    /// Summed CPU usage over the ready replicas.
    pub fn total_cpu_millicores(&self) -> f64 {
        self.ready_replicas
            .iter()
            .map(|r| r.cpu_usage_millicores)
            .sum()
    }

    /// CPU requested by all ready replicas together.
    pub fn total_requested_millicores(&self) -> f64 {
        self.requested_cpu_per_replica_millicores as f64 * f64::from(self.num_ready())
    }

    /// Whether every replica the deployment asks for is ready.
    ///
    /// False while a previous scale-up is still starting replicas.
    pub fn is_settled(&self) -> bool {
        self.current_replica_count == self.num_ready()
    }
}
