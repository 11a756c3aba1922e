//! In-memory `ClusterClient` for tests.

use std::sync::{Arc, Mutex, MutexGuard};

use webscale_engine::ReplicaObservation;

use crate::client::{ClusterClient, ReplicaRef};
use crate::error::{ClusterError, ClusterResult};

#[derive(Debug, Default)]
struct FakeState {
    requested_cpu: u64,
    replicas: u32,
    ready: Vec<ReplicaObservation>,
    fail_reads: bool,
    fail_writes: bool,
    replica_writes: Vec<u32>,
    marked: Vec<(String, i32)>,
}

/// A cluster held in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCluster {
    pub fn new(requested_cpu: u64, replicas: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                requested_cpu,
                replicas,
                ..Default::default()
            })),
        }
    }

    pub fn with_ready(self, ready: Vec<ReplicaObservation>) -> Self {
        self.set_ready(ready);
        self
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_ready(&self, ready: Vec<ReplicaObservation>) {
        self.lock().ready = ready;
    }

    pub fn set_replicas(&self, replicas: u32) {
        self.lock().replicas = replicas;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Current replica count.
    pub fn replicas(&self) -> u32 {
        self.lock().replicas
    }

    /// Every replica count written, in order.
    pub fn replica_writes(&self) -> Vec<u32> {
        self.lock().replica_writes.clone()
    }

    /// Every `(replica, cost)` annotation written, in order.
    pub fn marked(&self) -> Vec<(String, i32)> {
        self.lock().marked.clone()
    }

    fn read_guard(&self) -> ClusterResult<MutexGuard<'_, FakeState>> {
        let state = self.lock();
        if state.fail_reads {
            return Err(ClusterError::Connect("fake read failure".to_string()));
        }
        Ok(state)
    }

    fn write_guard(&self) -> ClusterResult<MutexGuard<'_, FakeState>> {
        let state = self.lock();
        if state.fail_writes {
            return Err(ClusterError::Connect("fake write failure".to_string()));
        }
        Ok(state)
    }
}

impl ClusterClient for FakeCluster {
    async fn requested_cpu_millicores(&self) -> ClusterResult<u64> {
        Ok(self.read_guard()?.requested_cpu)
    }

    async fn current_replica_count(&self) -> ClusterResult<u32> {
        Ok(self.read_guard()?.replicas)
    }

    async fn ready_replicas(&self) -> ClusterResult<Vec<ReplicaRef>> {
        Ok(self
            .read_guard()?
            .ready
            .iter()
            .map(|r| ReplicaRef::new(r.id.clone(), r.address.clone()))
            .collect())
    }

    async fn cpu_usage(&self, replicas: &[ReplicaRef]) -> ClusterResult<Vec<ReplicaObservation>> {
        let state = self.read_guard()?;
        Ok(replicas
            .iter()
            .map(|r| {
                let cpu = state
                    .ready
                    .iter()
                    .find(|o| o.id == r.id)
                    .map_or(0.0, |o| o.cpu_usage_millicores);
                ReplicaObservation::new(r.id.clone(), r.address.clone(), cpu)
            })
            .collect())
    }

    async fn set_replica_count(&self, target: u32) -> ClusterResult<()> {
        let mut state = self.write_guard()?;
        state.replicas = target;
        state.replica_writes.push(target);
        Ok(())
    }

    async fn mark_for_removal(&self, replica_id: &str, priority_cost: i32) -> ClusterResult<()> {
        self.write_guard()?
            .marked
            .push((replica_id.to_string(), priority_cost));
        Ok(())
    }
}
