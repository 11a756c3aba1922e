//! Per-tick snapshot assembly.

use tracing::debug;

use webscale_engine::ClusterSnapshot;

use crate::client::ClusterClient;
use crate::error::ClusterResult;

/// Read everything one decision needs from the cluster.
///
/// Ready replicas are listed first; CPU usage is fetched for exactly that
/// list, so the snapshot is internally consistent even if pods change
/// while it is built.
pub async fn collect_snapshot<C: ClusterClient>(client: &C) -> ClusterResult<ClusterSnapshot> {
    let ready = client.ready_replicas().await?;
    let ready_replicas = client.cpu_usage(&ready).await?;
    let requested_cpu_per_replica_millicores = client.requested_cpu_millicores().await?;
    let current_replica_count = client.current_replica_count().await?;

    let snapshot = ClusterSnapshot {
        ready_replicas,
        requested_cpu_per_replica_millicores,
        current_replica_count,
    };

    debug!(
        ready = snapshot.num_ready(),
        current = snapshot.current_replica_count,
        requested_cpu = snapshot.requested_cpu_per_replica_millicores,
        total_cpu = snapshot.total_cpu_millicores(),
        "snapshot collected"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeCluster;
    use webscale_engine::ReplicaObservation;

    #[tokio::test]
    async fn snapshot_reflects_cluster() {
        let cluster = FakeCluster::new(100, 3).with_ready(vec![
            ReplicaObservation::new("pod_a", "ip_a", 90.0),
            ReplicaObservation::new("pod_b", "ip_b", 110.0),
        ]);

        let snap = collect_snapshot(&cluster).await.unwrap();

        assert_eq!(snap.num_ready(), 2);
        assert_eq!(snap.total_cpu_millicores(), 200.0);
        assert_eq!(snap.requested_cpu_per_replica_millicores, 100);
        assert_eq!(snap.current_replica_count, 3);
        assert_eq!(snap.ready_replicas[0].id, "pod_a");
    }

    #[tokio::test]
    async fn snapshot_propagates_failures() {
        let cluster = FakeCluster::new(100, 3);
        cluster.fail_reads(true);

        assert!(collect_snapshot(&cluster).await.is_err());
    }
}
