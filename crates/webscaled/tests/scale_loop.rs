//! Scale loop ticks end to end against an in-memory cluster.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use webscale_cluster::fake::FakeCluster;
use webscale_engine::{DatasetProbe, Policy, ReplicaObservation, ScalerAction};
use webscaled::{ScaleLoop, ScalerSettings};

/// Dataset counts by address; unknown addresses do not answer.
#[derive(Default)]
struct StubProbe {
    loads: HashMap<String, u64>,
}

impl StubProbe {
    fn with(loads: &[(&str, u64)]) -> Self {
        Self {
            loads: loads.iter().map(|(a, n)| (a.to_string(), *n)).collect(),
        }
    }
}

impl DatasetProbe for StubProbe {
    async fn probe_load(&self, address: &str) -> Option<u64> {
        self.loads.get(address).copied()
    }
}

fn settings(min_replicas: u32, max_replicas: u32) -> ScalerSettings {
    ScalerSettings {
        policy: Policy::new(min_replicas, max_replicas, 0.7, 0.4, Duration::from_secs(300)).unwrap(),
        loop_interval: Duration::from_secs(30),
    }
}

fn replicas(cpu: &[f64]) -> Vec<ReplicaObservation> {
    let names = ["pod_a", "pod_b", "pod_c", "pod_d"];
    let ips = ["ip_a", "ip_b", "ip_c", "ip_d"];
    cpu.iter()
        .enumerate()
        .map(|(i, c)| ReplicaObservation::new(names[i], ips[i], *c))
        .collect()
}

#[tokio::test]
async fn hot_tier_scales_up_by_one() {
    let cluster = FakeCluster::new(100, 3).with_ready(replicas(&[100.0, 100.0, 100.0]));
    let mut scale_loop = ScaleLoop::new(cluster.clone(), StubProbe::default(), &settings(1, 5));
    let now = Instant::now();

    let decision = scale_loop.tick(now).await.unwrap();

    assert_eq!(decision.action, ScalerAction::ScaleUp);
    assert_eq!(cluster.replicas(), 4);
    assert_eq!(cluster.replica_writes(), vec![4]);
    assert_eq!(scale_loop.debounce().last_scale_up(), Some(now));
}

#[tokio::test]
async fn idle_replica_is_removed() {
    let cluster = FakeCluster::new(100, 3).with_ready(replicas(&[20.0, 20.0, 20.0]));
    let probe = StubProbe::with(&[("ip_a", 3), ("ip_b", 0), ("ip_c", 55)]);
    let mut scale_loop = ScaleLoop::new(cluster.clone(), probe, &settings(2, 5));

    let decision = scale_loop.tick(Instant::now()).await.unwrap();

    assert_eq!(decision.action, ScalerAction::ScaleDown);
    assert_eq!(cluster.marked(), vec![("pod_b".to_string(), 0)]);
    assert_eq!(cluster.replicas(), 2);
    assert_eq!(scale_loop.debounce().last_scale_up(), None);
}

#[tokio::test]
async fn recent_scale_up_blocks_scale_down() {
    let cluster = FakeCluster::new(100, 3).with_ready(replicas(&[100.0, 100.0, 100.0]));
    let probe = StubProbe::with(&[("ip_a", 3), ("ip_b", 0), ("ip_c", 55), ("ip_d", 0)]);
    let mut scale_loop = ScaleLoop::new(cluster.clone(), probe, &settings(2, 5));
    let start = Instant::now();

    assert_eq!(scale_loop.tick(start).await.unwrap().action, ScalerAction::ScaleUp);

    // The new replica came up and load dropped.
    cluster.set_ready(replicas(&[20.0, 20.0, 20.0, 20.0]));

    let decision = scale_loop.tick(start + Duration::from_secs(60)).await.unwrap();
    assert_eq!(decision.action, ScalerAction::NoOp);
    assert!(cluster.marked().is_empty());
    assert_eq!(cluster.replicas(), 4);

    let decision = scale_loop.tick(start + Duration::from_secs(301)).await.unwrap();
    assert_eq!(decision.action, ScalerAction::ScaleDown);
    assert_eq!(
        cluster.marked(),
        vec![("pod_b".to_string(), 0), ("pod_d".to_string(), 0)]
    );
    assert_eq!(cluster.replicas(), 2);
    assert_eq!(cluster.replica_writes(), vec![4, 3, 2]);
}

#[tokio::test]
async fn starting_replicas_hold_the_tier() {
    let cluster = FakeCluster::new(100, 4).with_ready(replicas(&[100.0, 100.0, 100.0]));
    let mut scale_loop = ScaleLoop::new(cluster.clone(), StubProbe::default(), &settings(1, 5));

    let decision = scale_loop.tick(Instant::now()).await.unwrap();

    assert_eq!(decision.action, ScalerAction::NoOp);
    assert!(cluster.replica_writes().is_empty());
}

#[tokio::test]
async fn failed_scale_up_leaves_debounce_untouched() {
    let cluster = FakeCluster::new(100, 3).with_ready(replicas(&[100.0, 100.0, 100.0]));
    cluster.fail_writes(true);
    let mut scale_loop = ScaleLoop::new(cluster.clone(), StubProbe::default(), &settings(1, 5));

    assert!(scale_loop.tick(Instant::now()).await.is_err());
    assert_eq!(scale_loop.debounce().last_scale_up(), None);
    assert_eq!(cluster.replicas(), 3);

    // The next tick retries once the cluster answers again.
    cluster.fail_writes(false);
    let decision = scale_loop.tick(Instant::now()).await.unwrap();
    assert_eq!(decision.action, ScalerAction::ScaleUp);
    assert_eq!(cluster.replicas(), 4);
}

#[tokio::test]
async fn unreadable_cluster_fails_the_tick_only() {
    let cluster = FakeCluster::new(100, 3).with_ready(replicas(&[20.0, 20.0, 20.0]));
    cluster.fail_reads(true);
    let mut scale_loop = ScaleLoop::new(cluster.clone(), StubProbe::with(&[("ip_a", 0)]), &settings(1, 5));

    assert!(scale_loop.tick(Instant::now()).await.is_err());
    assert!(cluster.marked().is_empty());

    cluster.fail_reads(false);
    let decision = scale_loop.tick(Instant::now()).await.unwrap();
    assert_eq!(decision.action, ScalerAction::ScaleDown);
}

#[tokio::test(start_paused = true)]
async fn run_stops_on_shutdown() {
    let cluster = FakeCluster::new(100, 3).with_ready(replicas(&[50.0, 50.0, 50.0]));
    let mut scale_loop = ScaleLoop::new(cluster, StubProbe::default(), &settings(1, 5));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(async move { scale_loop.run(shutdown_rx).await });
    tokio::time::sleep(Duration::from_secs(65)).await;
    shutdown_tx.send(true).unwrap();

    handle.await.unwrap();
}
