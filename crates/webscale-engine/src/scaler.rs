//! Scaling decisions.
//!
//! `decide()` compares the snapshot's total CPU against the band derived
//! from the policy and either grows the deployment by one replica, holds,
//! or removes idle replicas. It returns the effects to apply instead of
//! applying them, so it can be driven against any orchestrator.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::debounce::DebounceState;
use crate::effect::EffectRequest;
use crate::policy::Policy;
use crate::probe::DatasetProbe;
use crate::snapshot::ClusterSnapshot;

/// What a tick did to the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalerAction {
    ScaleUp,
    ScaleDown,
    NoOp,
}

/// Where the total CPU usage falls relative to the policy band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuBand {
    /// `total > upper`.
    Above,
    /// `lower < total <= upper`.
    Within,
    /// `total <= lower`.
    Below,
}

impl CpuBand {
    /// Classify `total` against the `(lower, upper]` hold band.
    pub fn classify(total: f64, lower: f64, upper: f64) -> Self {
        if total > upper {
            Self::Above
        } else if total > lower {
            Self::Within
        } else {
            Self::Below
        }
    }
}

/// The result of one `decide()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: ScalerAction,
    /// Effects to apply in order.
    pub effects: Vec<EffectRequest>,
}

impl Decision {
    fn no_op() -> Self {
        Self {
            action: ScalerAction::NoOp,
            effects: Vec::new(),
        }
    }

    /// Replica ids marked for removal by this decision.
    pub fn victims(&self) -> impl Iterator<Item = &str> {
        self.effects.iter().filter_map(|e| match e {
            EffectRequest::MarkForRemoval { replica_id, .. } => Some(replica_id.as_str()),
            _ => None,
        })
    }
}

/// Decide what to do with the deployment for this tick.
///
/// The caller applies `Decision::effects` and, if the action is
/// `ScaleUp`, records it in `debounce` (see `DebounceState::observe`).
pub async fn decide<P: DatasetProbe>(
    snapshot: &ClusterSnapshot,
    policy: &Policy,
    probe: &P,
    debounce: &DebounceState,
    now: Instant,
) -> Decision {
    let num_ready = snapshot.num_ready();
    let current = snapshot.current_replica_count;
    let total_cpu = snapshot.total_cpu_millicores();
    let total_requested = snapshot.total_requested_millicores();

    let upper = total_requested * policy.upper_cpu_fraction;
    let lower = total_requested * policy.lower_cpu_fraction;
    let band = CpuBand::classify(total_cpu, lower, upper);

    debug!(
        num_ready,
        current,
        total_cpu,
        total_requested,
        upper,
        lower,
        ?band,
        "evaluating replicas"
    );

    match band {
        CpuBand::Above => scale_up(snapshot, policy),
        CpuBand::Within => {
            debug!("cpu within band, holding");
            Decision::no_op()
        }
        CpuBand::Below => scale_down(snapshot, policy, probe, debounce, now).await,
    }
}

fn scale_up(snapshot: &ClusterSnapshot, policy: &Policy) -> Decision {
    let current = snapshot.current_replica_count;

    if current >= policy.max_replicas {
        debug!(current, max = policy.max_replicas, "cpu above band but at max replicas");
        return Decision::no_op();
    }
    if !snapshot.is_settled() {
        debug!(
            current,
            ready = snapshot.num_ready(),
            "cpu above band but replicas still starting"
        );
        return Decision::no_op();
    }

    let target = current + 1;
    info!(from = current, to = target, "scaling up");
    Decision {
        action: ScalerAction::ScaleUp,
        effects: vec![EffectRequest::SetReplicas(target)],
    }
}

async fn scale_down<P: DatasetProbe>(
    snapshot: &ClusterSnapshot,
    policy: &Policy,
    probe: &P,
    debounce: &DebounceState,
    now: Instant,
) -> Decision {
    let max_to_kill = i64::from(snapshot.num_ready()) - i64::from(policy.min_replicas);

    if max_to_kill <= 0 {
        debug!(
            ready = snapshot.num_ready(),
            min = policy.min_replicas,
            "cpu below band but at min replicas"
        );
        return Decision::no_op();
    }
    if !snapshot.is_settled() {
        debug!(
            current = snapshot.current_replica_count,
            ready = snapshot.num_ready(),
            "cpu below band but replicas still starting"
        );
        return Decision::no_op();
    }
    if !debounce.scale_down_allowed(policy.no_scale_down_period, now) {
        debug!(
            period_secs = policy.no_scale_down_period.as_secs(),
            "cpu below band but inside no-scale-down period"
        );
        return Decision::no_op();
    }

    let mut effects = Vec::new();
    let mut victims = 0i64;

    for replica in &snapshot.ready_replicas {
        if victims >= max_to_kill {
            break;
        }

        match probe.probe_load(&replica.address).await {
            Some(0) => {
                info!(
                    replica = %replica.id,
                    address = %replica.address,
                    "replica holds no datasets, marking for removal"
                );
                effects.push(EffectRequest::mark_for_removal(replica.id.clone()));
                effects.push(EffectRequest::DecrementReplicas);
                victims += 1;
            }
            Some(datasets) => {
                debug!(
                    replica = %replica.id,
                    address = %replica.address,
                    datasets,
                    "replica busy, keeping"
                );
            }
            None => {
                warn!(
                    replica = %replica.id,
                    address = %replica.address,
                    "dataset probe unavailable, keeping replica"
                );
            }
        }
    }

    if victims == 0 {
        debug!("no idle replica found, holding");
        return Decision::no_op();
    }

    info!(victims, max_to_kill, "scaling down");
    Decision {
        action: ScalerAction::ScaleDown,
        effects,
    }
}
