//! Orchestration side effects requested by a decision.

use std::fmt;

/// Deletion cost attached to a replica chosen for removal.
///
/// The orchestrator removes lower-cost replicas first when the replica
/// count drops.
pub const REMOVAL_PRIORITY_COST: i32 = 0;

/// A side effect the caller must apply, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectRequest {
    /// Set the deployment's replica count to this value.
    SetReplicas(u32),
    /// Annotate a replica so the orchestrator prefers removing it.
    MarkForRemoval { replica_id: String, priority_cost: i32 },
    /// Read the deployment's current replica count and lower it by one.
    ///
    /// Several of these in one tick compound.
    DecrementReplicas,
}

impl EffectRequest {
    /// Mark `replica_id` with the default removal cost.
    pub fn mark_for_removal(replica_id: impl Into<String>) -> Self {
        Self::MarkForRemoval {
            replica_id: replica_id.into(),
            priority_cost: REMOVAL_PRIORITY_COST,
        }
    }
}

impl fmt::Display for EffectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetReplicas(n) => write!(f, "set replicas to {n}"),
            Self::MarkForRemoval {
                replica_id,
                priority_cost,
            } => write!(f, "mark {replica_id} for removal (cost {priority_cost})"),
            Self::DecrementReplicas => f.write_str("decrement replicas"),
        }
    }
}
