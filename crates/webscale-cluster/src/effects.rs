//! Effect execution.
//!
//! Effects are applied strictly in order. The first failure stops the
//! tick; whatever was already applied stays applied and the next tick
//! works from the resulting cluster state.

use tracing::info;

use webscale_engine::EffectRequest;

use crate::client::ClusterClient;
use crate::error::ClusterResult;

/// Apply `effects` to the cluster, in order.
pub async fn apply_effects<C: ClusterClient>(client: &C, effects: &[EffectRequest]) -> ClusterResult<()> {
    for effect in effects {
        match effect {
            EffectRequest::SetReplicas(target) => {
                client.set_replica_count(*target).await?;
                info!(target, "replicas set");
            }
            EffectRequest::MarkForRemoval {
                replica_id,
                priority_cost,
            } => {
                client.mark_for_removal(replica_id, *priority_cost).await?;
                info!(replica = %replica_id, priority_cost, "replica marked for removal");
            }
            EffectRequest::DecrementReplicas => {
                // Re-read so several decrements in one tick compound.
                let current = client.current_replica_count().await?;
                let target = current.saturating_sub(1);
                client.set_replica_count(target).await?;
                info!(from = current, target, "replicas set");
            }
        }
    }
    Ok(())
}
