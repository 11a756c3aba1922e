//! The scale loop.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info};

use webscale_cluster::{ClusterClient, ClusterResult, ReadyAddresses, apply_effects, collect_snapshot};
use webscale_engine::{DatasetProbe, DebounceState, Decision, Policy, ScalerAction, decide};

use crate::config::ScalerSettings;

/// Drives one deployment: snapshot, decide, apply, once per interval.
///
/// The loop owns the debounce state. It is only updated after a tick's
/// effects were all applied, so a failed scale-up does not hold back
/// scale-down.
pub struct ScaleLoop<C, P> {
    client: C,
    probe: P,
    policy: Policy,
    interval: Duration,
    debounce: DebounceState,
    watched: Option<ReadyAddresses>,
}

impl<C: ClusterClient, P: DatasetProbe> ScaleLoop<C, P> {
    pub fn new(client: C, probe: P, settings: &ScalerSettings) -> Self {
        Self {
            client,
            probe,
            policy: settings.policy.clone(),
            interval: settings.loop_interval,
            debounce: DebounceState::new(),
            watched: None,
        }
    }

    /// Log the watcher's view of ready addresses on every tick.
    pub fn with_watched(mut self, watched: ReadyAddresses) -> Self {
        self.watched = Some(watched);
        self
    }

    pub fn debounce(&self) -> &DebounceState {
        &self.debounce
    }

    /// Run one tick at `now`.
    pub async fn tick(&mut self, now: Instant) -> ClusterResult<Decision> {
        let snapshot = collect_snapshot(&self.client).await?;

        if let Some(watched) = &self.watched {
            let addresses = watched.snapshot().await;
            debug!(
                watched = addresses.len(),
                ?addresses,
                snapshot_ready = snapshot.num_ready(),
                "watched ready addresses"
            );
        }

        let decision = decide(&snapshot, &self.policy, &self.probe, &self.debounce, now).await;
        apply_effects(&self.client, &decision.effects).await?;
        self.debounce.observe(decision.action, now);

        if decision.action != ScalerAction::NoOp {
            info!(action = ?decision.action, effects = decision.effects.len(), "tick applied");
        }
        Ok(decision)
    }

    /// Tick until shutdown is signalled. Tick failures are logged and the
    /// next tick starts after the usual interval.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "scale loop started");

        loop {
            if let Err(e) = self.tick(Instant::now()).await {
                error!(error = %e, "scale loop tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    info!("scale loop shutting down");
                    break;
                }
            }
        }
    }
}
