//! webscale-engine: replica scaling decisions for the web tier.
//!
//! Given a `ClusterSnapshot` (ready replicas with their CPU usage, the
//! per-replica CPU request and the deployment's replica count), a static
//! `Policy` and the `DebounceState`, `decide()` returns a `ScalerAction`
//! plus the `EffectRequest`s the caller must apply. The engine never talks
//! to the orchestrator itself.
//!
//! # Scaling Algorithm
//!
//! ```text
//! total_cpu       = sum(replica usage)
//! total_requested = requested_per_replica * num_ready
//! upper           = total_requested * upper_cpu_fraction
//! lower           = total_requested * lower_cpu_fraction
//!
//! if total_cpu > upper:
//!     if current < max and current == num_ready:
//!         SetReplicas(current + 1)                       // ScaleUp
//! elif total_cpu > lower:
//!     hold                                               // NoOp
//! else:
//!     max_to_kill = num_ready - min
//!     if max_to_kill > 0 and current == num_ready and debounce elapsed:
//!         for each ready replica while victims < max_to_kill:
//!             if probe(replica) == Some(0):
//!                 MarkForRemoval(replica, 0); DecrementReplicas   // ScaleDown
//! ```
//!
//! Replicas whose dataset probe reports a non-zero load, or does not
//! answer at all, are never selected for removal.

pub mod debounce;
pub mod effect;
pub mod error;
pub mod policy;
pub mod probe;
pub mod scaler;
pub mod snapshot;

pub use debounce::DebounceState;
pub use effect::{EffectRequest, REMOVAL_PRIORITY_COST};
pub use error::{ConfigError, ConfigResult};
pub use policy::Policy;
pub use probe::DatasetProbe;
pub use scaler::{decide, CpuBand, Decision, ScalerAction};
pub use snapshot::{ClusterSnapshot, ReplicaObservation};
