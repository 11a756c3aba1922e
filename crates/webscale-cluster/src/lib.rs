//! webscale-cluster: everything webscale needs from Kubernetes.
//!
//! # Architecture
//!
//! ```text
//! KubeConfig (local / in-cluster credentials)
//!   └── ApiTransport (HTTP/1, optional rustls)
//!         └── KubeClient: ClusterClient
//!               ├── collect_snapshot()  → webscale_engine::ClusterSnapshot
//!               ├── apply_effects()     ← webscale_engine::EffectRequest
//!               └── PodWatcher          → PodEvent → ReadyAddresses
//! ```
//!
//! Resource quantities (`"250m"`, `"123456789n"`, `"1.5"`) are normalized
//! to millicores here; the engine only ever sees numbers.

pub mod client;
pub mod credentials;
pub mod effects;
pub mod error;
pub mod model;
pub mod pods;
pub mod quantity;
pub mod snapshot;
pub mod transport;
pub mod watch;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use client::{ClusterClient, KubeClient, ReplicaRef, Workload};
pub use credentials::KubeConfig;
pub use effects::apply_effects;
pub use error::{ClusterError, ClusterResult};
pub use snapshot::collect_snapshot;
pub use watch::{PodEvent, PodWatcher, ReadyAddresses, run_applier};
