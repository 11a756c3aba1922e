//! Per-replica busyness signal.

use std::future::Future;

/// Reports how many datasets a replica holds in memory.
///
/// `None` means the replica could not be asked; callers treat that the
/// same as a busy replica.
pub trait DatasetProbe {
    fn probe_load(&self, address: &str) -> impl Future<Output = Option<u64>> + Send;
}
