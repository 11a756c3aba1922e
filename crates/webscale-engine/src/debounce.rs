//! Scale-up debounce.
//!
//! A scale-down is only allowed once `no_scale_down_period` has passed
//! since the last scale-up. The state lives with the loop driver, is read
//! by `decide()` and written by the driver after a tick that scaled up.

use std::time::{Duration, Instant};

use crate::scaler::ScalerAction;

/// When the workload last grew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceState {
    /// `None` until the first scale-up of this process.
    last_scale_up: Option<Instant>,
}

impl DebounceState {
    /// A fresh state; scale-down is immediately allowed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_scale_up(&self) -> Option<Instant> {
        self.last_scale_up
    }

    /// Record a scale-up at `now`.
    pub fn record_scale_up(&mut self, now: Instant) {
        self.last_scale_up = Some(now);
    }

    /// Fold the outcome of a tick into the state.
    ///
    /// Only `ScaleUp` moves the clock.
    pub fn observe(&mut self, action: ScalerAction, now: Instant) {
        if action == ScalerAction::ScaleUp {
            self.record_scale_up(now);
        }
    }

    /// Whether strictly more than `period` has elapsed since the last
    /// scale-up.
    pub fn scale_down_allowed(&self, period: Duration, now: Instant) -> bool {
        match self.last_scale_up {
            None => true,
            Some(at) => now.saturating_duration_since(at) > period,
        }
    }
}
