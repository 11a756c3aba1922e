//! webscaled: the webscale daemon.
//!
//! Loads the scaling policy from the environment, then runs one
//! `ScaleLoop` tick per interval: snapshot, decide, apply effects, update
//! the debounce clock. A `PodWatcher` runs beside it and keeps the set of
//! ready addresses that each tick logs.

pub mod config;
pub mod driver;

pub use config::ScalerSettings;
pub use driver::ScaleLoop;
