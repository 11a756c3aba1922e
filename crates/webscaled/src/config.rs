//! Scaling settings from the environment.

use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use webscale_engine::{ConfigError, ConfigResult, Policy};

pub const MIN_REPLICAS: &str = "MIN_REPLICAS";
pub const MAX_REPLICAS: &str = "MAX_REPLICAS";
pub const UPPER_CPU_THRESHOLD: &str = "UPPER_CPU_THRESHOLD";
pub const LOWER_CPU_THRESHOLD: &str = "LOWER_CPU_THRESHOLD";
pub const LOOP_TIME_S: &str = "LOOP_TIME_S";
pub const NO_SCALE_DOWN_PERIOD: &str = "NO_SCALE_DOWN_PERIOD";

/// Everything the scale loop needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalerSettings {
    pub policy: Policy,
    /// Pause between ticks.
    pub loop_interval: Duration,
}

impl ScalerSettings {
    /// Read the settings from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the settings through `lookup`. Every key is required.
    ///
    /// `LOOP_TIME_S` and `NO_SCALE_DOWN_PERIOD` are whole seconds; the
    /// CPU thresholds are fractions of the total requested CPU.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let min_replicas: u32 = required(&lookup, MIN_REPLICAS)?;
        let max_replicas: u32 = required(&lookup, MAX_REPLICAS)?;
        let upper: f64 = required(&lookup, UPPER_CPU_THRESHOLD)?;
        let lower: f64 = required(&lookup, LOWER_CPU_THRESHOLD)?;
        let loop_secs: u64 = required(&lookup, LOOP_TIME_S)?;
        let no_scale_down_secs: u64 = required(&lookup, NO_SCALE_DOWN_PERIOD)?;

        if loop_secs == 0 {
            return Err(ConfigError::Invalid(format!("{LOOP_TIME_S} must be greater than 0")));
        }

        let policy = Policy::new(
            min_replicas,
            max_replicas,
            upper,
            lower,
            Duration::from_secs(no_scale_down_secs),
        )?;

        info!(
            min_replicas,
            max_replicas,
            upper_cpu = upper,
            lower_cpu = lower,
            loop_secs,
            no_scale_down_secs,
            "scaling policy loaded"
        );

        Ok(Self {
            policy,
            loop_interval: Duration::from_secs(loop_secs),
        })
    }
}

fn required<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> ConfigResult<T> {
    let raw = lookup(key).ok_or(ConfigError::Missing(key))?;
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::NotNumeric { key, value: raw })
}
