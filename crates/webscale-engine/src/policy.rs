//! Static scaling thresholds.

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Thresholds that drive every scaling decision.
///
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Replica floor; scale-down never goes below it.
    pub min_replicas: u32,
    /// Replica ceiling; scale-up never goes above it.
    pub max_replicas: u32,
    /// Fraction of the total requested CPU above which we grow.
    pub upper_cpu_fraction: f64,
    /// Fraction of the total requested CPU at or below which we shrink.
    pub lower_cpu_fraction: f64,
    /// Minimum time after a scale-up before any scale-down.
    pub no_scale_down_period: Duration,
}

impl Policy {
    /// Build a policy, rejecting thresholds that break its invariants.
    pub fn new(
        min_replicas: u32,
        max_replicas: u32,
        upper_cpu_fraction: f64,
        lower_cpu_fraction: f64,
        no_scale_down_period: Duration,
    ) -> ConfigResult<Self> {
        let policy = Self {
            min_replicas,
            max_replicas,
            upper_cpu_fraction,
            lower_cpu_fraction,
            no_scale_down_period,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check `min <= max` and `0 <= lower < upper`.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_replicas > self.max_replicas {
            return Err(ConfigError::Invalid(format!(
                "min_replicas ({}) exceeds max_replicas ({})",
                self.min_replicas, self.max_replicas
            )));
        }

        if self.lower_cpu_fraction.is_nan() || self.lower_cpu_fraction < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "lower_cpu_fraction ({}) must be >= 0",
                self.lower_cpu_fraction
            )));
        }
        if !self.upper_cpu_fraction.is_finite()
            || self.lower_cpu_fraction >= self.upper_cpu_fraction
        {
            return Err(ConfigError::Invalid(format!(
                "lower_cpu_fraction ({}) must be below a finite upper_cpu_fraction ({})",
                self.lower_cpu_fraction, self.upper_cpu_fraction
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_thresholds() {
        let policy = Policy::new(2, 5, 0.7, 0.4, Duration::from_secs(300)).unwrap();
        assert_eq!(policy.min_replicas, 2);
        assert_eq!(policy.max_replicas, 5);
    }

    #[test]
    fn accepts_equal_min_and_max() {
        assert!(Policy::new(3, 3, 0.7, 0.4, Duration::ZERO).is_ok());
    }

    #[test]
    fn accepts_zero_min_and_zero_lower() {
        assert!(Policy::new(0, 1, 0.5, 0.0, Duration::ZERO).is_ok());
    }

    #[test]
    fn rejects_min_above_max() {
        let err = Policy::new(6, 5, 0.7, 0.4, Duration::ZERO).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("min_replicas")));
    }

    #[test]
    fn rejects_inverted_fractions() {
        assert!(Policy::new(1, 5, 0.4, 0.7, Duration::ZERO).is_err());
        assert!(Policy::new(1, 5, 0.5, 0.5, Duration::ZERO).is_err());
    }

    #[test]
    fn rejects_negative_lower() {
        assert!(Policy::new(1, 5, 0.7, -0.1, Duration::ZERO).is_err());
    }

    #[test]
    fn rejects_nan_fractions() {
        assert!(Policy::new(1, 5, f64::NAN, 0.4, Duration::ZERO).is_err());
        assert!(Policy::new(1, 5, 0.7, f64::NAN, Duration::ZERO).is_err());
        assert!(Policy::new(1, 5, f64::INFINITY, 0.4, Duration::ZERO).is_err());
    }
}
