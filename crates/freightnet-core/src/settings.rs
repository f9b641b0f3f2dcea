//! Distribution settings: algorithm tunables, scheduling budgets, and the
//! per-cargo-class policy table.
//!
//! Settings are plain serde-derived data. Hosts that load them from JSON can
//! enable the `settings-io` feature; everything else works with the defaults.

use serde::{Deserialize, Serialize};

/// Simulation time, measured in scheduler ticks.
pub type Ticks = u64;

// ---------------------------------------------------------------------------
// Policies and cargo classes
// ---------------------------------------------------------------------------

/// How demand is distributed among the nodes of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionPolicy {
    /// Traffic flows both ways: a forward assignment commits a scaled return
    /// assignment in the same step.
    Symmetric,
    /// Plain one-way distribution by raw supply.
    Asymmetric,
    /// One-way distribution where every demand node receives as close as
    /// possible to an equal share of the total supply.
    AsymmetricEqualized,
    /// One-way distribution that strictly prefers the nearest destinations.
    AsymmetricNearest,
}

/// Coarse cargo category used to pick a distribution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CargoClass {
    Passengers,
    Mail,
    Express,
    Freight,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Errors produced by [`DistributionSettings::validate`].
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("accuracy must be at least 1")]
    ZeroAccuracy,
    #[error("recompute interval must be at least 1 tick")]
    ZeroInterval,
    #[error("per-thread cost budget must be nonzero")]
    ZeroThreadBudget,
    #[error("job capacity must be nonzero")]
    ZeroJobCapacity,
}

/// Tunables for the demand engine and its scheduler.
///
/// The numeric scaling constants here are configuration inputs, not part of
/// the algorithm's contract; only monotonicity matters to the algorithms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionSettings {
    /// Iteration accuracy of the probe algorithm. Higher values probe more
    /// node pairs before the starvation fallback kicks in. Must be >= 1.
    pub accuracy: u32,
    /// Distance modifier in percent. Values above 100 are boosted
    /// non-linearly and shrink the distance divisor, favoring far pairs.
    pub demand_distance: u32,
    /// Size modifier in percent, used by the symmetric policy for both the
    /// effective supply and the return assignment.
    pub demand_size: u32,
    /// Ticks between recomputation rounds; also the unit of a job's
    /// duration budget.
    pub recompute_interval: Ticks,
    /// Cost a single worker thread is allowed to accumulate before the
    /// bucketing step flushes a job group.
    pub thread_cost_budget: u64,
    /// Hard capacity of the job pool. Exhausting it is fatal.
    pub max_jobs: usize,
    /// Policy per cargo class.
    pub passengers: DistributionPolicy,
    pub mail: DistributionPolicy,
    pub express: DistributionPolicy,
    pub freight: DistributionPolicy,
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            accuracy: 16,
            demand_distance: 100,
            demand_size: 100,
            recompute_interval: 32,
            thread_cost_budget: 1 << 20,
            max_jobs: 256,
            passengers: DistributionPolicy::Symmetric,
            mail: DistributionPolicy::Symmetric,
            express: DistributionPolicy::Asymmetric,
            freight: DistributionPolicy::Asymmetric,
        }
    }
}

impl DistributionSettings {
    /// Look up the distribution policy for a cargo class.
    pub fn policy_for(&self, cargo: CargoClass) -> DistributionPolicy {
        match cargo {
            CargoClass::Passengers => self.passengers,
            CargoClass::Mail => self.mail,
            CargoClass::Express => self.express,
            CargoClass::Freight => self.freight,
        }
    }

    /// The distance modifier with the non-linear boost applied: values above
    /// 100 count quadratically (`100 + (m - 100)^2`).
    pub fn boosted_demand_distance(&self) -> u32 {
        if self.demand_distance > 100 {
            let over = self.demand_distance - 100;
            100 + over * over
        } else {
            self.demand_distance
        }
    }

    /// Check the settings for values that would break scheduler or
    /// calculator invariants.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.accuracy == 0 {
            return Err(SettingsError::ZeroAccuracy);
        }
        if self.recompute_interval == 0 {
            return Err(SettingsError::ZeroInterval);
        }
        if self.thread_cost_budget == 0 {
            return Err(SettingsError::ZeroThreadBudget);
        }
        if self.max_jobs == 0 {
            return Err(SettingsError::ZeroJobCapacity);
        }
        Ok(())
    }

    /// Load settings from a JSON string. Missing fields fall back to their
    /// defaults; the result is validated before being returned.
    #[cfg(feature = "settings-io")]
    pub fn from_json(json: &str) -> Result<Self, SettingsIoError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Errors produced when loading settings from JSON.
#[cfg(feature = "settings-io")]
#[derive(Debug, thiserror::Error)]
pub enum SettingsIoError {
    #[error("malformed settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(#[from] SettingsError),
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = DistributionSettings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn policy_table_lookup() {
        let mut settings = DistributionSettings::default();
        settings.freight = DistributionPolicy::AsymmetricNearest;
        assert_eq!(
            settings.policy_for(CargoClass::Passengers),
            DistributionPolicy::Symmetric
        );
        assert_eq!(
            settings.policy_for(CargoClass::Freight),
            DistributionPolicy::AsymmetricNearest
        );
    }

    #[test]
    fn demand_distance_boost_above_100() {
        let mut settings = DistributionSettings::default();
        settings.demand_distance = 100;
        assert_eq!(settings.boosted_demand_distance(), 100);

        settings.demand_distance = 110;
        assert_eq!(settings.boosted_demand_distance(), 200);

        settings.demand_distance = 40;
        assert_eq!(settings.boosted_demand_distance(), 40);
    }

    #[test]
    fn validation_rejects_zero_accuracy() {
        let settings = DistributionSettings {
            accuracy: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::ZeroAccuracy)
        ));
    }

    #[test]
    fn validation_rejects_zero_budgets() {
        let settings = DistributionSettings {
            thread_cost_budget: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::ZeroThreadBudget)
        ));

        let settings = DistributionSettings {
            max_jobs: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::ZeroJobCapacity)
        ));
    }

    #[cfg(feature = "settings-io")]
    #[test]
    fn from_json_fills_missing_fields_with_defaults() {
        let settings =
            DistributionSettings::from_json(r#"{ "accuracy": 4, "demand_distance": 120 }"#)
                .unwrap();
        assert_eq!(settings.accuracy, 4);
        assert_eq!(settings.demand_distance, 120);
        assert_eq!(settings.demand_size, 100);
    }

    #[cfg(feature = "settings-io")]
    #[test]
    fn from_json_rejects_invalid_settings() {
        let result = DistributionSettings::from_json(r#"{ "accuracy": 0 }"#);
        assert!(matches!(result, Err(SettingsIoError::Invalid(_))));
    }
}
