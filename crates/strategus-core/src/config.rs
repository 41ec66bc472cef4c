//! World configuration.
//!
//! All tunables of the strategic layer live in [`WorldConfig`]. It
//! deserializes with defaults for every missing field, so a configuration
//! file only needs to mention what it overrides.
//!
//! ```
//! use strategus_core::config::{UnaffiliatedPolicy, WorldConfig};
//!
//! let config: WorldConfig =
//!     serde_json::from_str(r#"{ "encounter_radius": 8.0, "unaffiliated_policy": "neutral_by_default" }"#)
//!         .unwrap();
//! assert_eq!(config.encounter_radius, 8.0);
//! assert_eq!(config.unaffiliated_policy, UnaffiliatedPolicy::NeutralByDefault);
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use atlas::Bounds;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How to treat a pair where at least one side has no clan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaffiliatedPolicy {
    /// Unaffiliated entities are hostile to everyone (free-for-all).
    HostileByDefault,
    /// Unaffiliated entities never trigger encounters.
    NeutralByDefault,
}

impl Default for UnaffiliatedPolicy {
    fn default() -> Self {
        Self::HostileByDefault
    }
}

/// Configuration of the strategic-layer world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World extent; travel destinations must lie inside
    pub bounds: Bounds,
    /// Edge length of a spatial index cell
    pub cell_size: f32,
    /// Wall-clock interval between ticks, in milliseconds
    pub tick_interval_ms: u64,
    /// Simulation time units advanced per tick
    pub time_step: f32,
    /// Distance at or under which hostile entities meet
    pub encounter_radius: f32,
    /// Distance at or under which an observer sees exact position and army
    pub visibility_radius: f32,
    /// Hostility of entities without a clan
    pub unaffiliated_policy: UnaffiliatedPolicy,
    /// Revalidation interval of the clan relationship snapshot, in milliseconds
    pub relationship_refresh_ms: u64,
    /// Grace period granted to an in-flight tick on forced stop, in milliseconds
    pub shutdown_grace_ms: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds::new(1000.0, 1000.0),
            cell_size: 10.0,
            tick_interval_ms: 5_000,
            time_step: 1.0,
            encounter_radius: 5.0,
            visibility_radius: 50.0,
            unaffiliated_policy: UnaffiliatedPolicy::default(),
            relationship_refresh_ms: 60_000,
            shutdown_grace_ms: 10_000,
        }
    }
}

impl WorldConfig {
    /// Config with the given world extent anchored at the origin.
    #[must_use]
    pub fn with_bounds(width: f32, height: f32) -> Self {
        Self {
            bounds: Bounds::from_min_max(Vec2::ZERO, Vec2::new(width, height)),
            ..Default::default()
        }
    }

    /// Wall-clock tick interval.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Relationship snapshot revalidation interval.
    #[must_use]
    pub fn relationship_refresh(&self) -> Duration {
        Duration::from_millis(self.relationship_refresh_ms)
    }

    /// Grace period for a forced stop.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bounds.is_valid() {
            return Err(ConfigError::InvalidBounds);
        }
        let floats = [
            ("cell_size", self.cell_size),
            ("time_step", self.time_step),
            ("encounter_radius", self.encounter_radius),
            ("visibility_radius", self.visibility_radius),
        ];
        for (field, value) in floats {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NotPositive {
                    field,
                    value: f64::from(value),
                });
            }
        }
        let millis = [
            ("tick_interval_ms", self.tick_interval_ms),
            ("relationship_refresh_ms", self.relationship_refresh_ms),
        ];
        for (field, value) in millis {
            if value == 0 {
                return Err(ConfigError::NotPositive { field, value: 0.0 });
            }
        }
        Ok(())
    }
}
