//! Error types for the strategic-layer world.
//!
//! [`StrategusError`] is the taxonomy surfaced to callers of the world
//! service. The narrower enums describe failures of a single collaborator and
//! convert into it.

use crate::entity::{EncounterId, EntityId};

/// Failures reported by an entity store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The write's expected version is stale.
    #[error("version conflict on entity {id}: expected {expected}, found {actual}")]
    Conflict {
        /// Entity being written
        id: EntityId,
        /// Version the writer based its change on
        expected: u64,
        /// Version currently committed
        actual: u64,
    },
    /// No record exists for the id.
    #[error("entity {0} not found")]
    NotFound(EntityId),
    /// A record already exists for the id.
    #[error("entity {0} already exists")]
    AlreadyExists(EntityId),
    /// The backend failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failures reported by the clan service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClanError {
    /// The clan service could not be reached.
    #[error("clan service unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by the battle subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BattleError {
    /// The encounter could not be handed over.
    #[error("battle subsystem rejected encounter {0}: {1}")]
    Rejected(EncounterId, String),
}

/// Why a travel order (or repositioning) was refused.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum OrderRejection {
    /// Destination lies outside the world bounds.
    #[error("destination is outside the world bounds")]
    OutOfBounds,
    /// Destination has a NaN or infinite coordinate.
    #[error("destination is not a finite coordinate")]
    NonFiniteDestination,
    /// Requested speed is zero, negative or not finite.
    #[error("requested speed must be positive and finite")]
    NonPositiveSpeed,
    /// Requested speed is above the entity's cap.
    #[error("requested speed {requested} exceeds cap {cap}")]
    SpeedExceedsCap {
        /// Speed asked for
        requested: f32,
        /// Maximum allowed
        cap: f32,
    },
    /// The entity is frozen in an encounter.
    #[error("entity is in an encounter")]
    InEncounter,
    /// The entity has been archived.
    #[error("entity is archived")]
    Archived,
}

/// Errors surfaced by world operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StrategusError {
    /// A write's expected version is stale; reload and retry or drop it.
    #[error("entity {id} was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        /// Entity being written
        id: EntityId,
        /// Version the caller based its change on
        expected: u64,
        /// Version currently committed
        actual: u64,
    },
    /// The order was rejected synchronously; no state changed.
    #[error("invalid order: {0}")]
    InvalidOrder(#[from] OrderRejection),
    /// No entity with this id.
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
    /// No encounter with this id.
    #[error("encounter {0} not found")]
    EncounterNotFound(EncounterId),
    /// The encounter was already resolved.
    #[error("encounter {0} already resolved")]
    EncounterAlreadyResolved(EncounterId),
    /// Store failure other than a conflict or a missing record.
    #[error(transparent)]
    Store(StoreError),
    /// Clan service failure.
    #[error(transparent)]
    Clan(#[from] ClanError),
    /// The world could not be initialized with this configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<StoreError> for StrategusError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                id,
                expected,
                actual,
            } => Self::VersionConflict {
                id,
                expected,
                actual,
            },
            StoreError::NotFound(id) => Self::EntityNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Errors raised while validating configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A numeric setting is out of range.
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive {
        /// Setting name
        field: &'static str,
        /// Offending value
        value: f64,
    },
    /// The world bounds are empty or inverted.
    #[error("world bounds are empty or inverted")]
    InvalidBounds,
    /// The spatial index rejected the settings.
    #[error(transparent)]
    Index(#[from] atlas::IndexError),
}

/// Errors raised by the world clock.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// `start` was called on a running clock.
    #[error("world clock is already running")]
    AlreadyRunning,
    /// `stop` was called on a stopped clock.
    #[error("world clock is not running")]
    NotRunning,
    /// The clock could not be started.
    #[error("world clock failed to start: {0}")]
    StartupFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_maps_to_version_conflict() {
        let err: StrategusError = StoreError::Conflict {
            id: EntityId::new(1),
            expected: 2,
            actual: 3,
        }
        .into();
        assert_eq!(
            err,
            StrategusError::VersionConflict {
                id: EntityId::new(1),
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn store_not_found_maps_to_entity_not_found() {
        let err: StrategusError = StoreError::NotFound(EntityId::new(5)).into();
        assert_eq!(err, StrategusError::EntityNotFound(EntityId::new(5)));
    }

    #[test]
    fn backend_failure_is_wrapped() {
        let err: StrategusError = StoreError::Backend("disk".into()).into();
        assert!(matches!(err, StrategusError::Store(StoreError::Backend(_))));
        assert_eq!(err.to_string(), "store backend error: disk");
    }

    #[test]
    fn rejection_messages() {
        let err = StrategusError::from(OrderRejection::SpeedExceedsCap {
            requested: 20.0,
            cap: 10.0,
        });
        assert_eq!(err.to_string(), "invalid order: requested speed 20 exceeds cap 10");
    }
}
