//! Movement engine.
//!
//! Advances moving entities along their travel orders. The engine is a pure
//! function of `(entity, elapsed)`: it never touches storage or the spatial
//! index, so the tick can fan it out across threads and commit the results
//! afterwards.
//!
//! # Rules
//!
//! - Effective speed is the order's speed bounded by the entity's speed cap
//! - Displacement is `speed * elapsed` along the straight line to the
//!   destination
//! - A step that would reach or pass the destination lands exactly on it;
//!   the entity becomes idle and the order is discarded
//! - Idle, archived and encountered entities do not move

use glam::Vec2;
use rayon::prelude::*;

use crate::entity::{Entity, EntityId, TravelOrder};

/// Remaining distance under which an entity counts as arrived.
///
/// Absorbs the rounding left over after many fractional steps.
pub const ARRIVAL_EPSILON: f32 = 1e-3;

/// What a single advance did to an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveOutcome {
    /// Not moving, or no time elapsed
    Stationary,
    /// Moved part of the way
    Advanced {
        /// Position before the step
        from: Vec2,
        /// Position after the step
        to: Vec2,
    },
    /// Reached the destination and became idle
    Arrived {
        /// Position before the step
        from: Vec2,
        /// The destination
        to: Vec2,
    },
}

impl MoveOutcome {
    /// True if the position changed.
    #[must_use]
    pub fn moved(&self) -> bool {
        match self {
            Self::Stationary => false,
            Self::Advanced { from, to } | Self::Arrived { from, to } => from != to,
        }
    }

    /// True if the order completed.
    #[must_use]
    pub fn arrived(&self) -> bool {
        matches!(self, Self::Arrived { .. })
    }
}

/// Result of a single straight-line step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    /// New position
    pub position: Vec2,
    /// True if the destination was reached
    pub arrived: bool,
}

/// Stateless movement integrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementEngine;

impl MovementEngine {
    /// Computes one step from `position` along `order`.
    ///
    /// `speed_cap` bounds the order's speed. Non-finite or non-positive
    /// elapsed time produces no displacement.
    #[must_use]
    pub fn step(position: Vec2, order: &TravelOrder, speed_cap: f32, elapsed: f32) -> Step {
        let offset = order.destination - position;
        let remaining = offset.length();
        if remaining <= ARRIVAL_EPSILON {
            return Step {
                position: order.destination,
                arrived: true,
            };
        }

        if !elapsed.is_finite() || elapsed <= 0.0 {
            return Step {
                position,
                arrived: false,
            };
        }

        let speed = order.speed.min(speed_cap).max(0.0);
        let travel = speed * elapsed;
        if travel + ARRIVAL_EPSILON >= remaining {
            Step {
                position: order.destination,
                arrived: true,
            }
        } else {
            Step {
                position: position + offset / remaining * travel,
                arrived: false,
            }
        }
    }

    /// Advances an entity in place.
    ///
    /// On arrival the order is discarded and the entity becomes idle.
    pub fn advance(entity: &mut Entity, elapsed: f32) -> MoveOutcome {
        if entity.is_archived() {
            return MoveOutcome::Stationary;
        }
        let Some(order) = entity.travel_order().copied() else {
            return MoveOutcome::Stationary;
        };

        let from = entity.position();
        let step = Self::step(from, &order, entity.speed_cap(), elapsed);
        entity.set_position(step.position);

        if step.arrived {
            entity.clear_travel_order();
            MoveOutcome::Arrived {
                from,
                to: step.position,
            }
        } else if step.position == from {
            MoveOutcome::Stationary
        } else {
            MoveOutcome::Advanced {
                from,
                to: step.position,
            }
        }
    }

    /// Advances every moving entity of `entities` in parallel.
    ///
    /// Entities that are not moving are skipped. The result is ordered by
    /// entity id and contains the updated copies with their outcome.
    pub fn advance_all<'a>(
        entities: impl IntoIterator<Item = &'a Entity>,
        elapsed: f32,
    ) -> Vec<(Entity, MoveOutcome)> {
        let movers: Vec<&Entity> = entities
            .into_iter()
            .filter(|e| e.is_moving() && !e.is_archived())
            .collect();

        let mut advanced: Vec<(Entity, MoveOutcome)> = movers
            .par_iter()
            .map(|entity| {
                let mut next = (*entity).clone();
                let outcome = Self::advance(&mut next, elapsed);
                (next, outcome)
            })
            .collect();

        advanced.sort_by_key(|(entity, _)| entity.id());
        advanced
    }

    /// Ticks needed to cover the remaining distance of an entity's order.
    ///
    /// `None` if the entity is not moving or cannot make progress.
    #[must_use]
    pub fn ticks_to_arrival(entity: &Entity, time_step: f32) -> Option<u64> {
        let order = entity.travel_order()?;
        let speed = order.speed.min(entity.speed_cap());
        if speed <= 0.0 || time_step <= 0.0 {
            return None;
        }
        let remaining = (order.destination - entity.position()).length();
        let ticks = (remaining / (speed * time_step)).ceil();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(ticks as u64)
    }
}

/// Ids of the entities whose outcome changed their position.
pub(crate) fn moved_ids(advanced: &[(Entity, MoveOutcome)]) -> Vec<EntityId> {
    advanced
        .iter()
        .filter(|(_, outcome)| outcome.moved())
        .map(|(entity, _)| entity.id())
        .collect()
}
