//! Operations exposed to the transport layer and collaborating subsystems.
//!
//! Every write goes through the same optimistic-concurrency contract as the
//! tick: load the committed record, validate, modify, and save against the
//! loaded version. A write that loses a race with the tick (or another
//! caller) fails with [`StrategusError::VersionConflict`] and changes
//! nothing; the caller reloads and retries or drops the request.
//!
//! Reads never touch the store. They resolve against one snapshot of the
//! world for the whole call.

use std::sync::Arc;

use glam::Vec2;

use crate::encounter::Encounter;
use crate::entity::{AccountId, ArmySummary, ClanRef, EncounterId, Entity, EntityId, Profile, TravelOrder};
use crate::error::{OrderRejection, StrategusError};
use crate::store::VersionedWrite;
use crate::visibility::{EntityView, PrivateEntityView};
use crate::world::World;

/// Entry point for everything outside the tick loop.
#[derive(Debug, Clone)]
pub struct WorldService {
    world: Arc<World>,
}

impl WorldService {
    /// Creates a service over `world`.
    #[must_use]
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }

    /// The underlying world.
    #[must_use]
    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Every active entity as `observer` may see it.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if the observer is unknown or archived.
    pub fn get_public_view(&self, observer: EntityId) -> Result<Vec<EntityView>, StrategusError> {
        let snapshot = self.world.snapshot();
        let observer = snapshot
            .get_active(observer)
            .ok_or(StrategusError::EntityNotFound(observer))?;
        Ok(self.world.visibility().resolve_view(observer, snapshot.active()))
    }

    /// Unfiltered state of one entity.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if the entity is unknown.
    pub fn get_private_view(&self, id: EntityId) -> Result<PrivateEntityView, StrategusError> {
        let snapshot = self.world.snapshot();
        let entity = snapshot.get(id).ok_or(StrategusError::EntityNotFound(id))?;
        Ok(PrivateEntityView::of(entity, self.world.config().time_step))
    }

    /// Active entities within `radius` of the observer, as the observer may
    /// see them, in id order. A negative or non-finite radius yields nothing.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if the observer is unknown or archived.
    pub fn entities_near(&self, observer: EntityId, radius: f32) -> Result<Vec<EntityView>, StrategusError> {
        let snapshot = self.world.snapshot();
        let observer = snapshot
            .get_active(observer)
            .ok_or(StrategusError::EntityNotFound(observer))?;
        if !radius.is_finite() || radius < 0.0 {
            return Ok(Vec::new());
        }

        let center = observer.position();
        let nearby = self
            .world
            .index()
            .query_within(center, radius)
            .into_iter()
            .filter_map(|id| snapshot.get_active(id))
            // The index may be one commit ahead of this snapshot.
            .filter(|candidate| candidate.position().distance_squared(center) <= radius * radius);
        Ok(self.world.visibility().resolve_view(observer, nearby))
    }

    /// Encounters still waiting for the battle subsystem, in id order.
    pub async fn pending_encounters(&self) -> Vec<Encounter> {
        self.world
            .encounters()
            .lock()
            .await
            .pending_encounters()
            .cloned()
            .collect()
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Gives an entity a new travel order, replacing any active one.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` for an unusable destination or speed, or an entity that
    /// is archived or in an encounter. `VersionConflict` if the entity changed
    /// while the order was being written.
    pub async fn issue_travel_order(
        &self,
        id: EntityId,
        destination: Vec2,
        speed: f32,
    ) -> Result<TravelOrder, StrategusError> {
        let tick = self.world.snapshot().tick();
        let order = TravelOrder::new(destination, speed, tick);
        let config = self.world.config();

        let entity = self
            .mutate(id, None, |entity| {
                check_free(entity)?;
                check_destination(config.bounds, destination)?;
                if !speed.is_finite() || speed <= 0.0 {
                    return Err(OrderRejection::NonPositiveSpeed.into());
                }
                if speed > entity.speed_cap() {
                    return Err(OrderRejection::SpeedExceedsCap {
                        requested: speed,
                        cap: entity.speed_cap(),
                    }
                    .into());
                }
                entity.set_travel_order(order);
                Ok(())
            })
            .await?;

        tracing::debug!(entity = %id, x = destination.x, y = destination.y, speed, "travel order issued");
        Ok(*entity.travel_order().unwrap_or(&order))
    }

    /// Discards the active travel order, if any.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` for an archived entity or one in an encounter.
    pub async fn cancel_travel_order(&self, id: EntityId) -> Result<Entity, StrategusError> {
        self.mutate(id, None, |entity| {
            check_free(entity)?;
            entity.clear_travel_order();
            Ok(())
        })
        .await
    }

    /// Creates the entity of an account entering the strategic layer.
    ///
    /// The entity id is the account id. Its clan is looked up once from the
    /// clan service.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` for an unusable position or speed cap, `Clan` if the
    /// clan lookup fails, `Store(AlreadyExists)` if the account already has
    /// an entity.
    pub async fn enter_world(
        &self,
        account: AccountId,
        profile: Profile,
        position: Vec2,
        army: ArmySummary,
        speed_cap: f32,
    ) -> Result<Entity, StrategusError> {
        check_destination(self.world.config().bounds, position)?;
        check_speed_cap(speed_cap)?;

        let id = EntityId::new(account.as_u64());
        let clan = self.world.clans().clan_of(id).await?;
        let mut entity = Entity::new(id, account, profile, position, army, speed_cap).with_clan(clan);
        entity.touch(self.world.snapshot().tick());

        let version = self.world.store().create(&entity).await?;
        entity.set_version(version);
        self.world.apply([entity.clone()]);

        tracing::info!(entity = %id, x = position.x, y = position.y, "entity entered the world");
        Ok(entity)
    }

    /// Freezes the entity of a removed account. Archiving twice is a no-op.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` or `VersionConflict`.
    pub async fn archive(&self, id: EntityId) -> Result<Entity, StrategusError> {
        let current = self.world.store().load(id).await?;
        if current.is_archived() {
            return Ok(current);
        }
        let entity = self
            .mutate(id, Some(current.version()), |entity| {
                entity.archive();
                Ok(())
            })
            .await?;
        tracing::info!(entity = %id, "entity archived");
        Ok(entity)
    }

    /// Administrative teleport. Cancels any active order.
    ///
    /// # Errors
    ///
    /// `VersionConflict` if the entity is no longer at `expected_version`,
    /// `InvalidOrder` for an unusable position or an entity that is archived
    /// or in an encounter.
    pub async fn reposition(
        &self,
        id: EntityId,
        position: Vec2,
        expected_version: u64,
    ) -> Result<Entity, StrategusError> {
        let bounds = self.world.config().bounds;
        let entity = self
            .mutate(id, Some(expected_version), |entity| {
                check_free(entity)?;
                check_destination(bounds, position)?;
                entity.clear_travel_order();
                entity.set_position(position);
                Ok(())
            })
            .await?;
        tracing::info!(entity = %id, x = position.x, y = position.y, "entity repositioned");
        Ok(entity)
    }

    /// Installs an externally recomputed army summary and speed cap.
    ///
    /// An active order faster than the new cap is kept; movement clamps it.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` for an unusable cap or an archived entity.
    pub async fn update_army(&self, id: EntityId, army: ArmySummary, speed_cap: f32) -> Result<Entity, StrategusError> {
        check_speed_cap(speed_cap)?;
        self.mutate(id, None, |entity| {
            if entity.is_archived() {
                return Err(OrderRejection::Archived.into());
            }
            entity.set_army(army, speed_cap);
            Ok(())
        })
        .await
    }

    /// Records a clan change notified by the clan subsystem.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` or `VersionConflict`.
    pub async fn set_clan(&self, id: EntityId, clan: Option<ClanRef>) -> Result<Entity, StrategusError> {
        self.mutate(id, None, move |entity| {
            entity.set_clan(clan);
            Ok(())
        })
        .await
    }

    /// Battle subsystem callback: marks an encounter resolved and returns
    /// both members to `Idle` in one atomic write.
    ///
    /// # Errors
    ///
    /// `EncounterNotFound`, `EncounterAlreadyResolved`, or `VersionConflict`
    /// if a member changed concurrently (nothing is resolved; retry).
    pub async fn resolve_encounter(&self, id: EncounterId) -> Result<Encounter, StrategusError> {
        let mut ledger = self.world.encounters().lock().await;
        let members = ledger.pending(id)?.members();
        let tick = self.world.snapshot().tick();

        let mut writes = Vec::with_capacity(members.len());
        for member in members {
            let mut entity = self.world.store().load(member).await?;
            // A member archived during the battle is already idle.
            if entity.encounter() == Some(id) {
                entity.leave_encounter();
                entity.touch(tick);
                writes.push(VersionedWrite::from_current(entity));
            }
        }

        let versions = self.world.store().save_batch(&writes).await?;
        let released = writes.into_iter().zip(versions).map(|(write, version)| {
            let mut entity = write.entity;
            entity.set_version(version);
            entity
        });
        self.world.apply(released);

        let encounter = ledger.resolve(id)?;
        tracing::info!(encounter = %id, tick, "encounter resolved");
        Ok(encounter)
    }

    /// Load, modify and save one entity.
    ///
    /// With `expected_version`, the loaded record must still be at that
    /// version.
    async fn mutate<F>(&self, id: EntityId, expected_version: Option<u64>, change: F) -> Result<Entity, StrategusError>
    where
        F: FnOnce(&mut Entity) -> Result<(), StrategusError> + Send,
    {
        let mut entity = self.world.store().load(id).await?;
        let base = entity.version();
        if let Some(expected) = expected_version {
            if expected != base {
                return Err(StrategusError::VersionConflict {
                    id,
                    expected,
                    actual: base,
                });
            }
        }

        change(&mut entity)?;
        entity.touch(self.world.snapshot().tick());

        let version = self.world.store().save(&entity, base).await?;
        entity.set_version(version);
        self.world.apply([entity.clone()]);
        Ok(entity)
    }
}

fn check_free(entity: &Entity) -> Result<(), OrderRejection> {
    if entity.is_archived() {
        Err(OrderRejection::Archived)
    } else if entity.is_in_encounter() {
        Err(OrderRejection::InEncounter)
    } else {
        Ok(())
    }
}

fn check_destination(bounds: atlas::Bounds, point: Vec2) -> Result<(), OrderRejection> {
    if !point.is_finite() {
        Err(OrderRejection::NonFiniteDestination)
    } else if !bounds.contains(point) {
        Err(OrderRejection::OutOfBounds)
    } else {
        Ok(())
    }
}

fn check_speed_cap(speed_cap: f32) -> Result<(), OrderRejection> {
    if speed_cap.is_finite() && speed_cap >= 0.0 {
        Ok(())
    } else {
        Err(OrderRejection::NonPositiveSpeed)
    }
}
