//! Shared world context.
//!
//! [`World`] bundles everything the tick pipeline, the clock and the service
//! operations share: configuration, collaborator ports, the spatial index,
//! the latest committed [`WorldSnapshot`], the clan relationship cache and
//! the encounter ledger. It is created by [`World::init`] and released by
//! [`World::teardown`]; components receive it explicitly as `Arc<World>`.
//!
//! # Snapshot Publication
//!
//! Readers clone an `Arc` of the current snapshot and work on it for the
//! whole call, so a single view resolution never sees a half-applied tick.
//! Writers publish committed records through [`World::apply`]: a record
//! replaces the snapshot's copy only if its version is newer. The tick and
//! external writers can therefore publish in any order without either
//! clobbering the other's newer state.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

use atlas::SpatialIndex;
use tokio::sync::Mutex;

use crate::battle::BattleSink;
use crate::clan::{ClanService, Hostility, RelationshipCache};
use crate::config::WorldConfig;
use crate::encounter::EncounterLedger;
use crate::entity::{ClanId, Entity, EntityId, MovementState};
use crate::error::{ConfigError, StrategusError};
use crate::store::EntityStore;
use crate::visibility::VisibilityFilter;

/// Latest committed state of every known entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldSnapshot {
    tick: u64,
    entities: BTreeMap<EntityId, Entity>,
}

impl WorldSnapshot {
    /// Snapshot holding `entities` at `tick`.
    #[must_use]
    pub fn from_entities(tick: u64, entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            tick,
            entities: entities.into_iter().map(|e| (e.id(), e)).collect(),
        }
    }

    /// Last completed tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Looks up an entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Looks up a non-archived entity.
    #[must_use]
    pub fn get_active(&self, id: EntityId) -> Option<&Entity> {
        self.get(id).filter(|e| !e.is_archived())
    }

    /// Every entity, in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    /// Non-archived entities, in id order.
    pub fn active(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values().filter(|e| !e.is_archived())
    }

    /// Clans present among active entities.
    #[must_use]
    pub fn clans(&self) -> BTreeSet<ClanId> {
        self.active().filter_map(Entity::clan_id).collect()
    }

    /// Number of entities, archived ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True if the snapshot holds no entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Installs a committed record unless the snapshot already holds the same
    /// or a newer version. Returns `true` if the record was installed.
    pub fn apply(&mut self, entity: Entity) -> bool {
        match self.entities.get(&entity.id()) {
            Some(current) if current.version() >= entity.version() => false,
            _ => {
                self.entities.insert(entity.id(), entity);
                true
            }
        }
    }

    /// Deterministic digest of the snapshot.
    ///
    /// Positions and destinations are hashed as raw bits.
    #[must_use]
    pub fn world_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        for entity in self.entities.values() {
            entity.id().hash(&mut hasher);
            entity.position().x.to_bits().hash(&mut hasher);
            entity.position().y.to_bits().hash(&mut hasher);
            match entity.state() {
                MovementState::Idle => 0u8.hash(&mut hasher),
                MovementState::Moving(order) => {
                    1u8.hash(&mut hasher);
                    order.destination.x.to_bits().hash(&mut hasher);
                    order.destination.y.to_bits().hash(&mut hasher);
                    order.speed.to_bits().hash(&mut hasher);
                }
                MovementState::InEncounter(id) => {
                    2u8.hash(&mut hasher);
                    id.hash(&mut hasher);
                }
            }
            entity.version().hash(&mut hasher);
            entity.is_archived().hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Collaborator ports the world is wired to.
#[derive(Clone)]
pub struct Collaborators {
    /// Entity persistence
    pub store: Arc<dyn EntityStore>,
    /// Clan relationships and membership
    pub clans: Arc<dyn ClanService>,
    /// Battle subsystem
    pub battles: Arc<dyn BattleSink>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Shared state of one running world.
pub struct World {
    config: WorldConfig,
    ports: Collaborators,
    index: SpatialIndex<EntityId>,
    snapshot: RwLock<Arc<WorldSnapshot>>,
    relationships: RelationshipCache,
    encounters: Mutex<EncounterLedger>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("World")
            .field("tick", &snapshot.tick())
            .field("entities", &snapshot.len())
            .field("indexed", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl World {
    /// Validates the configuration, loads every active entity from the store
    /// and fills the spatial index and relationship cache.
    ///
    /// # Errors
    ///
    /// An invalid configuration or a failing store is fatal. A failing clan
    /// service is not: the cache starts empty and is filled by the next
    /// refresh.
    pub async fn init(config: WorldConfig, ports: Collaborators) -> Result<Arc<Self>, StrategusError> {
        config.validate()?;
        let index = SpatialIndex::new(config.bounds, config.cell_size).map_err(ConfigError::from)?;

        let entities = ports.store.list_active().await?;
        index.rebuild(entities.iter().map(|e| (e.id(), e.position())));
        // Resume after the newest persisted write so ticks never go backwards.
        let tick = entities.iter().map(Entity::last_updated_tick).max().unwrap_or(0);
        let snapshot = WorldSnapshot::from_entities(tick, entities);

        let world = Arc::new(Self {
            config,
            ports,
            index,
            snapshot: RwLock::new(Arc::new(snapshot)),
            relationships: RelationshipCache::new(),
            encounters: Mutex::new(EncounterLedger::new()),
        });

        let failures = world.refresh_relationships().await;
        tracing::info!(
            entities = world.index.len(),
            relationship_failures = failures,
            "world initialized"
        );
        Ok(world)
    }

    /// Releases in-memory state. The store is left untouched.
    pub async fn teardown(&self) {
        let pending = self.encounters.lock().await.pending_encounters().count();
        let tick = self.snapshot().tick();
        self.index.rebuild(std::iter::empty());
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(WorldSnapshot::from_entities(tick, std::iter::empty()));
        tracing::info!(tick, pending_encounters = pending, "world torn down");
    }

    /// World configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Entity store.
    #[must_use]
    pub fn store(&self) -> &dyn EntityStore {
        self.ports.store.as_ref()
    }

    /// Clan service.
    #[must_use]
    pub fn clans(&self) -> &dyn ClanService {
        self.ports.clans.as_ref()
    }

    /// Battle subsystem.
    #[must_use]
    pub fn battles(&self) -> &dyn BattleSink {
        self.ports.battles.as_ref()
    }

    /// Spatial index of active entities.
    #[must_use]
    pub fn index(&self) -> &SpatialIndex<EntityId> {
        &self.index
    }

    /// Relationship cache.
    #[must_use]
    pub fn relationships(&self) -> &RelationshipCache {
        &self.relationships
    }

    /// Encounter ledger.
    #[must_use]
    pub fn encounters(&self) -> &Mutex<EncounterLedger> {
        &self.encounters
    }

    /// Latest committed snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Hostility over the current relationship snapshot.
    #[must_use]
    pub fn hostility(&self) -> Hostility {
        Hostility::new(self.relationships.snapshot(), self.config.unaffiliated_policy)
    }

    /// Visibility rules from the configuration.
    #[must_use]
    pub fn visibility(&self) -> VisibilityFilter {
        VisibilityFilter::new(self.config.visibility_radius, self.config.time_step)
    }

    /// Publishes committed records to the snapshot and the spatial index.
    ///
    /// Records older than the snapshot's copy are ignored. Archived records
    /// leave the index. Returns the number of records installed.
    pub fn apply(&self, committed: impl IntoIterator<Item = Entity>) -> usize {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let snapshot = Arc::make_mut(&mut guard);

        let mut moves = Vec::new();
        let mut removed = Vec::new();
        for entity in committed {
            let (id, position, archived) = (entity.id(), entity.position(), entity.is_archived());
            if snapshot.apply(entity) {
                if archived {
                    removed.push(id);
                } else {
                    moves.push((id, position));
                }
            }
        }

        // Still under the snapshot lock, so the index follows the same order.
        let installed = moves.len() + removed.len();
        self.index.upsert_many(moves);
        for id in removed {
            self.index.remove(id);
        }
        installed
    }

    /// Marks `tick` as the last completed tick.
    pub fn publish_tick(&self, tick: u64) {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut guard).tick = tick;
    }

    /// Reloads one record from the store into the snapshot.
    ///
    /// # Errors
    ///
    /// Propagates the store failure.
    pub async fn reload(&self, id: EntityId) -> Result<Entity, StrategusError> {
        let entity = self.store().load(id).await?;
        self.apply([entity.clone()]);
        Ok(entity)
    }

    /// Refetches relationships among the clans currently in play. Returns the
    /// number of failed lookups.
    pub async fn refresh_relationships(&self) -> usize {
        let clans = self.snapshot().clans();
        self.relationships.refresh(self.clans(), &clans).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::LoggingBattleSink;
    use crate::clan::StaticClanDirectory;
    use crate::entity::{AccountId, ArmySummary, Platform, Profile, TravelOrder};
    use crate::store::{InMemoryStore, MockEntityStore};
    use crate::error::StoreError;
    use glam::Vec2;

    fn entity(id: u64, x: f32) -> Entity {
        Entity::new(
            EntityId::new(id),
            AccountId::new(id),
            Profile::new(Platform::Steam, id.to_string(), "W"),
            Vec2::new(x, 0.0),
            ArmySummary::new(1, 1.0),
            5.0,
        )
    }

    fn ports(store: Arc<dyn EntityStore>) -> Collaborators {
        Collaborators {
            store,
            clans: Arc::new(StaticClanDirectory::new()),
            battles: Arc::new(LoggingBattleSink),
        }
    }

    #[test]
    fn snapshot_keeps_newer_version() {
        let mut snapshot = WorldSnapshot::default();
        let mut v2 = entity(1, 2.0);
        v2.set_version(2);
        let mut v1 = entity(1, 1.0);
        v1.set_version(1);

        assert!(snapshot.apply(v2));
        assert!(!snapshot.apply(v1));
        assert_eq!(snapshot.get(EntityId::new(1)).unwrap().position(), Vec2::new(2.0, 0.0));
    }

    #[test]
    fn world_hash_tracks_state() {
        let a = WorldSnapshot::from_entities(3, [entity(1, 1.0), entity(2, 2.0)]);
        let b = WorldSnapshot::from_entities(3, [entity(2, 2.0), entity(1, 1.0)]);
        assert_eq!(a.world_hash(), b.world_hash());

        let mut moving = entity(1, 1.0);
        moving.set_travel_order(TravelOrder::new(Vec2::new(9.0, 0.0), 1.0, 0));
        let c = WorldSnapshot::from_entities(3, [moving, entity(2, 2.0)]);
        assert_ne!(a.world_hash(), c.world_hash());
    }

    #[tokio::test]
    async fn init_loads_active_entities() {
        let store = Arc::new(InMemoryStore::new());
        store.create(&entity(1, 10.0)).await.unwrap();
        store.create(&entity(2, 20.0)).await.unwrap();

        let world = World::init(WorldConfig::default(), ports(store)).await.unwrap();
        assert_eq!(world.snapshot().len(), 2);
        assert_eq!(world.index().get(EntityId::new(2)), Some(Vec2::new(20.0, 0.0)));

        world.teardown().await;
        assert!(world.snapshot().is_empty());
        assert!(world.index().is_empty());
    }

    #[tokio::test]
    async fn init_resumes_after_newest_persisted_tick() {
        let store = Arc::new(InMemoryStore::new());
        let mut older = entity(1, 10.0);
        older.touch(7);
        let mut newer = entity(2, 20.0);
        newer.touch(12);
        store.create(&older).await.unwrap();
        store.create(&newer).await.unwrap();

        let world = World::init(WorldConfig::default(), ports(store)).await.unwrap();
        assert_eq!(world.snapshot().tick(), 12);

        let mut sim = crate::simulation::Simulation::new(Arc::clone(&world));
        assert_eq!(sim.step().await.tick, 13);
    }

    #[tokio::test]
    async fn init_rejects_invalid_config() {
        let config = WorldConfig {
            cell_size: -1.0,
            ..WorldConfig::default()
        };
        let result = World::init(config, ports(Arc::new(InMemoryStore::new()))).await;
        assert!(matches!(result, Err(StrategusError::Config(_))));
    }

    #[tokio::test]
    async fn init_fails_when_store_is_down() {
        let mut store = MockEntityStore::new();
        store
            .expect_list_active()
            .returning(|| Err(StoreError::Backend("offline".into())));
        let result = World::init(WorldConfig::default(), ports(Arc::new(store))).await;
        assert!(matches!(result, Err(StrategusError::Store(StoreError::Backend(_)))));
    }

    #[tokio::test]
    async fn apply_moves_and_removes_index_entries() {
        let store = Arc::new(InMemoryStore::new());
        store.create(&entity(1, 10.0)).await.unwrap();
        let world = World::init(WorldConfig::default(), ports(store)).await.unwrap();

        let mut moved = world.snapshot().get(EntityId::new(1)).unwrap().clone();
        moved.set_position(Vec2::new(40.0, 0.0));
        moved.set_version(2);
        assert_eq!(world.apply([moved.clone()]), 1);
        assert_eq!(world.index().get(EntityId::new(1)), Some(Vec2::new(40.0, 0.0)));

        // Stale copy is ignored.
        let mut stale = moved.clone();
        stale.set_position(Vec2::ZERO);
        stale.set_version(1);
        assert_eq!(world.apply([stale]), 0);

        let mut archived = moved;
        archived.archive();
        archived.set_version(3);
        world.apply([archived]);
        assert!(world.index().get(EntityId::new(1)).is_none());
        assert!(world.snapshot().get_active(EntityId::new(1)).is_none());
    }
}
