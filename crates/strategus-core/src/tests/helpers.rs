//! Test helper functions for setting up worlds and entities.
//!
//! This module provides factory functions and setup utilities that make
//! writing tests more ergonomic and consistent.

use std::sync::Arc;

use glam::Vec2;

use crate::battle::{BattleSink, ChannelBattleSink};
use crate::clan::{Relationship, StaticClanDirectory};
use crate::config::WorldConfig;
use crate::encounter::Encounter;
use crate::entity::{AccountId, ArmySummary, ClanId, ClanRef, Entity, EntityId, Platform, Profile, TravelOrder};
use crate::service::WorldService;
use crate::simulation::Simulation;
use crate::store::{EntityStore, InMemoryStore};
use crate::world::{Collaborators, World};

// =============================================================================
// Entity Factories
// =============================================================================

/// Creates an idle entity owned by account `id`, with speed cap 10.
pub fn army(id: u64, position: Vec2) -> Entity {
    Entity::new(
        EntityId::new(id),
        AccountId::new(id),
        Profile::new(Platform::Steam, format!("7656{id:06}"), format!("Army {id}")),
        position,
        ArmySummary::new(100, 120.0),
        10.0,
    )
}

/// Creates an entity already travelling toward `destination`.
pub fn marching(id: u64, position: Vec2, destination: Vec2, speed: f32) -> Entity {
    let mut entity = army(id, position);
    entity.set_travel_order(TravelOrder::new(destination, speed, 0));
    entity
}

/// Attaches a clan reference with a derived tag.
pub fn in_clan(entity: Entity, clan: u64) -> Entity {
    entity.with_clan(Some(clan_ref(clan)))
}

/// Clan reference with a derived tag and name.
pub fn clan_ref(clan: u64) -> ClanRef {
    ClanRef::new(ClanId::new(clan), format!("C{clan}"), format!("Clan {clan}"))
}

// =============================================================================
// World Setup
// =============================================================================

/// A world wired to in-memory collaborators.
pub struct TestWorld {
    /// Shared world context
    pub world: Arc<World>,
    /// Backing store, for inspecting committed state
    pub store: Arc<InMemoryStore>,
    /// Tick pipeline
    pub sim: Simulation,
    /// Service operations
    pub service: WorldService,
    /// Encounters handed to the battle subsystem
    pub battles: tokio::sync::mpsc::UnboundedReceiver<Encounter>,
}

impl TestWorld {
    /// Runs `n` ticks.
    pub async fn run(&mut self, n: usize) {
        for _ in 0..n {
            self.sim.step().await;
        }
    }

    /// Committed record of an entity.
    pub async fn stored(&self, id: u64) -> Entity {
        self.store.load(EntityId::new(id)).await.unwrap()
    }

    /// Encounters received by the battle channel so far.
    pub fn drain_battles(&mut self) -> Vec<Encounter> {
        let mut received = Vec::new();
        while let Ok(encounter) = self.battles.try_recv() {
            received.push(encounter);
        }
        received
    }
}

/// Builds a world from seed entities, a clan directory and a configuration.
pub async fn setup_world(config: WorldConfig, entities: Vec<Entity>, clans: StaticClanDirectory) -> TestWorld {
    let store = Arc::new(InMemoryStore::new());
    for entity in &entities {
        store.create(entity).await.unwrap();
    }

    let (sink, battles) = ChannelBattleSink::new();
    let sink: Arc<dyn BattleSink> = Arc::new(sink);
    let world = World::init(
        config,
        Collaborators {
            store: store.clone(),
            clans: Arc::new(clans),
            battles: sink,
        },
    )
    .await
    .unwrap();

    TestWorld {
        sim: Simulation::new(Arc::clone(&world)),
        service: WorldService::new(Arc::clone(&world)),
        world,
        store,
        battles,
    }
}

/// Builds a world with the default configuration and no clan relations.
pub async fn setup_default_world(entities: Vec<Entity>) -> TestWorld {
    setup_world(WorldConfig::default(), entities, StaticClanDirectory::new()).await
}

/// Directory in which every listed pair of clans is hostile.
pub fn hostile_clans(pairs: &[(u64, u64)]) -> StaticClanDirectory {
    pairs.iter().fold(StaticClanDirectory::new(), |directory, &(a, b)| {
        directory.with_relation(ClanId::new(a), ClanId::new(b), Relationship::Hostile)
    })
}

/// Sets up the three-army convergence scenario.
///
/// - Army 1 at (0, 0), unaffiliated, marching east at speed 1
/// - Army 2 at (3, 0), clan 9, idle
/// - Army 3 at (4, 0), clan 9, idle
///
/// Armies 2 and 3 are clanmates; both are hostile to the unaffiliated army 1.
pub fn convergence_scenario() -> Vec<Entity> {
    vec![
        marching(1, Vec2::ZERO, Vec2::new(500.0, 0.0), 1.0),
        in_clan(army(2, Vec2::new(3.0, 0.0)), 9),
        in_clan(army(3, Vec2::new(4.0, 0.0)), 9),
    ]
}

/// A deterministic spread of `n` armies, a third of them marching, in three
/// clans plus unaffiliated.
pub fn crowd(n: u64) -> Vec<Entity> {
    (0..n)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let position = Vec2::new((i % 10) as f32 * 7.0 + 100.0, (i / 10) as f32 * 7.0 + 100.0);
            let entity = if i % 3 == 0 {
                #[allow(clippy::cast_precision_loss)]
                let destination = Vec2::new(800.0 - (i % 7) as f32 * 50.0, 600.0 - (i % 5) as f32 * 40.0);
                marching(i + 1, position, destination, 4.0 + (i % 4) as f32)
            } else {
                army(i + 1, position)
            };
            match i % 4 {
                0 => entity,
                clan => in_clan(entity, clan),
            }
        })
        .collect()
}
