//! Integration tests for the full world pipeline.
//!
//! These tests exercise the tick, the service operations and the
//! collaborator ports together, checking end-to-end behavior rather than
//! individual components.

use std::collections::BTreeSet;

use glam::Vec2;

use crate::config::{UnaffiliatedPolicy, WorldConfig};
use crate::encounter::EncounterStatus;
use crate::entity::{EntityId, MovementState};
use crate::error::StrategusError;
use crate::store::EntityStore;
use crate::visibility::EntityView;

use super::helpers::{
    army, convergence_scenario, crowd, hostile_clans, in_clan, marching, setup_default_world, setup_world,
};

// =============================================================================
// Movement
// =============================================================================

#[tokio::test]
async fn march_reaches_destination_on_schedule() {
    let mut world = setup_default_world(vec![marching(1, Vec2::ZERO, Vec2::new(100.0, 0.0), 10.0)]).await;

    world.run(5).await;
    let halfway = world.stored(1).await;
    assert_eq!(halfway.position(), Vec2::new(50.0, 0.0));
    assert!(halfway.is_moving());

    world.run(5).await;
    let arrived = world.stored(1).await;
    assert_eq!(arrived.position(), Vec2::new(100.0, 0.0));
    assert!(arrived.is_idle());
    assert_eq!(arrived.last_updated_tick(), 10);

    // Nothing moves after arrival.
    world.run(3).await;
    assert_eq!(world.stored(1).await.version(), arrived.version());
}

#[tokio::test]
async fn order_issued_between_ticks_takes_effect() {
    let mut world = setup_default_world(vec![army(1, Vec2::new(10.0, 10.0))]).await;
    world.run(2).await;

    let order = world
        .service
        .issue_travel_order(EntityId::new(1), Vec2::new(10.0, 40.0), 10.0)
        .await
        .unwrap();
    assert_eq!(order.issued_at, 2);

    let report = world.sim.step().await;
    assert_eq!(report.moved, 1);
    assert_eq!(report.conflicts, 0);
    assert_eq!(world.stored(1).await.position(), Vec2::new(10.0, 20.0));
}

#[tokio::test]
async fn reduced_speed_cap_slows_an_active_order() {
    let mut world = setup_default_world(vec![marching(1, Vec2::ZERO, Vec2::new(100.0, 0.0), 10.0)]).await;
    world.run(1).await;

    world
        .service
        .update_army(EntityId::new(1), crate::entity::ArmySummary::new(5, 5.0), 2.5)
        .await
        .unwrap();
    world.run(2).await;
    assert_eq!(world.stored(1).await.position(), Vec2::new(15.0, 0.0));
}

// =============================================================================
// Encounters
// =============================================================================

#[tokio::test]
async fn closest_hostile_pair_meets_and_clanmate_waits() {
    let mut world = setup_default_world(convergence_scenario()).await;

    let report = world.sim.step().await;
    assert_eq!(report.encounters.len(), 1);
    assert_eq!(report.deferred, 1);

    let pending = world.service.pending_encounters().await;
    assert_eq!(pending.len(), 1);
    let encounter = &pending[0];
    assert_eq!(encounter.members(), [EntityId::new(1), EntityId::new(2)]);
    assert_eq!(encounter.trigger_tick(), 1);
    assert_eq!(encounter.position(), Vec2::new(2.0, 0.0));

    let a = world.stored(1).await;
    let b = world.stored(2).await;
    let c = world.stored(3).await;
    assert_eq!(a.state(), &MovementState::InEncounter(encounter.id()));
    assert_eq!(b.state(), &MovementState::InEncounter(encounter.id()));
    assert!(a.travel_order().is_none());
    assert!(c.is_idle());

    let handed = world.drain_battles();
    assert_eq!(handed, pending);

    // The deferred clanmate finds nobody free next tick.
    let report = world.sim.step().await;
    assert!(report.encounters.is_empty());
    assert_eq!(world.sim.detector().deferred().len(), 0);
}

#[tokio::test]
async fn frozen_entities_reject_orders_until_resolved() {
    let mut world = setup_default_world(convergence_scenario()).await;
    world.run(1).await;
    let encounter = world.service.pending_encounters().await.remove(0);

    let rejected = world
        .service
        .issue_travel_order(EntityId::new(1), Vec2::new(50.0, 50.0), 1.0)
        .await;
    assert_eq!(
        rejected,
        Err(StrategusError::InvalidOrder(crate::error::OrderRejection::InEncounter))
    );

    // Frozen entities do not move.
    world.run(3).await;
    assert_eq!(world.stored(1).await.position(), Vec2::new(1.0, 0.0));

    let resolved = world.service.resolve_encounter(encounter.id()).await.unwrap();
    assert_eq!(resolved.status(), EncounterStatus::Resolved);
    assert!(world.stored(1).await.is_idle());
    assert!(world.stored(2).await.is_idle());
    assert!(world.service.pending_encounters().await.is_empty());

    assert_eq!(
        world.service.resolve_encounter(encounter.id()).await,
        Err(StrategusError::EncounterAlreadyResolved(encounter.id()))
    );

    world
        .service
        .issue_travel_order(EntityId::new(1), Vec2::new(50.0, 50.0), 1.0)
        .await
        .unwrap();
}

#[tokio::test]
async fn neutral_policy_spares_unaffiliated_armies() {
    let config = WorldConfig {
        unaffiliated_policy: UnaffiliatedPolicy::NeutralByDefault,
        ..WorldConfig::default()
    };
    let mut world = setup_world(config, convergence_scenario(), hostile_clans(&[])).await;
    world.run(3).await;
    assert!(world.service.pending_encounters().await.is_empty());
}

#[tokio::test]
async fn hostile_clans_meet_once_relationships_are_loaded() {
    let entities = vec![
        in_clan(marching(1, Vec2::ZERO, Vec2::new(100.0, 0.0), 1.0), 1),
        in_clan(army(2, Vec2::new(4.0, 0.0)), 2),
    ];
    let mut world = setup_world(WorldConfig::default(), entities, hostile_clans(&[(1, 2)])).await;

    world.run(1).await;
    let pending = world.service.pending_encounters().await;
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn unknown_clan_pair_is_neutral() {
    let entities = vec![
        in_clan(marching(1, Vec2::ZERO, Vec2::new(100.0, 0.0), 1.0), 1),
        in_clan(army(2, Vec2::new(4.0, 0.0)), 2),
    ];
    let mut world = setup_world(WorldConfig::default(), entities, hostile_clans(&[])).await;
    world.run(3).await;
    assert!(world.service.pending_encounters().await.is_empty());
}

#[tokio::test]
async fn no_entity_is_ever_in_two_pending_encounters() {
    let mut world = setup_world(WorldConfig::default(), crowd(80), hostile_clans(&[(1, 2), (1, 3)])).await;

    for _ in 0..30 {
        world.sim.step().await;

        let pending = world.service.pending_encounters().await;
        let mut members = BTreeSet::new();
        for encounter in &pending {
            for member in encounter.members() {
                assert!(members.insert(member), "{member} in two pending encounters");
                let stored = world.store.load(member).await.unwrap();
                assert_eq!(stored.encounter(), Some(encounter.id()));
            }
        }

        // Resolve the oldest encounter each tick to keep the crowd moving.
        if let Some(oldest) = pending.first() {
            world.service.resolve_encounter(oldest.id()).await.unwrap();
        }
    }
}

// =============================================================================
// Visibility
// =============================================================================

#[tokio::test]
async fn public_view_hides_distant_strangers() {
    let entities = vec![
        in_clan(army(1, Vec2::new(100.0, 100.0)), 1),
        in_clan(army(2, Vec2::new(900.0, 900.0)), 1),
        in_clan(army(3, Vec2::new(140.0, 100.0)), 2),
        in_clan(army(4, Vec2::new(160.0, 100.0)), 2),
        army(5, Vec2::new(100.0, 150.0)),
    ];
    let world = setup_default_world(entities).await;

    let views = world.service.get_public_view(EntityId::new(1)).unwrap();
    let disclosed: Vec<(EntityId, bool)> = views.iter().map(|v| (v.id(), v.is_private())).collect();
    assert_eq!(
        disclosed,
        vec![
            (EntityId::new(1), true),  // self
            (EntityId::new(2), true),  // clanmate, far away
            (EntityId::new(3), true),  // 40 away
            (EntityId::new(4), false), // 60 away
            (EntityId::new(5), true),  // exactly on the radius
        ]
    );

    let EntityView::Public(stranger) = &views[3] else {
        panic!("expected public view");
    };
    assert_eq!(stranger.name, "Army 4");
    assert_eq!(stranger.clan.as_ref().map(|c| c.tag.as_str()), Some("C2"));
}

#[tokio::test]
async fn views_follow_committed_movement() {
    let mut world = setup_default_world(vec![
        army(1, Vec2::new(100.0, 100.0)),
        marching(2, Vec2::new(200.0, 100.0), Vec2::new(100.0, 100.0), 10.0),
    ])
    .await;

    let observer = EntityId::new(1);
    assert!(!world.service.get_public_view(observer).unwrap()[1].is_private());

    world.run(5).await;
    let views = world.service.get_public_view(observer).unwrap();
    assert_eq!(views[1].position(), Some(Vec2::new(150.0, 100.0)));
    assert_eq!(views[1].army(), Some(world.stored(2).await.army()));
}

#[tokio::test]
async fn private_view_is_unfiltered() {
    let mut world = setup_default_world(vec![marching(7, Vec2::ZERO, Vec2::new(0.0, 50.0), 5.0)]).await;
    world.run(1).await;

    let view = world.service.get_private_view(EntityId::new(7)).unwrap();
    assert_eq!(view.position, Vec2::new(0.0, 5.0));
    assert_eq!(view.destination, Some(Vec2::new(0.0, 50.0)));
    assert_eq!(view.eta_ticks, Some(9));
    assert_eq!(view.version, 2);
}
