//! Entity module for the strategic-layer world.
//!
//! This module provides the core entity types of the Strategus world:
//! - [`EntityId`] and the other identifier newtypes
//! - [`TravelOrder`]: a pending move toward a destination
//! - [`MovementState`]: `Idle`, `Moving` (owning its order) or `InEncounter`
//! - [`Entity`]: the complete, versioned entity record
//!
//! # State Encoding
//!
//! The travel order lives inside [`MovementState::Moving`], so an entity can
//! hold at most one order and an entity in an encounter cannot hold any. These
//! invariants are enforced by the type rather than by runtime checks.
//!
//! # Example
//!
//! ```
//! use strategus_core::entity::{AccountId, ArmySummary, Entity, EntityId, Platform, Profile};
//! use glam::Vec2;
//!
//! let entity = Entity::new(
//!     EntityId::new(42),
//!     AccountId::new(7),
//!     Profile::new(Platform::Steam, "7656119", "Orle"),
//!     Vec2::new(10.0, 20.0),
//!     ArmySummary::new(25, 40.0),
//!     12.0,
//! );
//!
//! assert_eq!(entity.id().as_u64(), 42);
//! assert!(entity.is_idle());
//! ```

pub mod components;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use components::{ArmySummary, ClanRef, Platform, Profile};

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates an identifier from a raw `u64` value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw `u64` value of this identifier.
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self::new(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_newtype!(
    /// Stable identifier of a strategic-layer entity.
    ///
    /// Entity IDs are ordered by their numeric value; that order is the
    /// deterministic tie-breaker everywhere the world iterates entities.
    EntityId
);

id_newtype!(
    /// Identifier of the owning user account.
    AccountId
);

id_newtype!(
    /// Opaque identifier of a clan in the clan subsystem.
    ClanId
);

id_newtype!(
    /// Identifier of an encounter created by the detector.
    EncounterId
);

/// A pending move toward a destination.
///
/// Owned exclusively by the [`MovementState::Moving`] variant of its entity;
/// discarded on arrival, cancellation or encounter entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelOrder {
    /// Where the entity is heading
    pub destination: Vec2,
    /// Requested speed in distance units per simulation time unit
    pub speed: f32,
    /// Tick at which the order was issued
    pub issued_at: u64,
}

impl TravelOrder {
    /// Creates a travel order.
    #[must_use]
    pub const fn new(destination: Vec2, speed: f32, issued_at: u64) -> Self {
        Self {
            destination,
            speed,
            issued_at,
        }
    }
}

/// Movement state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MovementState {
    /// Stationary, free to receive orders
    Idle,
    /// Travelling along its order
    Moving(TravelOrder),
    /// Frozen in an encounter until the battle is resolved
    InEncounter(EncounterId),
}

impl MovementState {
    /// Discriminant without payload.
    #[must_use]
    pub const fn kind(&self) -> MovementStateKind {
        match self {
            Self::Idle => MovementStateKind::Idle,
            Self::Moving(_) => MovementStateKind::Moving,
            Self::InEncounter(_) => MovementStateKind::InEncounter,
        }
    }
}

/// Payload-free movement state, used in views and reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementStateKind {
    /// Stationary
    Idle,
    /// Travelling
    Moving,
    /// In an encounter
    InEncounter,
}

impl fmt::Display for MovementStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Moving => write!(f, "Moving"),
            Self::InEncounter => write!(f, "InEncounter"),
        }
    }
}

/// A player-controlled army on the strategic map.
///
/// # Invariants
///
/// - The position is always defined once the entity exists
/// - `version` strictly increases with every committed mutation; the store
///   owns the increment, the entity only records the last committed value
/// - An archived entity is frozen: it is `Idle`, holds no order and takes no
///   part in movement, detection or views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    account: AccountId,
    profile: Profile,
    position: Vec2,
    state: MovementState,
    army: ArmySummary,
    speed_cap: f32,
    clan: Option<ClanRef>,
    last_updated_tick: u64,
    version: u64,
    archived: bool,
}

impl Entity {
    /// Creates an idle, unversioned entity.
    ///
    /// The version starts at 0; the store assigns version 1 when the entity
    /// is first committed.
    #[must_use]
    pub fn new(
        id: EntityId,
        account: AccountId,
        profile: Profile,
        position: Vec2,
        army: ArmySummary,
        speed_cap: f32,
    ) -> Self {
        Self {
            id,
            account,
            profile,
            position,
            state: MovementState::Idle,
            army,
            speed_cap,
            clan: None,
            last_updated_tick: 0,
            version: 0,
            archived: false,
        }
    }

    /// Builder-style clan assignment.
    #[must_use]
    pub fn with_clan(mut self, clan: Option<ClanRef>) -> Self {
        self.clan = clan;
        self
    }

    /// Returns the entity's identifier.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the owning account.
    #[must_use]
    pub const fn account(&self) -> AccountId {
        self.account
    }

    /// Returns the public display attributes.
    #[must_use]
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Returns the current position.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Returns the movement state.
    #[must_use]
    pub const fn state(&self) -> &MovementState {
        &self.state
    }

    /// Returns the active travel order, if moving.
    #[must_use]
    pub const fn travel_order(&self) -> Option<&TravelOrder> {
        match &self.state {
            MovementState::Moving(order) => Some(order),
            _ => None,
        }
    }

    /// Returns the encounter this entity is frozen in, if any.
    #[must_use]
    pub const fn encounter(&self) -> Option<EncounterId> {
        match self.state {
            MovementState::InEncounter(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the army summary.
    #[must_use]
    pub const fn army(&self) -> ArmySummary {
        self.army
    }

    /// Returns the maximum speed derived from army composition.
    #[must_use]
    pub const fn speed_cap(&self) -> f32 {
        self.speed_cap
    }

    /// Returns the clan reference, if affiliated.
    #[must_use]
    pub const fn clan(&self) -> Option<&ClanRef> {
        self.clan.as_ref()
    }

    /// Returns the clan id, if affiliated.
    #[must_use]
    pub fn clan_id(&self) -> Option<ClanId> {
        self.clan.as_ref().map(|clan| clan.id)
    }

    /// Returns the tick of the last committed mutation.
    #[must_use]
    pub const fn last_updated_tick(&self) -> u64 {
        self.last_updated_tick
    }

    /// Returns the last committed version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Returns `true` once the owning account has been removed.
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        self.archived
    }

    /// Returns `true` if the entity is idle.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, MovementState::Idle)
    }

    /// Returns `true` if the entity is travelling.
    #[must_use]
    pub const fn is_moving(&self) -> bool {
        matches!(self.state, MovementState::Moving(_))
    }

    /// Returns `true` if the entity is frozen in an encounter.
    #[must_use]
    pub const fn is_in_encounter(&self) -> bool {
        matches!(self.state, MovementState::InEncounter(_))
    }

    /// Returns `true` if the entity can move and be paired into an encounter.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        !self.archived && !self.is_in_encounter()
    }

    /// Replaces any active order with `order`.
    pub fn set_travel_order(&mut self, order: TravelOrder) {
        self.state = MovementState::Moving(order);
    }

    /// Discards the active order, if any, leaving the entity idle.
    ///
    /// Has no effect on an entity in an encounter.
    pub fn clear_travel_order(&mut self) {
        if self.is_moving() {
            self.state = MovementState::Idle;
        }
    }

    /// Freezes the entity in an encounter, discarding its order.
    pub fn enter_encounter(&mut self, encounter: EncounterId) {
        self.state = MovementState::InEncounter(encounter);
    }

    /// Releases the entity from its encounter.
    pub fn leave_encounter(&mut self) {
        if self.is_in_encounter() {
            self.state = MovementState::Idle;
        }
    }

    /// Sets the position.
    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    /// Replaces the army summary and speed cap.
    pub fn set_army(&mut self, army: ArmySummary, speed_cap: f32) {
        self.army = army;
        self.speed_cap = speed_cap;
    }

    /// Replaces the clan reference.
    pub fn set_clan(&mut self, clan: Option<ClanRef>) {
        self.clan = clan;
    }

    /// Freezes the entity permanently.
    pub fn archive(&mut self) {
        self.state = MovementState::Idle;
        self.archived = true;
    }

    /// Records the tick of the mutation being committed.
    pub fn touch(&mut self, tick: u64) {
        self.last_updated_tick = tick;
    }

    /// Records the version assigned by the store.
    ///
    /// Store adapters call this when materializing a committed record.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

// =============================================================================
// Tests
// =============================================================================
