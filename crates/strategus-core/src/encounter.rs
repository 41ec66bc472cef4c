//! Encounter detection.
//!
//! An encounter is the convergence of two hostile entities within
//! `encounter_radius`. The [`EncounterDetector`] proposes pairs; the tick
//! pipeline commits each pair atomically and records it in the
//! [`EncounterLedger`], which owns every encounter until the battle subsystem
//! reports it resolved.
//!
//! # Pairing Rules
//!
//! 1. Seeds are the entities advanced this tick plus the entities deferred
//!    by the previous tick's tie-break.
//! 2. For each seed, every free, hostile neighbour within the radius forms a
//!    candidate pair (the neighbour does not need to have moved).
//! 3. Candidates are sorted by `(distance, lower id, higher id)` and claimed
//!    greedily: a pair is selected only if neither member was already
//!    claimed. An entity therefore joins at most one encounter per tick, and
//!    always its closest available opponent.
//! 4. Entities that appeared in a candidate pair but were not claimed are
//!    deferred to the next tick.
//!
//! Given the same snapshot, relationships and seeds, the selection is
//! identical on every run.

use std::collections::{BTreeMap, BTreeSet};

use atlas::SpatialIndex;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::clan::Hostility;
use crate::entity::{EncounterId, Entity, EntityId};
use crate::error::StrategusError;
use crate::world::WorldSnapshot;

/// Lifecycle of an encounter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncounterStatus {
    /// Handed (or waiting to be handed) to the battle subsystem
    Pending,
    /// Battle finished; members released
    Resolved,
}

/// A detected convergence of two hostile entities.
///
/// Immutable once created except for its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    id: EncounterId,
    members: [EntityId; 2],
    trigger_tick: u64,
    position: Vec2,
    status: EncounterStatus,
}

impl Encounter {
    /// Creates a pending encounter. Members are stored in ascending order.
    #[must_use]
    pub fn new(id: EncounterId, a: EntityId, b: EntityId, trigger_tick: u64, position: Vec2) -> Self {
        let members = if a <= b { [a, b] } else { [b, a] };
        Self {
            id,
            members,
            trigger_tick,
            position,
            status: EncounterStatus::Pending,
        }
    }

    /// Encounter identifier.
    #[must_use]
    pub const fn id(&self) -> EncounterId {
        self.id
    }

    /// Member ids, ascending.
    #[must_use]
    pub const fn members(&self) -> [EntityId; 2] {
        self.members
    }

    /// Tick at which the pair was committed.
    #[must_use]
    pub const fn trigger_tick(&self) -> u64 {
        self.trigger_tick
    }

    /// Midpoint of the members at trigger time.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> EncounterStatus {
        self.status
    }

    /// True while the battle has not been resolved.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == EncounterStatus::Pending
    }

    /// True if `entity` is a member.
    #[must_use]
    pub fn involves(&self, entity: EntityId) -> bool {
        self.members.contains(&entity)
    }
}

/// Owner of every encounter created in the world.
#[derive(Debug, Default)]
pub struct EncounterLedger {
    encounters: BTreeMap<EncounterId, Encounter>,
    pending_by_entity: BTreeMap<EntityId, EncounterId>,
    next_id: u64,
}

impl EncounterLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            encounters: BTreeMap::new(),
            pending_by_entity: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Reserves the next encounter id.
    pub fn allocate_id(&mut self) -> EncounterId {
        let id = EncounterId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Pending encounter of an entity, if any.
    #[must_use]
    pub fn pending_for(&self, entity: EntityId) -> Option<EncounterId> {
        self.pending_by_entity.get(&entity).copied()
    }

    /// Records a committed encounter.
    ///
    /// Returns `false` (and records nothing) if either member already has a
    /// pending encounter.
    pub fn insert(&mut self, encounter: Encounter) -> bool {
        let [a, b] = encounter.members();
        if a == b || self.pending_for(a).is_some() || self.pending_for(b).is_some() {
            return false;
        }
        self.pending_by_entity.insert(a, encounter.id());
        self.pending_by_entity.insert(b, encounter.id());
        self.encounters.insert(encounter.id(), encounter);
        true
    }

    /// Looks up an encounter.
    #[must_use]
    pub fn get(&self, id: EncounterId) -> Option<&Encounter> {
        self.encounters.get(&id)
    }

    /// Checks that an encounter exists and is still pending.
    ///
    /// # Errors
    ///
    /// `EncounterNotFound` or `EncounterAlreadyResolved`.
    pub fn pending(&self, id: EncounterId) -> Result<&Encounter, StrategusError> {
        let encounter = self
            .encounters
            .get(&id)
            .ok_or(StrategusError::EncounterNotFound(id))?;
        if !encounter.is_pending() {
            return Err(StrategusError::EncounterAlreadyResolved(id));
        }
        Ok(encounter)
    }

    /// Marks an encounter resolved and releases its members.
    ///
    /// # Errors
    ///
    /// `EncounterNotFound` or `EncounterAlreadyResolved`.
    pub fn resolve(&mut self, id: EncounterId) -> Result<Encounter, StrategusError> {
        let members = self.pending(id)?.members();
        for member in members {
            self.pending_by_entity.remove(&member);
        }
        let encounter = self
            .encounters
            .get_mut(&id)
            .ok_or(StrategusError::EncounterNotFound(id))?;
        encounter.status = EncounterStatus::Resolved;
        Ok(encounter.clone())
    }

    /// Pending encounters in id order.
    pub fn pending_encounters(&self) -> impl Iterator<Item = &Encounter> + '_ {
        self.encounters.values().filter(|e| e.is_pending())
    }

    /// Every encounter in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Encounter> + '_ {
        self.encounters.values()
    }

    /// Number of encounters ever recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.encounters.len()
    }

    /// True if no encounter was ever recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.encounters.is_empty()
    }
}

/// A proposed pairing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairCandidate {
    /// Lower id
    pub a: EntityId,
    /// Higher id
    pub b: EntityId,
    /// Distance between the two at detection time
    pub distance: f32,
}

impl PairCandidate {
    fn new(x: EntityId, y: EntityId, distance: f32) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Self { a, b, distance }
    }
}

/// Result of one detection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    /// Pairs to commit, in selection order
    pub selected: Vec<PairCandidate>,
    /// Entities that qualified but lost the tie-break
    pub deferred: Vec<EntityId>,
}

/// Finds hostile pairs within the encounter radius.
#[derive(Debug, Clone)]
pub struct EncounterDetector {
    radius: f32,
    deferred: BTreeSet<EntityId>,
}

impl EncounterDetector {
    /// Creates a detector for the given radius.
    #[must_use]
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            deferred: BTreeSet::new(),
        }
    }

    /// Encounter radius.
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Entities carried over to the next pass.
    #[must_use]
    pub fn deferred(&self) -> &BTreeSet<EntityId> {
        &self.deferred
    }

    /// Carries an entity over to the next pass (e.g. after a failed commit).
    pub fn defer(&mut self, entity: EntityId) {
        self.deferred.insert(entity);
    }

    /// Runs one pass.
    ///
    /// `moved` are the entities advanced this tick; they are merged with the
    /// entities deferred by the previous pass. The new deferred set replaces
    /// the old one.
    pub fn detect(
        &mut self,
        moved: &[EntityId],
        snapshot: &WorldSnapshot,
        index: &SpatialIndex<EntityId>,
        hostility: &Hostility,
        ledger: &EncounterLedger,
    ) -> Detection {
        let mut seeds: BTreeSet<EntityId> = std::mem::take(&mut self.deferred);
        seeds.extend(moved.iter().copied());

        let eligible = |entity: &Entity| entity.is_free() && ledger.pending_for(entity.id()).is_none();

        let mut candidates: BTreeMap<(EntityId, EntityId), PairCandidate> = BTreeMap::new();
        for seed_id in seeds {
            let Some(seed) = snapshot.get(seed_id).filter(|e| eligible(e)) else {
                continue;
            };
            for other_id in index.query_within(seed.position(), self.radius) {
                if other_id == seed_id {
                    continue;
                }
                let Some(other) = snapshot.get(other_id).filter(|e| eligible(e)) else {
                    continue;
                };
                if !hostility.is_hostile(seed.clan_id(), other.clan_id()) {
                    continue;
                }
                // The index may lag the snapshot by a commit; the snapshot decides.
                let distance = seed.position().distance(other.position());
                if distance > self.radius {
                    continue;
                }
                let pair = PairCandidate::new(seed_id, other_id, distance);
                candidates.entry((pair.a, pair.b)).or_insert(pair);
            }
        }

        let mut ordered: Vec<PairCandidate> = candidates.into_values().collect();
        ordered.sort_by(|x, y| {
            x.distance
                .total_cmp(&y.distance)
                .then(x.a.cmp(&y.a))
                .then(x.b.cmp(&y.b))
        });

        let mut claimed = BTreeSet::new();
        let mut detection = Detection::default();
        for pair in &ordered {
            if claimed.contains(&pair.a) || claimed.contains(&pair.b) {
                continue;
            }
            claimed.insert(pair.a);
            claimed.insert(pair.b);
            detection.selected.push(*pair);
        }

        let losers: BTreeSet<EntityId> = ordered
            .iter()
            .flat_map(|pair| [pair.a, pair.b])
            .filter(|id| !claimed.contains(id))
            .collect();
        detection.deferred = losers.iter().copied().collect();
        self.deferred = losers;

        detection
    }
}
