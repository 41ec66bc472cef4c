//! Clan relationships as seen by the simulation.
//!
//! The clan subsystem is external and may be slow, so the tick never awaits
//! it. Instead [`RelationshipCache`] keeps the last-known relationship of
//! every clan pair in play, and a background refresh revalidates it at a
//! bounded interval. [`Hostility`] combines that snapshot with the
//! [`UnaffiliatedPolicy`] to answer "would these two fight?".

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::UnaffiliatedPolicy;
use crate::entity::{ClanId, ClanRef, EntityId};
use crate::error::ClanError;

/// Diplomatic stance between two clans.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relationship {
    /// At war; members meet in encounters
    Hostile,
    /// Allied
    Friendly,
    /// No stance
    Neutral,
}

/// Port to the clan subsystem.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClanService: Send + Sync {
    /// Stance of clan `a` toward clan `b`. Stances may be one-sided.
    async fn relationship(&self, a: ClanId, b: ClanId) -> Result<Relationship, ClanError>;

    /// Clan of an entity's owner, if any.
    async fn clan_of(&self, entity: EntityId) -> Result<Option<ClanRef>, ClanError>;
}

/// Stance between two clans given each side's view of the other.
///
/// Hostile or friendly only when both sides agree.
fn mutual(ab: Relationship, ba: Relationship) -> Relationship {
    if ab == ba {
        ab
    } else {
        Relationship::Neutral
    }
}

fn pair_key(a: ClanId, b: ClanId) -> (ClanId, ClanId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Immutable relationship table captured at one refresh.
#[derive(Debug, Clone, Default)]
pub struct RelationshipSnapshot {
    relations: HashMap<(ClanId, ClanId), Relationship>,
    refreshed_at: Option<Instant>,
}

impl RelationshipSnapshot {
    /// Snapshot from explicit pairs, stamped now.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ClanId, ClanId, Relationship)>) -> Self {
        Self {
            relations: pairs
                .into_iter()
                .map(|(a, b, rel)| (pair_key(a, b), rel))
                .collect(),
            refreshed_at: Some(Instant::now()),
        }
    }

    /// Stance between two distinct clans; `None` if never fetched.
    #[must_use]
    pub fn get(&self, a: ClanId, b: ClanId) -> Option<Relationship> {
        self.relations.get(&pair_key(a, b)).copied()
    }

    /// Number of known pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// True if no pair is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// When this snapshot was taken.
    #[must_use]
    pub fn refreshed_at(&self) -> Option<Instant> {
        self.refreshed_at
    }
}

/// Hostility evaluation over one relationship snapshot.
#[derive(Debug, Clone)]
pub struct Hostility {
    snapshot: Arc<RelationshipSnapshot>,
    policy: UnaffiliatedPolicy,
}

impl Hostility {
    /// Creates an evaluator.
    #[must_use]
    pub fn new(snapshot: Arc<RelationshipSnapshot>, policy: UnaffiliatedPolicy) -> Self {
        Self { snapshot, policy }
    }

    /// Stance between two (possibly unaffiliated) entities' clans.
    ///
    /// Members of the same clan are friendly. If either side has no clan the
    /// configured policy decides. Clan pairs missing from the snapshot are
    /// neutral until the next refresh.
    #[must_use]
    pub fn relation(&self, a: Option<ClanId>, b: Option<ClanId>) -> Relationship {
        match (a, b) {
            (Some(a), Some(b)) if a == b => Relationship::Friendly,
            (Some(a), Some(b)) => self.snapshot.get(a, b).unwrap_or(Relationship::Neutral),
            _ => match self.policy {
                UnaffiliatedPolicy::HostileByDefault => Relationship::Hostile,
                UnaffiliatedPolicy::NeutralByDefault => Relationship::Neutral,
            },
        }
    }

    /// True if the two sides would fight.
    #[must_use]
    pub fn is_hostile(&self, a: Option<ClanId>, b: Option<ClanId>) -> bool {
        self.relation(a, b) == Relationship::Hostile
    }
}

/// Last-known clan relationships, shared between the tick and the refresher.
#[derive(Debug, Default)]
pub struct RelationshipCache {
    current: RwLock<Arc<RelationshipSnapshot>>,
}

impl RelationshipCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RelationshipSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the snapshot.
    pub fn install(&self, snapshot: RelationshipSnapshot) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// True if the snapshot is older than `max_age` or was never filled.
    #[must_use]
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.snapshot()
            .refreshed_at()
            .map_or(true, |at| at.elapsed() >= max_age)
    }

    /// Refetch every pair among `clans`, asking in both directions, and
    /// install the result.
    ///
    /// A pair whose lookup fails in either direction keeps its last-known
    /// value. Returns the number of failed lookups.
    pub async fn refresh(&self, service: &dyn ClanService, clans: &BTreeSet<ClanId>) -> usize {
        let previous = self.snapshot();
        let mut relations = HashMap::new();
        let mut failures = 0;

        let ids: Vec<ClanId> = clans.iter().copied().collect();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let forward = service.relationship(a, b).await;
                let backward = service.relationship(b, a).await;
                match (forward, backward) {
                    (Ok(ab), Ok(ba)) => {
                        relations.insert(pair_key(a, b), mutual(ab, ba));
                    }
                    (forward, backward) => {
                        for err in [forward.err(), backward.err()].into_iter().flatten() {
                            failures += 1;
                            tracing::warn!(clan_a = %a, clan_b = %b, error = %err, "clan relationship lookup failed");
                        }
                        if let Some(rel) = previous.get(a, b) {
                            relations.insert(pair_key(a, b), rel);
                        }
                    }
                }
            }
        }

        tracing::debug!(pairs = relations.len(), failures, "relationship snapshot refreshed");
        self.install(RelationshipSnapshot {
            relations,
            refreshed_at: Some(Instant::now()),
        });
        failures
    }
}

/// Clan service backed by fixed tables.
#[derive(Debug, Clone, Default)]
pub struct StaticClanDirectory {
    members: HashMap<EntityId, ClanRef>,
    relations: HashMap<(ClanId, ClanId), Relationship>,
}

impl StaticClanDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a membership.
    #[must_use]
    pub fn with_member(mut self, entity: EntityId, clan: ClanRef) -> Self {
        self.members.insert(entity, clan);
        self
    }

    /// Registers a stance (symmetric).
    #[must_use]
    pub fn with_relation(mut self, a: ClanId, b: ClanId, relationship: Relationship) -> Self {
        self.relations.insert(pair_key(a, b), relationship);
        self
    }
}

#[async_trait]
impl ClanService for StaticClanDirectory {
    async fn relationship(&self, a: ClanId, b: ClanId) -> Result<Relationship, ClanError> {
        if a == b {
            return Ok(Relationship::Friendly);
        }
        Ok(self
            .relations
            .get(&pair_key(a, b))
            .copied()
            .unwrap_or(Relationship::Neutral))
    }

    async fn clan_of(&self, entity: EntityId) -> Result<Option<ClanRef>, ClanError> {
        Ok(self.members.get(&entity).cloned())
    }
}
