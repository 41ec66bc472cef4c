//! Fog-of-war filtering.
//!
//! [`VisibilityFilter::resolve_view`] decides, for one observer, what each
//! candidate discloses. It is a pure function of the snapshot it is given and
//! may run concurrently for any number of observers.
//!
//! A candidate is fully visible (private view) when it is the observer
//! itself, belongs to the observer's clan, or stands within
//! `visibility_radius` of the observer. Every other candidate is reduced to
//! its public view, in which position and army are absent rather than
//! obfuscated.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::entity::{ArmySummary, ClanRef, Entity, EntityId, MovementStateKind, Platform};
use crate::movement::MovementEngine;

/// Attributes every observer may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicEntityView {
    /// Entity id
    pub id: EntityId,
    /// Platform of the owning account
    pub platform: Platform,
    /// Account id on that platform
    pub platform_user_id: String,
    /// Display name
    pub name: String,
    /// Clan, if affiliated
    pub clan: Option<ClanRef>,
}

impl From<&Entity> for PublicEntityView {
    fn from(entity: &Entity) -> Self {
        let profile = entity.profile();
        Self {
            id: entity.id(),
            platform: profile.platform,
            platform_user_id: profile.platform_user_id.clone(),
            name: profile.name.clone(),
            clan: entity.clan().cloned(),
        }
    }
}

/// Full entity state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateEntityView {
    /// Public attributes
    #[serde(flatten)]
    pub public: PublicEntityView,
    /// Exact position
    pub position: Vec2,
    /// Army summary
    pub army: ArmySummary,
    /// Movement state
    pub state: MovementStateKind,
    /// Destination of the active order
    pub destination: Option<Vec2>,
    /// Ticks until arrival at the current time step
    pub eta_ticks: Option<u64>,
    /// Last committed version
    pub version: u64,
}

impl PrivateEntityView {
    /// Builds the full view of an entity.
    #[must_use]
    pub fn of(entity: &Entity, time_step: f32) -> Self {
        Self {
            public: PublicEntityView::from(entity),
            position: entity.position(),
            army: entity.army(),
            state: entity.state().kind(),
            destination: entity.travel_order().map(|order| order.destination),
            eta_ticks: MovementEngine::ticks_to_arrival(entity, time_step),
            version: entity.version(),
        }
    }
}

/// What an observer sees of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum EntityView {
    /// Self, clanmate or within visibility range
    Private(PrivateEntityView),
    /// Everyone else
    Public(PublicEntityView),
}

impl EntityView {
    /// Id of the viewed entity.
    #[must_use]
    pub fn id(&self) -> EntityId {
        match self {
            Self::Private(view) => view.public.id,
            Self::Public(view) => view.id,
        }
    }

    /// True for the private view.
    #[must_use]
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }

    /// Exact position, if disclosed.
    #[must_use]
    pub fn position(&self) -> Option<Vec2> {
        match self {
            Self::Private(view) => Some(view.position),
            Self::Public(_) => None,
        }
    }

    /// Army summary, if disclosed.
    #[must_use]
    pub fn army(&self) -> Option<ArmySummary> {
        match self {
            Self::Private(view) => Some(view.army),
            Self::Public(_) => None,
        }
    }
}

/// Observer-relative disclosure rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityFilter {
    radius: f32,
    time_step: f32,
}

impl VisibilityFilter {
    /// Creates a filter with the given visibility radius.
    ///
    /// `time_step` is only used to estimate arrival in private views.
    #[must_use]
    pub fn new(radius: f32, time_step: f32) -> Self {
        Self { radius, time_step }
    }

    /// Visibility radius.
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// True if `observer` may see `candidate`'s private attributes.
    #[must_use]
    pub fn discloses(&self, observer: &Entity, candidate: &Entity) -> bool {
        if observer.id() == candidate.id() {
            return true;
        }
        if let (Some(a), Some(b)) = (observer.clan_id(), candidate.clan_id()) {
            if a == b {
                return true;
            }
        }
        observer.position().distance_squared(candidate.position()) <= self.radius * self.radius
    }

    /// View of one candidate.
    #[must_use]
    pub fn view(&self, observer: &Entity, candidate: &Entity) -> EntityView {
        if self.discloses(observer, candidate) {
            EntityView::Private(PrivateEntityView::of(candidate, self.time_step))
        } else {
            EntityView::Public(PublicEntityView::from(candidate))
        }
    }

    /// Views of every candidate, in candidate order. Archived candidates are
    /// left out.
    pub fn resolve_view<'a>(
        &self,
        observer: &Entity,
        candidates: impl IntoIterator<Item = &'a Entity>,
    ) -> Vec<EntityView> {
        candidates
            .into_iter()
            .filter(|candidate| !candidate.is_archived())
            .map(|candidate| self.view(observer, candidate))
            .collect()
    }
}
