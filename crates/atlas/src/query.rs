//! Query interface for Atlas.
//!
//! Radius queries return the keys whose exact position lies inside a circle,
//! together with counters describing how much of the grid was touched.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::Bounds;

/// Circular region query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusQuery {
    /// Center of query region
    pub center: Vec2,
    /// Radius of query circle (inclusive)
    pub radius: f32,
}

impl RadiusQuery {
    /// Create a new radius query.
    #[must_use]
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Get the bounding box of this query.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds::from_min_max(
            self.center - Vec2::splat(self.radius),
            self.center + Vec2::splat(self.radius),
        )
    }

    /// Check whether a point satisfies the query.
    ///
    /// The comparison is done on squared distances, so the boundary is
    /// inclusive: a point exactly `radius` away matches.
    #[must_use]
    pub fn matches(&self, point: Vec2) -> bool {
        self.center.distance_squared(point) <= self.radius * self.radius
    }

    /// A query with a negative or non-finite radius can never match.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !self.center.is_finite() || !self.radius.is_finite() || self.radius < 0.0
    }
}

/// Counters gathered while answering a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    /// Number of grid cells inspected
    pub cells_visited: u32,
    /// Number of stored positions distance-checked
    pub candidates_checked: u32,
    /// Number of keys returned
    pub matches: u32,
}
