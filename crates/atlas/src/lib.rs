//! # Atlas
//!
//! Uniform-grid spatial substrate for strategic world maps.
//!
//! Atlas partitions a 2D coordinate space into square cells and keeps, for
//! every tracked key, its exact position and the cell it lives in. Radius
//! queries only visit the cells overlapping the query circle, so a query whose
//! radius is on the order of the cell size touches a constant number of cells
//! no matter how large the world is.
//!
//! - **[`Grid`]**: single-owner grid, mutated through `&mut self`
//! - **[`SpatialIndex`]**: shared grid safe for one writer and many readers;
//!   every read observes each key's position atomically
//! - **[`hash_grid`]**: deterministic digest of the grid contents
//!
//! ## Quick Start
//!
//! ```
//! use atlas::{Bounds, SpatialIndex};
//! use glam::Vec2;
//!
//! let index = SpatialIndex::new(Bounds::new(1000.0, 1000.0), 10.0).unwrap();
//! index.upsert(1_u64, Vec2::new(100.0, 100.0));
//! index.upsert(2_u64, Vec2::new(104.0, 100.0));
//! index.upsert(3_u64, Vec2::new(400.0, 100.0));
//!
//! let near = index.query_within(Vec2::new(100.0, 100.0), 5.0);
//! assert_eq!(near, vec![1, 2]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod grid;
pub mod hash;
pub mod index;
pub mod query;

pub use grid::{CellCoord, Grid};
pub use hash::hash_grid;
pub use index::SpatialIndex;
pub use query::{QueryStats, RadiusQuery};

use glam::Vec2;

/// Errors raised when constructing or feeding a grid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
    /// Cell size must be finite and strictly positive.
    #[error("invalid cell size {0}")]
    InvalidCellSize(f32),
    /// Bounds must have a positive, finite extent on both axes.
    #[error("invalid bounds {min:?}..{max:?}")]
    InvalidBounds {
        /// Minimum corner
        min: Vec2,
        /// Maximum corner
        max: Vec2,
    },
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    /// Minimum corner
    pub min: Vec2,
    /// Maximum corner
    pub max: Vec2,
}

impl Bounds {
    /// Create bounds from dimensions, anchored at the origin.
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            min: Vec2::ZERO,
            max: Vec2::new(width, height),
        }
    }

    /// Create bounds from min/max corners.
    #[must_use]
    pub fn from_min_max(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Get the center of the bounds.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Get the size of the bounds.
    #[must_use]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Check that both corners are finite and the extent is positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max.x > self.min.x && self.max.y > self.min.y
    }

    /// Check if a point is inside the bounds (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Clamp a point into the bounds.
    #[must_use]
    pub fn clamp(&self, point: Vec2) -> Vec2 {
        point.clamp(self.min, self.max)
    }

    /// Check if this rectangle intersects a circle.
    #[must_use]
    pub fn intersects_circle(&self, center: Vec2, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        center.distance_squared(closest) <= radius * radius
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(1000.0, 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_contains() {
        let bounds = Bounds::new(10.0, 10.0);
        assert!(bounds.contains(Vec2::ZERO));
        assert!(bounds.contains(Vec2::new(10.0, 10.0)));
        assert!(!bounds.contains(Vec2::new(10.5, 0.0)));
        assert!(!bounds.contains(Vec2::new(-0.1, 5.0)));
    }

    #[test]
    fn test_bounds_validity() {
        assert!(Bounds::new(10.0, 10.0).is_valid());
        assert!(!Bounds::new(0.0, 10.0).is_valid());
        assert!(!Bounds::from_min_max(Vec2::new(5.0, 5.0), Vec2::new(1.0, 9.0)).is_valid());
        assert!(!Bounds::from_min_max(Vec2::ZERO, Vec2::new(f32::INFINITY, 1.0)).is_valid());
    }

    #[test]
    fn test_intersects_circle() {
        let bounds = Bounds::from_min_max(Vec2::new(10.0, 10.0), Vec2::new(20.0, 20.0));
        assert!(bounds.intersects_circle(Vec2::new(5.0, 15.0), 5.0));
        assert!(!bounds.intersects_circle(Vec2::new(5.0, 15.0), 4.9));
        assert!(bounds.intersects_circle(Vec2::new(15.0, 15.0), 0.1));
    }

    #[test]
    fn test_clamp() {
        let bounds = Bounds::new(10.0, 10.0);
        assert_eq!(bounds.clamp(Vec2::new(-3.0, 12.0)), Vec2::new(0.0, 10.0));
    }
}
