//! Uniform grid storage.
//!
//! The grid maps every key to its exact position and buckets keys by the cell
//! containing that position. Cells are allocated lazily: empty space costs
//! nothing, and a cell's bucket is dropped as soon as its last key leaves.

use std::collections::HashMap;
use std::hash::Hash;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::query::{QueryStats, RadiusQuery};
use crate::{Bounds, IndexError};

/// Integer coordinate of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellCoord {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
}

impl CellCoord {
    /// Create a cell coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    position: Vec2,
    cell: CellCoord,
}

/// Single-owner uniform grid.
///
/// Positions outside the configured bounds are still accepted; the bounds only
/// anchor the cell lattice. Keys are returned from queries in ascending order
/// so callers iterating the result stay deterministic.
#[derive(Debug, Clone)]
pub struct Grid<K> {
    bounds: Bounds,
    cell_size: f32,
    inv_cell_size: f32,
    slots: HashMap<K, Slot>,
    cells: HashMap<CellCoord, Vec<K>>,
}

impl<K> Grid<K>
where
    K: Copy + Eq + Hash + Ord,
{
    /// Create an empty grid.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the cell size is not finite and positive or
    /// the bounds are empty.
    pub fn new(bounds: Bounds, cell_size: f32) -> Result<Self, IndexError> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(IndexError::InvalidCellSize(cell_size));
        }
        if !bounds.is_valid() {
            return Err(IndexError::InvalidBounds {
                min: bounds.min,
                max: bounds.max,
            });
        }
        Ok(Self {
            bounds,
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            slots: HashMap::new(),
            cells: HashMap::new(),
        })
    }

    /// World bounds anchoring the lattice.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Edge length of one cell.
    #[must_use]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Cell containing a point.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn cell_of(&self, point: Vec2) -> CellCoord {
        let local = (point - self.bounds.min) * self.inv_cell_size;
        CellCoord::new(local.x.floor() as i32, local.y.floor() as i32)
    }

    /// Insert or move a key. Returns the previous position, if any.
    pub fn upsert(&mut self, key: K, position: Vec2) -> Option<Vec2> {
        let cell = self.cell_of(position);
        let previous = self.slots.insert(key, Slot { position, cell });

        if let Some(old) = previous {
            if old.cell == cell {
                return Some(old.position);
            }
            self.detach(key, old.cell);
        }
        self.cells.entry(cell).or_default().push(key);
        previous.map(|slot| slot.position)
    }

    /// Remove a key. Returns its last position, if it was present.
    pub fn remove(&mut self, key: K) -> Option<Vec2> {
        let slot = self.slots.remove(&key)?;
        self.detach(key, slot.cell);
        Some(slot.position)
    }

    fn detach(&mut self, key: K, cell: CellCoord) {
        if let Some(bucket) = self.cells.get_mut(&cell) {
            bucket.retain(|k| *k != key);
            if bucket.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    /// Current position of a key.
    #[must_use]
    pub fn get(&self, key: K) -> Option<Vec2> {
        self.slots.get(&key).map(|slot| slot.position)
    }

    /// Whether a key is tracked.
    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.slots.contains_key(&key)
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of allocated (non-empty) cells.
    #[must_use]
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Remove every key.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.cells.clear();
    }

    /// All keys with their positions, sorted by key.
    #[must_use]
    pub fn entries_sorted(&self) -> Vec<(K, Vec2)> {
        let mut entries: Vec<_> = self
            .slots
            .iter()
            .map(|(key, slot)| (*key, slot.position))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Keys within `radius` of `center`, sorted ascending.
    #[must_use]
    pub fn query_within(&self, center: Vec2, radius: f32) -> Vec<K> {
        self.query(&RadiusQuery::new(center, radius)).0
    }

    /// Answer a radius query, returning matching keys (ascending) and stats.
    #[must_use]
    pub fn query(&self, query: &RadiusQuery) -> (Vec<K>, QueryStats) {
        let mut stats = QueryStats::default();
        if query.is_degenerate() || self.slots.is_empty() {
            return (Vec::new(), stats);
        }

        let area = query.bounds();
        let lo = self.cell_of(area.min);
        let hi = self.cell_of(area.max);
        let span = (i64::from(hi.x) - i64::from(lo.x) + 1) * (i64::from(hi.y) - i64::from(lo.y) + 1);

        let mut results = Vec::new();
        let mut visit = |bucket: &Vec<K>, stats: &mut QueryStats| {
            stats.cells_visited += 1;
            for key in bucket {
                stats.candidates_checked += 1;
                if let Some(slot) = self.slots.get(key) {
                    if query.matches(slot.position) {
                        results.push(*key);
                    }
                }
            }
        };

        // Huge radii would walk mostly empty cells; scan the occupied ones instead.
        #[allow(clippy::cast_possible_wrap)]
        if span > self.cells.len() as i64 {
            for (cell, bucket) in &self.cells {
                if (lo.x..=hi.x).contains(&cell.x) && (lo.y..=hi.y).contains(&cell.y) {
                    visit(bucket, &mut stats);
                }
            }
        } else {
            for x in lo.x..=hi.x {
                for y in lo.y..=hi.y {
                    if let Some(bucket) = self.cells.get(&CellCoord::new(x, y)) {
                        visit(bucket, &mut stats);
                    }
                }
            }
        }

        results.sort();
        #[allow(clippy::cast_possible_truncation)]
        {
            stats.matches = results.len() as u32;
        }
        (results, stats)
    }
}
