//! Grid hashing for determinism verification.
//!
//! Two grids holding the same keys at bit-identical positions produce the
//! same digest, regardless of insertion order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::grid::Grid;

/// Compute a deterministic hash of grid contents.
///
/// Entries are visited in key order and positions are hashed as raw bits to
/// avoid float comparison issues.
#[must_use]
pub fn hash_grid<K>(grid: &Grid<K>) -> u64
where
    K: Copy + Eq + Hash + Ord,
{
    let mut hasher = DefaultHasher::new();

    grid.cell_size().to_bits().hash(&mut hasher);
    let bounds = grid.bounds();
    bounds.min.x.to_bits().hash(&mut hasher);
    bounds.min.y.to_bits().hash(&mut hasher);
    bounds.max.x.to_bits().hash(&mut hasher);
    bounds.max.y.to_bits().hash(&mut hasher);

    for (key, position) in grid.entries_sorted() {
        key.hash(&mut hasher);
        position.x.to_bits().hash(&mut hasher);
        position.y.to_bits().hash(&mut hasher);
    }

    hasher.finish()
}
