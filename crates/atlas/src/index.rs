//! Shared spatial index.
//!
//! [`SpatialIndex`] wraps a [`Grid`] behind a reader-writer lock so a single
//! writer (the world tick) can move keys while any number of readers run
//! proximity queries. Every upsert swaps a key's position and cell membership
//! under the write lock, so a reader never sees a key half-moved.

use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::Vec2;

use crate::grid::Grid;
use crate::query::{QueryStats, RadiusQuery};
use crate::{Bounds, IndexError};

/// Thread-safe uniform-grid spatial index.
#[derive(Debug)]
pub struct SpatialIndex<K> {
    grid: RwLock<Grid<K>>,
}

impl<K> SpatialIndex<K>
where
    K: Copy + Eq + Hash + Ord,
{
    /// Create an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] for an invalid cell size or empty bounds.
    pub fn new(bounds: Bounds, cell_size: f32) -> Result<Self, IndexError> {
        Ok(Self {
            grid: RwLock::new(Grid::new(bounds, cell_size)?),
        })
    }

    // A panic while holding the lock cannot leave a slot half-written (each
    // mutation is a pair of map operations on owned data), so poisoning is
    // ignored rather than propagated.
    fn read(&self) -> RwLockReadGuard<'_, Grid<K>> {
        self.grid.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Grid<K>> {
        self.grid.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or move a key.
    pub fn upsert(&self, key: K, position: Vec2) -> Option<Vec2> {
        self.write().upsert(key, position)
    }

    /// Apply many moves under a single write lock.
    pub fn upsert_many<I>(&self, moves: I)
    where
        I: IntoIterator<Item = (K, Vec2)>,
    {
        let mut grid = self.write();
        for (key, position) in moves {
            grid.upsert(key, position);
        }
    }

    /// Remove a key.
    pub fn remove(&self, key: K) -> Option<Vec2> {
        self.write().remove(key)
    }

    /// Replace the whole contents.
    pub fn rebuild<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, Vec2)>,
    {
        let mut grid = self.write();
        grid.clear();
        for (key, position) in entries {
            grid.upsert(key, position);
        }
        tracing::debug!(
            keys = grid.len(),
            occupied_cells = grid.occupied_cells(),
            "spatial index rebuilt"
        );
    }

    /// Current position of a key.
    #[must_use]
    pub fn get(&self, key: K) -> Option<Vec2> {
        self.read().get(key)
    }

    /// Keys within `radius` of `center`, sorted ascending.
    #[must_use]
    pub fn query_within(&self, center: Vec2, radius: f32) -> Vec<K> {
        self.read().query_within(center, radius)
    }

    /// Keys within the query circle paired with their positions, read under
    /// one lock so the positions match the membership decision.
    #[must_use]
    pub fn query_positions(&self, query: &RadiusQuery) -> (Vec<(K, Vec2)>, QueryStats) {
        let grid = self.read();
        let (keys, stats) = grid.query(query);
        let located = keys
            .into_iter()
            .filter_map(|key| grid.get(key).map(|pos| (key, pos)))
            .collect();
        (located, stats)
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True if no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Run a closure against a consistent view of the grid.
    pub fn with_grid<R>(&self, f: impl FnOnce(&Grid<K>) -> R) -> R {
        f(&self.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;

    fn index() -> SpatialIndex<u64> {
        SpatialIndex::new(Bounds::new(1000.0, 1000.0), 10.0).unwrap()
    }

    #[test]
    fn upsert_remove_query() {
        let idx = index();
        idx.upsert(1, Vec2::new(10.0, 10.0));
        idx.upsert(2, Vec2::new(13.0, 14.0));
        assert_eq!(idx.query_within(Vec2::new(10.0, 10.0), 5.0), vec![1, 2]);

        idx.remove(2);
        assert_eq!(idx.query_within(Vec2::new(10.0, 10.0), 5.0), vec![1]);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn rebuild_replaces_contents() {
        let idx = index();
        idx.upsert(1, Vec2::ZERO);
        idx.rebuild([(5, Vec2::new(1.0, 1.0)), (6, Vec2::new(2.0, 2.0))]);
        assert_eq!(idx.get(1), None);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn query_positions_pairs_keys_with_positions() {
        let idx = index();
        idx.upsert_many([(1, Vec2::new(1.0, 0.0)), (2, Vec2::new(900.0, 0.0))]);
        let (found, stats) = idx.query_positions(&RadiusQuery::new(Vec2::ZERO, 2.0));
        assert_eq!(found, vec![(1, Vec2::new(1.0, 0.0))]);
        assert_eq!(stats.matches, 1);
    }

    #[test]
    fn concurrent_readers_never_see_torn_positions() {
        // The writer only ever stores points on the line y == x; a torn read
        // would surface a point off that line.
        let idx = Arc::new(index());
        idx.upsert(1, Vec2::new(0.0, 0.0));

        let writer = {
            let idx = Arc::clone(&idx);
            thread::spawn(move || {
                for step in 0..2_000_u16 {
                    let v = f32::from(step % 900);
                    idx.upsert(1, Vec2::new(v, v));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let idx = Arc::clone(&idx);
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let (found, _) =
                            idx.query_positions(&RadiusQuery::new(Vec2::new(450.0, 450.0), 1000.0));
                        for (_, pos) in found {
                            assert!((pos.x - pos.y).abs() < f32::EPSILON);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    proptest! {
        #[test]
        fn query_matches_brute_force(
            points in prop::collection::vec((0.0f32..500.0, 0.0f32..500.0), 0..64),
            cx in 0.0f32..500.0,
            cy in 0.0f32..500.0,
            radius in 0.0f32..80.0,
        ) {
            let idx = index();
            for (i, (x, y)) in points.iter().enumerate() {
                idx.upsert(i as u64, Vec2::new(*x, *y));
            }
            let center = Vec2::new(cx, cy);
            let expected: Vec<u64> = points
                .iter()
                .enumerate()
                .filter(|(_, (x, y))| center.distance_squared(Vec2::new(*x, *y)) <= radius * radius)
                .map(|(i, _)| i as u64)
                .collect();
            prop_assert_eq!(idx.query_within(center, radius), expected);
        }
    }
}
