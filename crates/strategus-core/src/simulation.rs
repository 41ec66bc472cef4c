//! The world tick.
//!
//! [`Simulation::step`] executes one tick of the strategic layer:
//!
//! 1. **SNAPSHOT**: Take the latest committed snapshot; it stays frozen for
//!    the movement phase
//! 2. **MOVEMENT**: Advance every moving entity in parallel (pure)
//! 3. **COMMIT**: Save each advanced entity against the version it was read
//!    at. A conflict skips that entity for this tick and reloads it; other
//!    entities are unaffected
//! 4. **INDEX**: Publish committed records to the snapshot and spatial index
//! 5. **DETECTION**: Find hostile pairs and commit each pair atomically
//! 6. **HANDOFF**: Pass new encounters to the battle subsystem
//! 7. **PUBLISH**: Advance the tick counter
//!
//! A tick never fails as a whole. Per-entity failures are logged, counted in
//! the [`TickReport`] and retried naturally on the next tick.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use std::sync::Arc;
//! use strategus_core::battle::LoggingBattleSink;
//! use strategus_core::clan::StaticClanDirectory;
//! use strategus_core::config::WorldConfig;
//! use strategus_core::simulation::Simulation;
//! use strategus_core::store::InMemoryStore;
//! use strategus_core::world::{Collaborators, World};
//!
//! let world = World::init(
//!     WorldConfig::default(),
//!     Collaborators {
//!         store: Arc::new(InMemoryStore::new()),
//!         clans: Arc::new(StaticClanDirectory::new()),
//!         battles: Arc::new(LoggingBattleSink),
//!     },
//! )
//! .await
//! .unwrap();
//!
//! let mut sim = Simulation::new(Arc::clone(&world));
//! let report = sim.step().await;
//! assert_eq!(report.tick, 1);
//! assert_eq!(world.snapshot().tick(), 1);
//! # });
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::encounter::{Encounter, EncounterDetector, EncounterLedger, PairCandidate};
use crate::entity::{EncounterId, Entity, EntityId};
use crate::error::{StoreError, StrategusError};
use crate::movement::{moved_ids, MoveOutcome, MovementEngine};
use crate::store::VersionedWrite;
use crate::world::{World, WorldSnapshot};

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Tick number
    pub tick: u64,
    /// Entities whose position changed
    pub moved: usize,
    /// Entities that reached their destination
    pub arrived: usize,
    /// Writes rejected for a stale version
    pub conflicts: usize,
    /// Writes that failed for another reason
    pub failures: usize,
    /// Encounters committed this tick
    pub encounters: Vec<EncounterId>,
    /// Entities carried over by the tie-break
    pub deferred: usize,
    /// Wall-clock time spent
    pub duration: Duration,
}

impl TickReport {
    fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }
}

/// Tick pipeline over a shared [`World`].
///
/// Owns the canonical tick counter and the detector's carry-over state. Only
/// one `Simulation` should drive a world; the clock enforces that by owning
/// it inside its single tick task.
#[derive(Debug)]
pub struct Simulation {
    world: Arc<World>,
    detector: EncounterDetector,
    tick: u64,
}

impl Simulation {
    /// Creates a pipeline resuming from the world's last published tick.
    #[must_use]
    pub fn new(world: Arc<World>) -> Self {
        let detector = EncounterDetector::new(world.config().encounter_radius);
        let tick = world.snapshot().tick();
        Self { world, detector, tick }
    }

    /// Last completed tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The world this pipeline drives.
    #[must_use]
    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Encounter detector state.
    #[must_use]
    pub fn detector(&self) -> &EncounterDetector {
        &self.detector
    }

    /// Executes one tick with the configured time step.
    pub async fn step(&mut self) -> TickReport {
        let elapsed = self.world.config().time_step;
        self.step_by(elapsed).await
    }

    /// Executes one tick advancing `elapsed` simulation time units.
    pub async fn step_by(&mut self, elapsed: f32) -> TickReport {
        let started = Instant::now();
        let tick = self.tick + 1;
        let mut report = TickReport::new(tick);
        tracing::debug!(tick, elapsed, "tick started");

        // PHASE 1-2: SNAPSHOT + MOVEMENT
        let snapshot = self.world.snapshot();
        let advanced = MovementEngine::advance_all(snapshot.active(), elapsed);
        let movers = moved_ids(&advanced);

        // PHASE 3: COMMIT
        let mut committed = Vec::with_capacity(advanced.len());
        for (entity, outcome) in advanced {
            if outcome == MoveOutcome::Stationary {
                continue;
            }
            if let Some(entity) = self.commit_move(entity, tick, &mut report).await {
                report.moved += usize::from(outcome.moved());
                report.arrived += usize::from(outcome.arrived());
                committed.push(entity);
            }
        }

        // PHASE 4: INDEX
        let seeds: Vec<EntityId> = committed
            .iter()
            .map(Entity::id)
            .filter(|id| movers.contains(id))
            .collect();
        self.world.apply(committed);

        // PHASE 5: DETECTION
        let created = self.detect(&seeds, tick, &mut report).await;

        // PHASE 6: HANDOFF
        for encounter in &created {
            if let Err(err) = self.world.battles().begin(encounter.clone()).await {
                tracing::warn!(encounter = %encounter.id(), error = %err, "battle hand-off failed; encounter stays pending");
            }
        }
        report.encounters = created.iter().map(Encounter::id).collect();

        // PHASE 7: PUBLISH
        self.world.publish_tick(tick);
        self.tick = tick;
        report.duration = started.elapsed();

        tracing::debug!(
            tick,
            moved = report.moved,
            arrived = report.arrived,
            conflicts = report.conflicts,
            encounters = report.encounters.len(),
            duration = ?report.duration,
            "tick complete"
        );
        report
    }

    async fn commit_move(&self, mut entity: Entity, tick: u64, report: &mut TickReport) -> Option<Entity> {
        let id = entity.id();
        let expected = entity.version();
        entity.touch(tick);

        match self.world.store().save(&entity, expected).await {
            Ok(version) => {
                entity.set_version(version);
                Some(entity)
            }
            Err(StoreError::Conflict { actual, .. }) => {
                report.conflicts += 1;
                tracing::warn!(entity = %id, expected, actual, tick, "movement write conflicted; skipping entity this tick");
                self.catch_up(id).await;
                None
            }
            Err(err) => {
                report.failures += 1;
                tracing::error!(entity = %id, error = %err, tick, "movement write failed");
                None
            }
        }
    }

    async fn detect(&mut self, moved: &[EntityId], tick: u64, report: &mut TickReport) -> Vec<Encounter> {
        let mut ledger = self.world.encounters().lock().await;
        let snapshot = self.world.snapshot();
        let hostility = self.world.hostility();

        let detection = self
            .detector
            .detect(moved, &snapshot, self.world.index(), &hostility, &ledger);
        report.deferred = detection.deferred.len();

        let mut created = Vec::with_capacity(detection.selected.len());
        for pair in detection.selected {
            match self.commit_encounter(&mut ledger, &snapshot, pair, tick).await {
                Ok(encounter) => {
                    tracing::info!(
                        encounter = %encounter.id(),
                        a = %pair.a,
                        b = %pair.b,
                        distance = pair.distance,
                        tick,
                        "encounter triggered"
                    );
                    created.push(encounter);
                }
                Err(err) => {
                    if matches!(err, StrategusError::VersionConflict { .. }) {
                        report.conflicts += 1;
                    } else {
                        report.failures += 1;
                    }
                    tracing::warn!(a = %pair.a, b = %pair.b, error = %err, tick, "encounter commit failed; pair stays eligible");
                    self.detector.defer(pair.a);
                    self.detector.defer(pair.b);
                    self.catch_up(pair.a).await;
                    self.catch_up(pair.b).await;
                }
            }
        }
        created
    }

    /// Commits both members of a pair as one atomic batch.
    async fn commit_encounter(
        &self,
        ledger: &mut EncounterLedger,
        snapshot: &WorldSnapshot,
        pair: PairCandidate,
        tick: u64,
    ) -> Result<Encounter, StrategusError> {
        let a = snapshot.get(pair.a).ok_or(StrategusError::EntityNotFound(pair.a))?;
        let b = snapshot.get(pair.b).ok_or(StrategusError::EntityNotFound(pair.b))?;

        let id = ledger.allocate_id();
        let position = (a.position() + b.position()) * 0.5;
        let writes: Vec<VersionedWrite> = [a, b]
            .into_iter()
            .map(|member| {
                let mut next = member.clone();
                next.enter_encounter(id);
                next.touch(tick);
                VersionedWrite::from_current(next)
            })
            .collect();

        let versions = self.world.store().save_batch(&writes).await?;
        let committed: Vec<Entity> = writes
            .into_iter()
            .zip(versions)
            .map(|(write, version)| {
                let mut entity = write.entity;
                entity.set_version(version);
                entity
            })
            .collect();

        let encounter = Encounter::new(id, pair.a, pair.b, tick, position);
        if !ledger.insert(encounter.clone()) {
            tracing::error!(encounter = %id, "ledger refused an encounter whose members were free at detection");
        }
        self.world.apply(committed);
        Ok(encounter)
    }

    async fn catch_up(&self, id: EntityId) {
        if let Err(err) = self.world.reload(id).await {
            tracing::warn!(entity = %id, error = %err, "failed to reload entity after conflict");
        }
    }
}
