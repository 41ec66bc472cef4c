//! World clock.
//!
//! [`WorldClock`] drives the [`Simulation`] on a fixed wall-clock cadence and
//! runs the clan relationship refresher next to it.
//!
//! ```text
//! Stopped --start--> Running --stop / force_stop--> Stopped
//! ```
//!
//! Ticks run one after another inside a single task, so two ticks never
//! overlap. A tick that overruns its interval is logged and the next one
//! starts right away; missed ticks are not queued up. [`WorldClock::stop`]
//! lets the in-flight tick finish. [`WorldClock::force_stop`] waits at most
//! `shutdown_grace_ms` and then abandons it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::ClockError;
use crate::simulation::Simulation;
use crate::world::World;

/// Lifecycle state of the clock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockState {
    /// No tick is scheduled
    Stopped,
    /// Ticking
    Running,
}

#[derive(Debug)]
struct RunningClock {
    cancel: CancellationToken,
    ticker: JoinHandle<Simulation>,
    refresher: JoinHandle<()>,
}

/// Owner of the tick loop.
#[derive(Debug)]
pub struct WorldClock {
    world: Arc<World>,
    idle: Option<Simulation>,
    running: Option<RunningClock>,
}

impl WorldClock {
    /// Creates a stopped clock over `world`.
    #[must_use]
    pub fn new(world: Arc<World>) -> Self {
        let simulation = Simulation::new(Arc::clone(&world));
        Self {
            world,
            idle: Some(simulation),
            running: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClockState {
        if self.running.is_some() {
            ClockState::Running
        } else {
            ClockState::Stopped
        }
    }

    /// Last completed tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.world.snapshot().tick()
    }

    /// Starts ticking.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if started twice, `StartupFailed` outside a tokio
    /// runtime.
    pub fn start(&mut self) -> Result<(), ClockError> {
        if self.running.is_some() {
            return Err(ClockError::AlreadyRunning);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| ClockError::StartupFailed(err.to_string()))?;

        let simulation = self
            .idle
            .take()
            .unwrap_or_else(|| Simulation::new(Arc::clone(&self.world)));
        let config = self.world.config();
        let cancel = CancellationToken::new();

        let ticker = runtime.spawn(run_ticks(simulation, config.tick_interval(), cancel.child_token()));
        let refresher = runtime.spawn(run_refresher(
            Arc::clone(&self.world),
            config.relationship_refresh(),
            cancel.child_token(),
        ));

        tracing::info!(
            tick = self.tick(),
            interval = ?config.tick_interval(),
            "world clock started"
        );
        self.running = Some(RunningClock {
            cancel,
            ticker,
            refresher,
        });
        Ok(())
    }

    /// Stops after the in-flight tick, if any, has finished. Returns the last
    /// completed tick.
    ///
    /// # Errors
    ///
    /// `NotRunning` if the clock is stopped.
    pub async fn stop(&mut self) -> Result<u64, ClockError> {
        let running = self.running.take().ok_or(ClockError::NotRunning)?;
        running.cancel.cancel();

        match running.ticker.await {
            Ok(simulation) => self.idle = Some(simulation),
            Err(err) => tracing::error!(error = %err, "tick task ended abnormally"),
        }
        if let Err(err) = running.refresher.await {
            tracing::warn!(error = %err, "relationship refresher ended abnormally");
        }

        let tick = self.tick();
        tracing::info!(tick, "world clock stopped");
        Ok(tick)
    }

    /// Stops, abandoning the in-flight tick if it does not finish within the
    /// configured grace period. Returns the last completed tick.
    ///
    /// An abandoned tick may have committed part of its writes; every commit
    /// is versioned, so the next tick resumes from the store's state.
    ///
    /// # Errors
    ///
    /// `NotRunning` if the clock is stopped.
    pub async fn force_stop(&mut self) -> Result<u64, ClockError> {
        let mut running = self.running.take().ok_or(ClockError::NotRunning)?;
        running.cancel.cancel();
        running.refresher.abort();

        let grace = self.world.config().shutdown_grace();
        match tokio::time::timeout(grace, &mut running.ticker).await {
            Ok(Ok(simulation)) => self.idle = Some(simulation),
            Ok(Err(err)) => tracing::error!(error = %err, "tick task ended abnormally"),
            Err(_) => {
                tracing::warn!(grace = ?grace, "in-flight tick abandoned after grace period");
                running.ticker.abort();
            }
        }

        let tick = self.tick();
        tracing::info!(tick, "world clock force-stopped");
        Ok(tick)
    }
}

async fn run_ticks(mut simulation: Simulation, interval: Duration, cancel: CancellationToken) -> Simulation {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the world ticks one interval after start.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        let report = simulation.step().await;
        let took = started.elapsed();
        if took > interval {
            tracing::warn!(
                tick = report.tick,
                took = ?took,
                interval = ?interval,
                "tick overran its interval"
            );
        }
    }

    simulation
}

async fn run_refresher(world: Arc<World>, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        // A refresh holds no lock across awaits, so it can be abandoned midway.
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            failures = world.refresh_relationships() => {
                if failures > 0 {
                    tracing::debug!(failures, "relationship refresh incomplete; keeping last-known values");
                }
            }
        }
    }
}
