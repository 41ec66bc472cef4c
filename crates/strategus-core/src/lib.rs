//! # Strategus Core
//!
//! Persistent strategic-layer world simulation for Strategus.
//!
//! This crate keeps the authoritative position and movement state of every
//! player army on the strategic map, advances it on a coarse fixed tick,
//! filters what each player may see of the others, and detects when hostile
//! armies converge into an encounter.
//!
//! ## Architecture
//!
//! - **Entities**: versioned army records ([`entity`])
//! - **Tick**: movement, spatial index update and encounter detection
//!   ([`simulation`]), driven by the [`clock`]
//! - **Reads**: fog-of-war views resolved on demand ([`visibility`])
//! - **Ports**: persistence ([`store`]), clans ([`clan`]) and the battle
//!   subsystem ([`battle`])
//!
//! Spatial queries are served by the [`atlas`] uniform grid.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strategus_core::{World, WorldClock, WorldConfig, WorldService};
//!
//! let world = World::init(WorldConfig::default(), collaborators).await?;
//! let mut clock = WorldClock::new(Arc::clone(&world));
//! clock.start()?;
//!
//! let service = WorldService::new(world);
//! service.issue_travel_order(army, Vec2::new(250.0, 80.0), 6.0).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export atlas for spatial queries
pub use atlas;

pub mod battle;
pub mod clan;
pub mod clock;
pub mod config;
pub mod encounter;
pub mod entity;
pub mod error;
pub mod movement;
pub mod service;
pub mod simulation;
pub mod store;
pub mod visibility;
pub mod world;

pub use clock::{ClockState, WorldClock};
pub use config::WorldConfig;
pub use error::StrategusError;
pub use service::WorldService;
pub use simulation::{Simulation, TickReport};
pub use world::{Collaborators, World};

#[cfg(test)]
mod tests;
