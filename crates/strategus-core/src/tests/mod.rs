//! Cross-module tests for the world pipeline.
//!
//! - `determinism.rs`: identical inputs produce identical trajectories
//! - `integration.rs`: end-to-end tick, service and port behavior
//! - `helpers.rs`: world and entity factories

mod helpers;
mod integration;

pub use helpers::*;
