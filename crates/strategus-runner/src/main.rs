//! Strategus runner - hosts the strategic world with in-memory collaborators.

mod seed;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use strategus_core::battle::LoggingBattleSink;
use strategus_core::store::{EntityStore, InMemoryStore};
use strategus_core::{Collaborators, World, WorldClock};
use tracing_subscriber::EnvFilter;

/// Strategus - persistent strategic world simulation
#[derive(Parser, Debug)]
#[command(name = "strategus")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// World configuration (JSON); defaults apply to missing fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed entities for the in-memory store (JSON array)
    #[arg(short, long)]
    entities: Option<PathBuf>,

    /// Clan relations (JSON array of `{ a, b, relationship }`)
    #[arg(short, long)]
    relations: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = seed::load_config(args.config.as_deref())?;
    let entities = seed::load_entities(args.entities.as_deref())?;
    let relations = seed::load_relations(args.relations.as_deref())?;

    let store = Arc::new(InMemoryStore::new());
    for entity in &entities {
        store
            .create(entity)
            .await
            .with_context(|| format!("failed to seed entity {}", entity.id()))?;
    }
    let clans = seed::clan_directory(&entities, &relations);

    let world = World::init(
        config,
        Collaborators {
            store,
            clans: Arc::new(clans),
            battles: Arc::new(LoggingBattleSink),
        },
    )
    .await
    .context("failed to initialize world")?;

    let mut clock = WorldClock::new(Arc::clone(&world));
    clock.start()?;

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");

    // Waits for the in-flight tick up to the configured grace period.
    let stopped = clock.force_stop().await?;

    world.teardown().await;
    tracing::info!(tick = stopped, "world shut down");
    Ok(())
}
