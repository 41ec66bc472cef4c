//! Loading of the runner's JSON inputs.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use strategus_core::clan::{Relationship, StaticClanDirectory};
use strategus_core::entity::{ClanId, Entity};
use strategus_core::WorldConfig;

/// A clan stance listed in the relations file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RelationEntry {
    pub a: ClanId,
    pub b: ClanId,
    pub relationship: Relationship,
}

/// Reads a configuration file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<WorldConfig> {
    let Some(path) = path else {
        return Ok(WorldConfig::default());
    };
    let config: WorldConfig = read_json(path)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Reads the seed entities, or none when no path is given.
pub fn load_entities(path: Option<&Path>) -> Result<Vec<Entity>> {
    path.map_or_else(|| Ok(Vec::new()), read_json)
}

/// Reads the clan relations, or none when no path is given.
pub fn load_relations(path: Option<&Path>) -> Result<Vec<RelationEntry>> {
    path.map_or_else(|| Ok(Vec::new()), read_json)
}

/// Clan directory holding every seed entity's membership and the listed
/// relations.
pub fn clan_directory(entities: &[Entity], relations: &[RelationEntry]) -> StaticClanDirectory {
    let directory = entities
        .iter()
        .filter_map(|entity| entity.clan().map(|clan| (entity.id(), clan.clone())))
        .fold(StaticClanDirectory::new(), |directory, (id, clan)| {
            directory.with_member(id, clan)
        });
    relations.iter().fold(directory, |directory, entry| {
        directory.with_relation(entry.a, entry.b, entry.relationship)
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}
