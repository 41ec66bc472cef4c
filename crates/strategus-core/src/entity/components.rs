//! Descriptive attributes attached to strategic-layer entities.
//!
//! These are the pieces of an entity that the simulation carries but never
//! computes: who owns it, how it is displayed, what army it fields and which
//! clan it belongs to. They are supplied by collaborating subsystems.

use serde::{Deserialize, Serialize};

use super::ClanId;

/// Platform the owning account signed in from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// Steam account
    Steam,
    /// Epic Games account
    EpicGames,
    /// Microsoft account
    Microsoft,
}

/// Public display attributes of the owning account.
///
/// Always disclosed, even in the fog-of-war view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Platform of the account
    pub platform: Platform,
    /// Account identifier on that platform
    pub platform_user_id: String,
    /// Display name
    pub name: String,
}

impl Profile {
    /// Creates a profile.
    #[must_use]
    pub fn new(platform: Platform, platform_user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            platform,
            platform_user_id: platform_user_id.into(),
            name: name.into(),
        }
    }
}

/// Summary of the army an entity fields.
///
/// Disclosed only to observers allowed to see the entity's private view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmySummary {
    /// Number of troops
    pub troops: u32,
    /// Aggregate fighting strength
    pub strength: f32,
}

impl ArmySummary {
    /// Creates an army summary.
    #[must_use]
    pub const fn new(troops: u32, strength: f32) -> Self {
        Self { troops, strength }
    }
}

/// Reference to a clan owned by the clan subsystem.
///
/// Carries the opaque id plus the public attributes shown next to a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClanRef {
    /// Clan identifier
    pub id: ClanId,
    /// Short tag
    pub tag: String,
    /// Full name
    pub name: String,
}

impl ClanRef {
    /// Creates a clan reference.
    #[must_use]
    pub fn new(id: ClanId, tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            name: name.into(),
        }
    }
}
