//! Per-tick player captures.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a connected player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// Immutable capture of one player, taken once per tick on the live thread.
///
/// Background workers only ever see players through these snapshots; they
/// never read the live world directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub location: Vec3,
    /// Progression level used by horde kinds to scale what they generate.
    pub gamestage: u32,
    /// Biome the player is standing in, if the host knows it.
    pub biome: Option<String>,
}

impl PlayerSnapshot {
    pub fn new(id: PlayerId, location: Vec3, gamestage: u32) -> Self {
        Self {
            id,
            location,
            gamestage,
            biome: None,
        }
    }

    /// Builder-style biome setter.
    pub fn in_biome(mut self, biome: impl Into<String>) -> Self {
        self.biome = Some(biome.into());
        self
    }
}
