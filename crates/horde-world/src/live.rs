//! The boundary to the authoritative live world.
//!
//! Everything behind these traits (creating, removing, steering and querying
//! concrete entities) may only be touched from the one thread that owns the
//! live world. The simulation enforces this by only ever handing out
//! `&mut dyn LiveWorld` inside the request processor's update.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::entity::{EntityClassId, EntityId};
use crate::player::PlayerSnapshot;
use crate::WorldError;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// What the live world currently knows about an entity handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liveness {
    /// Present and alive.
    Alive,
    /// Present but killed; the host has not removed the body yet.
    Dead,
    /// Unknown or already removed (including removals we requested).
    Missing,
}

/// Population bucket a horde kind draws its entity cap from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PopulationCategory {
    Enemy,
    Animal,
}

/// Alive count against the host's configured maximum for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PopulationCount {
    pub alive: usize,
    pub max: usize,
}

impl PopulationCount {
    /// `true` when no further entity of this category may be spawned.
    pub fn is_full(&self) -> bool {
        self.alive >= self.max
    }
}

// ---------------------------------------------------------------------------
// EntitySpawner
// ---------------------------------------------------------------------------

/// Creates concrete entities. Invoked only from the live-world thread.
pub trait EntitySpawner {
    /// Instantiate an entity of `class` at `position`.
    fn spawn_at(&mut self, class: EntityClassId, position: Vec3) -> Result<EntityId, WorldError>;
}

// ---------------------------------------------------------------------------
// LiveWorld
// ---------------------------------------------------------------------------

/// Full live-world surface used by horde requests and entity AI.
pub trait LiveWorld: EntitySpawner {
    /// Remove an entity. Removing an unknown handle is an error the caller
    /// may ignore.
    fn despawn(&mut self, entity: EntityId) -> Result<(), WorldError>;

    fn liveness(&self, entity: EntityId) -> Liveness;

    fn position(&self, entity: EntityId) -> Option<Vec3>;

    /// Ask the entity to path toward `target`.
    fn move_to(&mut self, entity: EntityId, target: Vec3, can_run: bool);

    fn stop(&mut self, entity: EntityId);

    fn is_moving(&self, entity: EntityId) -> bool;

    /// `true` while the entity is engaged with a player and should not be
    /// steered by horde objectives.
    fn has_player_target(&self, entity: EntityId) -> bool;

    fn set_sleeping(&mut self, entity: EntityId, sleeping: bool);

    fn is_sleeping(&self, entity: EntityId) -> bool;

    /// Find a valid spawn position within `spread` of `near`.
    fn find_spawn_position(&self, near: Vec3, spread: f32) -> Option<Vec3>;

    fn population(&self, category: PopulationCategory) -> PopulationCount;

    /// Capture all connected players.
    fn players(&self) -> Vec<PlayerSnapshot>;

    fn is_daytime(&self) -> bool;

    /// Monotonic world time in seconds.
    fn world_time(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_full_at_cap() {
        assert!(!PopulationCount { alive: 3, max: 4 }.is_full());
        assert!(PopulationCount { alive: 4, max: 4 }.is_full());
        assert!(PopulationCount::default().is_full());
    }
}
