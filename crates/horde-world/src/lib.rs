//! Horde World -- the live-world boundary of the horde simulation.
//!
//! This crate holds everything the simulation needs to talk about the
//! authoritative world without owning it: generational handles and arena
//! storage, the [`LiveWorld`](live::LiveWorld) trait that only the live thread
//! may call, immutable player captures, seeded random streams and ground-plane
//! geometry. [`MemoryWorld`](memory::MemoryWorld) implements the trait in
//! memory for tests and headless runs.
//!
//! # Quick Start
//!
//! ```
//! use glam::Vec3;
//! use horde_world::prelude::*;
//!
//! let mut world = MemoryWorld::new();
//! world.upsert_player(PlayerSnapshot::new(PlayerId(1), Vec3::ZERO, 30));
//!
//! let zombie = world.spawn_at(EntityClassId(12), Vec3::new(40.0, 0.0, 0.0)).unwrap();
//! assert_eq!(world.liveness(zombie), Liveness::Alive);
//!
//! let players = world.players();
//! assert_eq!(distance_xz(players[0].location, world.position(zombie).unwrap()), 40.0);
//! ```

#![deny(unsafe_code)]

pub mod arena;
pub mod biome;
pub mod entity;
pub mod geometry;
pub mod live;
pub mod memory;
pub mod player;
pub mod random;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by live-world operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The entity does not exist (stale generation or already removed).
    #[error("entity {entity:?} does not exist (stale or already removed)")]
    StaleEntity { entity: entity::EntityId },

    /// The population bucket for this entity class is at its cap.
    #[error("population for {category:?} is full")]
    PopulationFull { category: live::PopulationCategory },

    /// The host refused to create an entity of this class.
    #[error("cannot spawn {class}: {reason}")]
    SpawnRejected {
        class: entity::EntityClassId,
        reason: String,
    },

    /// No player with this id is connected.
    #[error("{player} is not connected")]
    UnknownPlayer { player: player::PlayerId },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::arena::{Arena, ArenaKey};
    pub use crate::biome::{BiomeMap, RegionBiomeMap};
    pub use crate::entity::{EntityClassId, EntityId};
    pub use crate::geometry::{distance_xz, to_xz, ChunkPos, CHUNK_SIZE};
    pub use crate::live::{EntitySpawner, LiveWorld, Liveness, PopulationCategory, PopulationCount};
    pub use crate::memory::MemoryWorld;
    pub use crate::player::{PlayerId, PlayerSnapshot};
    pub use crate::random::{stable_seed, PcgRandomFactory, RandomFactory, WorldRandom};
    pub use crate::WorldError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use glam::Vec3;

    #[test]
    fn stale_handle_after_despawn_and_respawn() {
        let mut world = MemoryWorld::new();
        let first = world.spawn_at(EntityClassId(1), Vec3::ZERO).unwrap();
        world.despawn(first).unwrap();
        let second = world.spawn_at(EntityClassId(1), Vec3::ZERO).unwrap();

        assert_eq!(first.index(), second.index());
        assert_eq!(world.liveness(first), Liveness::Missing);
        assert_eq!(world.liveness(second), Liveness::Alive);
    }

    #[test]
    fn error_messages_name_the_subject() {
        let err = WorldError::StaleEntity {
            entity: EntityId::new(4, 2),
        };
        assert!(err.to_string().contains("EntityId(4v2)"));

        let err = WorldError::UnknownPlayer { player: PlayerId(7) };
        assert_eq!(err.to_string(), "player#7 is not connected");
    }

    #[test]
    fn seeded_spawn_offsets_are_reproducible() {
        let factory = PcgRandomFactory::new(11);
        let mut a = factory.create_random(stable_seed(&[1, 2, 3]));
        let mut b = factory.create_random(stable_seed(&[1, 2, 3]));
        for _ in 0..8 {
            assert_eq!(
                a.random_in_circle(Vec3::ZERO, 10.0),
                b.random_in_circle(Vec3::ZERO, 10.0)
            );
        }
    }
}
