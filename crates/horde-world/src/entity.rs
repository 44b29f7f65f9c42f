//! Live-world entity handles.
//!
//! An [`EntityId`] names one concrete NPC owned by the live world. It uses the
//! arena key layout (`[generation: u32 | index: u32]`) so a handle kept by a
//! horde after its entity was removed is detected as stale rather than
//! resolving to an unrelated entity that recycled the slot.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::arena::{pack, ArenaKey};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Generational handle of a live-world entity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Construct from an index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self(pack(index, generation))
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl ArenaKey for EntityId {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self::new(index, generation)
    }

    fn index(self) -> u32 {
        EntityId::index(self)
    }

    fn generation(self) -> u32 {
        EntityId::generation(self)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityClassId
// ---------------------------------------------------------------------------

/// Identifies which kind of NPC the live world should instantiate.
///
/// The numbering belongs to the host; the simulation only passes it through
/// from a horde kind's generator to [`EntitySpawner::spawn_at`].
///
/// [`EntitySpawner::spawn_at`]: crate::live::EntitySpawner::spawn_at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityClassId(pub u32);

impl fmt::Display for EntityClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_round_trips_parts() {
        let id = EntityId::new(7, 3);
        assert_eq!(id.index(), 7);
        assert_eq!(id.generation(), 3);
        assert_eq!(EntityId::from_raw(id.to_raw()), id);
    }

    #[test]
    fn debug_shows_generation() {
        assert_eq!(format!("{:?}", EntityId::new(2, 5)), "EntityId(2v5)");
        assert_eq!(EntityId::new(2, 5).to_string(), "2v5");
    }

    #[test]
    fn ordering_follows_raw_value() {
        // Same index, later generation sorts after.
        assert!(EntityId::new(1, 0) < EntityId::new(1, 1));
    }
}
