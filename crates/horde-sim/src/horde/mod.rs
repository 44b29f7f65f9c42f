//! Hordes and their parts.
//!
//! A [`WorldHorde`](world_horde::WorldHorde) owns one or more
//! [`HordeCluster`](cluster::HordeCluster)s, each tagged with a
//! [`HordeKind`](kind::HordeKind). Clusters remember their members as
//! [`ClusterEntity`](entity::ClusterEntity) records whether or not they are
//! live. Everything that has to touch the live world is expressed as a
//! request from [`requests`].

use std::fmt;

use horde_world::arena::{pack, ArenaKey};

pub mod characteristics;
pub mod cluster;
pub mod entity;
pub mod group;
pub mod kind;
pub mod requests;
pub mod world_horde;

pub use characteristics::{HordeCharacteristics, Sensitivity, WalkSpeed};
pub use cluster::{ClusterDensity, ClusterId, HordeCluster, SpawnPoll, SpawnProgress, SpawnState};
pub use entity::{ClusterEntity, ClusterEntityId};
pub use group::{PlayerHordeGroup, SpawnConditions};
pub use kind::{ClassEntry, EntityGenerator, HordeKind, HordeKindId, HordeKindRegistry, UniformHordeKind};
pub use requests::{HordeEvent, PositionReport};
pub use world_horde::{HordeBlueprint, WorldHorde};

// ---------------------------------------------------------------------------
// HordeId
// ---------------------------------------------------------------------------

/// Generational key of a horde in the tracker's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HordeId(u64);

impl ArenaKey for HordeId {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self(pack(index, generation))
    }

    fn index(self) -> u32 {
        self.0 as u32
    }

    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl HordeId {
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for HordeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HordeId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for HordeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "horde#{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// IdAllocator
// ---------------------------------------------------------------------------

/// Monotonic ids for clusters and cluster members, owned by the tracker.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next_cluster: u64,
    next_member: u64,
}

impl IdAllocator {
    pub(crate) fn cluster(&mut self) -> ClusterId {
        self.next_cluster += 1;
        ClusterId(self.next_cluster)
    }

    pub(crate) fn member(&mut self) -> ClusterEntityId {
        self.next_member += 1;
        ClusterEntityId(self.next_member)
    }
}
