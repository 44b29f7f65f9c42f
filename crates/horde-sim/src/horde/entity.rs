//! One member of a horde cluster.

use std::fmt;

use glam::Vec3;
use horde_world::entity::{EntityClassId, EntityId};
use serde::Serialize;

/// Tracker-assigned id of a cluster member. Survives despawn and respawn,
/// unlike the live [`EntityId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClusterEntityId(pub u64);

impl fmt::Display for ClusterEntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member#{}", self.0)
    }
}

/// A horde member that is either live (has a handle) or remembered by class
/// and last known location.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterEntity {
    id: ClusterEntityId,
    class: EntityClassId,
    handle: Option<EntityId>,
    location: Vec3,
    awaiting_state_change: bool,
}

impl ClusterEntity {
    /// A member that was just spawned as `handle`.
    pub fn spawned(id: ClusterEntityId, class: EntityClassId, handle: EntityId, location: Vec3) -> Self {
        Self {
            id,
            class,
            handle: Some(handle),
            location,
            awaiting_state_change: false,
        }
    }

    pub fn id(&self) -> ClusterEntityId {
        self.id
    }

    pub fn class(&self) -> EntityClassId {
        self.class
    }

    /// Live handle, present iff spawned.
    pub fn handle(&self) -> Option<EntityId> {
        self.handle
    }

    pub fn is_spawned(&self) -> bool {
        self.handle.is_some()
    }

    pub fn location(&self) -> Vec3 {
        self.location
    }

    pub fn set_location(&mut self, location: Vec3) {
        self.location = location;
    }

    /// `true` while a spawn or despawn request for this member is in flight.
    pub fn is_awaiting_state_change(&self) -> bool {
        self.awaiting_state_change
    }

    pub fn mark_awaiting_state_change(&mut self) {
        self.awaiting_state_change = true;
    }

    /// A respawn finished; `None` means it failed and the member stays
    /// unspawned.
    pub fn on_respawned(&mut self, handle: Option<EntityId>, location: Vec3) {
        self.handle = handle;
        self.location = location;
        self.awaiting_state_change = false;
    }

    /// The live entity was removed; remember where it stood.
    pub fn on_despawned(&mut self, location: Option<Vec3>) {
        if let Some(location) = location {
            self.location = location;
        }
        self.handle = None;
        self.awaiting_state_change = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn despawn_then_respawn_cycle() {
        let mut e = ClusterEntity::spawned(ClusterEntityId(1), EntityClassId(3), EntityId::new(0, 0), Vec3::ZERO);
        assert!(e.is_spawned());
        e.mark_awaiting_state_change();
        e.on_despawned(Some(Vec3::new(4.0, 0.0, 0.0)));
        assert!(!e.is_spawned());
        assert!(!e.is_awaiting_state_change());
        assert_eq!(e.location().x, 4.0);

        e.mark_awaiting_state_change();
        e.on_respawned(Some(EntityId::new(1, 0)), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(e.handle(), Some(EntityId::new(1, 0)));
    }

    #[test]
    fn failed_respawn_stays_unspawned() {
        let mut e = ClusterEntity::spawned(ClusterEntityId(1), EntityClassId(3), EntityId::new(0, 0), Vec3::ZERO);
        e.on_despawned(None);
        e.mark_awaiting_state_change();
        e.on_respawned(None, Vec3::ZERO);
        assert!(!e.is_spawned());
        assert!(!e.is_awaiting_state_change());
    }
}
