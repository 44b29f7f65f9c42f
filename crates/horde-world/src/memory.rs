//! In-memory [`LiveWorld`] used by tests, benchmarks and the demo.
//!
//! Entities are plain records in an [`Arena`]; `step` advances movement.
//! Nothing here pathfinds: an entity walks in a straight line toward its
//! move target at a fixed speed.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use horde_world::prelude::*;
//!
//! let mut world = MemoryWorld::new();
//! let id = world.spawn_at(EntityClassId(1), Vec3::ZERO).unwrap();
//! world.move_to(id, Vec3::new(10.0, 0.0, 0.0), false);
//! world.step(1.0);
//! assert!(world.position(id).unwrap().x > 0.0);
//!
//! world.kill(id);
//! assert_eq!(world.liveness(id), Liveness::Dead);
//! ```

use std::collections::HashMap;

use glam::Vec3;
use tracing::trace;

use crate::arena::Arena;
use crate::entity::{EntityClassId, EntityId};
use crate::geometry::step_toward;
use crate::live::{EntitySpawner, LiveWorld, Liveness, PopulationCategory, PopulationCount};
use crate::player::{PlayerId, PlayerSnapshot};
use crate::WorldError;

/// Walk speed applied by [`MemoryWorld::step`], in blocks per second.
pub const DEFAULT_MOVE_SPEED: f32 = 4.0;

#[derive(Debug, Clone)]
struct MemoryEntity {
    class: EntityClassId,
    category: PopulationCategory,
    position: Vec3,
    target: Option<Vec3>,
    running: bool,
    sleeping: bool,
    dead: bool,
    player_target: bool,
}

/// A deterministic live world held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryWorld {
    entities: Arena<EntityId, MemoryEntity>,
    players: Vec<PlayerSnapshot>,
    caps: HashMap<PopulationCategory, usize>,
    categories: HashMap<EntityClassId, PopulationCategory>,
    daytime: bool,
    time: f64,
    move_speed: f32,
    spawn_blocked: bool,
    spawned_total: u64,
    despawned_total: u64,
}

impl MemoryWorld {
    /// An empty world with generous population caps, daytime, time zero.
    pub fn new() -> Self {
        let mut caps = HashMap::new();
        caps.insert(PopulationCategory::Enemy, 1_000);
        caps.insert(PopulationCategory::Animal, 1_000);
        Self {
            entities: Arena::new(),
            players: Vec::new(),
            caps,
            categories: HashMap::new(),
            daytime: true,
            time: 0.0,
            move_speed: DEFAULT_MOVE_SPEED,
            spawn_blocked: false,
            spawned_total: 0,
            despawned_total: 0,
        }
    }

    // -- players -----------------------------------------------------------

    /// Add a player, or replace the one with the same id.
    pub fn upsert_player(&mut self, player: PlayerSnapshot) {
        match self.players.iter_mut().find(|p| p.id == player.id) {
            Some(existing) => *existing = player,
            None => self.players.push(player),
        }
    }

    pub fn move_player(&mut self, id: PlayerId, location: Vec3) -> Result<(), WorldError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(WorldError::UnknownPlayer { player: id })?;
        player.location = location;
        Ok(())
    }

    pub fn remove_player(&mut self, id: PlayerId) {
        self.players.retain(|p| p.id != id);
    }

    // -- knobs -------------------------------------------------------------

    pub fn set_population_cap(&mut self, category: PopulationCategory, max: usize) {
        self.caps.insert(category, max);
    }

    /// Count entities of `class` against `category` instead of `Enemy`.
    pub fn set_class_category(&mut self, class: EntityClassId, category: PopulationCategory) {
        self.categories.insert(class, category);
    }

    /// When set, [`find_spawn_position`](LiveWorld::find_spawn_position)
    /// fails everywhere.
    pub fn set_spawn_blocked(&mut self, blocked: bool) {
        self.spawn_blocked = blocked;
    }

    pub fn set_daytime(&mut self, daytime: bool) {
        self.daytime = daytime;
    }

    pub fn set_move_speed(&mut self, speed: f32) {
        self.move_speed = speed;
    }

    /// Mark an entity as engaged with a player.
    pub fn set_player_target(&mut self, entity: EntityId, engaged: bool) {
        if let Some(e) = self.entities.get_mut(entity) {
            e.player_target = engaged;
        }
    }

    /// Teleport an entity. Used by tests to place stragglers.
    pub fn set_position(&mut self, entity: EntityId, position: Vec3) {
        if let Some(e) = self.entities.get_mut(entity) {
            e.position = position;
        }
    }

    // -- simulation --------------------------------------------------------

    /// Kill an entity without removing it.
    pub fn kill(&mut self, entity: EntityId) -> bool {
        match self.entities.get_mut(entity) {
            Some(e) if !e.dead => {
                e.dead = true;
                e.target = None;
                true
            }
            _ => false,
        }
    }

    /// Advance time and move every walking entity toward its target.
    pub fn step(&mut self, dt: f32) {
        self.time += dt as f64;
        let speed = self.move_speed;
        for (_, e) in self.entities.iter_mut() {
            if e.dead || e.sleeping {
                continue;
            }
            if let Some(target) = e.target {
                let factor = if e.running { 2.0 } else { 1.0 };
                e.position = step_toward(e.position, target, speed * factor * dt);
                if e.position == target {
                    e.target = None;
                }
            }
        }
    }

    // -- inspection --------------------------------------------------------

    /// Entities currently present (alive or dead).
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn alive_count(&self) -> usize {
        self.entities.iter().filter(|(_, e)| !e.dead).count()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys()
    }

    pub fn class_of(&self, entity: EntityId) -> Option<EntityClassId> {
        self.entities.get(entity).map(|e| e.class)
    }

    pub fn spawned_total(&self) -> u64 {
        self.spawned_total
    }

    pub fn despawned_total(&self) -> u64 {
        self.despawned_total
    }
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitySpawner for MemoryWorld {
    fn spawn_at(&mut self, class: EntityClassId, position: Vec3) -> Result<EntityId, WorldError> {
        let category = self
            .categories
            .get(&class)
            .copied()
            .unwrap_or(PopulationCategory::Enemy);
        if self.population(category).is_full() {
            return Err(WorldError::PopulationFull { category });
        }
        let id = self.entities.insert(MemoryEntity {
            class,
            category,
            position,
            target: None,
            running: false,
            sleeping: false,
            dead: false,
            player_target: false,
        });
        self.spawned_total += 1;
        trace!(entity = ?id, %class, "memory world spawned entity");
        Ok(id)
    }
}

impl LiveWorld for MemoryWorld {
    fn despawn(&mut self, entity: EntityId) -> Result<(), WorldError> {
        match self.entities.remove(entity) {
            Some(_) => {
                self.despawned_total += 1;
                Ok(())
            }
            None => Err(WorldError::StaleEntity { entity }),
        }
    }

    fn liveness(&self, entity: EntityId) -> Liveness {
        match self.entities.get(entity) {
            Some(e) if e.dead => Liveness::Dead,
            Some(_) => Liveness::Alive,
            None => Liveness::Missing,
        }
    }

    fn position(&self, entity: EntityId) -> Option<Vec3> {
        self.entities.get(entity).map(|e| e.position)
    }

    fn move_to(&mut self, entity: EntityId, target: Vec3, can_run: bool) {
        if let Some(e) = self.entities.get_mut(entity) {
            if !e.dead {
                e.target = Some(target);
                e.running = can_run;
            }
        }
    }

    fn stop(&mut self, entity: EntityId) {
        if let Some(e) = self.entities.get_mut(entity) {
            e.target = None;
        }
    }

    fn is_moving(&self, entity: EntityId) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|e| e.target.is_some() && !e.sleeping)
    }

    fn has_player_target(&self, entity: EntityId) -> bool {
        self.entities.get(entity).is_some_and(|e| e.player_target)
    }

    fn set_sleeping(&mut self, entity: EntityId, sleeping: bool) {
        if let Some(e) = self.entities.get_mut(entity) {
            e.sleeping = sleeping;
        }
    }

    fn is_sleeping(&self, entity: EntityId) -> bool {
        self.entities.get(entity).is_some_and(|e| e.sleeping)
    }

    fn find_spawn_position(&self, near: Vec3, _spread: f32) -> Option<Vec3> {
        (!self.spawn_blocked).then_some(near)
    }

    fn population(&self, category: PopulationCategory) -> PopulationCount {
        let alive = self
            .entities
            .iter()
            .filter(|(_, e)| !e.dead && e.category == category)
            .count();
        PopulationCount {
            alive,
            max: self.caps.get(&category).copied().unwrap_or(0),
        }
    }

    fn players(&self) -> Vec<PlayerSnapshot> {
        self.players.clone()
    }

    fn is_daytime(&self) -> bool {
        self.daytime
    }

    fn world_time(&self) -> f64 {
        self.time
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
