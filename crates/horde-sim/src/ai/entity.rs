//! Entity-level command execution on the live-world thread.
//!
//! Each live horde entity gets an [`EntityAiRequest`] submitted to the
//! request processor. The request wraps an [`EntityExecutor`] that steers the
//! entity through the live world: commands from an optional entity-local
//! generator first, then its own copy of the published group command. Group
//! completions and the final release go back to the owning horde over an
//! [`AiFeedback`] channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use glam::Vec3;
use horde_world::entity::EntityId;
use horde_world::live::{LiveWorld, Liveness};
use horde_world::random::WorldRandom;

use super::command::{AiAgent, AiCommand, CommandGenerator};
use super::group::GroupCommand;
use crate::request::{MainThreadRequest, RequestContext, RequestKind};
use crate::subscription::Subscriber;

// ---------------------------------------------------------------------------
// AiFeedback
// ---------------------------------------------------------------------------

/// Messages from entity executors to their horde's AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiFeedback {
    /// An entity finished its copy of the group command of `generation`.
    CommandCompleted { generation: u64 },
    /// The executor for `entity` stopped. `ticket` identifies which
    /// registration ended, so a stale release cannot drop a newer one.
    EntityReleased { entity: EntityId, ticket: u64, dead: bool },
}

// ---------------------------------------------------------------------------
// EntityAgent
// ---------------------------------------------------------------------------

/// [`AiAgent`] view of one live entity.
pub struct EntityAgent<'w> {
    world: &'w mut dyn LiveWorld,
    entity: EntityId,
    now: f64,
    fallback: Vec3,
}

impl<'w> EntityAgent<'w> {
    pub fn new(world: &'w mut dyn LiveWorld, entity: EntityId) -> Self {
        let now = world.world_time();
        let fallback = world.position(entity).unwrap_or(Vec3::ZERO);
        Self {
            world,
            entity,
            now,
            fallback,
        }
    }
}

impl AiAgent for EntityAgent<'_> {
    fn location(&self) -> Vec3 {
        self.world.position(self.entity).unwrap_or(self.fallback)
    }

    // The live world paths on its own clock; `dt` only matters to abstract agents.
    fn move_to(&mut self, target: Vec3, can_run: bool, _dt: f32) {
        self.world.move_to(self.entity, target, can_run);
    }

    fn stop(&mut self) {
        self.world.stop(self.entity);
    }

    fn is_moving(&self) -> bool {
        self.world.is_moving(self.entity)
    }

    fn has_player_target(&self) -> bool {
        self.world.has_player_target(self.entity)
    }

    fn is_dead(&self) -> bool {
        self.world.liveness(self.entity) != Liveness::Alive
    }

    fn sleep(&mut self) {
        self.world.set_sleeping(self.entity, true);
    }

    fn wake_up(&mut self) {
        self.world.set_sleeping(self.entity, false);
    }

    fn is_sleeping(&self) -> bool {
        self.world.is_sleeping(self.entity)
    }

    fn now(&self) -> f64 {
        self.now
    }
}

// ---------------------------------------------------------------------------
// EntityExecutor
// ---------------------------------------------------------------------------

/// Per-entity command state.
#[derive(Debug)]
pub struct EntityExecutor {
    entity: EntityId,
    local: Option<Box<dyn CommandGenerator>>,
    local_command: Option<Box<dyn AiCommand>>,
    group: Subscriber<GroupCommand>,
    group_command: Option<Box<dyn AiCommand>>,
    group_generation: u64,
    random: WorldRandom,
}

impl EntityExecutor {
    pub fn new(
        entity: EntityId,
        group: Subscriber<GroupCommand>,
        local: Option<Box<dyn CommandGenerator>>,
        random: WorldRandom,
    ) -> Self {
        Self {
            entity,
            local,
            local_command: None,
            group,
            group_command: None,
            group_generation: 0,
            random,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Name of the command this executor would run next.
    pub fn active_name(&self) -> Option<&'static str> {
        self.local_command
            .as_ref()
            .or(self.group_command.as_ref())
            .map(|c| c.name())
    }

    /// Run one step. Returns the generation of a group command this entity
    /// just completed.
    pub fn update(&mut self, agent: &mut dyn AiAgent, dt: f32) -> Option<u64> {
        // Fighting a player takes precedence over any objective.
        if agent.has_player_target() {
            return None;
        }

        if self.local_command.is_none() {
            if let Some(generator) = self.local.as_mut() {
                self.local_command = generator.generate_next(agent, &mut self.random);
            }
        }
        if let Some(command) = self.local_command.as_mut() {
            if command.can_execute(agent) {
                command.execute(agent, dt);
            }
            if command.is_complete(agent) {
                command.on_completed(agent);
                if let (Some(generator), Some(done)) = (self.local.as_mut(), self.local_command.take()) {
                    generator.on_completed(done.as_ref());
                }
            }
            return None;
        }

        if let Some(latest) = self.group.take_changed() {
            if latest.generation != self.group_generation {
                if let Some(mut old) = self.group_command.take() {
                    old.on_interrupted(agent);
                }
                self.group_generation = latest.generation;
                self.group_command = latest.command.clone();
            }
        }

        let command = self.group_command.as_mut()?;
        if command.can_execute(agent) {
            command.execute(agent, dt);
        }
        if !command.is_complete(agent) {
            return None;
        }
        command.on_completed(agent);
        self.group_command = None;
        Some(self.group_generation)
    }
}

// ---------------------------------------------------------------------------
// EntityAiRequest
// ---------------------------------------------------------------------------

/// Runs an [`EntityExecutor`] every frame until the entity dies or the
/// owning horde unloads it.
#[derive(Debug)]
pub struct EntityAiRequest {
    executor: EntityExecutor,
    loaded: Arc<AtomicBool>,
    feedback: Sender<AiFeedback>,
    ticket: u64,
    finished: bool,
    dead: bool,
}

impl EntityAiRequest {
    pub(crate) fn new(
        executor: EntityExecutor,
        loaded: Arc<AtomicBool>,
        feedback: Sender<AiFeedback>,
        ticket: u64,
    ) -> Self {
        Self {
            executor,
            loaded,
            feedback,
            ticket,
            finished: false,
            dead: false,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.executor.entity()
    }
}

impl MainThreadRequest for EntityAiRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::EntityAi
    }

    fn is_done(&self) -> bool {
        self.finished || !self.loaded.load(Ordering::Acquire)
    }

    fn tick_execute(&mut self, ctx: &mut RequestContext<'_>) {
        let entity = self.executor.entity();
        match ctx.world.liveness(entity) {
            Liveness::Alive => {}
            Liveness::Dead => {
                self.dead = true;
                self.finished = true;
                return;
            }
            Liveness::Missing => {
                self.finished = true;
                return;
            }
        }

        let mut agent = EntityAgent::new(&mut *ctx.world, entity);
        if let Some(generation) = self.executor.update(&mut agent, ctx.dt) {
            // The horde may be gone already; nobody left to tell.
            let _ = self.feedback.send(AiFeedback::CommandCompleted { generation });
        }
    }

    fn on_cleanup(&mut self, _ctx: &mut RequestContext<'_>) {
        let _ = self.feedback.send(AiFeedback::EntityReleased {
            entity: self.executor.entity(),
            ticket: self.ticket,
            dead: self.dead,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::commands::GoToTargetCommand;
    use crate::subscription::Subscription;
    use horde_world::prelude::*;

    fn publish_go_to(slot: &Subscription<GroupCommand>, generation: u64, x: f32) {
        slot.publish(GroupCommand {
            generation,
            command: Some(Box::new(GoToTargetCommand::new(Vec3::new(x, 0.0, 0.0)))),
        });
    }

    #[test]
    fn entity_follows_group_command_and_reports_generation() {
        let mut world = MemoryWorld::new();
        let entity = world.spawn_at(EntityClassId(1), Vec3::ZERO).unwrap();
        let slot = Subscription::new();
        publish_go_to(&slot, 3, 40.0);

        let mut exec = EntityExecutor::new(entity, slot.subscribe(), None, WorldRandom::from_seed(1));
        let mut agent = EntityAgent::new(&mut world, entity);
        assert_eq!(exec.update(&mut agent, 0.1), None);
        assert_eq!(exec.active_name(), Some("go_to_target"));
        assert!(world.is_moving(entity));

        // Teleport next to the target: the copy completes.
        world.set_position(entity, Vec3::new(39.0, 0.0, 0.0));
        let mut agent = EntityAgent::new(&mut world, entity);
        assert_eq!(exec.update(&mut agent, 0.1), Some(3));
        assert_eq!(exec.active_name(), None);
    }

    #[test]
    fn player_target_suspends_objectives() {
        let mut world = MemoryWorld::new();
        let entity = world.spawn_at(EntityClassId(1), Vec3::ZERO).unwrap();
        world.set_player_target(entity, true);
        let slot = Subscription::new();
        publish_go_to(&slot, 1, 40.0);

        let mut exec = EntityExecutor::new(entity, slot.subscribe(), None, WorldRandom::from_seed(1));
        let mut agent = EntityAgent::new(&mut world, entity);
        exec.update(&mut agent, 0.1);
        assert!(!world.is_moving(entity));
    }

    #[test]
    fn request_finishes_on_death_and_reports_release() {
        let mut world = MemoryWorld::new();
        let entity = world.spawn_at(EntityClassId(1), Vec3::ZERO).unwrap();
        let slot = Subscription::new();
        publish_go_to(&slot, 1, 40.0);
        let (tx, rx) = crossbeam_channel::unbounded();
        let loaded = Arc::new(AtomicBool::new(true));

        let exec = EntityExecutor::new(entity, slot.subscribe(), None, WorldRandom::from_seed(1));
        let mut request = EntityAiRequest::new(exec, Arc::clone(&loaded), tx, 9);

        let mut ctx = RequestContext { world: &mut world, dt: 0.1 };
        request.tick_execute(&mut ctx);
        assert!(!request.is_done());

        world.kill(entity);
        let mut ctx = RequestContext { world: &mut world, dt: 0.1 };
        request.tick_execute(&mut ctx);
        assert!(request.is_done());
        request.on_cleanup(&mut ctx);
        assert_eq!(
            rx.try_recv().unwrap(),
            AiFeedback::EntityReleased { entity, ticket: 9, dead: true }
        );
    }

    #[test]
    fn unloading_finishes_without_death() {
        let mut world = MemoryWorld::new();
        let entity = world.spawn_at(EntityClassId(1), Vec3::ZERO).unwrap();
        let slot = Subscription::new();
        let (tx, _rx) = crossbeam_channel::unbounded();
        let loaded = Arc::new(AtomicBool::new(true));
        let exec = EntityExecutor::new(entity, slot.subscribe(), None, WorldRandom::from_seed(1));
        let request = EntityAiRequest::new(exec, Arc::clone(&loaded), tx, 0);

        loaded.store(false, Ordering::Release);
        assert!(request.is_done());
        assert_eq!(world.liveness(entity), Liveness::Alive);
    }
}
