//! One horde's AI: the group executor plus handles to its entity executors.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use horde_world::entity::EntityId;
use horde_world::random::WorldRandom;
use tracing::trace;

use super::command::{AiAgent, AiCommand, CommandGenerator};
use super::entity::{AiFeedback, EntityAiRequest, EntityExecutor};
use super::group::GroupExecutor;

#[derive(Debug)]
struct EntityHandle {
    loaded: Arc<AtomicBool>,
    ticket: u64,
}

/// Group executor, entity registrations and the feedback inbox.
#[derive(Debug)]
pub struct HordeAi {
    group: GroupExecutor,
    entities: BTreeMap<EntityId, EntityHandle>,
    feedback_tx: Sender<AiFeedback>,
    feedback_rx: Receiver<AiFeedback>,
    next_ticket: u64,
}

impl HordeAi {
    pub fn new(generator: Box<dyn CommandGenerator>) -> Self {
        let (feedback_tx, feedback_rx) = crossbeam_channel::unbounded();
        Self {
            group: GroupExecutor::new(generator),
            entities: BTreeMap::new(),
            feedback_tx,
            feedback_rx,
            next_ticket: 0,
        }
    }

    pub fn group(&self) -> &GroupExecutor {
        &self.group
    }

    /// Register a live entity and build the request that will drive it.
    ///
    /// Registering an entity twice unloads the previous executor first.
    pub fn add_entity(
        &mut self,
        entity: EntityId,
        local: Option<Box<dyn CommandGenerator>>,
        random: WorldRandom,
    ) -> EntityAiRequest {
        self.release_entity(entity);
        let loaded = Arc::new(AtomicBool::new(true));
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.entities.insert(
            entity,
            EntityHandle {
                loaded: Arc::clone(&loaded),
                ticket,
            },
        );
        let executor = EntityExecutor::new(entity, self.group.subscribe(), local, random);
        EntityAiRequest::new(executor, loaded, self.feedback_tx.clone(), ticket)
    }

    /// Stop driving `entity` without touching it in the live world.
    pub fn release_entity(&mut self, entity: EntityId) -> bool {
        match self.entities.remove(&entity) {
            Some(handle) => {
                handle.loaded.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Unload every entity executor. Used on despawn, merge and removal.
    pub fn release_all(&mut self) -> usize {
        let count = self.entities.len();
        for (_, handle) in std::mem::take(&mut self.entities) {
            handle.loaded.store(false, Ordering::Release);
        }
        count
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn interrupt(&mut self, commands: Vec<Box<dyn AiCommand>>, agent: &mut dyn AiAgent) {
        self.group.interrupt(commands, agent);
    }

    /// Drain entity feedback, then step the group objective unless the
    /// entities are carrying it out.
    pub fn update(&mut self, agent: &mut dyn AiAgent, dt: f32, random: &mut WorldRandom, spawned: bool) {
        while let Ok(message) = self.feedback_rx.try_recv() {
            match message {
                AiFeedback::CommandCompleted { generation } => {
                    self.group.on_command_completed(generation, agent, random);
                }
                AiFeedback::EntityReleased { entity, ticket, dead } => {
                    if self.entities.get(&entity).is_some_and(|h| h.ticket == ticket) {
                        self.entities.remove(&entity);
                        trace!(entity = ?entity, dead, "entity executor released");
                    }
                }
            }
        }
        if !spawned {
            self.group.update(agent, dt, random);
        }
    }

    pub fn objective_score(&self, agent: &dyn AiAgent) -> f32 {
        self.group.objective_score(agent)
    }
}

impl Drop for HordeAi {
    fn drop(&mut self) {
        self.release_all();
    }
}
