//! Group-level command execution.
//!
//! A [`GroupExecutor`] holds one horde's objective. While the horde is
//! abstract it executes the objective itself against the horde agent; while
//! the horde is spawned the objective is carried out by the entity executors,
//! which report completion back, and the group only advances.
//!
//! Every change of the active command bumps a generation counter and
//! publishes a [`GroupCommand`] so entity executors can pick up a fresh copy.

use std::collections::VecDeque;
use std::fmt;

use horde_world::random::WorldRandom;
use tracing::trace;

use super::command::{AiAgent, AiCommand, CommandGenerator};
use crate::subscription::{Subscriber, Subscription};

/// The group objective as seen by entity executors.
#[derive(Debug, Clone)]
pub struct GroupCommand {
    /// Bumped every time the active command changes.
    pub generation: u64,
    /// `None` while the group has nothing to do.
    pub command: Option<Box<dyn AiCommand>>,
}

/// Executes a horde's objective with an interrupt queue on top.
pub struct GroupExecutor {
    generator: Box<dyn CommandGenerator>,
    current: Option<Box<dyn AiCommand>>,
    interrupts: VecDeque<Box<dyn AiCommand>>,
    generation: u64,
    published: Subscription<GroupCommand>,
}

impl GroupExecutor {
    pub fn new(generator: Box<dyn CommandGenerator>) -> Self {
        Self {
            generator,
            current: None,
            interrupts: VecDeque::new(),
            generation: 0,
            published: Subscription::new(),
        }
    }

    /// A reader of the published group command.
    pub fn subscribe(&self) -> Subscriber<GroupCommand> {
        self.published.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The command being worked on: the top interrupt if any, else the
    /// generator's current command.
    pub fn active(&self) -> Option<&dyn AiCommand> {
        match self.interrupts.front() {
            Some(top) => Some(top.as_ref()),
            None => self.current.as_deref(),
        }
    }

    fn active_mut(&mut self) -> Option<&mut Box<dyn AiCommand>> {
        match self.interrupts.front_mut() {
            Some(top) => Some(top),
            None => self.current.as_mut(),
        }
    }

    pub fn pending_interrupts(&self) -> usize {
        self.interrupts.len()
    }

    /// A fresh copy of the generator, if it supports forking.
    pub fn fork_generator(&self) -> Option<Box<dyn CommandGenerator>> {
        self.generator.fork()
    }

    /// Replace the interrupt queue with `commands`.
    ///
    /// Everything preempted gets its `on_interrupted` hook, and the
    /// generator is told so it can resume later. The generator's command is
    /// regenerated once the interrupts are exhausted.
    pub fn interrupt(&mut self, commands: Vec<Box<dyn AiCommand>>, agent: &mut dyn AiAgent) {
        for mut preempted in self.interrupts.drain(..) {
            preempted.on_interrupted(agent);
        }
        if let Some(mut current) = self.current.take() {
            current.on_interrupted(agent);
            self.generator.on_interrupted(current.as_ref());
        }
        self.interrupts.extend(commands);
        self.advance_generation();
    }

    /// Execute one step of the active command against `agent`.
    pub fn update(&mut self, agent: &mut dyn AiAgent, dt: f32, random: &mut WorldRandom) {
        self.discard_expired(agent.now());

        if self.active().is_none() {
            self.current = self.generator.generate_next(agent, random);
            if self.current.is_none() {
                return;
            }
            self.advance_generation();
        }

        let complete = match self.active_mut() {
            Some(command) => {
                if command.can_execute(agent) {
                    command.execute(agent, dt);
                }
                command.is_complete(agent)
            }
            None => false,
        };
        if complete {
            self.complete_active(agent, random);
        }
    }

    /// An entity finished its copy of generation `generation`.
    ///
    /// Reports for older generations are ignored; the first report for the
    /// current one completes the active command for the whole group.
    pub fn on_command_completed(&mut self, generation: u64, agent: &mut dyn AiAgent, random: &mut WorldRandom) {
        if generation != self.generation || self.active().is_none() {
            trace!(generation, current = self.generation, "stale group completion");
            return;
        }
        self.complete_active(agent, random);
    }

    /// `current score - mean(interrupt scores)`. Lower is more urgent.
    pub fn objective_score(&self, agent: &dyn AiAgent) -> f32 {
        let current = self
            .current
            .as_ref()
            .map_or(0.0, |c| c.objective_score(agent) as f32);
        if self.interrupts.is_empty() {
            return current;
        }
        let sum: f32 = self
            .interrupts
            .iter()
            .map(|c| c.objective_score(agent) as f32)
            .sum();
        current - sum / self.interrupts.len() as f32
    }

    fn complete_active(&mut self, agent: &mut dyn AiAgent, random: &mut WorldRandom) {
        if let Some(mut top) = self.interrupts.pop_front() {
            top.on_completed(agent);
            let now = agent.now();
            self.interrupts.retain(|c| !c.has_expired(now));
        } else if let Some(mut current) = self.current.take() {
            current.on_completed(agent);
            self.generator.on_completed(current.as_ref());
        }
        if self.interrupts.is_empty() && self.current.is_none() {
            self.current = self.generator.generate_next(agent, random);
        }
        self.advance_generation();
    }

    fn discard_expired(&mut self, now: f64) {
        let before = self.interrupts.len();
        self.interrupts.retain(|c| !c.has_expired(now));
        if self.interrupts.len() != before {
            self.advance_generation();
        }
    }

    fn advance_generation(&mut self) {
        self.generation += 1;
        self.published.publish(GroupCommand {
            generation: self.generation,
            command: self.active().map(|c| c.boxed_clone()),
        });
    }
}

impl fmt::Debug for GroupExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupExecutor")
            .field("generation", &self.generation)
            .field("current", &self.current.as_ref().map(|c| c.name()))
            .field("interrupts", &self.interrupts.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
