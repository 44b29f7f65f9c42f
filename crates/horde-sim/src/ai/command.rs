//! AI agents, commands and command generators.
//!
//! An [`AiAgent`] is anything that can be steered: the abstract horde while it
//! is unspawned, or one concrete entity on the live thread. An [`AiCommand`]
//! is a stateful objective ("go there", "wander for 30 s") executed against an
//! agent frame by frame. A [`CommandGenerator`] decides which command comes
//! next once the current one completes or is interrupted.

use std::fmt;

use glam::Vec3;
use horde_world::random::WorldRandom;

// ---------------------------------------------------------------------------
// AiAgent
// ---------------------------------------------------------------------------

/// Something a command can steer.
pub trait AiAgent {
    fn location(&self) -> Vec3;

    /// Advance toward `target` for `dt` seconds.
    fn move_to(&mut self, target: Vec3, can_run: bool, dt: f32);

    fn stop(&mut self);

    fn is_moving(&self) -> bool;

    /// `true` while the agent is fighting a player. Objectives yield to this.
    fn has_player_target(&self) -> bool;

    fn is_dead(&self) -> bool;

    fn sleep(&mut self);

    fn wake_up(&mut self);

    fn is_sleeping(&self) -> bool;

    /// Simulation time in seconds, used for command expiry.
    fn now(&self) -> f64;
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

/// Optional lifetime of a command, measured from when it was assigned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Expiry {
    pub assigned_at: f64,
    pub lifetime: f64,
}

impl Expiry {
    pub fn new(assigned_at: f64, lifetime: f64) -> Self {
        Self {
            assigned_at,
            lifetime,
        }
    }

    pub fn has_expired(&self, now: f64) -> bool {
        now - self.assigned_at > self.lifetime
    }
}

// ---------------------------------------------------------------------------
// AiCommand
// ---------------------------------------------------------------------------

/// A stateful objective executed against an agent.
///
/// Commands are cloned when a group objective is handed to entity executors,
/// so each entity works through its own copy.
pub trait AiCommand: Send + Sync + fmt::Debug {
    /// Short name for logs and snapshots.
    fn name(&self) -> &'static str;

    /// `false` while the agent cannot act on this command right now.
    fn can_execute(&self, agent: &dyn AiAgent) -> bool;

    fn execute(&mut self, agent: &mut dyn AiAgent, dt: f32);

    fn is_complete(&self, agent: &dyn AiAgent) -> bool;

    /// Lower is more urgent. Drives merge tie-breaking.
    fn objective_score(&self, agent: &dyn AiAgent) -> i32;

    fn on_completed(&mut self, _agent: &mut dyn AiAgent) {}

    fn on_interrupted(&mut self, _agent: &mut dyn AiAgent) {}

    fn expiry(&self) -> Option<Expiry> {
        None
    }

    fn has_expired(&self, now: f64) -> bool {
        self.expiry().is_some_and(|e| e.has_expired(now))
    }

    /// Seconds of timed work left, for commands that have any.
    fn remaining_time(&self) -> Option<f32> {
        None
    }

    fn boxed_clone(&self) -> Box<dyn AiCommand>;
}

impl Clone for Box<dyn AiCommand> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

// ---------------------------------------------------------------------------
// CommandGenerator
// ---------------------------------------------------------------------------

/// Produces the next objective for a group or an entity.
pub trait CommandGenerator: Send + fmt::Debug {
    /// The next command, or `None` to stay idle this update.
    fn generate_next(&mut self, agent: &dyn AiAgent, random: &mut WorldRandom) -> Option<Box<dyn AiCommand>>;

    /// A command this generator produced finished normally.
    fn on_completed(&mut self, _command: &dyn AiCommand) {}

    /// A command this generator produced was preempted.
    fn on_interrupted(&mut self, _command: &dyn AiCommand) {}

    /// A fresh generator with the same settings, for a horde split off from
    /// this one. `None` leaves the new horde idle.
    fn fork(&self) -> Option<Box<dyn CommandGenerator>> {
        None
    }
}

/// Generator that never produces anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleGenerator;

impl CommandGenerator for IdleGenerator {
    fn generate_next(&mut self, _agent: &dyn AiAgent, _random: &mut WorldRandom) -> Option<Box<dyn AiCommand>> {
        None
    }

    fn fork(&self) -> Option<Box<dyn CommandGenerator>> {
        Some(Box::new(IdleGenerator))
    }
}

// ---------------------------------------------------------------------------
// Test agent
// ---------------------------------------------------------------------------

/// Minimal in-memory agent for unit tests of commands and executors.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct TestAgent {
    pub location: Vec3,
    pub speed: f32,
    pub sleeping: bool,
    pub player_target: bool,
    pub dead: bool,
    pub moving: bool,
    pub now: f64,
}

#[cfg(test)]
impl AiAgent for TestAgent {
    fn location(&self) -> Vec3 {
        self.location
    }
    fn move_to(&mut self, target: Vec3, _can_run: bool, dt: f32) {
        self.location = horde_world::geometry::step_toward(self.location, target, self.speed * dt);
        self.moving = true;
    }
    fn stop(&mut self) {
        self.moving = false;
    }
    fn is_moving(&self) -> bool {
        self.moving
    }
    fn has_player_target(&self) -> bool {
        self.player_target
    }
    fn is_dead(&self) -> bool {
        self.dead
    }
    fn sleep(&mut self) {
        self.sleeping = true;
    }
    fn wake_up(&mut self) {
        self.sleeping = false;
    }
    fn is_sleeping(&self) -> bool {
        self.sleeping
    }
    fn now(&self) -> f64 {
        self.now
    }
}
