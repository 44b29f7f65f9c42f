//! Built-in commands: go to a target, wander in place, sleep.

use glam::Vec3;
use horde_world::geometry::distance_xz;

use super::command::{AiAgent, AiCommand, Expiry};

/// Distance at which a [`GoToTargetCommand`] counts as arrived.
pub const MIN_DISTANCE_TO_TARGET: f32 = 10.0;

// ---------------------------------------------------------------------------
// GoToTargetCommand
// ---------------------------------------------------------------------------

/// Walk toward a fixed location.
///
/// Not executable while the agent is engaged with a player, so a horde that
/// found someone to fight does not wander off toward its objective.
#[derive(Debug, Clone, PartialEq)]
pub struct GoToTargetCommand {
    target: Vec3,
    can_run: bool,
    expiry: Option<Expiry>,
}

impl GoToTargetCommand {
    pub fn new(target: Vec3) -> Self {
        Self {
            target,
            can_run: false,
            expiry: None,
        }
    }

    /// Allow the agent to run.
    pub fn running(mut self) -> Self {
        self.can_run = true;
        self
    }

    /// Expire `lifetime` seconds after `assigned_at`.
    pub fn expiring(mut self, assigned_at: f64, lifetime: f64) -> Self {
        self.expiry = Some(Expiry::new(assigned_at, lifetime));
        self
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }
}

impl AiCommand for GoToTargetCommand {
    fn name(&self) -> &'static str {
        "go_to_target"
    }

    fn can_execute(&self, agent: &dyn AiAgent) -> bool {
        !agent.has_player_target()
    }

    fn execute(&mut self, agent: &mut dyn AiAgent, dt: f32) {
        agent.move_to(self.target, self.can_run, dt);
    }

    fn is_complete(&self, agent: &dyn AiAgent) -> bool {
        distance_xz(agent.location(), self.target) < MIN_DISTANCE_TO_TARGET
    }

    fn objective_score(&self, agent: &dyn AiAgent) -> i32 {
        distance_xz(agent.location(), self.target).floor() as i32
    }

    fn expiry(&self) -> Option<Expiry> {
        self.expiry
    }

    fn boxed_clone(&self) -> Box<dyn AiCommand> {
        Box::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// WanderCommand
// ---------------------------------------------------------------------------

/// Linger for a while.
#[derive(Debug, Clone, PartialEq)]
pub struct WanderCommand {
    remaining: f32,
}

impl WanderCommand {
    pub fn new(seconds: f32) -> Self {
        Self { remaining: seconds }
    }
}

impl AiCommand for WanderCommand {
    fn name(&self) -> &'static str {
        "wander"
    }

    fn can_execute(&self, _agent: &dyn AiAgent) -> bool {
        true
    }

    fn execute(&mut self, _agent: &mut dyn AiAgent, dt: f32) {
        self.remaining -= dt;
    }

    fn is_complete(&self, _agent: &dyn AiAgent) -> bool {
        self.remaining <= 0.0
    }

    fn objective_score(&self, _agent: &dyn AiAgent) -> i32 {
        (self.remaining * 10.0) as i32
    }

    fn remaining_time(&self) -> Option<f32> {
        Some(self.remaining.max(0.0))
    }

    fn boxed_clone(&self) -> Box<dyn AiCommand> {
        Box::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// SleepingCommand
// ---------------------------------------------------------------------------

/// Sleep in place; the agent wakes when the command ends either way.
#[derive(Debug, Clone, PartialEq)]
pub struct SleepingCommand {
    remaining: f32,
}

impl SleepingCommand {
    pub fn new(seconds: f32) -> Self {
        Self { remaining: seconds }
    }
}

impl AiCommand for SleepingCommand {
    fn name(&self) -> &'static str {
        "sleeping"
    }

    fn can_execute(&self, _agent: &dyn AiAgent) -> bool {
        true
    }

    fn execute(&mut self, agent: &mut dyn AiAgent, dt: f32) {
        if !agent.is_sleeping() {
            agent.stop();
            agent.sleep();
        }
        self.remaining -= dt;
    }

    fn is_complete(&self, _agent: &dyn AiAgent) -> bool {
        self.remaining <= 0.0
    }

    fn objective_score(&self, _agent: &dyn AiAgent) -> i32 {
        (self.remaining * 10.0) as i32
    }

    fn on_completed(&mut self, agent: &mut dyn AiAgent) {
        agent.wake_up();
    }

    fn on_interrupted(&mut self, agent: &mut dyn AiAgent) {
        agent.wake_up();
    }

    fn remaining_time(&self) -> Option<f32> {
        Some(self.remaining.max(0.0))
    }

    fn boxed_clone(&self) -> Box<dyn AiCommand> {
        Box::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::command::TestAgent;

    fn agent_at(x: f32) -> TestAgent {
        TestAgent {
            location: Vec3::new(x, 0.0, 0.0),
            speed: 5.0,
            ..Default::default()
        }
    }

    #[test]
    fn go_to_target_walks_and_completes() {
        let mut agent = agent_at(0.0);
        let mut cmd = GoToTargetCommand::new(Vec3::new(30.0, 0.0, 0.0));
        assert_eq!(cmd.objective_score(&agent), 30);
        assert!(!cmd.is_complete(&agent));

        for _ in 0..4 {
            cmd.execute(&mut agent, 1.0);
        }
        assert_eq!(agent.location.x, 20.0);
        assert!(!cmd.is_complete(&agent));
        cmd.execute(&mut agent, 1.0);
        assert!(cmd.is_complete(&agent));
    }

    #[test]
    fn go_to_target_yields_to_player_fights() {
        let mut agent = agent_at(0.0);
        let cmd = GoToTargetCommand::new(Vec3::X * 50.0);
        assert!(cmd.can_execute(&agent));
        agent.player_target = true;
        assert!(!cmd.can_execute(&agent));
    }

    #[test]
    fn go_to_target_score_uses_ground_plane() {
        let agent = TestAgent {
            location: Vec3::new(0.0, 80.0, 0.0),
            ..Default::default()
        };
        let cmd = GoToTargetCommand::new(Vec3::new(3.0, 0.0, 4.0));
        assert_eq!(cmd.objective_score(&agent), 5);
    }

    #[test]
    fn go_to_target_expiry() {
        let cmd = GoToTargetCommand::new(Vec3::ZERO).expiring(100.0, 30.0);
        assert!(!cmd.has_expired(120.0));
        assert!(cmd.has_expired(131.0));
        assert!(!GoToTargetCommand::new(Vec3::ZERO).has_expired(1e9));
    }

    #[test]
    fn wander_counts_down() {
        let mut agent = agent_at(0.0);
        let mut cmd = WanderCommand::new(2.0);
        assert_eq!(cmd.objective_score(&agent), 20);
        cmd.execute(&mut agent, 1.5);
        assert_eq!(cmd.objective_score(&agent), 5);
        assert!(!cmd.is_complete(&agent));
        cmd.execute(&mut agent, 0.5);
        assert!(cmd.is_complete(&agent));
        assert_eq!(cmd.remaining_time(), Some(0.0));
    }

    #[test]
    fn sleeping_wakes_on_completion_and_interrupt() {
        let mut agent = agent_at(0.0);
        let mut cmd = SleepingCommand::new(1.0);
        cmd.execute(&mut agent, 0.5);
        assert!(agent.sleeping);
        cmd.on_interrupted(&mut agent);
        assert!(!agent.sleeping);

        cmd.execute(&mut agent, 0.6);
        assert!(cmd.is_complete(&agent));
        cmd.on_completed(&mut agent);
        assert!(!agent.sleeping);
    }

    #[test]
    fn boxed_clone_is_independent() {
        let agent = agent_at(0.0);
        let original: Box<dyn AiCommand> = Box::new(WanderCommand::new(3.0));
        let mut copy = original.clone();
        let mut scratch = agent.clone();
        copy.execute(&mut scratch, 3.0);
        assert!(copy.is_complete(&agent));
        assert!(!original.is_complete(&agent));
    }
}
