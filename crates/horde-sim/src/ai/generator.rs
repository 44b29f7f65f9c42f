//! Wandering objective generator.
//!
//! Cycles a horde through three states:
//!
//! - **Idle**: pick a random destination inside the world bounds and a wander
//!   duration; sometimes sleep first.
//! - **Moving**: go to the destination.
//! - **Wander**: linger at the destination for the chosen duration.
//!
//! An interrupted wander resumes from `Moving` with whatever time it had left,
//! so a horde pulled away by a noise walks back and finishes its stay.

use glam::Vec3;
use horde_world::random::WorldRandom;

use super::command::{AiAgent, AiCommand, CommandGenerator};
use super::commands::{GoToTargetCommand, SleepingCommand, WanderCommand};

const DEFAULT_SLEEP_CHANCE: f32 = 0.7;
const DEFAULT_WANDER_TIME: (f32, f32) = (100.0, 4_900.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WanderState {
    Idle,
    Moving,
    Wander,
}

/// Random destinations with dwell time and optional naps.
#[derive(Debug, Clone)]
pub struct WanderingCommandGenerator {
    bounds_min: Vec3,
    bounds_max: Vec3,
    sleep_chance: f32,
    wander_time: (f32, f32),
    state: WanderState,
    target: Option<Vec3>,
    remaining_wander: f32,
}

impl WanderingCommandGenerator {
    /// Destinations are drawn uniformly from the ground-plane box
    /// `bounds_min..bounds_max`.
    pub fn new(bounds_min: Vec3, bounds_max: Vec3) -> Self {
        Self {
            bounds_min,
            bounds_max,
            sleep_chance: DEFAULT_SLEEP_CHANCE,
            wander_time: DEFAULT_WANDER_TIME,
            state: WanderState::Idle,
            target: None,
            remaining_wander: 0.0,
        }
    }

    pub fn with_sleep_chance(mut self, chance: f32) -> Self {
        self.sleep_chance = chance;
        self
    }

    /// Dwell time range in seconds.
    pub fn with_wander_time(mut self, min: f32, max: f32) -> Self {
        self.wander_time = (min, max);
        self
    }

    /// Current destination, if one was chosen.
    pub fn target(&self) -> Option<Vec3> {
        self.target
    }
}

impl CommandGenerator for WanderingCommandGenerator {
    fn generate_next(&mut self, _agent: &dyn AiAgent, random: &mut WorldRandom) -> Option<Box<dyn AiCommand>> {
        match self.state {
            WanderState::Idle => {
                self.target = Some(random.random_location(self.bounds_min, self.bounds_max));
                self.remaining_wander = random.random_range_f32(self.wander_time.0, self.wander_time.1);
                self.state = WanderState::Moving;
                if random.random_chance(self.sleep_chance) {
                    return Some(Box::new(SleepingCommand::new(self.remaining_wander)));
                }
            }
            WanderState::Wander => {
                return Some(Box::new(WanderCommand::new(self.remaining_wander)));
            }
            WanderState::Moving => {}
        }

        match self.target {
            Some(target) => Some(Box::new(GoToTargetCommand::new(target))),
            None => {
                self.state = WanderState::Idle;
                None
            }
        }
    }

    fn on_completed(&mut self, command: &dyn AiCommand) {
        match command.name() {
            "go_to_target" => self.state = WanderState::Wander,
            "wander" => {
                self.state = WanderState::Idle;
                self.target = None;
            }
            _ => {}
        }
    }

    fn on_interrupted(&mut self, command: &dyn AiCommand) {
        if command.name() == "wander" {
            if let Some(remaining) = command.remaining_time() {
                self.remaining_wander = remaining;
            }
            self.state = WanderState::Moving;
        }
    }

    fn fork(&self) -> Option<Box<dyn CommandGenerator>> {
        Some(Box::new(
            WanderingCommandGenerator::new(self.bounds_min, self.bounds_max)
                .with_sleep_chance(self.sleep_chance)
                .with_wander_time(self.wander_time.0, self.wander_time.1),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::command::TestAgent;

    fn generator() -> WanderingCommandGenerator {
        WanderingCommandGenerator::new(Vec3::new(-100.0, 0.0, -100.0), Vec3::new(100.0, 0.0, 100.0))
            .with_sleep_chance(0.0)
            .with_wander_time(5.0, 6.0)
    }

    #[test]
    fn idle_then_move_then_wander_then_idle() {
        let agent = TestAgent::default();
        let mut random = WorldRandom::from_seed(3);
        let mut gen = generator();

        let go = gen.generate_next(&agent, &mut random).unwrap();
        assert_eq!(go.name(), "go_to_target");
        let target = gen.target().unwrap();
        assert!(target.x >= -100.0 && target.x < 100.0);

        gen.on_completed(go.as_ref());
        let wander = gen.generate_next(&agent, &mut random).unwrap();
        assert_eq!(wander.name(), "wander");
        let t = wander.remaining_time().unwrap();
        assert!((5.0..6.0).contains(&t));

        gen.on_completed(wander.as_ref());
        assert!(gen.target().is_none());
        let next = gen.generate_next(&agent, &mut random).unwrap();
        assert_eq!(next.name(), "go_to_target");
    }

    #[test]
    fn interrupted_wander_resumes_with_remaining_time() {
        let mut agent = TestAgent::default();
        let mut random = WorldRandom::from_seed(4);
        let mut gen = generator();

        let go = gen.generate_next(&agent, &mut random).unwrap();
        gen.on_completed(go.as_ref());
        let mut wander = gen.generate_next(&agent, &mut random).unwrap();
        let before = wander.remaining_time().unwrap();
        wander.execute(&mut agent, 2.0);
        gen.on_interrupted(wander.as_ref());

        // Walks back first, then lingers for what was left.
        let back = gen.generate_next(&agent, &mut random).unwrap();
        assert_eq!(back.name(), "go_to_target");
        gen.on_completed(back.as_ref());
        let resumed = gen.generate_next(&agent, &mut random).unwrap();
        assert!((resumed.remaining_time().unwrap() - (before - 2.0)).abs() < 1e-4);
    }

    #[test]
    fn always_sleeps_first_with_full_chance() {
        let agent = TestAgent::default();
        let mut random = WorldRandom::from_seed(5);
        let mut gen = generator().with_sleep_chance(1.0);
        let first = gen.generate_next(&agent, &mut random).unwrap();
        assert_eq!(first.name(), "sleeping");
        gen.on_completed(first.as_ref());
        // Still heading for the chosen destination afterwards.
        let second = gen.generate_next(&agent, &mut random).unwrap();
        assert_eq!(second.name(), "go_to_target");
    }

    #[test]
    fn fork_starts_from_idle() {
        let agent = TestAgent::default();
        let mut random = WorldRandom::from_seed(6);
        let mut gen = generator();
        let go = gen.generate_next(&agent, &mut random).unwrap();
        gen.on_completed(go.as_ref());

        let mut forked = gen.fork().unwrap();
        let first = forked.generate_next(&agent, &mut random).unwrap();
        assert_eq!(first.name(), "go_to_target");
    }
}
