//! Layered AI: commands, generators, and the group / entity executors.

pub mod command;
pub mod commands;
pub mod entity;
pub mod generator;
pub mod group;
pub mod horde;

pub use command::{AiAgent, AiCommand, CommandGenerator, Expiry, IdleGenerator};
pub use commands::{GoToTargetCommand, SleepingCommand, WanderCommand, MIN_DISTANCE_TO_TARGET};
pub use entity::{AiFeedback, EntityAgent, EntityAiRequest, EntityExecutor};
pub use generator::WanderingCommandGenerator;
pub use group::{GroupCommand, GroupExecutor};
pub use horde::HordeAi;
