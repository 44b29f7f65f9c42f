//! Horde Sim -- the world horde simulation.
//!
//! Hordes are tracked abstractly on background threads and only become
//! live entities near players. The [`WorldHordeTracker`](tracker::WorldHordeTracker)
//! advances every horde once per tick on a rayon pool and expresses every
//! live-world change as a [`MainThreadRequest`](request::MainThreadRequest),
//! which the [`RequestProcessor`](request::RequestProcessor) executes on the
//! live-world thread a little each frame. Results flow back to the tracker
//! as events and through [`Subscription`](subscription::Subscription)s.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use glam::Vec3;
//! use horde_sim::prelude::*;
//! use horde_world::prelude::*;
//!
//! let registry = Arc::new(
//!     HordeKindRegistry::builder()
//!         .register(UniformHordeKind::new("walker", vec![EntityClassId(1)]))?
//!         .build(),
//! );
//! let mut processor = RequestProcessor::new();
//! let mut tracker = WorldHordeTracker::new(
//!     TrackerConfig::default(),
//!     Arc::clone(&registry),
//!     Arc::new(PcgRandomFactory::new(42)),
//!     processor.sender(),
//! )?;
//!
//! let walker = Arc::clone(registry.get("walker").unwrap());
//! tracker.add(HordeBlueprint::new(Vec3::new(40.0, 0.0, 0.0), Box::new(IdleGenerator)).with_cluster(walker, 0.5));
//!
//! let mut world = MemoryWorld::new();
//! world.upsert_player(PlayerSnapshot::new(PlayerId(1), Vec3::ZERO, 5));
//! for _ in 0..10 {
//!     tracker.tick(0.1, &WorldSnapshot::capture(&world))?;
//!     processor.update(0.1, &mut world);
//! }
//! assert_eq!(world.entity_count(), 2);
//! # Ok::<(), horde_sim::SimError>(())
//! ```

#![deny(unsafe_code)]

pub mod ai;
pub mod config;
pub mod driver;
pub mod event;
pub mod horde;
pub mod populator;
pub mod request;
pub mod snapshot;
pub mod subscription;
pub mod tracker;

pub use config::TrackerConfig;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the simulation.
///
/// Soft failures inside a tick (no spawn position, population full, stale
/// entities) are logged and absorbed; only the conditions below surface.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A configuration value is out of range.
    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// The configuration document could not be parsed.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The request processor was dropped or shut down.
    #[error("main-thread request processor is closed")]
    ProcessorClosed,

    /// The tracker was dropped; its handle can no longer queue commands.
    #[error("world horde tracker is closed")]
    TrackerClosed,

    /// Two horde kinds were registered under one id.
    #[error("horde kind `{kind}` is already registered")]
    DuplicateKind { kind: &'static str },

    /// A worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The tracker thread could not be started.
    #[error("failed to spawn tracker thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// A tracker tick panicked; the tracker is gone.
    #[error("tracker tick panicked")]
    TrackerPanicked,
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::ai::{
        AiAgent, AiCommand, CommandGenerator, GoToTargetCommand, IdleGenerator, SleepingCommand,
        WanderCommand, WanderingCommandGenerator,
    };
    pub use crate::config::{FeralSense, TrackerConfig};
    pub use crate::driver::TrackerDriver;
    pub use crate::event::{WorldEventReport, WorldEventReporter, WorldEventSender};
    pub use crate::horde::{
        ClassEntry, ClusterId, EntityGenerator, HordeBlueprint, HordeCharacteristics, HordeCluster, HordeEvent, HordeId,
        HordeKind, HordeKindId, HordeKindRegistry, PlayerHordeGroup, SpawnConditions, SpawnState, UniformHordeKind, WorldHorde,
    };
    pub use crate::populator::{HordePopulator, WildernessHordePopulator, WorldHordePopulator};
    pub use crate::request::{BoxedRequest, MainThreadRequest, RequestKind, RequestProcessor, RequestSender};
    pub use crate::snapshot::{ClusterSnapshot, ClusterTable, TrackerSnapshot};
    pub use crate::subscription::{Subscriber, Subscription};
    pub use crate::tracker::{TrackerDiagnostics, TrackerHandle, WorldHordeTracker, WorldSnapshot};
    pub use crate::SimError;
}
