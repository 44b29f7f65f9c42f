//! Background runner for the tracker.
//!
//! The live-world thread owns a [`TrackerDriver`] and calls
//! [`TrackerDriver::update`] once per frame, next to
//! [`RequestProcessor::update`](crate::request::RequestProcessor::update).
//! When a tick is due the driver captures a [`WorldSnapshot`] and moves the
//! tracker onto a named thread for one tick; the tracker comes back when the
//! thread is joined. It is never shared, so no lock guards it.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use horde_world::live::LiveWorld;
use tracing::{debug, error};

use crate::tracker::{TrackerDiagnostics, WorldHordeTracker, WorldSnapshot};
use crate::SimError;

type TickResult = (Box<WorldHordeTracker>, Result<TrackerDiagnostics, SimError>);

enum DriverState {
    Idle(Box<WorldHordeTracker>),
    Running(JoinHandle<TickResult>),
    /// A tick panicked and took the tracker with it.
    Poisoned,
}

/// Runs [`WorldHordeTracker::tick`] on a background thread at a fixed
/// interval.
pub struct TrackerDriver {
    state: DriverState,
    interval: Duration,
    last_start: Option<Instant>,
    ticks_started: u64,
}

impl TrackerDriver {
    /// Drive `tracker` at its configured `tick_interval_ms`.
    pub fn new(tracker: WorldHordeTracker) -> Self {
        let interval = Duration::from_millis(tracker.config().tick_interval_ms);
        Self {
            state: DriverState::Idle(Box::new(tracker)),
            interval,
            last_start: None,
            ticks_started: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, DriverState::Running(_))
    }

    pub fn ticks_started(&self) -> u64 {
        self.ticks_started
    }

    /// Collect a finished tick and start the next one if it is due.
    ///
    /// Returns the diagnostics of the tick collected by this call, if any.
    /// Ticks always advance by the configured interval, so the horde
    /// simulation does not depend on how late a tick was collected.
    pub fn update(&mut self, world: &dyn LiveWorld) -> Result<Option<TrackerDiagnostics>, SimError> {
        let mut collected = None;
        if let DriverState::Running(handle) = &self.state {
            if handle.is_finished() {
                collected = Some(self.collect()?);
            }
        }

        let due = self
            .last_start
            .map_or(true, |started| started.elapsed() >= self.interval);
        if due && matches!(self.state, DriverState::Idle(_)) {
            self.start(WorldSnapshot::capture(world))?;
        }

        match collected {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }

    /// Move the tracker onto a fresh thread. A failed spawn drops the
    /// tracker and leaves the driver poisoned.
    fn start(&mut self, snapshot: WorldSnapshot) -> Result<(), SimError> {
        let DriverState::Idle(mut tracker) = std::mem::replace(&mut self.state, DriverState::Poisoned) else {
            return Ok(());
        };
        let dt = self.interval.as_secs_f32();
        let handle = thread::Builder::new()
            .name("horde-tracker".into())
            .spawn(move || {
                let result = tracker.tick(dt, &snapshot).cloned();
                (tracker, result)
            })
            .map_err(|err| {
                error!(%err, "failed to spawn tracker thread; driver poisoned");
                SimError::ThreadSpawn(err)
            })?;
        self.state = DriverState::Running(handle);
        self.last_start = Some(Instant::now());
        self.ticks_started += 1;
        Ok(())
    }

    /// Join the running tick; the outer error means the tracker is lost.
    fn collect(&mut self) -> Result<Result<TrackerDiagnostics, SimError>, SimError> {
        let DriverState::Running(handle) = std::mem::replace(&mut self.state, DriverState::Poisoned) else {
            return Err(SimError::TrackerPanicked);
        };
        match handle.join() {
            Ok((tracker, result)) => {
                if let Ok(diagnostics) = &result {
                    debug!(
                        tick = diagnostics.tick,
                        hordes = diagnostics.hordes,
                        requests = diagnostics.requests_submitted,
                        "tracker tick collected"
                    );
                }
                self.state = DriverState::Idle(tracker);
                Ok(result)
            }
            Err(_) => {
                error!("tracker tick panicked; driver poisoned");
                Err(SimError::TrackerPanicked)
            }
        }
    }

    /// Wait for any running tick and hand the tracker back.
    pub fn join(mut self) -> Result<WorldHordeTracker, SimError> {
        if self.is_running() {
            // Tick errors are already logged by the tracker; the tracker
            // itself is still usable.
            let _ = self.collect()?;
        }
        match self.state {
            DriverState::Idle(tracker) => Ok(*tracker),
            DriverState::Running(_) | DriverState::Poisoned => Err(SimError::TrackerPanicked),
        }
    }
}

impl std::fmt::Debug for TrackerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            DriverState::Idle(_) => "idle",
            DriverState::Running(_) => "running",
            DriverState::Poisoned => "poisoned",
        };
        f.debug_struct("TrackerDriver")
            .field("state", &state)
            .field("interval", &self.interval)
            .field("ticks_started", &self.ticks_started)
            .finish()
    }
}
