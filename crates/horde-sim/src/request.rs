//! Main-thread request processing.
//!
//! Background work never touches the live world. Instead it builds request
//! objects and submits them through a [`RequestSender`]; the one thread that
//! owns the live world drives a [`RequestProcessor`], which calls each
//! request's [`tick_execute`](MainThreadRequest::tick_execute) once per frame
//! until the request reports [`is_done`](MainThreadRequest::is_done), then
//! calls [`on_cleanup`](MainThreadRequest::on_cleanup) exactly once and drops
//! it.
//!
//! Requests run in submission order (FIFO) within a frame. A request that
//! needs many frames (a 40-entity spawn batch) keeps its own progress state
//! between calls.
//!
//! # Example
//!
//! ```
//! use horde_sim::request::{MainThreadRequest, RequestContext, RequestKind, RequestProcessor};
//! use horde_world::prelude::*;
//!
//! struct CountDown(u32);
//!
//! impl MainThreadRequest for CountDown {
//!     fn kind(&self) -> RequestKind { RequestKind::Blocking }
//!     fn is_done(&self) -> bool { self.0 == 0 }
//!     fn tick_execute(&mut self, _ctx: &mut RequestContext<'_>) { self.0 -= 1; }
//! }
//!
//! let mut world = MemoryWorld::new();
//! let mut processor = RequestProcessor::new();
//! processor.sender().submit(Box::new(CountDown(3))).unwrap();
//!
//! processor.update(0.05, &mut world);
//! processor.update(0.05, &mut world);
//! assert_eq!(processor.active_len(), 1);
//! processor.update(0.05, &mut world);
//! assert_eq!(processor.active_len(), 0);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crossbeam_channel::{Receiver, Sender};
use horde_world::live::LiveWorld;
use serde::Serialize;
use tracing::{debug, warn};

use crate::SimError;

// ---------------------------------------------------------------------------
// RequestKind
// ---------------------------------------------------------------------------

/// Category of a request, used for per-kind counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RequestKind {
    ClusterSpawn,
    HordeDespawn,
    EntitySpawn,
    EntityDespawn,
    PositionUpdate,
    EntityAi,
    Blocking,
}

// ---------------------------------------------------------------------------
// MainThreadRequest
// ---------------------------------------------------------------------------

/// Live-world access handed to requests while they execute.
pub struct RequestContext<'a> {
    pub world: &'a mut dyn LiveWorld,
    /// Seconds since the previous processor update.
    pub dt: f32,
}

/// A unit of work that must run on the live-world thread.
pub trait MainThreadRequest: Send {
    fn kind(&self) -> RequestKind;

    /// `true` once no further `tick_execute` calls are needed.
    fn is_done(&self) -> bool;

    /// Advance the request by one frame.
    fn tick_execute(&mut self, ctx: &mut RequestContext<'_>);

    /// Called exactly once, after `is_done` first returns `true`.
    fn on_cleanup(&mut self, _ctx: &mut RequestContext<'_>) {}
}

/// Owned, type-erased request.
pub type BoxedRequest = Box<dyn MainThreadRequest>;

// ---------------------------------------------------------------------------
// RequestSender
// ---------------------------------------------------------------------------

/// Thread-safe submission handle. Cheap to clone.
#[derive(Clone)]
pub struct RequestSender {
    tx: Sender<BoxedRequest>,
}

impl RequestSender {
    /// Queue a request for the live thread.
    pub fn submit(&self, request: BoxedRequest) -> Result<(), SimError> {
        self.tx.send(request).map_err(|_| SimError::ProcessorClosed)
    }

    /// Queue many requests, preserving their order.
    pub fn submit_all(&self, requests: impl IntoIterator<Item = BoxedRequest>) -> Result<usize, SimError> {
        let mut count = 0;
        for request in requests {
            self.submit(request)?;
            count += 1;
        }
        Ok(count)
    }

    /// Run `job` on the live thread and wait for its result.
    ///
    /// Must not be called from the thread that drives the processor: that
    /// thread would wait on itself.
    pub fn run_blocking<R, F>(&self, job: F) -> Result<R, SimError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn LiveWorld) -> R + Send + 'static,
    {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.submit(Box::new(BlockingRequest {
            job: Some(Box::new(move |world: &mut dyn LiveWorld| {
                let _ = done_tx.send(job(world));
            })),
        }))?;
        done_rx.recv().map_err(|_| SimError::ProcessorClosed)
    }
}

impl fmt::Debug for RequestSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSender")
            .field("queued", &self.tx.len())
            .finish()
    }
}

type BlockingJob = Box<dyn FnOnce(&mut dyn LiveWorld) + Send>;

/// Runs one closure on the live thread, then finishes.
struct BlockingRequest {
    job: Option<BlockingJob>,
}

impl MainThreadRequest for BlockingRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::Blocking
    }

    fn is_done(&self) -> bool {
        self.job.is_none()
    }

    fn tick_execute(&mut self, ctx: &mut RequestContext<'_>) {
        if let Some(job) = self.job.take() {
            job(ctx.world);
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessReport
// ---------------------------------------------------------------------------

/// Summary of the last [`RequestProcessor::update`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Requests moved from the submission queue into the active list.
    pub received: usize,
    /// `tick_execute` calls made.
    pub executed: usize,
    /// Requests cleaned up and dropped.
    pub completed: usize,
    /// Requests still active afterwards.
    pub active: usize,
}

// ---------------------------------------------------------------------------
// RequestProcessor
// ---------------------------------------------------------------------------

/// Single consumer of all live-world requests.
pub struct RequestProcessor {
    tx: Sender<BoxedRequest>,
    rx: Receiver<BoxedRequest>,
    active: Vec<BoxedRequest>,
    last_report: ProcessReport,
}

impl RequestProcessor {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            active: Vec::new(),
            last_report: ProcessReport::default(),
        }
    }

    /// A new submission handle.
    pub fn sender(&self) -> RequestSender {
        RequestSender {
            tx: self.tx.clone(),
        }
    }

    /// Run one frame of request work against the live world.
    pub fn update(&mut self, dt: f32, world: &mut dyn LiveWorld) -> &ProcessReport {
        let mut report = ProcessReport::default();
        while let Ok(request) = self.rx.try_recv() {
            self.active.push(request);
            report.received += 1;
        }

        let mut ctx = RequestContext { world, dt };
        let mut still_active = Vec::with_capacity(self.active.len());
        for mut request in self.active.drain(..) {
            if !request.is_done() {
                request.tick_execute(&mut ctx);
                report.executed += 1;
            }
            if request.is_done() {
                request.on_cleanup(&mut ctx);
                report.completed += 1;
            } else {
                still_active.push(request);
            }
        }
        self.active = still_active;
        report.active = self.active.len();

        self.last_report = report;
        &self.last_report
    }

    pub fn last_report(&self) -> &ProcessReport {
        &self.last_report
    }

    /// Requests currently in the active list.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Requests submitted but not yet picked up by an update.
    pub fn queued_len(&self) -> usize {
        self.rx.len()
    }

    /// Active requests per kind.
    pub fn counts(&self) -> BTreeMap<RequestKind, usize> {
        let mut counts = BTreeMap::new();
        for request in &self.active {
            *counts.entry(request.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Drop every active and queued request without running cleanup.
    pub fn shutdown(&mut self) {
        let queued = self.rx.try_iter().count();
        let active = self.active.len();
        self.active.clear();
        if queued + active > 0 {
            warn!(active, queued, "request processor shut down with pending work");
        } else {
            debug!("request processor shut down");
        }
    }
}

impl Default for RequestProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestProcessor")
            .field("active", &self.active.len())
            .field("queued", &self.rx.len())
            .field("last_report", &self.last_report)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
