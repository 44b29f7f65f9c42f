//! World events that draw hordes.
//!
//! Noise in the world (gunfire, explosions, screamers) is reported with an
//! interest level. The [`WorldEventReporter`] stores interest per chunk,
//! spreads a weakened share to neighbouring chunks, lets it decay over time
//! and turns each fresh report into a [`WorldEventReport`]: a location, the
//! chunk's aggregated interest, and the distance from which hordes notice it.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use horde_sim::event::WorldEventReporter;
//!
//! let mut reporter = WorldEventReporter::new(8192.0, 3, 0.25);
//! let sender = reporter.sender();
//! sender.report(Vec3::new(100.0, 0.0, 100.0), 40.0);
//!
//! let reports = reporter.update(0.0);
//! assert_eq!(reports.len(), 1);
//! assert_eq!(reports[0].interest, 40.0);
//! assert!(reports[0].distance > 0.0);
//! ```

use std::collections::BTreeMap;

use crossbeam_channel::{Receiver, Sender};
use glam::Vec3;
use horde_world::geometry::ChunkPos;
use serde::Serialize;
use tracing::trace;

/// Seconds scale of the quadratic interest decay.
const TIME_SCALE: f32 = 10.0;

/// Interest at which a chunk saturates.
const INTEREST_CAP: f32 = 100.0;

// ---------------------------------------------------------------------------
// WorldEvent
// ---------------------------------------------------------------------------

/// Interest stored for one chunk.
///
/// Interest decays as `I - ln(I + 1) / TIME_SCALE * t^2` and is forgotten
/// once that reaches zero.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldEvent {
    location: Vec3,
    interest: f32,
    strength: f32,
    ignore_cap: bool,
    time: f64,
    lifetime: f64,
}

impl WorldEvent {
    pub fn new(location: Vec3, interest: f32, time: f64) -> Self {
        let mut event = Self {
            location,
            interest: 0.0,
            strength: 1.0,
            ignore_cap: false,
            time,
            lifetime: 0.0,
        };
        event.set_interest(interest.max(0.0));
        event
    }

    /// Share of another event's interest, weakened by `strength`.
    fn echo(location: Vec3, interest: f32, strength: f32, ignore_cap: bool, time: f64) -> Self {
        let mut event = Self::new(location, interest * strength, time);
        event.strength = strength;
        event.ignore_cap = ignore_cap;
        event
    }

    /// Let this event push a chunk past the usual interest cap.
    pub fn ignoring_cap(mut self) -> Self {
        self.ignore_cap = true;
        self
    }

    pub fn location(&self) -> Vec3 {
        self.location
    }

    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::containing(self.location)
    }

    /// Decayed interest at world time `now`.
    pub fn interest_at(&self, now: f64) -> f32 {
        let elapsed = (now - self.time).max(0.0) as f32;
        let slope = -((self.interest + 1.0).ln() / TIME_SCALE);
        (slope * elapsed * elapsed + self.interest).max(0.0)
    }

    pub fn has_lost_interest(&self, now: f64) -> bool {
        now - self.time > self.lifetime
    }

    /// Fold a newer event for the same chunk into this one.
    pub fn add(&mut self, other: &WorldEvent) {
        let sum = self.interest + other.interest;
        let cap = if other.ignore_cap {
            sum.max(INTEREST_CAP) * other.strength
        } else if other.strength < 1.0 {
            INTEREST_CAP * other.strength
        } else {
            INTEREST_CAP
        };
        self.set_interest(sum.min(cap).max(self.interest));
        self.time = self.time.max(other.time);
    }

    fn set_interest(&mut self, interest: f32) {
        self.interest = interest;
        let ln = (interest + 1.0).ln();
        self.lifetime = if ln > 0.0 {
            f64::from(TIME_SCALE * interest / ln).sqrt()
        } else {
            0.0
        };
    }
}

// ---------------------------------------------------------------------------
// WorldEventReport
// ---------------------------------------------------------------------------

/// An event hordes may react to this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorldEventReport {
    pub location: Vec3,
    pub interest: f32,
    /// Hordes within `distance * sensitivity` go and look.
    pub distance: f32,
}

/// Thread-safe handle for reporting events. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WorldEventSender {
    tx: Sender<(Vec3, f32)>,
}

impl WorldEventSender {
    /// Report noise of `interest` at `location`. Picked up on the next
    /// reporter update.
    pub fn report(&self, location: Vec3, interest: f32) {
        // A closed channel means the tracker is gone.
        let _ = self.tx.send((location, interest));
    }
}

// ---------------------------------------------------------------------------
// WorldEventReporter
// ---------------------------------------------------------------------------

/// Per-chunk interest store.
#[derive(Debug)]
pub struct WorldEventReporter {
    tx: Sender<(Vec3, f32)>,
    rx: Receiver<(Vec3, f32)>,
    history: BTreeMap<ChunkPos, WorldEvent>,
    chunk_radius: i32,
    distance_multiplier: f32,
    map_size_ln: f64,
    map_scale: f64,
}

impl WorldEventReporter {
    pub fn new(map_size: f32, chunk_radius: i32, distance_multiplier: f32) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let map_size_ln = f64::from(map_size.max(1.0)).ln();
        Self {
            tx,
            rx,
            history: BTreeMap::new(),
            chunk_radius: chunk_radius.max(0),
            distance_multiplier,
            map_size_ln,
            map_scale: 2f64.powf(map_size_ln),
        }
    }

    pub fn sender(&self) -> WorldEventSender {
        WorldEventSender { tx: self.tx.clone() }
    }

    /// Chunks currently holding interest.
    pub fn tracked_chunks(&self) -> usize {
        self.history.len()
    }

    pub fn interest_at(&self, chunk: ChunkPos, now: f64) -> Option<f32> {
        self.history.get(&chunk).map(|e| e.interest_at(now))
    }

    /// Store everything reported since the last update, forget decayed
    /// chunks, and return one report per event received.
    pub fn update(&mut self, now: f64) -> Vec<WorldEventReport> {
        let mut fresh = Vec::new();
        while let Ok((location, interest)) = self.rx.try_recv() {
            self.store(WorldEvent::new(location, interest, now));
            fresh.push(location);
        }

        let before = self.history.len();
        self.history.retain(|_, event| !event.has_lost_interest(now));
        if self.history.len() != before {
            trace!(forgotten = before - self.history.len(), "world events decayed");
        }

        fresh
            .into_iter()
            .filter_map(|location| {
                let interest = self.history.get(&ChunkPos::containing(location))?.interest_at(now);
                Some(WorldEventReport {
                    location,
                    interest,
                    distance: self.interest_distance(interest),
                })
            })
            .collect()
    }

    /// Store an event and its weakened echoes in the surrounding chunks.
    pub fn store(&mut self, event: WorldEvent) {
        let center = event.chunk();
        let r = self.chunk_radius;
        for dx in -r..=r {
            for dz in -r..=r {
                if dx == 0 && dz == 0 {
                    continue;
                }
                let strength = 1.0 - (dx.abs() + dz.abs()) as f32 / (2 * (r + 1)) as f32;
                let echo = WorldEvent::echo(event.location, event.interest, strength, event.ignore_cap, event.time);
                self.merge_into(center.offset(dx, dz), echo);
            }
        }
        self.merge_into(center, event);
    }

    fn merge_into(&mut self, chunk: ChunkPos, event: WorldEvent) {
        match self.history.get_mut(&chunk) {
            Some(existing) => existing.add(&event),
            None => {
                self.history.insert(chunk, event);
            }
        }
    }

    /// Distance from which hordes notice an event of `interest`.
    pub fn interest_distance(&self, interest: f32) -> f32 {
        let offset = self.map_size_ln + 100f64.ln();
        let distance = self.map_scale * (f64::from(interest) / 100.0) + offset;
        (distance * f64::from(self.distance_multiplier)) as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_decays_quadratically_and_expires() {
        let event = WorldEvent::new(Vec3::ZERO, 50.0, 0.0);
        assert_eq!(event.interest_at(0.0), 50.0);
        let one = event.interest_at(1.0);
        let two = event.interest_at(2.0);
        assert!(one < 50.0);
        // Quadratic: four times the loss after twice the time.
        assert!(((50.0 - two) - 4.0 * (50.0 - one)).abs() < 1e-3);
        assert!(!event.has_lost_interest(5.0));
        assert!(event.has_lost_interest(100.0));
    }

    #[test]
    fn chunk_interest_is_capped() {
        let mut a = WorldEvent::new(Vec3::ZERO, 80.0, 0.0);
        a.add(&WorldEvent::new(Vec3::ZERO, 80.0, 1.0));
        assert_eq!(a.interest_at(1.0), 100.0);

        let mut b = WorldEvent::new(Vec3::ZERO, 80.0, 0.0);
        b.add(&WorldEvent::new(Vec3::ZERO, 80.0, 0.0).ignoring_cap());
        assert_eq!(b.interest_at(0.0), 160.0);
    }

    #[test]
    fn events_spread_to_neighbouring_chunks() {
        let mut reporter = WorldEventReporter::new(8192.0, 3, 0.25);
        reporter.store(WorldEvent::new(Vec3::new(8.0, 0.0, 8.0), 60.0, 0.0));
        assert_eq!(reporter.tracked_chunks(), 49);
        let center = reporter.interest_at(ChunkPos::new(0, 0), 0.0).unwrap();
        let near = reporter.interest_at(ChunkPos::new(1, 0), 0.0).unwrap();
        let far = reporter.interest_at(ChunkPos::new(3, 3), 0.0).unwrap();
        assert_eq!(center, 60.0);
        assert!(near < center && far < near);
        assert!(reporter.interest_at(ChunkPos::new(4, 0), 0.0).is_none());
    }

    #[test]
    fn overlapping_reports_accumulate() {
        let mut reporter = WorldEventReporter::new(8192.0, 1, 0.25);
        let sender = reporter.sender();
        sender.report(Vec3::new(1.0, 0.0, 1.0), 20.0);
        reporter.update(0.0);
        sender.report(Vec3::new(2.0, 0.0, 2.0), 20.0);
        let reports = reporter.update(0.0);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].interest, 40.0);
    }

    #[test]
    fn interest_distance_grows_with_interest() {
        let reporter = WorldEventReporter::new(8192.0, 3, 0.25);
        let low = reporter.interest_distance(10.0);
        let high = reporter.interest_distance(100.0);
        assert!(low > 0.0);
        assert!(high > low);
    }

    #[test]
    fn decayed_chunks_are_forgotten() {
        let mut reporter = WorldEventReporter::new(8192.0, 0, 0.25);
        reporter.sender().report(Vec3::ZERO, 10.0);
        reporter.update(0.0);
        assert_eq!(reporter.tracked_chunks(), 1);
        reporter.update(1_000.0);
        assert_eq!(reporter.tracked_chunks(), 0);
    }
}
