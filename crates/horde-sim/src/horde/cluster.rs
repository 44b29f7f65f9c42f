//! Kind-tagged sub-populations of a horde.
//!
//! A cluster moves through
//! `Despawned -> SpawningRequested -> Spawning -> Spawned -> Despawned`.
//! The state lives in a [`SpawnStateCell`] shared with the in-flight spawn
//! request, so the request can observe a despawn and stop early.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::entity::{ClusterEntity, ClusterEntityId};
use super::kind::{HordeKind, HordeKindId};
use crate::subscription::Subscriber;

/// Tracker-assigned cluster id. Stable across merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClusterId(pub u64);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Spawn state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum SpawnState {
    Despawned = 0,
    SpawningRequested = 1,
    Spawning = 2,
    Spawned = 3,
}

impl SpawnState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SpawnState::SpawningRequested,
            2 => SpawnState::Spawning,
            3 => SpawnState::Spawned,
            _ => SpawnState::Despawned,
        }
    }

    /// `true` for the two in-flight spawn states.
    pub fn is_spawning(self) -> bool {
        matches!(self, SpawnState::SpawningRequested | SpawnState::Spawning)
    }
}

/// Atomic spawn state shared between a cluster and its spawn request.
#[derive(Debug, Clone)]
pub struct SpawnStateCell(Arc<AtomicU8>);

impl SpawnStateCell {
    pub fn new(state: SpawnState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub fn load(&self) -> SpawnState {
        SpawnState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: SpawnState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to` if the state is still `from`.
    pub fn transition(&self, from: SpawnState, to: SpawnState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Progress of one spawn batch, published by the spawn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SpawnProgress {
    pub spawned: usize,
    pub remaining: usize,
    pub complete: bool,
}

/// Outcome of polling a cluster's in-flight spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnPoll {
    /// No spawn in flight.
    Idle,
    /// Still running.
    Pending,
    /// Finished with every planned entity.
    Spawned,
    /// Finished with nothing spawned; the cluster is back to `Despawned`.
    Failed,
    /// Finished early with some entities live.
    Partial { spawned: usize, remaining: usize },
}

// ---------------------------------------------------------------------------
// Density
// ---------------------------------------------------------------------------

/// Cluster density with per-batch kill accounting.
///
/// When a batch of `N` entities is spawned from density `D`, each kill
/// lowers the density to `D * (N - k) / N`; after `N` kills it is exactly
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterDensity {
    value: f32,
    batch_density: f32,
    batch_size: usize,
    killed: usize,
}

impl ClusterDensity {
    pub fn new(value: f32) -> Self {
        let value = value.max(0.0);
        Self {
            value,
            batch_density: value,
            batch_size: 0,
            killed: 0,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Start a batch of `size` entities from the current density.
    pub fn begin_batch(&mut self, size: usize) {
        self.batch_density = self.value;
        self.batch_size = size;
        self.killed = 0;
    }

    /// One member of the current batch was killed.
    pub fn record_kill(&mut self) {
        if self.batch_size == 0 {
            return;
        }
        self.killed = (self.killed + 1).min(self.batch_size);
        self.value = if self.killed == self.batch_size {
            0.0
        } else {
            self.batch_density * (self.batch_size - self.killed) as f32 / self.batch_size as f32
        };
    }

    /// A batch that finished with fewer members than planned stands for the
    /// whole density; killing every member that landed clears it.
    pub fn shrink_batch(&mut self, size: usize) {
        if size > 0 && size < self.batch_size {
            self.batch_size = size;
            self.killed = self.killed.min(size);
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn killed(&self) -> usize {
        self.killed
    }

    /// Wear the density down by `amount`, stopping at zero. Any batch in
    /// flight is forgotten; decay only applies while nothing is spawned.
    pub fn decay(&mut self, amount: f32) {
        *self = Self::new(self.value - amount.max(0.0));
    }
}

// ---------------------------------------------------------------------------
// HordeCluster
// ---------------------------------------------------------------------------

/// A kind-tagged group of entities inside a horde.
pub struct HordeCluster {
    id: ClusterId,
    kind: Arc<dyn HordeKind>,
    density: ClusterDensity,
    state: SpawnStateCell,
    entities: Vec<ClusterEntity>,
    progress: Option<Subscriber<SpawnProgress>>,
    failures: u32,
    retry_at_tick: u64,
    fresh_batch: bool,
}

impl HordeCluster {
    pub fn new(id: ClusterId, kind: Arc<dyn HordeKind>, density: f32) -> Self {
        Self {
            id,
            kind,
            density: ClusterDensity::new(density),
            state: SpawnStateCell::new(SpawnState::Despawned),
            entities: Vec::new(),
            progress: None,
            failures: 0,
            retry_at_tick: 0,
            fresh_batch: false,
        }
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn kind(&self) -> &Arc<dyn HordeKind> {
        &self.kind
    }

    pub fn kind_id(&self) -> HordeKindId {
        self.kind.id()
    }

    pub fn density(&self) -> f32 {
        self.density.value()
    }

    pub fn density_state(&self) -> &ClusterDensity {
        &self.density
    }

    pub fn state(&self) -> SpawnState {
        self.state.load()
    }

    pub(crate) fn state_cell(&self) -> &SpawnStateCell {
        &self.state
    }

    pub fn is_spawned(&self) -> bool {
        self.state() == SpawnState::Spawned
    }

    pub fn is_spawning(&self) -> bool {
        self.state().is_spawning()
    }

    /// A cluster with no density left is dead and gets removed.
    pub fn is_dead(&self) -> bool {
        self.density.value() <= f32::EPSILON
    }

    pub fn decay(&mut self, amount: f32) {
        self.density.decay(amount);
    }

    pub fn entities(&self) -> &[ClusterEntity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut [ClusterEntity] {
        &mut self.entities
    }

    pub fn entity_mut(&mut self, id: ClusterEntityId) -> Option<&mut ClusterEntity> {
        self.entities.iter_mut().find(|e| e.id() == id)
    }

    pub fn add_entity(&mut self, entity: ClusterEntity) {
        self.entities.push(entity);
    }

    /// Remove a member. A kill also lowers the density.
    pub fn remove_entity(&mut self, id: ClusterEntityId, killed: bool) -> Option<ClusterEntity> {
        let index = self.entities.iter().position(|e| e.id() == id)?;
        let removed = self.entities.remove(index);
        if killed {
            self.density.record_kill();
        }
        Some(removed)
    }

    pub(crate) fn clear_entities(&mut self) -> Vec<ClusterEntity> {
        std::mem::take(&mut self.entities)
    }

    /// `true` once the retry backoff after a failed spawn has elapsed.
    pub fn can_retry(&self, tick: u64) -> bool {
        tick >= self.retry_at_tick
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Mark a spawn request of `batch_size` entities as submitted.
    ///
    /// A batch only starts from an empty, despawned cluster; a cluster that
    /// still remembers members keeps its batch accounting.
    pub(crate) fn begin_spawn(&mut self, progress: Subscriber<SpawnProgress>, batch_size: usize) {
        self.fresh_batch = self.state() == SpawnState::Despawned && self.entities.is_empty();
        if self.fresh_batch {
            self.density.begin_batch(batch_size);
        }
        self.state.store(SpawnState::SpawningRequested);
        self.progress = Some(progress);
    }

    /// Check the in-flight spawn and apply its outcome.
    pub fn poll_spawn(&mut self, tick: u64, max_backoff_ticks: u32) -> SpawnPoll {
        let Some(progress) = self.progress.as_ref() else {
            return SpawnPoll::Idle;
        };
        let Some(latest) = progress.latest() else {
            return SpawnPoll::Pending;
        };
        if !latest.complete {
            return SpawnPoll::Pending;
        }
        self.progress = None;

        if latest.spawned == 0 {
            self.state.store(SpawnState::Despawned);
            self.failures = self.failures.saturating_add(1);
            let backoff = 2u64
                .saturating_pow(self.failures)
                .min(u64::from(max_backoff_ticks.max(1)));
            self.retry_at_tick = tick + backoff;
            debug!(cluster = %self.id, failures = self.failures, backoff, "spawn produced nothing");
            return SpawnPoll::Failed;
        }

        self.state.store(SpawnState::Spawned);
        self.failures = 0;
        if self.fresh_batch {
            self.density.shrink_batch(latest.spawned);
        }
        if latest.remaining > 0 {
            SpawnPoll::Partial {
                spawned: latest.spawned,
                remaining: latest.remaining,
            }
        } else {
            SpawnPoll::Spawned
        }
    }

    /// Force the cluster to `Despawned`, abandoning any in-flight spawn.
    pub(crate) fn mark_despawned(&mut self) {
        self.state.store(SpawnState::Despawned);
        self.progress = None;
    }

    /// Split off a new cluster holding `amount` of this cluster's density.
    pub(crate) fn split_off(&mut self, id: ClusterId, amount: f32) -> HordeCluster {
        let amount = amount.clamp(0.0, self.density.value());
        self.density = ClusterDensity::new(self.density.value() - amount);
        HordeCluster::new(id, Arc::clone(&self.kind), amount)
    }
}

impl fmt::Debug for HordeCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HordeCluster")
            .field("id", &self.id)
            .field("kind", &self.kind.id())
            .field("density", &self.density.value())
            .field("state", &self.state())
            .field("entities", &self.entities.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horde::kind::UniformHordeKind;
    use crate::subscription::Subscription;
    use horde_world::entity::EntityClassId;

    fn cluster(density: f32) -> HordeCluster {
        HordeCluster::new(
            ClusterId(1),
            Arc::new(UniformHordeKind::new("test", vec![EntityClassId(1)])),
            density,
        )
    }

    #[test]
    fn shrunk_batch_clears_density_after_its_own_kills() {
        let mut d = ClusterDensity::new(4.0);
        d.begin_batch(8);
        d.shrink_batch(2);
        d.record_kill();
        assert_eq!(d.value(), 2.0);
        d.record_kill();
        assert_eq!(d.value(), 0.0);
        // Growing is never allowed.
        d.shrink_batch(10);
        assert_eq!(d.batch_size(), 2);
    }

    #[test]
    fn decay_clamps_at_zero_and_kills_the_cluster() {
        let mut c = cluster(0.5);
        c.decay(0.2);
        assert!((c.density() - 0.3).abs() < 1e-6);
        assert!(!c.is_dead());
        c.decay(1.0);
        assert_eq!(c.density(), 0.0);
        assert!(c.is_dead());
        c.decay(-3.0);
        assert_eq!(c.density(), 0.0);
    }

    #[test]
    fn density_decrements_per_kill_and_hits_zero() {
        let mut d = ClusterDensity::new(2.0);
        d.begin_batch(4);
        d.record_kill();
        assert_eq!(d.value(), 1.5);
        d.record_kill();
        d.record_kill();
        assert_eq!(d.value(), 0.5);
        d.record_kill();
        assert_eq!(d.value(), 0.0);
        // Extra kills beyond the batch change nothing.
        d.record_kill();
        assert_eq!(d.value(), 0.0);
    }

    #[test]
    fn kills_without_a_batch_are_ignored() {
        let mut d = ClusterDensity::new(1.0);
        d.record_kill();
        assert_eq!(d.value(), 1.0);
    }

    #[test]
    fn state_cell_transition_is_conditional() {
        let cell = SpawnStateCell::new(SpawnState::SpawningRequested);
        let shared = cell.clone();
        assert!(shared.transition(SpawnState::SpawningRequested, SpawnState::Spawning));
        assert_eq!(cell.load(), SpawnState::Spawning);
        cell.store(SpawnState::Despawned);
        assert!(!shared.transition(SpawnState::SpawningRequested, SpawnState::Spawning));
    }

    #[test]
    fn failed_spawn_backs_off_exponentially_up_to_cap() {
        let mut c = cluster(1.0);
        let mut retry_ticks = Vec::new();
        for tick in [0u64, 100, 200, 300, 400, 500, 600] {
            let slot = Subscription::new();
            c.begin_spawn(slot.subscribe(), 4);
            slot.publish(SpawnProgress {
                spawned: 0,
                remaining: 4,
                complete: true,
            });
            assert_eq!(c.poll_spawn(tick, 32), SpawnPoll::Failed);
            assert_eq!(c.state(), SpawnState::Despawned);
            retry_ticks.push(c.retry_at_tick - tick);
        }
        assert_eq!(retry_ticks, vec![2, 4, 8, 16, 32, 32, 32]);
        assert!(!c.can_retry(601));
        assert!(c.can_retry(632));
    }

    #[test]
    fn complete_spawn_resets_failures() {
        let mut c = cluster(1.0);
        let slot = Subscription::new();
        c.begin_spawn(slot.subscribe(), 4);
        assert_eq!(c.state(), SpawnState::SpawningRequested);
        assert_eq!(c.poll_spawn(0, 32), SpawnPoll::Pending);
        slot.publish(SpawnProgress {
            spawned: 4,
            remaining: 0,
            complete: true,
        });
        assert_eq!(c.poll_spawn(0, 32), SpawnPoll::Spawned);
        assert_eq!(c.state(), SpawnState::Spawned);
        assert_eq!(c.poll_spawn(1, 32), SpawnPoll::Idle);
    }

    #[test]
    fn partial_spawn_is_reported() {
        let mut c = cluster(1.0);
        let slot = Subscription::new();
        c.begin_spawn(slot.subscribe(), 4);
        slot.publish(SpawnProgress {
            spawned: 1,
            remaining: 3,
            complete: true,
        });
        assert_eq!(
            c.poll_spawn(0, 32),
            SpawnPoll::Partial {
                spawned: 1,
                remaining: 3
            }
        );
    }

    #[test]
    fn split_off_conserves_density() {
        let mut c = cluster(7.0);
        let piece = c.split_off(ClusterId(2), 3.0);
        assert_eq!(piece.density() + c.density(), 7.0);
        assert_eq!(piece.kind_id(), c.kind_id());
    }
}
