//! Main-thread requests issued by hordes, and the events they send back.
//!
//! Hordes never touch the live world. They build these requests during the
//! parallel phase; the request processor runs them on the live thread, and
//! results flow back to the tracker as [`HordeEvent`]s or through
//! subscriptions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use dashmap::DashSet;
use glam::Vec3;
use horde_world::entity::{EntityClassId, EntityId};
use horde_world::geometry::{centroid, distance_xz};
use horde_world::live::{LiveWorld, Liveness, PopulationCategory};
use horde_world::random::{RandomFactory, WorldRandom};
use tracing::{debug, trace, warn};

use super::cluster::{ClusterId, SpawnProgress, SpawnState, SpawnStateCell};
use super::entity::ClusterEntityId;
use super::group::PlayerHordeGroup;
use super::kind::EntityGenerator;
use super::HordeId;
use crate::request::{MainThreadRequest, RequestContext, RequestKind};
use crate::subscription::Subscription;

// ---------------------------------------------------------------------------
// HordeEvent
// ---------------------------------------------------------------------------

/// Results of main-thread requests, drained by the tracker each tick.
///
/// Entity events are addressed by cluster, which stays valid when the
/// cluster changes horde in a merge.
#[derive(Debug, Clone, PartialEq)]
pub enum HordeEvent {
    /// A cluster spawn batch created a new entity.
    EntitySpawned {
        cluster: ClusterId,
        entity: EntityId,
        class: EntityClassId,
        location: Vec3,
    },
    /// A remembered member was respawned, or failed to be (`entity: None`).
    EntityRespawned {
        cluster: ClusterId,
        member: ClusterEntityId,
        entity: Option<EntityId>,
        location: Vec3,
    },
    /// A member's live entity was removed.
    EntityDespawned {
        cluster: ClusterId,
        member: ClusterEntityId,
        location: Option<Vec3>,
    },
    /// A full-horde despawn finished.
    HordeDespawned { horde: HordeId },
}

/// Handles shared by every request that creates or removes entities.
#[derive(Debug, Clone)]
pub struct RequestLinks {
    pub events: Sender<HordeEvent>,
    pub tracked: Arc<DashSet<EntityId>>,
    pub live_entities: Arc<AtomicUsize>,
}

impl RequestLinks {
    fn entity_added(&self, entity: EntityId) {
        self.tracked.insert(entity);
        self.live_entities.fetch_add(1, Ordering::AcqRel);
    }

    fn entity_removed(&self, entity: EntityId) {
        if self.tracked.remove(&entity).is_none() {
            debug!(entity = ?entity, "removed an entity that was not tracked");
        }
        decrement(&self.live_entities);
    }

    fn send(&self, event: HordeEvent) {
        // A closed channel means the tracker is gone; nothing left to update.
        let _ = self.events.send(event);
    }
}

/// Saturating decrement of a live-entity counter.
pub(crate) fn decrement(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
}

// ---------------------------------------------------------------------------
// ClusterSpawnRequest
// ---------------------------------------------------------------------------

/// Placement and pacing limits for spawn batches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnLimits {
    /// Band `(min, max)` from the nearest player in which entities appear.
    pub distance_band: (f32, f32),
    pub spread: f32,
    /// Beyond this distance from every player a batch that cannot find a
    /// position gives up.
    pub view_distance: f32,
    /// Frames between consecutive spawns of one batch.
    pub delay_frames: u32,
    /// Live entities the horde may hold while this batch runs.
    pub max_live: usize,
}

/// Spawns one cluster's batch, one entity every few frames.
pub struct ClusterSpawnRequest {
    cluster: ClusterId,
    state: SpawnStateCell,
    progress: Subscription<SpawnProgress>,
    generator: Box<dyn EntityGenerator>,
    random: Option<WorldRandom>,
    random_factory: Arc<dyn RandomFactory>,
    group: PlayerHordeGroup,
    horde_location: Vec3,
    category: PopulationCategory,
    limits: SpawnLimits,
    links: RequestLinks,
    size: usize,
    index: usize,
    cooldown: u32,
    finished: bool,
}

impl ClusterSpawnRequest {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cluster: ClusterId,
        state: SpawnStateCell,
        progress: Subscription<SpawnProgress>,
        generator: Box<dyn EntityGenerator>,
        random: WorldRandom,
        random_factory: Arc<dyn RandomFactory>,
        group: PlayerHordeGroup,
        horde_location: Vec3,
        category: PopulationCategory,
        limits: SpawnLimits,
        links: RequestLinks,
        size: usize,
    ) -> Self {
        Self {
            cluster,
            state,
            progress,
            generator,
            random: Some(random),
            random_factory,
            group,
            horde_location,
            category,
            limits,
            links,
            size,
            index: 0,
            cooldown: 0,
            finished: false,
        }
    }

    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Stop spawning and publish what was achieved as complete.
    pub fn cancel(&mut self) {
        self.finished = true;
        self.publish();
    }

    fn publish(&self) {
        self.progress.publish(SpawnProgress {
            spawned: self.index,
            remaining: self.size - self.index,
            complete: self.finished,
        });
    }

    /// Point inside the spawn band on the line from the closest player to
    /// the horde.
    fn spawn_target(&self) -> (Vec3, f32) {
        let (player, distance) = self.group.closest_to(self.horde_location);
        let (min, max) = self.limits.distance_band;
        if distance >= min && distance <= max {
            return (self.horde_location, distance);
        }
        let offset = self.horde_location - player.location;
        let direction = if distance <= f32::EPSILON {
            Vec3::X
        } else {
            Vec3::new(offset.x, 0.0, offset.z) / distance
        };
        let target = player.location + direction * ((min + max) / 2.0);
        (Vec3::new(target.x, self.horde_location.y, target.z), distance)
    }
}

impl std::fmt::Debug for ClusterSpawnRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSpawnRequest")
            .field("cluster", &self.cluster)
            .field("index", &self.index)
            .field("size", &self.size)
            .field("finished", &self.finished)
            .finish()
    }
}

impl MainThreadRequest for ClusterSpawnRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::ClusterSpawn
    }

    fn is_done(&self) -> bool {
        self.finished
    }

    fn tick_execute(&mut self, ctx: &mut RequestContext<'_>) {
        // A despawn between submission and now cancels the batch.
        if !self.state.transition(SpawnState::SpawningRequested, SpawnState::Spawning)
            && self.state.load() != SpawnState::Spawning
        {
            debug!(cluster = %self.cluster, "cluster stopped spawning");
            self.cancel();
            return;
        }
        if self.size == 0 {
            self.cancel();
            return;
        }

        if self.cooldown > 0 {
            self.cooldown -= 1;
            return;
        }
        self.cooldown = self.limits.delay_frames.saturating_sub(1);

        if ctx.world.population(self.category).is_full() {
            return;
        }
        // Batches are sized to fit, so only respawned members can fill the
        // horde up. Settle for what landed rather than wait forever.
        if self.links.live_entities.load(Ordering::Acquire) >= self.limits.max_live {
            debug!(cluster = %self.cluster, spawned = self.index, planned = self.size, "horde full, finishing batch early");
            self.size = self.index;
            self.cancel();
            return;
        }

        let (target, player_distance) = self.spawn_target();
        let Some(position) = ctx.world.find_spawn_position(target, self.limits.spread) else {
            if player_distance > self.limits.view_distance {
                warn!(cluster = %self.cluster, "no spawn position found, giving up");
                self.cancel();
            }
            return;
        };

        let Some(random) = self.random.as_mut() else {
            self.cancel();
            return;
        };
        let class = self.generator.next_class(random);
        match ctx.world.spawn_at(class, position) {
            Ok(entity) => {
                self.links.entity_added(entity);
                self.links.send(HordeEvent::EntitySpawned {
                    cluster: self.cluster,
                    entity,
                    class,
                    location: position,
                });
                self.index += 1;
                self.finished = self.index >= self.size;
                trace!(cluster = %self.cluster, entity = ?entity, index = self.index, "spawned horde entity");
                self.publish();
            }
            Err(err) => {
                warn!(cluster = %self.cluster, %class, error = %err, "live world refused spawn");
                self.cancel();
            }
        }
    }

    fn on_cleanup(&mut self, _ctx: &mut RequestContext<'_>) {
        if let Some(random) = self.random.take() {
            self.random_factory.free_random(random);
        }
    }
}

// ---------------------------------------------------------------------------
// HordeDespawnRequest
// ---------------------------------------------------------------------------

/// Removes every live entity of a horde, a few per frame.
#[derive(Debug)]
pub struct HordeDespawnRequest {
    horde: HordeId,
    entities: Vec<EntityId>,
    per_frame: usize,
    links: RequestLinks,
}

impl HordeDespawnRequest {
    pub(crate) fn new(horde: HordeId, entities: Vec<EntityId>, per_frame: usize, links: RequestLinks) -> Self {
        Self {
            horde,
            entities,
            per_frame: per_frame.max(1),
            links,
        }
    }

    pub fn remaining(&self) -> usize {
        self.entities.len()
    }
}

impl MainThreadRequest for HordeDespawnRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::HordeDespawn
    }

    fn is_done(&self) -> bool {
        self.entities.is_empty()
    }

    fn tick_execute(&mut self, ctx: &mut RequestContext<'_>) {
        for _ in 0..self.per_frame {
            let Some(entity) = self.entities.pop() else {
                break;
            };
            if let Err(err) = ctx.world.despawn(entity) {
                debug!(entity = ?entity, error = %err, "entity already gone during horde despawn");
            }
            self.links.entity_removed(entity);
        }
    }

    fn on_cleanup(&mut self, _ctx: &mut RequestContext<'_>) {
        self.links.send(HordeEvent::HordeDespawned { horde: self.horde });
    }
}

// ---------------------------------------------------------------------------
// EntitySpawnRequest / EntityDespawnRequest
// ---------------------------------------------------------------------------

/// Brings one remembered member back into the live world.
#[derive(Debug)]
pub struct EntitySpawnRequest {
    cluster: ClusterId,
    member: ClusterEntityId,
    class: EntityClassId,
    location: Vec3,
    spread: f32,
    category: PopulationCategory,
    links: RequestLinks,
    done: bool,
}

impl EntitySpawnRequest {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cluster: ClusterId,
        member: ClusterEntityId,
        class: EntityClassId,
        location: Vec3,
        spread: f32,
        category: PopulationCategory,
        links: RequestLinks,
    ) -> Self {
        Self {
            cluster,
            member,
            class,
            location,
            spread,
            category,
            links,
            done: false,
        }
    }
}

impl MainThreadRequest for EntitySpawnRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::EntitySpawn
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn tick_execute(&mut self, ctx: &mut RequestContext<'_>) {
        // Wait for room rather than failing.
        if ctx.world.population(self.category).is_full() {
            return;
        }
        self.done = true;
        let position = ctx
            .world
            .find_spawn_position(self.location, self.spread)
            .unwrap_or(self.location);
        let entity = match ctx.world.spawn_at(self.class, position) {
            Ok(entity) => {
                self.links.entity_added(entity);
                Some(entity)
            }
            Err(err) => {
                warn!(cluster = %self.cluster, member = %self.member, error = %err, "failed to respawn horde entity");
                None
            }
        };
        self.links.send(HordeEvent::EntityRespawned {
            cluster: self.cluster,
            member: self.member,
            entity,
            location: position,
        });
    }
}

/// Removes one member's live entity, remembering where it stood.
#[derive(Debug)]
pub struct EntityDespawnRequest {
    target: Option<(ClusterId, ClusterEntityId)>,
    entity: EntityId,
    links: RequestLinks,
    done: bool,
}

impl EntityDespawnRequest {
    pub(crate) fn new(cluster: ClusterId, member: ClusterEntityId, entity: EntityId, links: RequestLinks) -> Self {
        Self {
            target: Some((cluster, member)),
            entity,
            links,
            done: false,
        }
    }

    /// Despawn an entity no cluster member refers to.
    pub(crate) fn untracked(entity: EntityId, links: RequestLinks) -> Self {
        Self {
            target: None,
            entity,
            links,
            done: false,
        }
    }
}

impl MainThreadRequest for EntityDespawnRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::EntityDespawn
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn tick_execute(&mut self, ctx: &mut RequestContext<'_>) {
        self.done = true;
        let location = ctx.world.position(self.entity);
        if let Err(err) = ctx.world.despawn(self.entity) {
            debug!(entity = ?self.entity, error = %err, "entity already gone");
        }
        self.links.entity_removed(self.entity);
        if let Some((cluster, member)) = self.target {
            self.links.send(HordeEvent::EntityDespawned {
                cluster,
                member,
                location,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// PositionUpdateRequest
// ---------------------------------------------------------------------------

/// Live positions and deaths of one horde's members.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionReport {
    /// Mean position of the living members, if any.
    pub centroid: Option<Vec3>,
    pub positions: Vec<(ClusterId, ClusterEntityId, Vec3)>,
    pub dead: Vec<(ClusterId, ClusterEntityId, EntityId)>,
}

/// Samples the live world once and publishes a [`PositionReport`].
#[derive(Debug)]
pub struct PositionUpdateRequest {
    members: Vec<(ClusterId, ClusterEntityId, EntityId)>,
    report: Subscription<PositionReport>,
    done: bool,
}

impl PositionUpdateRequest {
    pub(crate) fn new(members: Vec<(ClusterId, ClusterEntityId, EntityId)>, report: Subscription<PositionReport>) -> Self {
        Self {
            members,
            report,
            done: false,
        }
    }
}

impl MainThreadRequest for PositionUpdateRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::PositionUpdate
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn tick_execute(&mut self, ctx: &mut RequestContext<'_>) {
        self.done = true;
        let mut report = PositionReport::default();
        for &(cluster, member, entity) in &self.members {
            match ctx.world.liveness(entity) {
                Liveness::Alive => {
                    if let Some(position) = ctx.world.position(entity) {
                        report.positions.push((cluster, member, position));
                    }
                }
                Liveness::Dead => report.dead.push((cluster, member, entity)),
                // Removed by a request still in flight; its own event covers it.
                Liveness::Missing => {}
            }
        }
        report.centroid = centroid(report.positions.iter().map(|&(_, _, p)| p));
        self.report.publish(report);
    }
}

/// `true` if any player of `players` is within `radius` of `location`.
pub(crate) fn any_within(players: &[horde_world::player::PlayerSnapshot], location: Vec3, radius: f32) -> bool {
    players.iter().any(|p| distance_xz(p.location, location) <= radius)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::horde::kind::{HordeKind, UniformHordeKind};
    use horde_world::prelude::*;

    fn links() -> (RequestLinks, crossbeam_channel::Receiver<HordeEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            RequestLinks {
                events: tx,
                tracked: Arc::new(DashSet::new()),
                live_entities: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    fn limits() -> SpawnLimits {
        SpawnLimits {
            distance_band: (72.0, 81.0),
            spread: 8.0,
            view_distance: 90.0,
            delay_frames: 2,
            max_live: 16,
        }
    }

    fn spawn_request(
        size_density: f32,
        state: &SpawnStateCell,
        progress: Subscription<SpawnProgress>,
        links: RequestLinks,
    ) -> ClusterSpawnRequest {
        let kind = UniformHordeKind::new("test", vec![EntityClassId(5)]);
        let group = PlayerHordeGroup::new(vec![PlayerSnapshot::new(PlayerId(1), Vec3::ZERO, 1)]).unwrap();
        let factory: Arc<dyn RandomFactory> = Arc::new(PcgRandomFactory::new(1));
        let mut random = factory.create_random(7);
        let generator = kind.create_entity_generator(&group.conditions(&TrackerConfig::default()), &mut random);
        let size = generator.determine_entity_count(size_density);
        ClusterSpawnRequest::new(
            ClusterId(3),
            state.clone(),
            progress,
            generator,
            random,
            factory,
            group,
            Vec3::new(50.0, 0.0, 0.0),
            PopulationCategory::Enemy,
            limits(),
            links,
            size,
        )
    }

    #[test]
    fn spawn_batch_paces_and_lands_in_band() {
        let mut world = MemoryWorld::new();
        let (links, rx) = links();
        let state = SpawnStateCell::new(SpawnState::SpawningRequested);
        let progress = Subscription::new();
        let reader = progress.subscribe();
        let mut request = spawn_request(0.5, &state, progress, links.clone());
        assert_eq!(request.size(), 2);

        let mut ctx = RequestContext { world: &mut world, dt: 0.1 };
        request.tick_execute(&mut ctx);
        assert_eq!(state.load(), SpawnState::Spawning);
        request.tick_execute(&mut ctx);
        assert!(!request.is_done());
        request.tick_execute(&mut ctx);
        assert!(request.is_done());

        let progress = reader.latest().unwrap();
        assert_eq!(*progress, SpawnProgress { spawned: 2, remaining: 0, complete: true });
        assert_eq!(links.live_entities.load(Ordering::Acquire), 2);
        assert_eq!(links.tracked.len(), 2);

        let events: Vec<HordeEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        for event in events {
            let HordeEvent::EntitySpawned { location, .. } = event else {
                panic!("unexpected event {event:?}");
            };
            // Pushed out from 50 to the middle of the band.
            assert!((distance_xz(location, Vec3::ZERO) - 76.5).abs() < 1e-3);
        }
    }

    #[test]
    fn despawned_cluster_cancels_batch() {
        let mut world = MemoryWorld::new();
        let (links, _rx) = links();
        let state = SpawnStateCell::new(SpawnState::SpawningRequested);
        let progress = Subscription::new();
        let reader = progress.subscribe();
        let mut request = spawn_request(2.0, &state, progress, links);

        let mut ctx = RequestContext { world: &mut world, dt: 0.1 };
        request.tick_execute(&mut ctx);
        state.store(SpawnState::Despawned);
        request.tick_execute(&mut ctx);
        assert!(request.is_done());
        let progress = reader.latest().unwrap();
        assert!(progress.complete);
        assert_eq!(progress.spawned, 1);
        assert_eq!(progress.remaining, 7);
    }

    #[test]
    fn full_horde_finishes_the_batch_with_what_landed() {
        let mut world = MemoryWorld::new();
        let (links, _rx) = links();
        links.live_entities.store(14, Ordering::Release);
        let state = SpawnStateCell::new(SpawnState::SpawningRequested);
        let progress = Subscription::new();
        let reader = progress.subscribe();
        let mut request = spawn_request(1.0, &state, progress, links.clone());
        assert_eq!(request.size(), 4);

        let mut ctx = RequestContext { world: &mut world, dt: 0.1 };
        for _ in 0..10 {
            request.tick_execute(&mut ctx);
        }
        assert!(request.is_done());
        assert_eq!(world.entity_count(), 2);
        assert_eq!(links.live_entities.load(Ordering::Acquire), 16);
        assert_eq!(*reader.latest().unwrap(), SpawnProgress { spawned: 2, remaining: 0, complete: true });
    }

    #[test]
    fn full_horde_before_any_spawn_reports_nothing_spawned() {
        let mut world = MemoryWorld::new();
        let (links, _rx) = links();
        links.live_entities.store(16, Ordering::Release);
        let state = SpawnStateCell::new(SpawnState::SpawningRequested);
        let progress = Subscription::new();
        let reader = progress.subscribe();
        let mut request = spawn_request(1.0, &state, progress, links);
        let mut ctx = RequestContext { world: &mut world, dt: 0.1 };
        request.tick_execute(&mut ctx);
        assert!(request.is_done());
        assert_eq!(world.entity_count(), 0);
        assert_eq!(reader.latest().unwrap().spawned, 0);
    }

    #[test]
    fn horde_despawn_removes_per_frame_then_reports() {
        let mut world = MemoryWorld::new();
        let (links, rx) = links();
        let a = world.spawn_at(EntityClassId(1), Vec3::ZERO).unwrap();
        let b = world.spawn_at(EntityClassId(1), Vec3::ZERO).unwrap();
        links.entity_added(a);
        links.entity_added(b);

        let horde = HordeId::from_parts(0, 0);
        let mut request = HordeDespawnRequest::new(horde, vec![a, b], 1, links.clone());
        let mut ctx = RequestContext { world: &mut world, dt: 0.1 };
        request.tick_execute(&mut ctx);
        assert_eq!(request.remaining(), 1);
        request.tick_execute(&mut ctx);
        assert!(request.is_done());
        request.on_cleanup(&mut ctx);

        assert_eq!(world.entity_count(), 0);
        assert_eq!(links.live_entities.load(Ordering::Acquire), 0);
        assert!(links.tracked.is_empty());
        assert_eq!(rx.try_recv().unwrap(), HordeEvent::HordeDespawned { horde });
    }

    #[test]
    fn position_report_splits_alive_and_dead() {
        let mut world = MemoryWorld::new();
        let a = world.spawn_at(EntityClassId(1), Vec3::new(10.0, 0.0, 0.0)).unwrap();
        let b = world.spawn_at(EntityClassId(1), Vec3::new(20.0, 0.0, 0.0)).unwrap();
        let c = world.spawn_at(EntityClassId(1), Vec3::new(90.0, 0.0, 0.0)).unwrap();
        world.kill(c);
        let slot = Subscription::new();
        let reader = slot.subscribe();
        let members = vec![
            (ClusterId(1), ClusterEntityId(1), a),
            (ClusterId(1), ClusterEntityId(2), b),
            (ClusterId(1), ClusterEntityId(3), c),
        ];
        let mut request = PositionUpdateRequest::new(members, slot);
        let mut ctx = RequestContext { world: &mut world, dt: 0.1 };
        request.tick_execute(&mut ctx);
        let report = reader.latest().unwrap();
        assert_eq!(report.centroid, Some(Vec3::new(15.0, 0.0, 0.0)));
        assert_eq!(report.positions.len(), 2);
        assert_eq!(report.dead, vec![(ClusterId(1), ClusterEntityId(3), c)]);
    }

    #[test]
    fn entity_round_trip_through_requests() {
        let mut world = MemoryWorld::new();
        let (links, rx) = links();
        let e = world.spawn_at(EntityClassId(1), Vec3::new(3.0, 0.0, 0.0)).unwrap();
        links.entity_added(e);

        let mut despawn = EntityDespawnRequest::new(ClusterId(1), ClusterEntityId(4), e, links.clone());
        let mut ctx = RequestContext { world: &mut world, dt: 0.1 };
        despawn.tick_execute(&mut ctx);
        assert_eq!(
            rx.try_recv().unwrap(),
            HordeEvent::EntityDespawned {
                cluster: ClusterId(1),
                member: ClusterEntityId(4),
                location: Some(Vec3::new(3.0, 0.0, 0.0)),
            }
        );

        let mut respawn = EntitySpawnRequest::new(
            ClusterId(1),
            ClusterEntityId(4),
            EntityClassId(1),
            Vec3::new(3.0, 0.0, 0.0),
            8.0,
            PopulationCategory::Enemy,
            links.clone(),
        );
        respawn.tick_execute(&mut ctx);
        let HordeEvent::EntityRespawned { entity: Some(entity), .. } = rx.try_recv().unwrap() else {
            panic!("respawn failed");
        };
        assert!(links.tracked.contains(&entity));
        assert_eq!(links.live_entities.load(Ordering::Acquire), 1);
    }
}
