//! A horde as the tracker sees it.
//!
//! [`WorldHorde::update`] is the per-horde half of a tracker tick. It runs on
//! a worker thread with exclusive access to one horde and a shared, read-only
//! [`HordeTickContext`], and returns the main-thread requests the horde needs
//! instead of touching the live world. Merging and splitting happen later in
//! the tick, sequentially, on the tracker thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use dashmap::DashSet;
use glam::Vec3;
use horde_world::biome::BiomeMap;
use horde_world::entity::EntityId;
use horde_world::geometry::{distance_xz, step_toward};
use horde_world::player::PlayerSnapshot;
use horde_world::random::{stable_seed, RandomFactory, WorldRandom};
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use super::characteristics::HordeCharacteristics;
use super::cluster::{ClusterId, HordeCluster, SpawnPoll, SpawnState};
use super::entity::{ClusterEntity, ClusterEntityId};
use super::group::PlayerHordeGroup;
use super::kind::HordeKind;
use super::requests::{
    any_within, decrement, ClusterSpawnRequest, EntityDespawnRequest, EntitySpawnRequest, HordeDespawnRequest,
    HordeEvent, PositionReport, PositionUpdateRequest, RequestLinks, SpawnLimits,
};
use super::{HordeId, IdAllocator};
use crate::ai::command::{AiAgent, AiCommand, CommandGenerator, IdleGenerator};
use crate::ai::commands::{GoToTargetCommand, WanderCommand};
use crate::ai::horde::HordeAi;
use crate::config::TrackerConfig;
use crate::event::WorldEventReport;
use crate::request::BoxedRequest;
use crate::subscription::{Subscriber, Subscription};

// ---------------------------------------------------------------------------
// HordeBlueprint
// ---------------------------------------------------------------------------

/// A horde to be added to the tracker.
///
/// Populators describe hordes with blueprints; the tracker assigns ids and
/// random streams when it adopts them.
///
/// ```
/// use std::sync::Arc;
/// use glam::Vec3;
/// use horde_sim::ai::IdleGenerator;
/// use horde_sim::horde::{HordeBlueprint, UniformHordeKind};
/// use horde_world::entity::EntityClassId;
///
/// let kind = Arc::new(UniformHordeKind::new("wandering", vec![EntityClassId(1)]));
/// let blueprint = HordeBlueprint::new(Vec3::new(300.0, 0.0, 40.0), Box::new(IdleGenerator))
///     .with_cluster(kind.clone(), 2.0)
///     .with_cluster(kind, 1.5);
/// assert_eq!(blueprint.density(), 3.5);
/// ```
#[derive(Debug)]
pub struct HordeBlueprint {
    pub location: Vec3,
    pub clusters: Vec<(Arc<dyn HordeKind>, f32)>,
    pub generator: Box<dyn CommandGenerator>,
    /// Biome the horde belongs to. Filled from the tracker's biome map when
    /// left empty.
    pub biome: Option<String>,
}

impl HordeBlueprint {
    pub fn new(location: Vec3, generator: Box<dyn CommandGenerator>) -> Self {
        Self {
            location,
            clusters: Vec::new(),
            generator,
            biome: None,
        }
    }

    pub fn in_biome(mut self, biome: impl Into<String>) -> Self {
        self.biome = Some(biome.into());
        self
    }

    pub fn with_cluster(mut self, kind: Arc<dyn HordeKind>, density: f32) -> Self {
        self.clusters.push((kind, density));
        self
    }

    pub fn density(&self) -> f32 {
        self.clusters.iter().map(|(_, d)| d.max(0.0)).sum()
    }
}

// ---------------------------------------------------------------------------
// Tick context
// ---------------------------------------------------------------------------

/// Shared, read-only inputs of one horde update.
pub struct HordeTickContext<'a> {
    pub config: &'a TrackerConfig,
    pub players: &'a [PlayerSnapshot],
    pub reports: &'a [WorldEventReport],
    pub is_daytime: bool,
    pub dt: f32,
    pub tick: u64,
    pub events: &'a Sender<HordeEvent>,
    pub tracked: &'a Arc<DashSet<EntityId>>,
    pub random_factory: &'a Arc<dyn RandomFactory>,
    pub cluster_pool: &'a rayon::ThreadPool,
    pub biomes: Option<&'a dyn BiomeMap>,
}

/// What one horde update produced.
#[derive(Default)]
pub struct HordeTickOutput {
    pub requests: Vec<BoxedRequest>,
    /// The horde has no clusters left and should be removed.
    pub dead: bool,
}

// ---------------------------------------------------------------------------
// HordeAgent
// ---------------------------------------------------------------------------

/// The abstract horde as an AI agent: a point that walks at the horde's
/// speed and can nap.
#[derive(Debug, Clone, Copy)]
struct HordeAgent {
    location: Vec3,
    speed: f32,
    sleeping: bool,
    moving: bool,
    dead: bool,
    now: f64,
}

impl AiAgent for HordeAgent {
    fn location(&self) -> Vec3 {
        self.location
    }

    fn move_to(&mut self, target: Vec3, can_run: bool, dt: f32) {
        let speed = if can_run { self.speed * 2.0 } else { self.speed };
        self.location = step_toward(self.location, target, speed * dt);
        self.moving = true;
    }

    fn stop(&mut self) {
        self.moving = false;
    }

    fn is_moving(&self) -> bool {
        self.moving
    }

    fn has_player_target(&self) -> bool {
        false
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

// ---------------------------------------------------------------------------
// WorldHorde
// ---------------------------------------------------------------------------

/// Requests planned for one spawned cluster.
struct ClusterPlan {
    requests: Vec<BoxedRequest>,
    any_near: bool,
}

/// One horde: clusters, merged characteristics and AI.
pub struct WorldHorde {
    location: Vec3,
    clusters: Vec<HordeCluster>,
    characteristics: HordeCharacteristics,
    ai: HordeAi,
    random: WorldRandom,
    sleeping: bool,
    live_entities: Arc<AtomicUsize>,
    merged: bool,
    despawn_pending: bool,
    pending_position: Option<Subscriber<PositionReport>>,
    ai_time: f64,
    sequence: u64,
    spawn_biome: Option<String>,
}

impl WorldHorde {
    pub(crate) fn from_blueprint(
        blueprint: HordeBlueprint,
        ids: &mut IdAllocator,
        sequence: u64,
        random: WorldRandom,
    ) -> Self {
        let clusters = blueprint
            .clusters
            .into_iter()
            .map(|(kind, density)| HordeCluster::new(ids.cluster(), kind, density))
            .collect();
        Self::from_clusters(
            blueprint.location,
            clusters,
            blueprint.generator,
            blueprint.biome,
            sequence,
            random,
        )
    }

    pub(crate) fn from_clusters(
        location: Vec3,
        clusters: Vec<HordeCluster>,
        generator: Box<dyn CommandGenerator>,
        spawn_biome: Option<String>,
        sequence: u64,
        random: WorldRandom,
    ) -> Self {
        let mut characteristics = HordeCharacteristics::default();
        for cluster in &clusters {
            characteristics.merge(&cluster.kind().create_characteristics());
        }
        Self {
            location,
            clusters,
            characteristics,
            ai: HordeAi::new(generator),
            random,
            sleeping: false,
            live_entities: Arc::new(AtomicUsize::new(0)),
            merged: false,
            despawn_pending: false,
            pending_position: None,
            ai_time: 0.0,
            sequence,
            spawn_biome,
        }
    }

    pub fn location(&self) -> Vec3 {
        self.location
    }

    pub fn clusters(&self) -> &[HordeCluster] {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&HordeCluster> {
        self.clusters.iter().find(|c| c.id() == id)
    }

    pub(crate) fn cluster_mut(&mut self, id: ClusterId) -> Option<&mut HordeCluster> {
        self.clusters.iter_mut().find(|c| c.id() == id)
    }

    pub fn characteristics(&self) -> &HordeCharacteristics {
        &self.characteristics
    }

    pub fn ai(&self) -> &HordeAi {
        &self.ai
    }

    pub(crate) fn ai_mut(&mut self) -> &mut HordeAi {
        &mut self.ai
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Creation order; used to seed this horde's random streams.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Live entities attributed to this horde, including in-flight spawns.
    pub fn live_entities(&self) -> usize {
        self.live_entities.load(Ordering::Acquire)
    }

    /// Counter shared with this horde's requests.
    pub(crate) fn live_counter(&self) -> &Arc<AtomicUsize> {
        &self.live_entities
    }

    /// Biome the horde was created in, if the tracker knows biomes.
    pub fn spawn_biome(&self) -> Option<&str> {
        self.spawn_biome.as_deref()
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }

    pub fn is_despawn_pending(&self) -> bool {
        self.despawn_pending
    }

    pub fn density(&self) -> f32 {
        self.clusters.iter().map(HordeCluster::density).sum()
    }

    pub fn is_dead(&self) -> bool {
        self.clusters.is_empty()
    }

    /// `true` once any cluster has left `Despawned`.
    pub fn is_spawned(&self) -> bool {
        self.clusters.iter().any(|c| c.state() != SpawnState::Despawned)
    }

    /// No spawn, despawn or per-entity change in flight.
    pub fn is_settled(&self) -> bool {
        !self.despawn_pending
            && self.clusters.iter().all(|c| {
                !c.is_spawning() && c.entities().iter().all(|e| !e.is_awaiting_state_change())
            })
    }

    fn has_live_members(&self) -> bool {
        self.clusters
            .iter()
            .any(|c| c.entities().iter().any(ClusterEntity::is_spawned))
    }

    fn links(&self, ctx: &HordeTickContext<'_>) -> RequestLinks {
        RequestLinks {
            events: ctx.events.clone(),
            tracked: Arc::clone(ctx.tracked),
            live_entities: Arc::clone(&self.live_entities),
        }
    }

    fn agent(&self, is_daytime: bool) -> HordeAgent {
        HordeAgent {
            location: self.location,
            speed: self.characteristics.walk_speed(is_daytime),
            sleeping: self.sleeping,
            moving: false,
            dead: self.clusters.is_empty(),
            now: self.ai_time,
        }
    }

    /// `current - mean(interrupts)` of the horde's objective. Lower wins
    /// merges.
    pub fn objective_score(&self, is_daytime: bool) -> f32 {
        self.ai.objective_score(&self.agent(is_daytime))
    }

    /// Preempt the horde's objective with `commands`.
    pub fn interrupt(&mut self, commands: Vec<Box<dyn AiCommand>>, is_daytime: bool) {
        let mut agent = self.agent(is_daytime);
        self.ai.interrupt(commands, &mut agent);
        self.sleeping = agent.sleeping;
    }

    // -----------------------------------------------------------------------
    // Per-tick update
    // -----------------------------------------------------------------------

    /// One tick of this horde. Never touches the live world.
    pub fn update(&mut self, id: HordeId, ctx: &HordeTickContext<'_>) -> HordeTickOutput {
        let mut out = HordeTickOutput::default();
        self.poll_clusters(id, ctx, &mut out.requests);

        if !self.despawn_pending {
            if self.is_spawned() {
                self.update_visibility(id, ctx, &mut out.requests);
            } else if let Some(group) =
                PlayerHordeGroup::near(ctx.players, self.location, ctx.config.unspawned_view_distance())
            {
                out.requests.extend(self.request_spawns(&group, ctx));
            }
        }

        self.update_position(ctx, &mut out.requests);
        if !self.despawn_pending && !self.is_spawned() {
            self.update_decay(id, ctx);
        }
        if self.is_dead() {
            out.dead = true;
            return out;
        }

        self.update_ai(ctx);
        out
    }

    /// Wear down an abstract horde that has strayed from its spawn biome.
    /// Clusters that reach zero density are dropped.
    fn update_decay(&mut self, id: HordeId, ctx: &HordeTickContext<'_>) {
        let (Some(map), Some(home)) = (ctx.biomes, self.spawn_biome.as_deref()) else {
            return;
        };
        let here = map.biome_at(self.location).unwrap_or(ctx.config.default_biome.as_str());
        if here == home {
            return;
        }
        let amount = ctx.config.biome_decay_rate * ctx.dt;
        if amount <= 0.0 {
            return;
        }
        for cluster in &mut self.clusters {
            cluster.decay(amount);
        }
        let before = self.clusters.len();
        self.clusters.retain(|c| !c.is_dead());
        if self.clusters.len() < before {
            debug!(horde = ?id, biome = here, home, removed = before - self.clusters.len(), "clusters decayed away");
        }
    }

    fn poll_clusters(&mut self, id: HordeId, ctx: &HordeTickContext<'_>, requests: &mut Vec<BoxedRequest>) {
        let mut partial = false;
        for cluster in &mut self.clusters {
            match cluster.poll_spawn(ctx.tick, ctx.config.spawn_retry_max_backoff_ticks) {
                SpawnPoll::Failed => {
                    warn!(horde = ?id, cluster = %cluster.id(), failures = cluster.failures(), "cluster spawn produced no entities");
                }
                SpawnPoll::Partial { spawned, remaining } => {
                    warn!(horde = ?id, cluster = %cluster.id(), spawned, remaining, "cluster spawned partially");
                    partial = true;
                }
                SpawnPoll::Spawned => {
                    debug!(horde = ?id, cluster = %cluster.id(), "cluster spawned");
                }
                SpawnPoll::Idle | SpawnPoll::Pending => {}
            }
        }
        if partial {
            let links = self.links(ctx);
            requests.extend(self.despawn(id, ctx.config.despawns_per_frame, links));
        }
    }

    /// Spawn requests for every cluster that may spawn now.
    ///
    /// Batches are capped so the horde never holds more than
    /// `max_entities_per_player` live entities per responsible player. A
    /// capped batch stands for the whole cluster, so killing all of it
    /// clears the cluster's density.
    pub fn request_spawns(&mut self, group: &PlayerHordeGroup, ctx: &HordeTickContext<'_>) -> Vec<BoxedRequest> {
        let links = self.links(ctx);
        let conditions = group.conditions(ctx.config);
        let max_live = ctx.config.max_entities_per_player * group.len();
        let mut budget = max_live.saturating_sub(self.live_entities.load(Ordering::Acquire));
        let mut requests: Vec<BoxedRequest> = Vec::new();
        for cluster in &mut self.clusters {
            if cluster.state() != SpawnState::Despawned || !cluster.can_retry(ctx.tick) || cluster.is_dead() {
                continue;
            }
            if budget == 0 {
                trace!(cluster = %cluster.id(), max_live, "horde at its live entity cap");
                break;
            }
            let kind = Arc::clone(cluster.kind());
            // Keyed by the cluster alone so a respawn replays the same batch.
            let seed = stable_seed(&[ctx.config.world_seed, cluster.id().0]);
            let mut random = ctx.random_factory.create_random(seed);
            let generator = kind.create_entity_generator(&conditions, &mut random);
            let size = generator.determine_entity_count(cluster.density()).min(budget);
            budget -= size;

            let progress = Subscription::new();
            cluster.begin_spawn(progress.subscribe(), size);
            let limits = SpawnLimits {
                distance_band: ctx.config.spawn_distance_band(),
                spread: ctx.config.spawn_spread,
                view_distance: ctx.config.view_distance,
                delay_frames: ctx.config.spawn_delay_frames,
                max_live,
            };
            trace!(
                cluster = %cluster.id(),
                size,
                players = group.len(),
                gamestage = conditions.gamestage,
                biome = conditions.biome,
                "requesting cluster spawn"
            );
            requests.push(Box::new(ClusterSpawnRequest::new(
                cluster.id(),
                cluster.state_cell().clone(),
                progress,
                generator,
                random,
                Arc::clone(ctx.random_factory),
                group.clone(),
                self.location,
                kind.category(),
                limits,
                links.clone(),
                size,
            )));
        }
        requests
    }

    /// Per-entity spawn and despawn around players, or a full despawn once
    /// nobody is near.
    fn update_visibility(&mut self, id: HordeId, ctx: &HordeTickContext<'_>, requests: &mut Vec<BoxedRequest>) {
        let links = self.links(ctx);
        let view = ctx.config.view_distance;
        let spread = ctx.config.spawn_spread;
        let players = ctx.players;

        let plans: Vec<ClusterPlan> = ctx.cluster_pool.install(|| {
            self.clusters
                .par_iter_mut()
                .map(|cluster| plan_cluster(cluster, players, view, spread, &links))
                .collect()
        });

        let any_spawning = self.clusters.iter().any(HordeCluster::is_spawning);
        let any_near = plans.iter().any(|p| p.any_near)
            || (any_spawning && any_within(players, self.location, view));
        if !any_near {
            if let Some(request) = self.despawn(id, ctx.config.despawns_per_frame, links) {
                requests.push(request);
            }
            return;
        }
        for plan in plans {
            requests.extend(plan.requests);
        }

        // Despawned clusters of a live horde rejoin once their backoff ends.
        if let Some(group) = PlayerHordeGroup::near(players, self.location, view) {
            requests.extend(self.request_spawns(&group, ctx));
        }
    }

    fn update_position(&mut self, ctx: &HordeTickContext<'_>, requests: &mut Vec<BoxedRequest>) {
        if let Some(pending) = &self.pending_position {
            let Some(report) = pending.latest() else {
                return;
            };
            self.pending_position = None;
            self.apply_position(&report, ctx.tracked);
        }
        if self.despawn_pending || !self.is_spawned() {
            return;
        }
        let members: Vec<(ClusterId, ClusterEntityId, EntityId)> = self
            .clusters
            .iter()
            .flat_map(|c| {
                c.entities()
                    .iter()
                    .filter(|e| !e.is_awaiting_state_change())
                    .filter_map(move |e| e.handle().map(|h| (c.id(), e.id(), h)))
            })
            .collect();
        if members.is_empty() {
            return;
        }
        let slot = Subscription::new();
        self.pending_position = Some(slot.subscribe());
        requests.push(Box::new(PositionUpdateRequest::new(members, slot)));
    }

    /// Adopt a position report: move members, drop the dead, remove
    /// clusters with no density left.
    pub(crate) fn apply_position(&mut self, report: &PositionReport, tracked: &DashSet<EntityId>) {
        if let Some(centroid) = report.centroid {
            self.location = centroid;
        }
        for &(cluster, member, position) in &report.positions {
            if let Some(entity) = self.cluster_mut(cluster).and_then(|c| c.entity_mut(member)) {
                entity.set_location(position);
            }
        }
        for &(cluster_id, member, entity) in &report.dead {
            let Some(cluster) = self.cluster_mut(cluster_id) else {
                continue;
            };
            let current = cluster.entities().iter().find(|e| e.id() == member).and_then(ClusterEntity::handle);
            if current != Some(entity) {
                continue;
            }
            cluster.remove_entity(member, true);
            tracked.remove(&entity);
            decrement(&self.live_entities);
            self.ai.release_entity(entity);
            trace!(cluster = %cluster_id, %member, "horde member killed");
        }
        let before = self.clusters.len();
        self.clusters.retain(|c| !c.is_dead());
        if self.clusters.len() != before {
            debug!(removed = before - self.clusters.len(), "dead clusters removed");
        }
    }

    fn update_ai(&mut self, ctx: &HordeTickContext<'_>) {
        self.ai_time += f64::from(ctx.dt);
        let mut agent = self.agent(ctx.is_daytime);

        let sensitivity = self.characteristics.sensitivity(
            ctx.config.feral_sense,
            ctx.config.feral_sense_multiplier,
            ctx.is_daytime,
        );
        if let Some(sensitivity) = sensitivity {
            let nearest = ctx
                .reports
                .iter()
                .map(|r| (r, distance_xz(r.location, self.location)))
                .filter(|(r, d)| *d <= r.distance * sensitivity)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((report, _)) = nearest {
                trace!(sequence = self.sequence, interest = report.interest, "horde drawn to world event");
                let commands: Vec<Box<dyn AiCommand>> = vec![
                    Box::new(GoToTargetCommand::new(report.location)),
                    Box::new(WanderCommand::new(report.interest)),
                ];
                self.ai.interrupt(commands, &mut agent);
            }
        }

        let live = self.has_live_members();
        self.ai.update(&mut agent, ctx.dt, &mut self.random, live);
        if !live {
            self.location = agent.location;
        }
        self.sleeping = agent.sleeping;
    }

    // -----------------------------------------------------------------------
    // Despawn, merge, split
    // -----------------------------------------------------------------------

    /// Despawn every live entity. A no-op while a despawn is pending or when
    /// nothing is live.
    pub fn despawn(&mut self, id: HordeId, per_frame: usize, links: RequestLinks) -> Option<BoxedRequest> {
        if self.despawn_pending {
            return None;
        }
        let was_spawned = self.is_spawned();
        let handles: Vec<EntityId> = self
            .clusters
            .iter()
            .flat_map(|c| c.entities().iter().filter_map(ClusterEntity::handle))
            .collect();
        for cluster in &mut self.clusters {
            cluster.mark_despawned();
        }
        self.ai.release_all();
        self.pending_position = None;

        if handles.is_empty() {
            if was_spawned && self.clusters.iter().all(|c| c.entities().is_empty()) {
                warn!(horde = ?id, "despawning a spawned horde with no entities");
            }
            for cluster in &mut self.clusters {
                cluster.clear_entities();
            }
            return None;
        }
        debug!(horde = ?id, entities = handles.len(), "despawning horde");
        self.despawn_pending = true;
        Some(Box::new(HordeDespawnRequest::new(id, handles, per_frame, links)))
    }

    /// The full despawn finished; forget the members.
    pub(crate) fn on_despawned(&mut self) {
        for cluster in &mut self.clusters {
            cluster.clear_entities();
        }
        self.despawn_pending = false;
    }

    /// Absorb `other` if this horde wins the objective comparison and the
    /// union is allowed. Returns the AI requests for adopted live entities.
    pub fn merge(
        &mut self,
        other: &mut WorldHorde,
        max_density: f32,
        is_daytime: bool,
        world_seed: u64,
    ) -> Option<Vec<BoxedRequest>> {
        if self.merged || other.merged || !self.is_settled() || !other.is_settled() {
            return None;
        }
        if other.objective_score(is_daytime) < self.objective_score(is_daytime) {
            return None;
        }
        let compatible = self.clusters.iter().all(|a| {
            other
                .clusters
                .iter()
                .all(|b| a.kind().can_merge_with(b.kind().as_ref()))
        });
        if !compatible || self.density() + other.density() > max_density {
            return None;
        }

        other.merged = true;
        other.ai.release_all();
        other.pending_position = None;

        let mut requests: Vec<BoxedRequest> = Vec::new();
        for cluster in &other.clusters {
            for entity in cluster.entities() {
                let Some(handle) = entity.handle() else {
                    continue;
                };
                let random = WorldRandom::from_seed(stable_seed(&[world_seed, self.sequence, handle.to_raw()]));
                let local = cluster.kind().entity_command_generator();
                requests.push(Box::new(self.ai.add_entity(handle, local, random)));
            }
        }
        self.clusters.append(&mut other.clusters);
        self.characteristics.merge(&other.characteristics);
        let moved = other.live_entities.swap(0, Ordering::AcqRel);
        self.live_entities.fetch_add(moved, Ordering::AcqRel);
        Some(requests)
    }

    /// Split clusters off until this horde holds at most `cap` density.
    /// Returns the clusters of each new horde; density is conserved.
    pub(crate) fn split(&mut self, cap: f32, ids: &mut IdAllocator) -> Vec<Vec<HordeCluster>> {
        if self.density() <= cap || self.is_spawned() || self.despawn_pending || cap <= 0.0 {
            return Vec::new();
        }
        let mut parts: Vec<Vec<HordeCluster>> = Vec::new();
        let mut current: Vec<HordeCluster> = Vec::new();
        let mut current_density = 0.0f32;
        for mut cluster in std::mem::take(&mut self.clusters) {
            loop {
                let room = cap - current_density;
                if cluster.density() <= room + f32::EPSILON {
                    current_density += cluster.density();
                    current.push(cluster);
                    break;
                }
                if room > f32::EPSILON {
                    current.push(cluster.split_off(ids.cluster(), room));
                }
                parts.push(std::mem::take(&mut current));
                current_density = 0.0;
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }
        let mut parts = parts.into_iter();
        self.clusters = parts.next().unwrap_or_default();
        parts.collect()
    }

    /// A fresh generator for a horde split off from this one.
    pub(crate) fn fork_generator(&self) -> Box<dyn CommandGenerator> {
        self.ai
            .group()
            .fork_generator()
            .unwrap_or_else(|| Box::new(IdleGenerator))
    }

    /// Random point near this horde, for placing split-off hordes.
    pub(crate) fn nearby_location(&mut self, radius: f32) -> Vec3 {
        self.random.random_in_circle(self.location, radius)
    }

    /// Hand back the random stream when the horde is retired.
    pub(crate) fn take_random(&mut self) -> WorldRandom {
        std::mem::replace(&mut self.random, WorldRandom::from_seed(0))
    }
}

impl std::fmt::Debug for WorldHorde {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldHorde")
            .field("location", &self.location)
            .field("clusters", &self.clusters)
            .field("live_entities", &self.live_entities())
            .field("merged", &self.merged)
            .field("despawn_pending", &self.despawn_pending)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Decide per member of a spawned cluster whether it should be live.
fn plan_cluster(
    cluster: &mut HordeCluster,
    players: &[PlayerSnapshot],
    view: f32,
    spread: f32,
    links: &RequestLinks,
) -> ClusterPlan {
    let id = cluster.id();
    let category = cluster.kind().category();
    let mut plan = ClusterPlan {
        requests: Vec::new(),
        any_near: false,
    };
    for entity in cluster.entities_mut() {
        if entity.is_awaiting_state_change() {
            plan.any_near = true;
            continue;
        }
        let near = any_within(players, entity.location(), view);
        plan.any_near |= near;
        match (entity.handle(), near) {
            (Some(handle), false) => {
                entity.mark_awaiting_state_change();
                plan.requests.push(Box::new(EntityDespawnRequest::new(id, entity.id(), handle, links.clone())));
            }
            (None, true) => {
                entity.mark_awaiting_state_change();
                plan.requests.push(Box::new(EntitySpawnRequest::new(
                    id,
                    entity.id(),
                    entity.class(),
                    entity.location(),
                    spread,
                    category,
                    links.clone(),
                )));
            }
            _ => {}
        }
    }
    plan
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horde::kind::UniformHordeKind;
    use horde_world::prelude::*;

    struct Fixture {
        config: TrackerConfig,
        players: Vec<PlayerSnapshot>,
        events: Sender<HordeEvent>,
        tracked: Arc<DashSet<EntityId>>,
        factory: Arc<dyn RandomFactory>,
        pool: rayon::ThreadPool,
        biomes: Option<Arc<dyn BiomeMap>>,
    }

    impl Fixture {
        fn new(players: Vec<PlayerSnapshot>) -> Self {
            let (events, _rx) = crossbeam_channel::unbounded();
            Self {
                config: TrackerConfig::default(),
                players,
                events,
                tracked: Arc::new(DashSet::new()),
                factory: Arc::new(PcgRandomFactory::new(1)),
                pool: rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap(),
                biomes: None,
            }
        }

        fn with_biomes(mut self, biomes: RegionBiomeMap, decay_rate: f32) -> Self {
            self.biomes = Some(Arc::new(biomes));
            self.config.biome_decay_rate = decay_rate;
            self
        }

        fn ctx(&self, tick: u64) -> HordeTickContext<'_> {
            HordeTickContext {
                config: &self.config,
                players: &self.players,
                reports: &[],
                is_daytime: true,
                dt: 0.1,
                tick,
                events: &self.events,
                tracked: &self.tracked,
                random_factory: &self.factory,
                cluster_pool: &self.pool,
                biomes: self.biomes.as_deref(),
            }
        }
    }

    fn kind(id: &'static str) -> Arc<dyn HordeKind> {
        Arc::new(UniformHordeKind::new(id, vec![EntityClassId(1)]))
    }

    fn horde(ids: &mut IdAllocator, location: Vec3, densities: &[f32]) -> WorldHorde {
        let mut blueprint = HordeBlueprint::new(location, Box::new(IdleGenerator));
        for &d in densities {
            blueprint = blueprint.with_cluster(kind("walker"), d);
        }
        WorldHorde::from_blueprint(blueprint, ids, 0, WorldRandom::from_seed(1))
    }

    fn id() -> HordeId {
        HordeId::from_parts(0, 0)
    }

    #[test]
    fn nearby_player_triggers_one_spawn_per_cluster() {
        let fixture = Fixture::new(vec![PlayerSnapshot::new(PlayerId(1), Vec3::ZERO, 10)]);
        let mut ids = IdAllocator::default();
        let mut h = horde(&mut ids, Vec3::new(50.0, 0.0, 0.0), &[1.0, 2.0]);
        let out = h.update(id(), &fixture.ctx(0));
        assert_eq!(out.requests.len(), 2);
        assert!(!out.dead);
        assert!(h.clusters().iter().all(|c| c.state() == SpawnState::SpawningRequested));
    }

    #[test]
    fn distant_player_leaves_horde_abstract() {
        let fixture = Fixture::new(vec![PlayerSnapshot::new(PlayerId(1), Vec3::new(500.0, 0.0, 0.0), 10)]);
        let mut ids = IdAllocator::default();
        let mut h = horde(&mut ids, Vec3::ZERO, &[1.0]);
        let out = h.update(id(), &fixture.ctx(0));
        assert!(out.requests.is_empty());
        assert!(!h.is_spawned());
    }

    #[test]
    fn despawn_of_unspawned_horde_is_noop() {
        let fixture = Fixture::new(Vec::new());
        let mut ids = IdAllocator::default();
        let mut h = horde(&mut ids, Vec3::ZERO, &[1.0]);
        let links = h.links(&fixture.ctx(0));
        assert!(h.despawn(id(), 1, links.clone()).is_none());
        assert!(h.despawn(id(), 1, links).is_none());
        assert!(!h.is_despawn_pending());
        assert_eq!(h.clusters()[0].state(), SpawnState::Despawned);
    }

    #[test]
    fn despawn_collects_live_handles_once() {
        let fixture = Fixture::new(Vec::new());
        let mut ids = IdAllocator::default();
        let mut h = horde(&mut ids, Vec3::ZERO, &[1.0]);
        let cluster = h.clusters()[0].id();
        h.cluster_mut(cluster).unwrap().add_entity(ClusterEntity::spawned(
            ids.member(),
            EntityClassId(1),
            EntityId::new(0, 0),
            Vec3::ZERO,
        ));
        let links = h.links(&fixture.ctx(0));
        assert!(h.despawn(id(), 1, links.clone()).is_some());
        assert!(h.is_despawn_pending());
        assert!(h.despawn(id(), 1, links).is_none());

        h.on_despawned();
        assert!(!h.is_despawn_pending());
        assert!(h.clusters()[0].entities().is_empty());
    }

    #[test]
    fn killed_members_lower_density_and_dead_clusters_go() {
        let fixture = Fixture::new(Vec::new());
        let mut ids = IdAllocator::default();
        let mut h = horde(&mut ids, Vec3::ZERO, &[0.5]);
        let cluster_id = h.clusters()[0].id();
        let member = ids.member();
        let handle = EntityId::new(3, 0);
        {
            let cluster = h.cluster_mut(cluster_id).unwrap();
            let slot = Subscription::new();
            cluster.begin_spawn(slot.subscribe(), 1);
            cluster.add_entity(ClusterEntity::spawned(member, EntityClassId(1), handle, Vec3::ZERO));
        }
        fixture.tracked.insert(handle);
        h.live_entities.store(1, Ordering::Release);

        let report = PositionReport {
            centroid: None,
            positions: Vec::new(),
            dead: vec![(cluster_id, member, handle)],
        };
        h.apply_position(&report, &fixture.tracked);
        assert!(h.is_dead());
        assert_eq!(h.live_entities(), 0);
        assert!(fixture.tracked.is_empty());
    }

    #[test]
    fn merge_takes_union_when_winner_scores_lower() {
        let mut ids = IdAllocator::default();
        let mut a = horde(&mut ids, Vec3::ZERO, &[2.0]);
        let mut b = horde(&mut ids, Vec3::new(80.0, 0.0, 0.0), &[3.0]);
        let requests = a.merge(&mut b, 10.0, true, 0).unwrap();
        assert!(requests.is_empty());
        assert_eq!(a.clusters().len(), 2);
        assert_eq!(a.density(), 5.0);
        assert!(b.is_merged());
        assert!(b.is_dead());
    }

    #[test]
    fn merge_is_refused_by_the_higher_scorer_and_taken_by_the_lower() {
        let mut ids = IdAllocator::default();
        let mut a = horde(&mut ids, Vec3::ZERO, &[2.0]);
        let mut b = horde(&mut ids, Vec3::new(50.0, 0.0, 0.0), &[3.0]);
        let b_cluster = b.clusters()[0].id();
        b.interrupt(vec![Box::new(GoToTargetCommand::new(Vec3::new(0.0, 0.0, 1000.0)))], true);
        assert!(b.objective_score(true) < a.objective_score(true));

        assert!(a.merge(&mut b, 10.0, true, 0).is_none());
        assert!(!b.is_merged());

        b.merge(&mut a, 10.0, true, 0).unwrap();
        assert!(a.is_merged());
        assert!(a.is_dead());
        assert_eq!(b.density(), 5.0);
        assert_eq!(b.clusters()[0].id(), b_cluster);
    }

    #[test]
    fn merge_respects_density_cap_and_kind_rules() {
        let mut ids = IdAllocator::default();
        let mut a = horde(&mut ids, Vec3::ZERO, &[6.0]);
        let mut b = horde(&mut ids, Vec3::ZERO, &[6.0]);
        assert!(a.merge(&mut b, 10.0, true, 0).is_none());
        assert!(!b.is_merged());

        let mut c = WorldHorde::from_blueprint(
            HordeBlueprint::new(Vec3::ZERO, Box::new(IdleGenerator)).with_cluster(kind("screamer"), 1.0),
            &mut ids,
            1,
            WorldRandom::from_seed(2),
        );
        let mut d = horde(&mut ids, Vec3::ZERO, &[1.0]);
        assert!(c.merge(&mut d, 10.0, true, 0).is_none());
    }

    #[test]
    fn split_conserves_density_under_cap() {
        let mut ids = IdAllocator::default();
        let mut h = horde(&mut ids, Vec3::ZERO, &[7.0, 8.0, 3.0]);
        let parts = h.split(10.0, &mut ids);
        let mut total = h.density();
        assert!(h.density() <= 10.0 + 1e-4);
        for part in &parts {
            let density: f32 = part.iter().map(HordeCluster::density).sum();
            assert!(density <= 10.0 + 1e-4);
            total += density;
        }
        assert!((total - 18.0).abs() < 1e-4);
        assert_eq!(parts.len(), 1);
    }

    fn biomes() -> RegionBiomeMap {
        RegionBiomeMap::new()
            .with_fallback("desert")
            .with_region(-100.0, -100.0, 100.0, 100.0, "pine_forest")
    }

    fn forest_horde(ids: &mut IdAllocator, location: Vec3, density: f32) -> WorldHorde {
        let blueprint = HordeBlueprint::new(location, Box::new(IdleGenerator))
            .with_cluster(kind("walker"), density)
            .in_biome("pine_forest");
        WorldHorde::from_blueprint(blueprint, ids, 0, WorldRandom::from_seed(1))
    }

    #[test]
    fn abstract_horde_decays_only_outside_its_biome() {
        let fixture = Fixture::new(Vec::new()).with_biomes(biomes(), 1.0);
        let mut ids = IdAllocator::default();
        let mut home = forest_horde(&mut ids, Vec3::new(20.0, 0.0, 0.0), 1.0);
        let mut stray = forest_horde(&mut ids, Vec3::new(500.0, 0.0, 0.0), 1.0);

        home.update(id(), &fixture.ctx(0));
        stray.update(id(), &fixture.ctx(0));

        assert_eq!(home.density(), 1.0);
        assert!((stray.density() - 0.9).abs() < 1e-5);
        assert_eq!(stray.spawn_biome(), Some("pine_forest"));
    }

    #[test]
    fn decayed_clusters_are_removed_and_the_horde_dies() {
        let fixture = Fixture::new(Vec::new()).with_biomes(biomes(), 10.0);
        let mut ids = IdAllocator::default();
        let mut stray = forest_horde(&mut ids, Vec3::new(500.0, 0.0, 0.0), 0.5);
        let out = stray.update(id(), &fixture.ctx(0));
        assert!(out.dead);
        assert!(stray.clusters().is_empty());
        assert_eq!(stray.density(), 0.0);
    }

    #[test]
    fn spawned_or_unmapped_hordes_never_decay() {
        let player = PlayerSnapshot::new(PlayerId(1), Vec3::new(450.0, 0.0, 0.0), 10);
        let fixture = Fixture::new(vec![player]).with_biomes(biomes(), 10.0);
        let mut ids = IdAllocator::default();
        let mut seen = forest_horde(&mut ids, Vec3::new(500.0, 0.0, 0.0), 0.5);
        let out = seen.update(id(), &fixture.ctx(0));
        assert!(!out.dead);
        assert!(seen.is_spawned());
        assert_eq!(seen.density(), 0.5);

        // No biome map: nothing to stray from.
        let plain = Fixture::new(Vec::new());
        let mut untagged = forest_horde(&mut ids, Vec3::new(500.0, 0.0, 0.0), 0.5);
        untagged.update(id(), &plain.ctx(0));
        assert_eq!(untagged.density(), 0.5);
    }
}
