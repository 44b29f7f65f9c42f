//! The world horde tracker.
//!
//! [`WorldHordeTracker::tick`] advances every horde by one step in five
//! phases:
//!
//! 0. **feedback**: apply [`HordeEvent`]s sent by main-thread requests since
//!    the last tick (new, respawned and despawned entities, finished horde
//!    despawns);
//! 1. **snapshot**: publish the players captured on the live thread and
//!    collect fresh world-event reports;
//! 2. **parallel**: run [`WorldHorde::update`] for every horde on a bounded
//!    rayon pool; each horde returns the requests it needs;
//! 3. **merge**: split oversized hordes, then try to merge nearby pairs;
//! 4. **drain**: apply queued [`TrackerHandle`] commands, remove dead and
//!    absorbed hordes, publish the cluster table and submit every request,
//!    in horde order, to the request processor.
//!
//! The tracker never touches the live world itself; the only shared mutable
//! state is the tracked-entity set and the live-entity counters, both
//! updated by requests on the live thread.
//!
//! # Example
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
//! let walker = Arc::clone(registry.get("walker").unwrap());
//!
//! let mut processor = RequestProcessor::new();
//! let mut tracker = WorldHordeTracker::new(
//!     TrackerConfig::default(),
//!     registry,
//!     Arc::new(PcgRandomFactory::new(7)),
//!     processor.sender(),
//! )?;
//! tracker.add(HordeBlueprint::new(Vec3::new(50.0, 0.0, 0.0), Box::new(IdleGenerator)).with_cluster(walker, 1.0));
//!
//! let mut world = MemoryWorld::new();
//! world.upsert_player(PlayerSnapshot::new(PlayerId(1), Vec3::ZERO, 10));
//!
//! let diagnostics = tracker.tick(0.1, &WorldSnapshot::capture(&world))?;
//! assert_eq!(diagnostics.requests_submitted, 1);
//! processor.update(0.1, &mut world);
//! assert_eq!(world.entity_count(), 1);
//! # Ok::<(), horde_sim::SimError>(())
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashSet;
use glam::Vec3;
use horde_world::arena::Arena;
use horde_world::biome::BiomeMap;
use horde_world::entity::EntityId;
use horde_world::geometry::distance_xz;
use horde_world::live::LiveWorld;
use horde_world::player::PlayerSnapshot;
use horde_world::random::{stable_seed, RandomFactory, WorldRandom};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::ai::command::{AiCommand, CommandGenerator};
use crate::config::TrackerConfig;
use crate::event::{WorldEventReporter, WorldEventSender};
use crate::horde::cluster::{ClusterId, HordeCluster, SpawnState};
use crate::horde::entity::{ClusterEntity, ClusterEntityId};
use crate::horde::kind::HordeKindRegistry;
use crate::horde::requests::{EntityDespawnRequest, HordeEvent, RequestLinks};
use crate::horde::world_horde::{HordeBlueprint, HordeTickContext, HordeTickOutput, WorldHorde};
use crate::horde::{HordeId, IdAllocator};
use crate::request::{BoxedRequest, RequestSender};
use crate::snapshot::{cluster_table, ClusterTable, TrackerSnapshot};
use crate::subscription::{Subscriber, Subscription};
use crate::SimError;

/// Radius around an oversized horde in which its split-off parts appear.
const SPLIT_SCATTER_RADIUS: f32 = 10.0;

// ---------------------------------------------------------------------------
// WorldSnapshot
// ---------------------------------------------------------------------------

/// Live-world state captured on the live thread before a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldSnapshot {
    pub players: Vec<PlayerSnapshot>,
    pub is_daytime: bool,
    pub world_time: f64,
}

impl WorldSnapshot {
    pub fn capture(world: &dyn LiveWorld) -> Self {
        Self {
            players: world.players(),
            is_daytime: world.is_daytime(),
            world_time: world.world_time(),
        }
    }
}

// ---------------------------------------------------------------------------
// TrackerDiagnostics
// ---------------------------------------------------------------------------

/// Counters for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerDiagnostics {
    pub tick: u64,
    pub hordes: usize,
    pub spawned_hordes: usize,
    pub clusters: usize,
    pub live_entities: usize,
    pub total_density: f32,
    pub events_applied: usize,
    pub stale_events: usize,
    pub hordes_added: usize,
    pub hordes_removed: usize,
    pub merges: usize,
    pub splits: usize,
    pub requests_submitted: usize,
}

// ---------------------------------------------------------------------------
// TrackerHandle
// ---------------------------------------------------------------------------

enum TrackerCommand {
    Add(HordeBlueprint),
    Interrupt(HordeId, Vec<Box<dyn AiCommand>>),
    Flush,
}

/// Thread-safe access to a tracker that may be running elsewhere.
///
/// Commands are queued and applied in the drain phase of the next tick.
#[derive(Clone)]
pub struct TrackerHandle {
    commands: Sender<TrackerCommand>,
    clusters: Subscriber<ClusterTable>,
    players: Subscriber<Vec<PlayerSnapshot>>,
    tracked: Arc<DashSet<EntityId>>,
    events: WorldEventSender,
}

impl TrackerHandle {
    /// Queue a new horde.
    pub fn add(&self, blueprint: HordeBlueprint) -> Result<(), SimError> {
        self.send(TrackerCommand::Add(blueprint))
    }

    /// Queue an interrupt of a horde's objective.
    pub fn interrupt(&self, horde: HordeId, commands: Vec<Box<dyn AiCommand>>) -> Result<(), SimError> {
        self.send(TrackerCommand::Interrupt(horde, commands))
    }

    /// Queue removal of every horde.
    pub fn flush(&self) -> Result<(), SimError> {
        self.send(TrackerCommand::Flush)
    }

    /// Reader of the per-kind cluster table published after every tick.
    pub fn cluster_subscriber(&self) -> Subscriber<ClusterTable> {
        self.clusters.clone()
    }

    /// Reader of the players captured for the latest tick.
    pub fn player_subscriber(&self) -> Subscriber<Vec<PlayerSnapshot>> {
        self.players.clone()
    }

    /// `false` while `entity` belongs to a horde; the host must not remove
    /// it on its own.
    pub fn can_world_despawn(&self, entity: EntityId) -> bool {
        !self.tracked.contains(&entity)
    }

    pub fn event_sender(&self) -> WorldEventSender {
        self.events.clone()
    }

    /// Report noise that may draw hordes.
    pub fn report_event(&self, location: Vec3, interest: f32) {
        self.events.report(location, interest);
    }

    fn send(&self, command: TrackerCommand) -> Result<(), SimError> {
        self.commands.send(command).map_err(|_| SimError::TrackerClosed)
    }
}

impl std::fmt::Debug for TrackerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerHandle")
            .field("queued", &self.commands.len())
            .field("tracked", &self.tracked.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WorldHordeTracker
// ---------------------------------------------------------------------------

/// Owns every horde and runs the per-tick phases.
pub struct WorldHordeTracker {
    config: TrackerConfig,
    registry: Arc<HordeKindRegistry>,
    random_factory: Arc<dyn RandomFactory>,
    requests: RequestSender,
    hordes: Arena<HordeId, WorldHorde>,
    ids: IdAllocator,
    next_sequence: u64,
    tick: u64,
    horde_pool: rayon::ThreadPool,
    cluster_pool: rayon::ThreadPool,
    events_tx: Sender<HordeEvent>,
    events_rx: Receiver<HordeEvent>,
    commands_tx: Sender<TrackerCommand>,
    commands_rx: Receiver<TrackerCommand>,
    tracked: Arc<DashSet<EntityId>>,
    cluster_owner: BTreeMap<ClusterId, HordeId>,
    cluster_table: Subscription<ClusterTable>,
    players: Subscription<Vec<PlayerSnapshot>>,
    event_reporter: WorldEventReporter,
    merge_random: WorldRandom,
    biomes: Option<Arc<dyn BiomeMap>>,
    diagnostics: TrackerDiagnostics,
}

impl WorldHordeTracker {
    /// Validate `config` and build the worker pools.
    pub fn new(
        config: TrackerConfig,
        registry: Arc<HordeKindRegistry>,
        random_factory: Arc<dyn RandomFactory>,
        requests: RequestSender,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let horde_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.horde_threads)
            .thread_name(|i| format!("horde-worker-{i}"))
            .build()?;
        let cluster_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.cluster_threads)
            .thread_name(|i| format!("cluster-worker-{i}"))
            .build()?;
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let merge_random = random_factory.create_random(stable_seed(&[config.world_seed, u64::MAX]));
        let event_reporter = WorldEventReporter::new(
            config.map_size,
            config.event_chunk_radius,
            config.event_interest_distance_multiplier,
        );
        info!(
            horde_threads = config.horde_threads,
            cluster_threads = config.cluster_threads,
            kinds = registry.len(),
            "world horde tracker created"
        );
        Ok(Self {
            config,
            registry,
            random_factory,
            requests,
            hordes: Arena::new(),
            ids: IdAllocator::default(),
            next_sequence: 0,
            tick: 0,
            horde_pool,
            cluster_pool,
            events_tx,
            events_rx,
            commands_tx,
            commands_rx,
            tracked: Arc::new(DashSet::new()),
            cluster_owner: BTreeMap::new(),
            cluster_table: Subscription::new(),
            players: Subscription::new(),
            event_reporter,
            merge_random,
            biomes: None,
            diagnostics: TrackerDiagnostics::default(),
        })
    }

    /// Give hordes a biome to belong to. Abstract hordes outside the biome
    /// they were added in lose density over time.
    pub fn with_biome_map(mut self, biomes: Arc<dyn BiomeMap>) -> Self {
        self.biomes = Some(biomes);
        self
    }

    pub fn handle(&self) -> TrackerHandle {
        TrackerHandle {
            commands: self.commands_tx.clone(),
            clusters: self.cluster_table.subscribe(),
            players: self.players.subscribe(),
            tracked: Arc::clone(&self.tracked),
            events: self.event_reporter.sender(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HordeKindRegistry> {
        &self.registry
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn len(&self) -> usize {
        self.hordes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hordes.is_empty()
    }

    pub fn horde(&self, id: HordeId) -> Option<&WorldHorde> {
        self.hordes.get(id)
    }

    pub fn hordes(&self) -> impl Iterator<Item = (HordeId, &WorldHorde)> {
        self.hordes.iter()
    }

    /// Horde owning `cluster`, as of the last drain phase.
    pub fn cluster_owner(&self, cluster: ClusterId) -> Option<HordeId> {
        self.cluster_owner.get(&cluster).copied()
    }

    pub fn diagnostics(&self) -> &TrackerDiagnostics {
        &self.diagnostics
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot::capture(self.tick, self.hordes.iter())
    }

    /// Add a horde right away, bypassing the command queue. Returns `None`
    /// if the blueprint is empty or names an unregistered kind.
    pub fn add(&mut self, mut blueprint: HordeBlueprint) -> Option<HordeId> {
        if blueprint.clusters.is_empty() {
            warn!("ignoring horde blueprint without clusters");
            return None;
        }
        if let Some((kind, _)) = blueprint
            .clusters
            .iter()
            .find(|(kind, _)| self.registry.get(kind.id().0).is_none())
        {
            warn!(kind = %kind.id(), "ignoring horde blueprint with unregistered kind");
            return None;
        }
        if blueprint.biome.is_none() {
            blueprint.biome = self.biome_at(blueprint.location);
        }
        let sequence = self.next_sequence();
        let random = self.horde_random(sequence);
        let horde = WorldHorde::from_blueprint(blueprint, &mut self.ids, sequence, random);
        Some(self.insert(horde))
    }

    fn adopt_clusters(
        &mut self,
        location: Vec3,
        clusters: Vec<HordeCluster>,
        generator: Box<dyn CommandGenerator>,
        spawn_biome: Option<String>,
    ) -> HordeId {
        let sequence = self.next_sequence();
        let random = self.horde_random(sequence);
        let horde = WorldHorde::from_clusters(location, clusters, generator, spawn_biome, sequence, random);
        self.insert(horde)
    }

    fn insert(&mut self, horde: WorldHorde) -> HordeId {
        let id = self.hordes.insert(horde);
        if let Some(horde) = self.hordes.get(id) {
            for cluster in horde.clusters() {
                self.cluster_owner.insert(cluster.id(), id);
            }
        }
        self.diagnostics.hordes_added += 1;
        debug!(horde = ?id, "horde added");
        id
    }

    /// Biome at `location`, or the configured default when the map has a
    /// gap there. `None` without a map.
    fn biome_at(&self, location: Vec3) -> Option<String> {
        let map = self.biomes.as_ref()?;
        Some(
            map.biome_at(location)
                .unwrap_or(self.config.default_biome.as_str())
                .to_owned(),
        )
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn horde_random(&self, sequence: u64) -> WorldRandom {
        self.random_factory
            .create_random(stable_seed(&[self.config.world_seed, sequence]))
    }

    /// Remove a horde, releasing its AI and random stream.
    fn retire(&mut self, id: HordeId) -> bool {
        let Some(mut horde) = self.hordes.remove(id) else {
            return false;
        };
        horde.ai_mut().release_all();
        self.random_factory.free_random(horde.take_random());
        trace!(horde = ?id, merged = horde.is_merged(), "horde removed");
        true
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one full tick.
    ///
    /// Fails only if the request processor has shut down.
    pub fn tick(&mut self, dt: f32, world: &WorldSnapshot) -> Result<&TrackerDiagnostics, SimError> {
        self.tick += 1;
        self.diagnostics = TrackerDiagnostics {
            tick: self.tick,
            ..Default::default()
        };

        let mut requests = self.apply_feedback();

        self.players.publish(world.players.clone());
        let reports = self.event_reporter.update(world.world_time);

        let mut dead = Vec::new();
        for (id, output) in self.update_hordes(dt, world, &reports) {
            requests.extend(output.requests);
            if output.dead {
                dead.push(id);
            }
        }

        if self.config.split_oversized_hordes {
            self.split_oversized();
        }
        requests.extend(self.merge_nearby(world.is_daytime));

        requests.extend(self.apply_commands(world.is_daytime));
        let absorbed: Vec<HordeId> = self
            .hordes
            .iter()
            .filter(|(_, h)| h.is_merged() || h.is_dead())
            .map(|(id, _)| id)
            .collect();
        for id in dead.into_iter().chain(absorbed) {
            if self.retire(id) {
                self.diagnostics.hordes_removed += 1;
            }
        }
        self.publish_clusters();

        self.diagnostics.requests_submitted = self.requests.submit_all(requests)?;
        self.collect_diagnostics();
        Ok(&self.diagnostics)
    }

    /// Phase 0: apply results of main-thread requests.
    fn apply_feedback(&mut self) -> Vec<BoxedRequest> {
        let mut requests: Vec<BoxedRequest> = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            let applied = match event {
                HordeEvent::EntitySpawned {
                    cluster,
                    entity,
                    class,
                    location,
                } => {
                    let member = self.ids.member();
                    let record = ClusterEntity::spawned(member, class, entity, location);
                    self.on_entity_spawned(cluster, record, &mut requests)
                }
                HordeEvent::EntityRespawned {
                    cluster,
                    member,
                    entity,
                    location,
                } => self.on_entity_respawned(cluster, member, entity, location, &mut requests),
                HordeEvent::EntityDespawned {
                    cluster,
                    member,
                    location,
                } => self.on_entity_despawned(cluster, member, location),
                HordeEvent::HordeDespawned { horde } => match self.hordes.get_mut(horde) {
                    Some(h) => {
                        h.on_despawned();
                        debug!(horde = ?horde, "horde despawned");
                        true
                    }
                    None => false,
                },
            };
            if applied {
                self.diagnostics.events_applied += 1;
            } else {
                debug!("dropped stale horde event");
                self.diagnostics.stale_events += 1;
            }
        }
        requests
    }

    /// Despawn an entity that no cluster will own.
    fn stray_despawn(&self, entity: EntityId, counter: Option<Arc<AtomicUsize>>) -> BoxedRequest {
        let links = RequestLinks {
            events: self.events_tx.clone(),
            tracked: Arc::clone(&self.tracked),
            live_entities: counter.unwrap_or_default(),
        };
        Box::new(EntityDespawnRequest::untracked(entity, links))
    }

    fn owner_of(&mut self, cluster: ClusterId) -> Option<&mut WorldHorde> {
        let id = self.cluster_owner.get(&cluster).copied()?;
        self.hordes.get_mut(id)
    }

    fn on_entity_spawned(&mut self, cluster: ClusterId, record: ClusterEntity, requests: &mut Vec<BoxedRequest>) -> bool {
        let Some(entity) = record.handle() else {
            return false;
        };
        let world_seed = self.config.world_seed;
        let Some(horde) = self.owner_of(cluster) else {
            requests.push(self.stray_despawn(entity, None));
            return false;
        };
        let counter = Arc::clone(horde.live_counter());
        let sequence = horde.sequence();
        let local = match horde.cluster_mut(cluster) {
            Some(target) if target.state() != SpawnState::Despawned => {
                let local = target.kind().entity_command_generator();
                target.add_entity(record);
                local
            }
            Some(_) => {
                // The cluster was despawned while its batch was still running.
                trace!(cluster = %cluster, entity = ?entity, "late spawn despawned");
                requests.push(self.stray_despawn(entity, Some(counter)));
                return true;
            }
            None => {
                requests.push(self.stray_despawn(entity, Some(counter)));
                return false;
            }
        };
        let random = WorldRandom::from_seed(stable_seed(&[world_seed, sequence, entity.to_raw()]));
        requests.push(Box::new(horde.ai_mut().add_entity(entity, local, random)));
        true
    }

    fn on_entity_respawned(
        &mut self,
        cluster: ClusterId,
        member: ClusterEntityId,
        entity: Option<EntityId>,
        location: Vec3,
        requests: &mut Vec<BoxedRequest>,
    ) -> bool {
        let world_seed = self.config.world_seed;
        let Some(horde) = self.owner_of(cluster) else {
            requests.extend(entity.map(|e| self.stray_despawn(e, None)));
            return false;
        };
        let counter = Arc::clone(horde.live_counter());
        let sequence = horde.sequence();
        let local = match horde.cluster_mut(cluster) {
            Some(target) if target.state() != SpawnState::Despawned => {
                let local = target.kind().entity_command_generator();
                match target.entity_mut(member) {
                    Some(record) => {
                        record.on_respawned(entity, location);
                        local
                    }
                    None => {
                        requests.extend(entity.map(|e| self.stray_despawn(e, Some(counter))));
                        return false;
                    }
                }
            }
            _ => {
                requests.extend(entity.map(|e| self.stray_despawn(e, Some(counter))));
                return false;
            }
        };
        if let Some(handle) = entity {
            let random = WorldRandom::from_seed(stable_seed(&[world_seed, sequence, handle.to_raw()]));
            requests.push(Box::new(horde.ai_mut().add_entity(handle, local, random)));
        }
        true
    }

    fn on_entity_despawned(&mut self, cluster: ClusterId, member: ClusterEntityId, location: Option<Vec3>) -> bool {
        let Some(horde) = self.owner_of(cluster) else {
            return false;
        };
        let Some(record) = horde.cluster_mut(cluster).and_then(|c| c.entity_mut(member)) else {
            return false;
        };
        let handle = record.handle();
        record.on_despawned(location);
        if let Some(handle) = handle {
            horde.ai_mut().release_entity(handle);
        }
        true
    }

    /// Phase 2: update every horde in parallel; outputs are in arena order.
    fn update_hordes(
        &mut self,
        dt: f32,
        world: &WorldSnapshot,
        reports: &[crate::event::WorldEventReport],
    ) -> Vec<(HordeId, HordeTickOutput)> {
        let ctx = HordeTickContext {
            config: &self.config,
            players: &world.players,
            reports,
            is_daytime: world.is_daytime,
            dt,
            tick: self.tick,
            events: &self.events_tx,
            tracked: &self.tracked,
            random_factory: &self.random_factory,
            cluster_pool: &self.cluster_pool,
            biomes: self.biomes.as_deref(),
        };
        let work: Vec<(HordeId, &mut WorldHorde)> = self.hordes.iter_mut().collect();
        self.horde_pool.install(|| {
            work.into_par_iter()
                .map(|(id, horde)| (id, horde.update(id, &ctx)))
                .collect()
        })
    }

    /// Phase 3a: split unspawned hordes above the density cap.
    fn split_oversized(&mut self) {
        let cap = self.config.max_horde_density;
        let mut created = Vec::new();
        for (id, horde) in self.hordes.iter_mut() {
            let parts = horde.split(cap, &mut self.ids);
            if parts.is_empty() {
                continue;
            }
            debug!(horde = ?id, parts = parts.len(), "splitting oversized horde");
            for clusters in parts {
                let location = horde.nearby_location(SPLIT_SCATTER_RADIUS);
                let biome = horde.spawn_biome().map(str::to_owned);
                created.push((location, clusters, horde.fork_generator(), biome));
            }
        }
        for (location, clusters, generator, biome) in created {
            self.adopt_clusters(location, clusters, generator, biome);
            self.diagnostics.splits += 1;
        }
    }

    /// Phase 3b: pairwise merge of settled hordes.
    fn merge_nearby(&mut self, is_daytime: bool) -> Vec<BoxedRequest> {
        let mut requests = Vec::new();
        let keys = self.hordes.keys();
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                let Some((a, b)) = self.hordes.get_pair_mut(keys[i], keys[j]) else {
                    continue;
                };
                if a.is_merged() || b.is_merged() || a.is_dead() || b.is_dead() {
                    continue;
                }
                if !a.is_settled() || !b.is_settled() {
                    continue;
                }
                let threshold = match (a.is_spawned(), b.is_spawned()) {
                    (true, true) => self.config.merge_distance_loaded,
                    (false, false) => self.config.merge_distance_unloaded,
                    _ => continue,
                };
                if distance_xz(a.location(), b.location()) > threshold {
                    continue;
                }
                if !self.merge_random.random_chance(self.config.merge_chance) {
                    continue;
                }
                let cap = self.config.max_horde_density;
                let seed = self.config.world_seed;
                let outcome = match a.merge(b, cap, is_daytime, seed) {
                    Some(adopted) => Some((adopted, keys[i], keys[j])),
                    None => b.merge(a, cap, is_daytime, seed).map(|adopted| (adopted, keys[j], keys[i])),
                };
                match outcome {
                    Some((adopted, winner, loser)) => {
                        debug!(winner = ?winner, loser = ?loser, "hordes merged");
                        requests.extend(adopted);
                        self.diagnostics.merges += 1;
                    }
                    None => trace!(a = ?keys[i], b = ?keys[j], "merge refused"),
                }
            }
        }
        requests
    }

    /// Phase 4a: apply queued handle commands.
    fn apply_commands(&mut self, is_daytime: bool) -> Vec<BoxedRequest> {
        let mut requests: Vec<BoxedRequest> = Vec::new();
        while let Ok(command) = self.commands_rx.try_recv() {
            match command {
                TrackerCommand::Add(blueprint) => {
                    self.add(blueprint);
                }
                TrackerCommand::Interrupt(id, commands) => match self.hordes.get_mut(id) {
                    Some(horde) => horde.interrupt(commands, is_daytime),
                    None => debug!(horde = ?id, "interrupt for a removed horde"),
                },
                TrackerCommand::Flush => requests.extend(self.flush()),
            }
        }
        requests
    }

    /// Remove every horde, despawning whatever is live.
    pub fn flush(&mut self) -> Vec<BoxedRequest> {
        let mut requests: Vec<BoxedRequest> = Vec::new();
        let per_frame = self.config.despawns_per_frame;
        for (id, horde) in self.hordes.iter_mut() {
            let links = RequestLinks {
                events: self.events_tx.clone(),
                tracked: Arc::clone(&self.tracked),
                live_entities: Arc::clone(horde.live_counter()),
            };
            requests.extend(horde.despawn(id, per_frame, links));
        }
        let removed = self.hordes.len();
        for id in self.hordes.keys() {
            self.retire(id);
        }
        self.cluster_owner.clear();
        self.diagnostics.hordes_removed += removed;
        info!(removed, "tracker flushed");
        requests
    }

    /// Phase 4b: rebuild the cluster index and publish the table.
    fn publish_clusters(&mut self) {
        self.cluster_owner.clear();
        for (id, horde) in self.hordes.iter() {
            for cluster in horde.clusters() {
                self.cluster_owner.insert(cluster.id(), id);
            }
        }
        self.cluster_table
            .publish(cluster_table(self.hordes.iter().map(|(_, h)| h)));
    }

    fn collect_diagnostics(&mut self) {
        let d = &mut self.diagnostics;
        d.hordes = self.hordes.len();
        for (_, horde) in self.hordes.iter() {
            if horde.is_spawned() {
                d.spawned_hordes += 1;
            }
            d.clusters += horde.clusters().len();
            d.live_entities += horde.live_entities();
            d.total_density += horde.density();
        }
    }
}

impl std::fmt::Debug for WorldHordeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldHordeTracker")
            .field("tick", &self.tick)
            .field("hordes", &self.hordes.len())
            .field("tracked", &self.tracked.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
