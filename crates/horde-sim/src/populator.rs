//! Horde populators.
//!
//! Populators decide where new hordes come from. They run off the tracker
//! thread, read the tracker through its published subscriptions, and hand
//! new hordes over as [`HordeBlueprint`]s through a [`TrackerHandle`].

use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use horde_world::geometry::distance_xz;
use horde_world::player::PlayerSnapshot;
use horde_world::random::WorldRandom;
use tracing::{debug, trace, warn};

use crate::ai::generator::WanderingCommandGenerator;
use crate::horde::kind::HordeKind;
use crate::horde::world_horde::HordeBlueprint;
use crate::snapshot::ClusterTable;
use crate::subscription::Subscriber;
use crate::tracker::TrackerHandle;

/// Lowest density a populated cluster starts with.
const MIN_POPULATED_DENSITY: f32 = 0.1;

/// A source of new hordes.
pub trait HordePopulator: Send + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Cheap precheck; `populate` is skipped when this returns `false`.
    fn can_run(&self, _players: &[PlayerSnapshot], _clusters: &ClusterTable) -> bool {
        true
    }

    /// Hordes to add this update. May be empty.
    fn populate(
        &mut self,
        dt: f32,
        players: &[PlayerSnapshot],
        clusters: &ClusterTable,
        random: &mut WorldRandom,
    ) -> Vec<HordeBlueprint>;
}

// ---------------------------------------------------------------------------
// WorldHordePopulator
// ---------------------------------------------------------------------------

/// Runs every registered populator while the world is under its density
/// budget.
pub struct WorldHordePopulator {
    populators: Vec<Box<dyn HordePopulator>>,
    players: Subscriber<Vec<PlayerSnapshot>>,
    clusters: Subscriber<ClusterTable>,
    handle: TrackerHandle,
    random: WorldRandom,
    max_world_density: f32,
}

impl WorldHordePopulator {
    pub fn new(handle: TrackerHandle, random: WorldRandom, max_world_density: f32) -> Self {
        Self {
            populators: Vec::new(),
            players: handle.player_subscriber(),
            clusters: handle.cluster_subscriber(),
            handle,
            random,
            max_world_density,
        }
    }

    pub fn register(&mut self, populator: impl HordePopulator + 'static) -> &mut Self {
        debug!(populator = populator.name(), "horde populator registered");
        self.populators.push(Box::new(populator));
        self
    }

    pub fn len(&self) -> usize {
        self.populators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.populators.is_empty()
    }

    /// Run one round. Returns the number of hordes handed to the tracker.
    ///
    /// Nothing happens until the tracker has published its first tick.
    pub fn update(&mut self, dt: f32) -> usize {
        let (Some(players), Some(clusters)) = (self.players.latest(), self.clusters.latest()) else {
            return 0;
        };
        let mut density: f32 = clusters.values().flatten().map(|c| c.density).sum();
        if density >= self.max_world_density {
            trace!(density, max = self.max_world_density, "world density budget reached");
            return 0;
        }

        let mut added = 0;
        'populators: for populator in &mut self.populators {
            if !populator.can_run(&players, &clusters) {
                continue;
            }
            for blueprint in populator.populate(dt, &players, &clusters, &mut self.random) {
                if density + blueprint.density() > self.max_world_density {
                    break 'populators;
                }
                density += blueprint.density();
                if let Err(err) = self.handle.add(blueprint) {
                    warn!(%err, populator = populator.name(), "tracker gone; populated horde dropped");
                    break 'populators;
                }
                added += 1;
            }
        }
        if added > 0 {
            debug!(added, density, "populated hordes");
        }
        added
    }
}

impl fmt::Debug for WorldHordePopulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldHordePopulator")
            .field("populators", &self.populators)
            .field("max_world_density", &self.max_world_density)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WildernessHordePopulator
// ---------------------------------------------------------------------------

/// Drops single-cluster hordes of one kind at random points of the map,
/// away from players and from other clusters of the same kind.
#[derive(Debug)]
pub struct WildernessHordePopulator {
    kind: Arc<dyn HordeKind>,
    half_extent: f32,
    view_distance: f32,
    spacing: f32,
}

impl WildernessHordePopulator {
    pub fn new(kind: Arc<dyn HordeKind>, map_size: f32, view_distance: f32) -> Self {
        Self {
            kind,
            half_extent: map_size / 2.0,
            view_distance,
            spacing: view_distance * 4.0,
        }
    }

    fn bounds(&self) -> (Vec3, Vec3) {
        (
            Vec3::new(-self.half_extent, 0.0, -self.half_extent),
            Vec3::new(self.half_extent, 0.0, self.half_extent),
        )
    }

    /// `true` if no player can see `location` and no cluster of this kind
    /// is already close to it.
    fn is_free(&self, location: Vec3, players: &[PlayerSnapshot], clusters: &ClusterTable) -> bool {
        if players
            .iter()
            .any(|p| distance_xz(p.location, location) <= self.view_distance)
        {
            return false;
        }
        clusters.get(&self.kind.id()).map_or(true, |same| {
            same.iter()
                .all(|c| distance_xz(c.location, location) > self.spacing)
        })
    }
}

impl HordePopulator for WildernessHordePopulator {
    fn name(&self) -> &'static str {
        "wilderness"
    }

    fn populate(
        &mut self,
        _dt: f32,
        players: &[PlayerSnapshot],
        clusters: &ClusterTable,
        random: &mut WorldRandom,
    ) -> Vec<HordeBlueprint> {
        let (min, max) = self.bounds();
        let location = random.random_location(min, max);
        if !self.is_free(location, players, clusters) {
            return Vec::new();
        }
        let density = random.random_f32().max(MIN_POPULATED_DENSITY);
        trace!(kind = %self.kind.id(), ?location, density, "wilderness horde placed");
        vec![HordeBlueprint::new(location, Box::new(WanderingCommandGenerator::new(min, max)))
            .with_cluster(Arc::clone(&self.kind), density)]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horde::kind::{HordeKindId, HordeKindRegistry, UniformHordeKind};
    use crate::request::RequestProcessor;
    use crate::snapshot::ClusterSnapshot;
    use crate::tracker::{WorldHordeTracker, WorldSnapshot};
    use crate::TrackerConfig;
    use horde_world::prelude::*;

    fn walker() -> Arc<dyn HordeKind> {
        Arc::new(UniformHordeKind::new("walker", vec![EntityClassId(1)]))
    }

    #[test]
    fn wilderness_avoids_players_and_same_kind() {
        let populator = WildernessHordePopulator::new(walker(), 1000.0, 90.0);
        let players = vec![PlayerSnapshot::new(PlayerId(1), Vec3::ZERO, 1)];
        let mut table = ClusterTable::new();
        assert!(!populator.is_free(Vec3::new(50.0, 0.0, 0.0), &players, &table));
        assert!(populator.is_free(Vec3::new(200.0, 0.0, 0.0), &players, &table));

        table.entry(HordeKindId("walker")).or_default().push(ClusterSnapshot {
            kind: HordeKindId("walker"),
            location: Vec3::new(300.0, 0.0, 0.0),
            density: 1.0,
        });
        assert!(!populator.is_free(Vec3::new(200.0, 0.0, 0.0), &players, &table));
        table.clear();
        table.entry(HordeKindId("screamer")).or_default().push(ClusterSnapshot {
            kind: HordeKindId("screamer"),
            location: Vec3::new(300.0, 0.0, 0.0),
            density: 1.0,
        });
        assert!(populator.is_free(Vec3::new(200.0, 0.0, 0.0), &players, &table));
    }

    #[test]
    fn wilderness_blueprints_stay_on_the_map() {
        let mut populator = WildernessHordePopulator::new(walker(), 1000.0, 90.0);
        let mut random = WorldRandom::from_seed(5);
        let table = ClusterTable::new();
        for _ in 0..50 {
            for blueprint in populator.populate(0.1, &[], &table, &mut random) {
                assert!(blueprint.location.x.abs() <= 500.0);
                assert!(blueprint.location.z.abs() <= 500.0);
                assert!(blueprint.density() >= MIN_POPULATED_DENSITY);
                assert!(blueprint.density() <= 1.0);
            }
        }
    }

    #[test]
    fn world_populator_waits_for_first_tick_and_respects_budget() {
        let registry = Arc::new(
            HordeKindRegistry::builder()
                .register(UniformHordeKind::new("walker", vec![EntityClassId(1)]))
                .unwrap()
                .build(),
        );
        let kind = Arc::clone(registry.get("walker").unwrap());
        let processor = RequestProcessor::new();
        let config = TrackerConfig {
            max_world_density: 2.0,
            ..Default::default()
        };
        let mut tracker =
            WorldHordeTracker::new(config, registry, Arc::new(PcgRandomFactory::new(1)), processor.sender()).unwrap();

        let mut world = WorldHordePopulator::new(tracker.handle(), WorldRandom::from_seed(9), 2.0);
        world.register(WildernessHordePopulator::new(kind, 100_000.0, 90.0));
        assert_eq!(world.update(0.1), 0);

        tracker.tick(0.1, &WorldSnapshot::default()).unwrap();
        for _ in 0..20 {
            world.update(0.1);
            tracker.tick(0.1, &WorldSnapshot::default()).unwrap();
        }
        assert!(!tracker.is_empty());
        assert!(tracker.snapshot().total_density() <= 2.0 + 1e-4);
    }
}
