//! Property tests for horde density bookkeeping.
//!
//! Kills lower a cluster's density exactly in proportion to its batch, and
//! the tracker's merge and split passes move density between hordes without
//! creating or destroying any. Biome decay only ever removes density.

use std::sync::Arc;

use glam::Vec3;
use horde_sim::horde::ClusterDensity;
use horde_sim::prelude::*;
use horde_world::prelude::*;
use proptest::prelude::*;

fn tracker(config: TrackerConfig) -> (WorldHordeTracker, RequestProcessor, Arc<dyn HordeKind>) {
    let registry = Arc::new(
        HordeKindRegistry::builder()
            .register(UniformHordeKind::new("walker", vec![EntityClassId(1)]))
            .unwrap()
            .build(),
    );
    let walker = Arc::clone(registry.get("walker").unwrap());
    let processor = RequestProcessor::new();
    let tracker = WorldHordeTracker::new(config, registry, Arc::new(PcgRandomFactory::new(5)), processor.sender()).unwrap();
    (tracker, processor, walker)
}

/// Densities in quarter steps, so sums compare exactly.
fn quarter_density(max_quarters: u32) -> impl Strategy<Value = f32> {
    (1..=max_quarters).prop_map(|q| q as f32 * 0.25)
}

#[derive(Debug, Clone)]
enum TrackerOp {
    Add { x: f32, z: f32, density: f32 },
    Tick,
}

fn tracker_op_strategy() -> impl Strategy<Value = TrackerOp> {
    prop_oneof![
        ((-300i32..300), (-300i32..300), quarter_density(60))
            .prop_map(|(x, z, density)| TrackerOp::Add { x: x as f32, z: z as f32, density }),
        Just(TrackerOp::Tick),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1_000))]

    #[test]
    fn kills_scale_density_by_batch(density in 0.1f32..50.0, size in 1usize..40, kills in 0usize..60) {
        let mut cluster = ClusterDensity::new(density);
        cluster.begin_batch(size);
        for _ in 0..kills {
            cluster.record_kill();
        }
        let k = kills.min(size);
        if k == size {
            prop_assert_eq!(cluster.value(), 0.0);
        } else {
            let expected = density * (size - k) as f32 / size as f32;
            prop_assert!((cluster.value() - expected).abs() <= expected.abs() * 1e-5 + 1e-6);
        }
        prop_assert!(cluster.value() <= density);
    }

    #[test]
    fn decay_never_drives_density_negative(density in 0.0f32..20.0, steps in prop::collection::vec(-1.0f32..5.0, 1..20)) {
        let mut cluster = ClusterDensity::new(density);
        let mut previous = cluster.value();
        for amount in steps {
            cluster.decay(amount);
            prop_assert!(cluster.value() >= 0.0);
            prop_assert!(cluster.value() <= previous);
            previous = cluster.value();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn merge_happens_iff_union_fits(a in quarter_density(40), b in quarter_density(40)) {
        let config = TrackerConfig {
            merge_chance: 1.0,
            max_horde_density: 10.0,
            ..Default::default()
        };
        let (mut tracker, _processor, walker) = tracker(config);
        tracker.add(HordeBlueprint::new(Vec3::ZERO, Box::new(IdleGenerator)).with_cluster(Arc::clone(&walker), a));
        tracker.add(HordeBlueprint::new(Vec3::new(30.0, 0.0, 0.0), Box::new(IdleGenerator)).with_cluster(walker, b));
        let diagnostics = tracker.tick(0.1, &WorldSnapshot::default()).unwrap().clone();

        prop_assert!((diagnostics.total_density - (a + b)).abs() < 1e-4);
        for (_, horde) in tracker.hordes() {
            prop_assert!(horde.density() <= 10.0 + 1e-4);
        }
        if a + b <= 10.0 {
            prop_assert_eq!(tracker.len(), 1);
            prop_assert_eq!(diagnostics.merges, 1);
        } else {
            prop_assert_eq!(diagnostics.merges, 0);
        }
    }

    #[test]
    fn abstract_ticks_conserve_density(ops in prop::collection::vec(tracker_op_strategy(), 1..40)) {
        let config = TrackerConfig {
            merge_chance: 0.5,
            max_horde_density: 10.0,
            ..Default::default()
        };
        let (mut tracker, _processor, walker) = tracker(config);
        let mut added = 0.0f32;
        let mut hordes = 0usize;

        for op in ops {
            match op {
                TrackerOp::Add { x, z, density } => {
                    let blueprint = HordeBlueprint::new(Vec3::new(x, 0.0, z), Box::new(IdleGenerator))
                        .with_cluster(Arc::clone(&walker), density);
                    prop_assert!(tracker.add(blueprint).is_some());
                    added += density;
                    hordes += 1;
                }
                TrackerOp::Tick => {
                    let d = tracker.tick(0.1, &WorldSnapshot::default()).unwrap().clone();
                    prop_assert!((d.total_density - added).abs() < 1e-2);
                    prop_assert!(d.hordes <= hordes + d.splits);
                    hordes = d.hordes;
                    for (_, horde) in tracker.hordes() {
                        prop_assert!(horde.density() <= 10.0 + 1e-3);
                        prop_assert!(!horde.is_dead());
                    }
                }
            }
        }
    }

    #[test]
    fn stray_horde_decays_to_nothing_and_is_removed(
        density in quarter_density(20),
        rate in 0.05f32..2.0,
        ticks in 1usize..60,
    ) {
        const DT: f32 = 0.5;
        let config = TrackerConfig {
            biome_decay_rate: rate,
            ..Default::default()
        };
        let (tracker, _processor, walker) = tracker(config);
        let map = RegionBiomeMap::new().with_fallback("desert");
        let mut tracker = tracker.with_biome_map(Arc::new(map));
        let id = tracker
            .add(HordeBlueprint::new(Vec3::ZERO, Box::new(IdleGenerator)).with_cluster(walker, density).in_biome("snow"))
            .unwrap();

        for tick in 1..=ticks {
            tracker.tick(DT, &WorldSnapshot::default()).unwrap();
            let expected = density - rate * DT * tick as f32;
            match tracker.horde(id) {
                Some(horde) => {
                    prop_assert!(horde.density() > 0.0);
                    prop_assert!((horde.density() - expected.max(0.0)).abs() < 1e-3);
                }
                None => {
                    prop_assert!(expected < 1e-3);
                    prop_assert!(tracker.is_empty());
                }
            }
            if expected < -1e-3 {
                prop_assert!(tracker.horde(id).is_none());
            }
        }
    }
}
