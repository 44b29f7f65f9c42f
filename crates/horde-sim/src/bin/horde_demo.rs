//! Headless horde demo.
//!
//! Runs the tracker on its background thread against an in-memory world
//! with two players walking in circles, a wilderness populator, a desert to
//! the east and an occasional gunshot. Prints the final tracker snapshot hash.
//!
//! Usage: `horde-demo [config.json] [frames]`
//!
//! Set `RUST_LOG=horde_sim=debug` for per-tick output.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use glam::Vec3;
use horde_sim::prelude::*;
use horde_world::prelude::*;
use tracing::info;

const FRAME: Duration = Duration::from_millis(16);
const DEFAULT_FRAMES: u32 = 600;

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            TrackerConfig::from_json_str(&json).with_context(|| format!("parsing {path}"))?
        }
        None => TrackerConfig {
            map_size: 2048.0,
            ..Default::default()
        },
    };
    let frames: u32 = match args.next() {
        Some(raw) => raw.parse().with_context(|| format!("invalid frame count `{raw}`"))?,
        None => DEFAULT_FRAMES,
    };

    let registry = Arc::new(
        HordeKindRegistry::builder()
            .register(
                UniformHordeKind::new("walker", vec![EntityClassId(1)])
                    .with_entry(ClassEntry::new(EntityClassId(2)).from_gamestage(40))
                    .with_entry(ClassEntry::new(EntityClassId(3)).in_biomes(&["desert"])),
            )?
            .register(
                UniformHordeKind::new("screamer", vec![EntityClassId(7)])
                    .with_entities_per_density(2.0)
                    .merging_with("walker"),
            )?
            .build(),
    );

    let factory: Arc<dyn RandomFactory> = Arc::new(PcgRandomFactory::new(config.world_seed));
    let mut processor = RequestProcessor::new();
    let biomes = Arc::new(
        RegionBiomeMap::new()
            .with_fallback(config.default_biome.clone())
            .with_region(200.0, -1024.0, 1024.0, 1024.0, "desert"),
    );
    let tracker = WorldHordeTracker::new(config.clone(), Arc::clone(&registry), factory, processor.sender())?
        .with_biome_map(Arc::clone(&biomes) as Arc<dyn BiomeMap>);
    let handle = tracker.handle();

    let mut populator = WorldHordePopulator::new(
        handle.clone(),
        WorldRandom::from_seed(stable_seed(&[config.world_seed, 1])),
        config.max_world_density,
    );
    for kind in registry.iter() {
        populator.register(WildernessHordePopulator::new(Arc::clone(kind), config.map_size, config.view_distance));
    }

    let mut world = MemoryWorld::new();
    let mut driver = TrackerDriver::new(tracker);
    let dt = FRAME.as_secs_f32();
    info!(frames, kinds = registry.len(), "horde demo starting");

    for frame in 0..frames {
        let t = frame as f32 * dt;
        for (id, location, gamestage) in [
            (PlayerId(1), Vec3::new(t.cos() * 60.0, 0.0, t.sin() * 60.0), 20),
            (PlayerId(2), Vec3::new(300.0 - t * 10.0, 0.0, 150.0), 45),
        ] {
            let mut player = PlayerSnapshot::new(id, location, gamestage);
            if let Some(biome) = biomes.biome_at(location) {
                player = player.in_biome(biome);
            }
            world.upsert_player(player);
        }
        if frame % 120 == 60 {
            handle.report_event(Vec3::new(300.0 - t * 10.0, 0.0, 150.0), 60.0);
        }

        if let Some(diagnostics) = driver.update(&world)? {
            info!(
                tick = diagnostics.tick,
                hordes = diagnostics.hordes,
                spawned = diagnostics.spawned_hordes,
                live = diagnostics.live_entities,
                density = diagnostics.total_density,
                "tracker tick"
            );
        }
        populator.update(dt);
        processor.update(dt, &mut world);
        world.step(dt);
        std::thread::sleep(FRAME);
    }

    let tracker = driver.join()?;
    let snapshot = tracker.snapshot();
    info!(
        ticks = tracker.tick_count(),
        hordes = snapshot.hordes.len(),
        entities = world.entity_count(),
        "horde demo finished"
    );
    println!("{}", serde_json::to_string_pretty(tracker.diagnostics())?);
    println!("snapshot hash: {}", snapshot.hash);
    Ok(())
}
