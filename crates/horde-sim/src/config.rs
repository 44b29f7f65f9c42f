//! Tracker configuration.
//!
//! [`TrackerConfig`] collects every tunable of the simulation. All fields have
//! defaults, so a JSON document only needs the values it overrides:
//!
//! ```
//! use horde_sim::config::TrackerConfig;
//!
//! let config = TrackerConfig::from_json_str(r#"{ "view_distance": 120.0, "merge_chance": 0.5 }"#).unwrap();
//! assert_eq!(config.view_distance, 120.0);
//! assert_eq!(config.horde_threads, 4);
//! ```

use serde::{Deserialize, Serialize};

use crate::SimError;

// ---------------------------------------------------------------------------
// FeralSense
// ---------------------------------------------------------------------------

/// When hordes get a boost to their event sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeralSense {
    #[default]
    Off,
    Day,
    Night,
    Always,
}

impl FeralSense {
    /// `true` if the boost applies at this time of day.
    pub fn is_active(self, is_daytime: bool) -> bool {
        match self {
            FeralSense::Off => false,
            FeralSense::Day => is_daytime,
            FeralSense::Night => !is_daytime,
            FeralSense::Always => true,
        }
    }
}

// ---------------------------------------------------------------------------
// TrackerConfig
// ---------------------------------------------------------------------------

/// Configuration for the world horde tracker and its requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Interval between tracker ticks when run by the driver, in milliseconds.
    pub tick_interval_ms: u64,
    /// Worker threads evaluating hordes in parallel. Must be at least 1.
    pub horde_threads: usize,
    /// Worker threads for per-cluster work inside one horde. Must be at least 1.
    pub cluster_threads: usize,
    /// Distance at which live entities stay spawned.
    pub view_distance: f32,
    /// Subtracted from `view_distance` while a horde is unspawned, so hordes
    /// at the edge do not flicker in and out.
    pub spawn_buffer: f32,
    /// Closest a freshly spawned entity may appear to its nearest player, as a
    /// fraction of `view_distance`.
    pub min_spawn_fraction: f32,
    /// Farthest a freshly spawned entity may appear to its nearest player, as
    /// a fraction of `view_distance`.
    pub max_spawn_fraction: f32,
    /// Radius around the computed spawn point searched by the live world.
    pub spawn_spread: f32,
    /// Merge distance when both hordes are spawned.
    pub merge_distance_loaded: f32,
    /// Merge distance when both hordes are unspawned.
    pub merge_distance_unloaded: f32,
    /// Probability that an eligible pair attempts to merge on a given tick.
    pub merge_chance: f32,
    /// Cap on the summed cluster density of one horde.
    pub max_horde_density: f32,
    /// Cap on the summed density of all hordes, used by populators.
    pub max_world_density: f32,
    /// Split unspawned hordes whose density exceeds `max_horde_density`.
    pub split_oversized_hordes: bool,
    /// Live entities one horde may hold per responsible player.
    pub max_entities_per_player: usize,
    /// Main-thread frames between consecutive spawns of one batch.
    pub spawn_delay_frames: u32,
    /// Upper bound on the retry backoff after a spawn produced nothing.
    pub spawn_retry_max_backoff_ticks: u32,
    /// Entities removed per frame by a full-horde despawn.
    pub despawns_per_frame: usize,
    /// Seed mixed into every deterministic random stream.
    pub world_seed: u64,
    /// Biome reported for player groups standing nowhere known.
    pub default_biome: String,
    /// Gamestage weight of the strongest player in a group.
    pub gamestage_starting_weight: f32,
    /// Multiplier applied to the weight of each following player.
    pub gamestage_diminishing_returns: f32,
    /// Density lost per second by an unspawned horde that has wandered out
    /// of the biome it was created in.
    pub biome_decay_rate: f32,
    /// When the feral-sense sensitivity boost applies.
    pub feral_sense: FeralSense,
    /// Sensitivity multiplier while feral sense is active.
    pub feral_sense_multiplier: f32,
    /// Edge length of the world, used to scale event interest distances.
    pub map_size: f32,
    /// Chunks around an event that share part of its interest.
    pub event_chunk_radius: i32,
    /// Scale applied to the distance at which hordes notice an event.
    pub event_interest_distance_multiplier: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            horde_threads: 4,
            cluster_threads: 2,
            view_distance: 90.0,
            spawn_buffer: 20.0,
            min_spawn_fraction: 0.8,
            max_spawn_fraction: 0.9,
            spawn_spread: 8.0,
            merge_distance_loaded: 10.0,
            merge_distance_unloaded: 100.0,
            merge_chance: 0.1,
            max_horde_density: 10.0,
            max_world_density: 160.0,
            split_oversized_hordes: true,
            max_entities_per_player: 16,
            spawn_delay_frames: 2,
            spawn_retry_max_backoff_ticks: 32,
            despawns_per_frame: 1,
            world_seed: 0,
            default_biome: "pine_forest".to_owned(),
            gamestage_starting_weight: 1.0,
            gamestage_diminishing_returns: 0.2,
            biome_decay_rate: 0.001,
            feral_sense: FeralSense::Off,
            feral_sense_multiplier: 1.5,
            map_size: 8192.0,
            event_chunk_radius: 3,
            event_interest_distance_multiplier: 0.25,
        }
    }
}

impl TrackerConfig {
    /// Parse from JSON and validate.
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Distance used to detect players around an unspawned horde.
    pub fn unspawned_view_distance(&self) -> f32 {
        (self.view_distance - self.spawn_buffer).max(0.0)
    }

    /// Band `(min, max)` from the nearest player in which entities appear.
    pub fn spawn_distance_band(&self) -> (f32, f32) {
        (
            self.view_distance * self.min_spawn_fraction,
            self.view_distance * self.max_spawn_fraction,
        )
    }

    /// Check every field for values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), SimError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Result<(), SimError> {
            Err(SimError::InvalidConfig {
                field,
                reason: reason.into(),
            })
        }

        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms", "must be positive");
        }
        if self.horde_threads == 0 {
            return invalid("horde_threads", "must be at least 1");
        }
        if self.cluster_threads == 0 {
            return invalid("cluster_threads", "must be at least 1");
        }
        if !(self.view_distance.is_finite() && self.view_distance > 0.0) {
            return invalid("view_distance", "must be positive and finite");
        }
        if !(self.spawn_buffer >= 0.0 && self.spawn_buffer < self.view_distance) {
            return invalid("spawn_buffer", "must be in [0, view_distance)");
        }
        if !(0.0..=1.0).contains(&self.min_spawn_fraction)
            || !(0.0..=1.0).contains(&self.max_spawn_fraction)
            || self.min_spawn_fraction > self.max_spawn_fraction
        {
            return invalid(
                "min_spawn_fraction",
                "spawn fractions must satisfy 0 <= min <= max <= 1",
            );
        }
        if !(0.0..=1.0).contains(&self.merge_chance) {
            return invalid("merge_chance", "must be a probability in [0, 1]");
        }
        if self.merge_distance_loaded < 0.0 || self.merge_distance_unloaded < 0.0 {
            return invalid("merge_distance_loaded", "merge distances must be non-negative");
        }
        if !(self.max_horde_density.is_finite() && self.max_horde_density > 0.0) {
            return invalid("max_horde_density", "must be positive and finite");
        }
        if self.despawns_per_frame == 0 {
            return invalid("despawns_per_frame", "must be at least 1");
        }
        if !(self.biome_decay_rate.is_finite() && self.biome_decay_rate >= 0.0) {
            return invalid("biome_decay_rate", "must be non-negative and finite");
        }
        if self.feral_sense_multiplier < 0.0 {
            return invalid("feral_sense_multiplier", "must be non-negative");
        }
        if !(self.map_size.is_finite() && self.map_size > 1.0) {
            return invalid("map_size", "must be greater than 1");
        }
        if self.event_chunk_radius < 0 {
            return invalid("event_chunk_radius", "must be non-negative");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
