//! The players responsible for one spawn.

use std::collections::BTreeMap;

use glam::Vec3;
use horde_world::geometry::distance_xz;
use horde_world::player::PlayerSnapshot;

use crate::config::TrackerConfig;

/// Players near a horde at the moment it was asked to spawn.
///
/// Never empty: construction from an empty list yields `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerHordeGroup {
    players: Vec<PlayerSnapshot>,
}

impl PlayerHordeGroup {
    pub fn new(players: Vec<PlayerSnapshot>) -> Option<Self> {
        (!players.is_empty()).then_some(Self { players })
    }

    /// Players within `radius` of `location` on the ground plane.
    pub fn near(players: &[PlayerSnapshot], location: Vec3, radius: f32) -> Option<Self> {
        Self::new(
            players
                .iter()
                .filter(|p| distance_xz(p.location, location) <= radius)
                .cloned()
                .collect(),
        )
    }

    pub fn players(&self) -> &[PlayerSnapshot] {
        &self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Combined gamestage with diminishing weight per additional player.
    ///
    /// Players are taken strongest first; the strongest counts with
    /// `starting_weight`, each following one with the previous weight times
    /// `diminishing_returns`. The sum is floored.
    pub fn gamestage(&self, starting_weight: f32, diminishing_returns: f32) -> u32 {
        let mut stages: Vec<u32> = self.players.iter().map(|p| p.gamestage).collect();
        stages.sort_unstable_by(|a, b| b.cmp(a));

        let mut weight = starting_weight;
        let mut total = 0.0f32;
        for stage in stages {
            total += stage as f32 * weight;
            weight *= diminishing_returns;
        }
        total.floor().max(0.0) as u32
    }

    /// Most common biome among the players, or `default` if none is known.
    /// Ties go to the alphabetically first biome.
    pub fn biome<'a>(&'a self, default: &'a str) -> &'a str {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for biome in self.players.iter().filter_map(|p| p.biome.as_deref()) {
            *counts.entry(biome).or_insert(0) += 1;
        }
        let mut best: Option<(&str, usize)> = None;
        for (biome, count) in counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((biome, count));
            }
        }
        best.map_or(default, |(biome, _)| biome)
    }

    /// Gamestage and biome of this group under `config`'s weighting.
    pub fn conditions<'a>(&'a self, config: &'a TrackerConfig) -> SpawnConditions<'a> {
        SpawnConditions {
            group: self,
            gamestage: self.gamestage(config.gamestage_starting_weight, config.gamestage_diminishing_returns),
            biome: self.biome(&config.default_biome),
        }
    }

    /// The player nearest to `location` and its ground-plane distance.
    pub fn closest_to(&self, location: Vec3) -> (&PlayerSnapshot, f32) {
        let mut closest = &self.players[0];
        let mut closest_distance = distance_xz(closest.location, location);
        for player in &self.players[1..] {
            let d = distance_xz(player.location, location);
            if d < closest_distance {
                closest = player;
                closest_distance = d;
            }
        }
        (closest, closest_distance)
    }
}

/// What an entity generator is built against.
#[derive(Debug, Clone, Copy)]
pub struct SpawnConditions<'a> {
    pub group: &'a PlayerHordeGroup,
    pub gamestage: u32,
    pub biome: &'a str,
}
