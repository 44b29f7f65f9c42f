//! Biome lookup on the ground plane.
//!
//! The host world owns its biome layout. The simulation only asks which
//! biome a location falls in, so the seam is a small read-only trait.

use std::fmt;

use glam::Vec3;

/// Read-only biome lookup shared with worker threads.
pub trait BiomeMap: Send + Sync + fmt::Debug {
    /// Name of the biome at `location`, or `None` outside any known biome.
    fn biome_at(&self, location: Vec3) -> Option<&str>;
}

/// Axis-aligned rectangle on the ground plane tagged with a biome name.
#[derive(Debug, Clone, PartialEq)]
struct BiomeRegion {
    min_x: f32,
    min_z: f32,
    max_x: f32,
    max_z: f32,
    name: String,
}

impl BiomeRegion {
    fn contains(&self, location: Vec3) -> bool {
        (self.min_x..self.max_x).contains(&location.x)
            && (self.min_z..self.max_z).contains(&location.z)
    }
}

/// Biome map built from rectangles, checked in insertion order.
///
/// ```
/// use glam::Vec3;
/// use horde_world::biome::{BiomeMap, RegionBiomeMap};
///
/// let map = RegionBiomeMap::new()
///     .with_fallback("pine_forest")
///     .with_region(0.0, 0.0, 100.0, 100.0, "desert");
/// assert_eq!(map.biome_at(Vec3::new(50.0, 0.0, 50.0)), Some("desert"));
/// assert_eq!(map.biome_at(Vec3::new(-50.0, 0.0, 50.0)), Some("pine_forest"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegionBiomeMap {
    regions: Vec<BiomeRegion>,
    fallback: Option<String>,
}

impl RegionBiomeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Biome reported where no region matches.
    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    /// Add a half-open rectangle `[min, max)` on the xz plane. Corners may
    /// be given in any order.
    pub fn with_region(
        mut self,
        x0: f32,
        z0: f32,
        x1: f32,
        z1: f32,
        name: impl Into<String>,
    ) -> Self {
        self.regions.push(BiomeRegion {
            min_x: x0.min(x1),
            min_z: z0.min(z1),
            max_x: x0.max(x1),
            max_z: z0.max(z1),
            name: name.into(),
        });
        self
    }
}

impl BiomeMap for RegionBiomeMap {
    fn biome_at(&self, location: Vec3) -> Option<&str> {
        self.regions
            .iter()
            .find(|region| region.contains(location))
            .map(|region| region.name.as_str())
            .or(self.fallback.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_region_wins() {
        let map = RegionBiomeMap::new()
            .with_region(0.0, 0.0, 10.0, 10.0, "snow")
            .with_region(0.0, 0.0, 100.0, 100.0, "desert");

        assert_eq!(map.biome_at(Vec3::new(5.0, 40.0, 5.0)), Some("snow"));
        assert_eq!(map.biome_at(Vec3::new(50.0, 0.0, 5.0)), Some("desert"));
        assert_eq!(map.biome_at(Vec3::new(-1.0, 0.0, 5.0)), None);
    }

    #[test]
    fn swapped_corners_are_normalised() {
        let map = RegionBiomeMap::new().with_region(10.0, 10.0, -10.0, -10.0, "burnt_forest");
        assert_eq!(map.biome_at(Vec3::ZERO), Some("burnt_forest"));
        assert_eq!(map.biome_at(Vec3::new(10.0, 0.0, 0.0)), None);
    }
}
