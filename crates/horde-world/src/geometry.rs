//! Planar distance helpers and chunk coordinates.
//!
//! Hordes live on the ground plane: proximity, objective scores and event
//! interest all use the `xz` projection of world positions and ignore height.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Edge length of one world chunk in blocks.
pub const CHUNK_SIZE: f32 = 16.0;

/// Project a world position onto the ground plane.
#[inline]
pub fn to_xz(v: Vec3) -> Vec2 {
    Vec2::new(v.x, v.z)
}

/// Ground-plane distance between two positions.
#[inline]
pub fn distance_xz(a: Vec3, b: Vec3) -> f32 {
    to_xz(a).distance(to_xz(b))
}

/// Move `from` toward `to` by at most `max_step`, never overshooting.
pub fn step_toward(from: Vec3, to: Vec3, max_step: f32) -> Vec3 {
    let delta = to - from;
    let length = delta.length();
    if length <= max_step || length <= f32::EPSILON {
        to
    } else {
        from + delta / length * max_step
    }
}

/// Mean of a set of positions, or `None` for an empty set.
pub fn centroid(points: impl IntoIterator<Item = Vec3>) -> Option<Vec3> {
    let mut sum = Vec3::ZERO;
    let mut count = 0u32;
    for p in points {
        sum += p;
        count += 1;
    }
    (count > 0).then(|| sum / count as f32)
}

// ---------------------------------------------------------------------------
// ChunkPos
// ---------------------------------------------------------------------------

/// Integer chunk coordinate on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a world position.
    pub fn containing(position: Vec3) -> Self {
        Self {
            x: (position.x / CHUNK_SIZE).floor() as i32,
            z: (position.z / CHUNK_SIZE).floor() as i32,
        }
    }

    /// Offset by whole chunks.
    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xz_distance_ignores_height() {
        let a = Vec3::new(0.0, 100.0, 0.0);
        let b = Vec3::new(3.0, -40.0, 4.0);
        assert!((distance_xz(a, b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn step_toward_clamps_at_target() {
        let from = Vec3::ZERO;
        let to = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(step_toward(from, to, 4.0), Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(step_toward(from, to, 40.0), to);
    }

    #[test]
    fn centroid_of_nothing_is_none() {
        assert!(centroid(std::iter::empty()).is_none());
        let c = centroid([Vec3::ZERO, Vec3::new(2.0, 0.0, 2.0)]).unwrap();
        assert_eq!(c, Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn negative_positions_floor_into_lower_chunk() {
        assert_eq!(ChunkPos::containing(Vec3::new(-0.5, 0.0, 15.9)), ChunkPos::new(-1, 0));
        assert_eq!(ChunkPos::containing(Vec3::new(16.0, 0.0, -16.0)), ChunkPos::new(1, -1));
    }
}
