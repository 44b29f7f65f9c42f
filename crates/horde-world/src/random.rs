//! Deterministic random streams.
//!
//! Every cluster spawn batch and every horde owns its own [`WorldRandom`],
//! seeded from a stable hash of identifiers rather than from wall-clock time.
//! Regenerating the same cluster with the same seed therefore yields the same
//! entity classes and spawn offsets, independent of how work was scheduled
//! across threads.
//!
//! # Example
//!
//! ```
//! use horde_world::random::{stable_seed, PcgRandomFactory, RandomFactory};
//!
//! let factory = PcgRandomFactory::new(42);
//! let seed = stable_seed(&[7, 1]);
//! let mut a = factory.create_random(seed);
//! let mut b = factory.create_random(seed);
//! assert_eq!(a.random_range(1000), b.random_range(1000));
//!
//! factory.free_random(a);
//! factory.free_random(b);
//! assert_eq!(factory.outstanding(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec3;
use parking_lot::{Mutex, MutexGuard};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

/// Derive a 64-bit seed from a sequence of identifiers.
///
/// Uses BLAKE3 over the little-endian bytes, so the result is identical on
/// every platform and across runs.
pub fn stable_seed(parts: &[u64]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&part.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

// ---------------------------------------------------------------------------
// WorldRandom
// ---------------------------------------------------------------------------

/// A seeded PCG stream with the helpers the simulation needs.
#[derive(Debug, Clone)]
pub struct WorldRandom {
    seed: u64,
    rng: Pcg64,
}

impl WorldRandom {
    /// Create a stream from a seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    /// Seed this stream was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform float in `[0, 1)`.
    pub fn random_f32(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }

    /// `true` with probability `chance` (clamped to `[0, 1]`).
    pub fn random_chance(&mut self, chance: f32) -> bool {
        if chance <= 0.0 {
            return false;
        }
        if chance >= 1.0 {
            return true;
        }
        self.random_f32() < chance
    }

    /// Uniform integer in `[0, max)`; `0` when `max == 0`.
    pub fn random_range(&mut self, max: u32) -> u32 {
        if max == 0 {
            0
        } else {
            self.rng.gen_range(0..max)
        }
    }

    /// Uniform float in `[min, max)`; `min` when the range is empty.
    pub fn random_range_f32(&mut self, min: f32, max: f32) -> f32 {
        if max <= min {
            min
        } else {
            self.rng.gen_range(min..max)
        }
    }

    /// Uniform point on the ground plane inside a circle around `center`.
    pub fn random_in_circle(&mut self, center: Vec3, radius: f32) -> Vec3 {
        let angle = self.random_range_f32(0.0, std::f32::consts::TAU);
        let r = radius * self.random_f32().sqrt();
        Vec3::new(center.x + r * angle.cos(), center.y, center.z + r * angle.sin())
    }

    /// Uniform point on the ground plane inside an axis-aligned box.
    pub fn random_location(&mut self, min: Vec3, max: Vec3) -> Vec3 {
        Vec3::new(
            self.random_range_f32(min.x, max.x),
            min.y,
            self.random_range_f32(min.z, max.z),
        )
    }

    /// Pick one element, or `None` from an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            items.get(self.random_range(items.len() as u32) as usize)
        }
    }
}

// ---------------------------------------------------------------------------
// RandomFactory
// ---------------------------------------------------------------------------

/// Hands out seeded streams and owns the shared non-deterministic stream.
pub trait RandomFactory: Send + Sync {
    /// Create a stream whose sequence depends only on the world and `seed`.
    fn create_random(&self, seed: u64) -> WorldRandom;

    /// Return a stream created by [`create_random`](Self::create_random).
    fn free_random(&self, random: WorldRandom);

    /// Shared stream for work that does not need reproducibility.
    fn shared_random(&self) -> MutexGuard<'_, WorldRandom>;
}

/// PCG-backed [`RandomFactory`] keyed by a world seed.
#[derive(Debug)]
pub struct PcgRandomFactory {
    world_seed: u64,
    shared: Mutex<WorldRandom>,
    outstanding: AtomicUsize,
}

impl PcgRandomFactory {
    pub fn new(world_seed: u64) -> Self {
        Self {
            world_seed,
            shared: Mutex::new(WorldRandom::from_seed(stable_seed(&[world_seed, u64::MAX]))),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn world_seed(&self) -> u64 {
        self.world_seed
    }

    /// Streams created and not yet freed.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

impl RandomFactory for PcgRandomFactory {
    fn create_random(&self, seed: u64) -> WorldRandom {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        WorldRandom::from_seed(stable_seed(&[self.world_seed, seed]))
    }

    fn free_random(&self, random: WorldRandom) {
        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if previous == 0 {
            self.outstanding.store(0, Ordering::Release);
            tracing::warn!(seed = random.seed(), "freed a random stream that was never created");
        }
    }

    fn shared_random(&self) -> MutexGuard<'_, WorldRandom> {
        self.shared.lock()
    }
}
