//! Generational arena storage.
//!
//! An [`Arena`] hands out keys that pack a *generation* counter in the high 32
//! bits and a slot *index* in the low 32 bits. Removing a value bumps the
//! slot's generation, so any key still held elsewhere (a queued request, an
//! event in flight from another thread) resolves to `None` instead of
//! silently aliasing whatever reuses the slot.
//!
//! # Example
//!
//! ```
//! use horde_world::arena::Arena;
//! use horde_world::entity::EntityId;
//!
//! let mut arena: Arena<EntityId, &str> = Arena::new();
//! let a = arena.insert("walker");
//! assert_eq!(arena.get(a), Some(&"walker"));
//!
//! arena.remove(a);
//! let b = arena.insert("runner");
//! assert_eq!(a.index(), b.index());
//! assert!(arena.get(a).is_none());
//! ```

use std::collections::VecDeque;
use std::marker::PhantomData;

// ---------------------------------------------------------------------------
// ArenaKey
// ---------------------------------------------------------------------------

/// A typed key usable with [`Arena`].
///
/// Implementors are thin `u64` newtypes laid out as
/// `[generation: u32 | index: u32]`.
pub trait ArenaKey: Copy + Eq {
    /// Build a key from its parts.
    fn from_parts(index: u32, generation: u32) -> Self;
    /// Slot index (low 32 bits).
    fn index(self) -> u32;
    /// Generation (high 32 bits).
    fn generation(self) -> u32;
}

/// Pack an index and generation into the shared key layout.
#[inline]
pub fn pack(index: u32, generation: u32) -> u64 {
    (generation as u64) << 32 | index as u64
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with generational keys and FIFO index recycling.
///
/// Iteration order is slot-index order, which is stable across runs given the
/// same sequence of inserts and removals.
#[derive(Debug, Clone)]
pub struct Arena<K: ArenaKey, T> {
    slots: Vec<Slot<T>>,
    free: VecDeque<u32>,
    len: usize,
    _key: PhantomData<K>,
}

impl<K: ArenaKey, T> Arena<K, T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    /// Insert a value, reusing the oldest freed slot if one exists.
    pub fn insert(&mut self, value: T) -> K {
        self.len += 1;
        if let Some(index) = self.free.pop_front() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            K::from_parts(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            K::from_parts(index, 0)
        }
    }

    /// Remove the value behind `key`. Returns `None` for stale or vacant keys.
    pub fn remove(&mut self, key: K) -> Option<T> {
        let slot = self.slots.get_mut(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push_back(key.index());
        self.len -= 1;
        Some(value)
    }

    /// Shared access to a live value.
    pub fn get(&self, key: K) -> Option<&T> {
        let slot = self.slots.get(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutable access to a live value.
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Mutable access to two distinct live values at once.
    ///
    /// Returns `None` if either key is stale or both name the same slot.
    pub fn get_pair_mut(&mut self, a: K, b: K) -> Option<(&mut T, &mut T)> {
        let (ia, ib) = (a.index() as usize, b.index() as usize);
        if ia == ib || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (low, high) = (ia.min(ib), ia.max(ib));
        let (head, tail) = self.slots.split_at_mut(high);
        let (low_slot, high_slot) = (&mut head[low], &mut tail[0]);
        let (low_value, high_value) = (low_slot.value.as_mut()?, high_slot.value.as_mut()?);
        if ia < ib {
            Some((low_value, high_value))
        } else {
            Some((high_value, low_value))
        }
    }

    /// `true` if `key` refers to a live value.
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if no values are live.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots waiting to be recycled.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Keys of all live values in slot order.
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Iterate live values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (K::from_parts(index as u32, slot.generation), value))
        })
    }

    /// Iterate live values mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (K::from_parts(index as u32, generation), value))
        })
    }

    /// Remove every value, bumping each occupied slot's generation.
    pub fn drain(&mut self) -> Vec<(K, T)> {
        let mut drained = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                drained.push((K::from_parts(index as u32, slot.generation), value));
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push_back(index as u32);
            }
        }
        self.len = 0;
        drained
    }
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;

    #[test]
    fn pair_access_keeps_argument_order() {
        let mut arena: Arena<EntityId, u32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        let (x, y) = arena.get_pair_mut(b, a).unwrap();
        assert_eq!((*x, *y), (2, 1));
        *x += 10;
        assert_eq!(arena.get(b), Some(&12));
        assert!(arena.get_pair_mut(a, a).is_none());
        arena.remove(a);
        assert!(arena.get_pair_mut(a, b).is_none());
    }

    #[test]
    fn insert_yields_distinct_indices() {
        let mut arena: Arena<EntityId, u32> = Arena::new();
        let keys: Vec<EntityId> = (0..64).map(|i| arena.insert(i)).collect();
        let mut indices: Vec<u32> = keys.iter().map(|k| k.index()).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), 64);
        assert_eq!(arena.len(), 64);
    }

    #[test]
    fn removed_key_goes_stale() {
        let mut arena: Arena<EntityId, &str> = Arena::new();
        let first = arena.insert("a");
        assert_eq!(arena.remove(first), Some("a"));
        assert_eq!(arena.remove(first), None);

        let second = arena.insert("b");
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), first.generation() + 1);
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&"b"));
    }

    #[test]
    fn recycling_is_fifo() {
        let mut arena: Arena<EntityId, u8> = Arena::new();
        let a = arena.insert(0);
        let b = arena.insert(1);
        let _c = arena.insert(2);
        arena.remove(b);
        arena.remove(a);

        // b's slot was freed first, so it is reused first.
        assert_eq!(arena.insert(3).index(), b.index());
        assert_eq!(arena.insert(4).index(), a.index());
        assert_eq!(arena.free_count(), 0);
    }

    #[test]
    fn iteration_is_in_slot_order() {
        let mut arena: Arena<EntityId, char> = Arena::new();
        let a = arena.insert('a');
        arena.insert('b');
        arena.insert('c');
        arena.remove(a);
        let seen: Vec<char> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(seen, vec!['b', 'c']);
    }

    #[test]
    fn drain_invalidates_all_keys() {
        let mut arena: Arena<EntityId, u8> = Arena::new();
        let keys: Vec<EntityId> = (0..4).map(|i| arena.insert(i)).collect();
        let drained = arena.drain();
        assert_eq!(drained.len(), 4);
        assert!(arena.is_empty());
        assert!(keys.iter().all(|k| !arena.contains(*k)));
    }

    #[test]
    fn get_mut_respects_generation() {
        let mut arena: Arena<EntityId, u32> = Arena::new();
        let key = arena.insert(1);
        *arena.get_mut(key).unwrap() += 1;
        assert_eq!(arena.get(key), Some(&2));
        arena.remove(key);
        assert!(arena.get_mut(key).is_none());
    }
}
