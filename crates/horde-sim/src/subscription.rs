//! Single-writer / multi-reader value slots.
//!
//! A [`Subscription`] is owned by exactly one writer (it is not `Clone`).
//! Each [`publish`](Subscription::publish) replaces the slot's value wholesale
//! and bumps a version counter. Any number of [`Subscriber`]s, on any thread,
//! read the latest value as an `Arc` and can ask whether it changed since they
//! last looked. Readers never observe a partially built value: the writer
//! builds it completely before publishing.
//!
//! # Example
//!
//! ```
//! use horde_sim::subscription::Subscription;
//!
//! let progress = Subscription::new();
//! let mut reader = progress.subscribe();
//! assert!(reader.latest().is_none());
//!
//! progress.publish(3_u32);
//! assert_eq!(reader.take_changed().as_deref(), Some(&3));
//! assert!(reader.take_changed().is_none()); // nothing new since
//! assert_eq!(reader.latest().as_deref(), Some(&3));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

struct Slot<T> {
    value: RwLock<Option<Arc<T>>>,
    version: AtomicU64,
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// The writing end of a slot.
pub struct Subscription<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Subscription<T> {
    /// An empty slot at version 0.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                value: RwLock::new(None),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Replace the current value.
    pub fn publish(&self, value: T) {
        let value = Arc::new(value);
        let mut guard = self.slot.value.write();
        *guard = Some(value);
        self.slot.version.fetch_add(1, Ordering::AcqRel);
    }

    /// A new reader that has not seen any version yet.
    pub fn subscribe(&self) -> Subscriber<T> {
        Subscriber {
            slot: Arc::clone(&self.slot),
            seen: 0,
        }
    }

    /// Number of publishes so far.
    pub fn version(&self) -> u64 {
        self.slot.version.load(Ordering::Acquire)
    }

    /// The value most recently published.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.slot.value.read().clone()
    }
}

impl<T> Default for Subscription<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("version", &self.version())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// A reading end of a slot. Cloning yields an independent reader with the
/// same "seen" position.
pub struct Subscriber<T> {
    slot: Arc<Slot<T>>,
    seen: u64,
}

impl<T> Subscriber<T> {
    /// The latest published value, regardless of whether it was seen before.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.slot.value.read().clone()
    }

    /// The latest value if it was published after this reader last took one.
    pub fn take_changed(&mut self) -> Option<Arc<T>> {
        let version = self.slot.version.load(Ordering::Acquire);
        if version == self.seen {
            return None;
        }
        let value = self.slot.value.read().clone();
        self.seen = version;
        value
    }

    /// `true` if something was published since this reader last took a value.
    pub fn has_changed(&self) -> bool {
        self.slot.version.load(Ordering::Acquire) != self.seen
    }

    /// Version published most recently.
    pub fn version(&self) -> u64 {
        self.slot.version.load(Ordering::Acquire)
    }
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            seen: self.seen,
        }
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("seen", &self.seen)
            .field("version", &self.version())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn last_value_wins() {
        let slot = Subscription::new();
        let mut reader = slot.subscribe();
        slot.publish(1);
        slot.publish(2);
        assert_eq!(reader.take_changed().as_deref(), Some(&2));
        assert_eq!(slot.version(), 2);
    }

    #[test]
    fn readers_track_independently() {
        let slot = Subscription::new();
        let mut a = slot.subscribe();
        let mut b = slot.subscribe();
        slot.publish("x");
        assert!(a.take_changed().is_some());
        assert!(b.has_changed());
        assert!(!a.has_changed());
        assert!(b.take_changed().is_some());
    }

    #[test]
    fn late_subscriber_sees_current_value() {
        let slot = Subscription::new();
        slot.publish(5u8);
        let mut late = slot.subscribe();
        assert_eq!(late.take_changed().as_deref(), Some(&5));
    }

    #[test]
    fn cross_thread_reader_sees_complete_values() {
        let slot = Subscription::new();
        let reader = slot.subscribe();
        let handle = thread::spawn(move || {
            let mut last_len = 0;
            for _ in 0..1_000 {
                if let Some(v) = reader.latest() {
                    // Every published vector is internally consistent.
                    let v: &Vec<u32> = &v;
                    assert!(v.iter().all(|x| *x as usize == v.len()));
                    last_len = v.len();
                }
            }
            last_len
        });
        for n in 1..200u32 {
            slot.publish(vec![n; n as usize]);
        }
        let _ = handle.join().unwrap();
    }
}
