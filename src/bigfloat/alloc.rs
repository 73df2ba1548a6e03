//! Pooled acquire/release of arbitrary-precision float storage.
//!
//! The pool hands out [`FiniteHandle`]s backed by slots in a `Vec<Float>`.
//! A released slot goes back on the free list; acquiring with an empty free
//! list grows the pool by doubling (or by one, the first time) rather than
//! allocating one slot at a time. The `live` set is the thing double-release
//! detection is built on: releasing a slot not currently live is a program
//! error.

use std::collections::HashSet;

use rug::Float;

/// An owning reference to one pooled mantissa slot.
///
/// Deliberately not `Clone`/`Copy`: two handles must never name the same
/// live slot, so duplicating one requires going through
/// [`super::Context::clone`], which acquires a fresh slot and copies the
/// value.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FiniteHandle(pub(crate) usize);

pub struct Allocator {
    precision: u32,
    slots: Vec<Float>,
    free: Vec<usize>,
    live: HashSet<usize>,
    cached: i64,
}

impl Allocator {
    pub fn new(precision: u32) -> Self {
        Allocator { precision, slots: Vec::new(), free: Vec::new(), live: HashSet::new(), cached: 0 }
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn set_precision(&mut self, precision: u32) {
        self.precision = precision;
    }

    fn grow(&mut self) {
        let batch = self.slots.len().max(1);
        for _ in 0..batch {
            self.free.push(self.slots.len());
            self.slots.push(Float::new(self.precision));
        }
    }

    /// Acquires an uninitialized (zero-valued) handle at the current precision.
    pub fn acquire(&mut self) -> FiniteHandle {
        if self.free.is_empty() {
            self.grow();
        }
        let slot = self.free.pop().expect("grow() leaves at least one free slot");
        self.slots[slot] = Float::new(self.precision);
        self.live.insert(slot);
        FiniteHandle(slot)
    }

    /// Releases a handle. Panics if the handle is not currently live — this
    /// is the double-release detection the allocator contract requires.
    pub fn release(&mut self, handle: FiniteHandle) {
        let FiniteHandle(slot) = handle;
        assert!(self.live.remove(&slot), "double release of bigfloat handle {slot}");
        self.free.push(slot);
    }

    pub fn value(&self, handle: &FiniteHandle) -> &Float {
        &self.slots[handle.0]
    }

    pub fn value_mut(&mut self, handle: &FiniteHandle) -> &mut Float {
        &mut self.slots[handle.0]
    }

    pub fn in_use_count(&self) -> usize {
        self.live.len()
    }

    pub fn cached_count(&self) -> i64 {
        self.cached
    }

    /// Advisory accounting for long-lived caches (cached constants,
    /// function scale vectors, ...). Callers must balance `+1` on store
    /// against `-1` on replace/discard.
    pub fn note_cache_delta(&mut self, delta: i64) {
        self.cached += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_round_trip_preserves_counts() {
        let mut a = Allocator::new(64);
        let before_cached = a.cached_count();
        let h = a.acquire();
        assert_eq!(a.in_use_count(), 1);
        a.release(h);
        assert_eq!(a.in_use_count(), 0);
        assert_eq!(a.cached_count(), before_cached);
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn double_release_is_detected() {
        let mut a = Allocator::new(64);
        let h = a.acquire();
        let slot = h.0;
        a.release(h);
        a.release(FiniteHandle(slot));
    }

    #[test]
    fn pool_grows_geometrically_and_reuses_freed_slots() {
        let mut a = Allocator::new(64);
        let h1 = a.acquire();
        let h2 = a.acquire();
        let h3 = a.acquire();
        assert_eq!(a.slots.len(), 4, "grow doubles: 1 then +1(=2) then +2(=4)");
        a.release(h1);
        a.release(h2);
        a.release(h3);
        assert_eq!(a.in_use_count(), 0);
    }
}
