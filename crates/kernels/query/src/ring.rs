//! Ring buffer of registrar snapshots.
//!
//! Slot layout (cyclic):
//!
//! ```text
//!   release ... acquire-1   held by outstanding requests, read-only
//!   acquire                 current, written by submit()
//!   acquire+1 ... release-1 free
//! ```
//!
//! The acquire cursor never advances onto the release cursor, so a slot
//! backing a live request is never overwritten.

use std::ops::Range;

use swell_foundation::{CallerId, Tick};

use crate::segment::SegmentRegistrar;

/// Fixed-capacity ring of [`SegmentRegistrar`] snapshots indexed by slot.
#[derive(Debug, Clone)]
pub struct SegmentRegistrarRingBuffer {
    slots: Vec<SegmentRegistrar>,
    /// Held slots already released out of order, waiting for the cursor.
    retired: Vec<bool>,
    release: usize,
    acquire: usize,
}

impl SegmentRegistrarRingBuffer {
    /// Create a ring with `capacity` slots (at least two).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            slots: vec![SegmentRegistrar::default(); capacity],
            retired: vec![false; capacity],
            release: 0,
            acquire: 0,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index of the current slot.
    pub fn current_index(&self) -> usize {
        self.acquire
    }

    /// Index of the oldest held slot (equal to the current index when
    /// nothing is held).
    pub fn release_index(&self) -> usize {
        self.release
    }

    /// The registrar being written this tick.
    pub fn current(&self) -> &SegmentRegistrar {
        &self.slots[self.acquire]
    }

    /// Mutable access to the registrar being written this tick.
    pub fn current_mut(&mut self) -> &mut SegmentRegistrar {
        &mut self.slots[self.acquire]
    }

    /// Registrar in any slot.
    pub fn slot(&self, index: usize) -> Option<&SegmentRegistrar> {
        self.slots.get(index)
    }

    /// Number of slots held by outstanding requests.
    pub fn held_count(&self) -> usize {
        self.distance(self.release, self.acquire)
    }

    /// True if `index` lies in the held range `[release, acquire)`.
    pub fn is_held(&self, index: usize) -> bool {
        index < self.capacity() && self.distance(self.release, index) < self.held_count()
    }

    /// True if [`acquire_new`](Self::acquire_new) would succeed.
    pub fn can_acquire(&self) -> bool {
        self.next(self.acquire) != self.release
    }

    /// Hand the current slot to an outstanding request and make the next
    /// slot current, copying forward every registration touched fewer than
    /// `staleness` ticks ago.
    ///
    /// Returns `false` without changing anything if the ring is exhausted.
    /// `relocate` is forwarded to
    /// [`SegmentRegistrar::copy_forward_from`].
    pub fn acquire_new<F>(&mut self, tick: Tick, staleness: Tick, relocate: F) -> bool
    where
        F: FnMut(Range<usize>, usize),
    {
        if !self.can_acquire() {
            return false;
        }
        let previous = self.acquire;
        let next = self.next(previous);

        let mut registrar = std::mem::take(&mut self.slots[next]);
        registrar.copy_forward_from(&self.slots[previous], tick, staleness, relocate);
        self.slots[next] = registrar;
        self.retired[next] = false;
        self.acquire = next;
        true
    }

    /// Free the oldest held slot. Returns `false` if nothing is held.
    pub fn release_last(&mut self) -> bool {
        if self.held_count() == 0 {
            return false;
        }
        self.retired[self.release] = false;
        self.release = self.next(self.release);
        self.sweep_retired();
        true
    }

    /// Free a specific held slot.
    ///
    /// Releasing out of order marks the slot retired; the release cursor
    /// only moves once every older slot is free as well. Returns `false`
    /// for a slot that is not held.
    pub fn release(&mut self, index: usize) -> bool {
        if !self.is_held(index) {
            return false;
        }
        if index == self.release {
            return self.release_last();
        }
        self.retired[index] = true;
        true
    }

    /// Move the registrar out of a held slot, leaving it empty.
    ///
    /// The slot stays held until released.
    pub fn take(&mut self, index: usize) -> Option<SegmentRegistrar> {
        if !self.is_held(index) {
            return None;
        }
        Some(std::mem::take(&mut self.slots[index]))
    }

    /// Remove a caller from the current slot and every free slot.
    pub fn remove_registrations(&mut self, caller: CallerId) {
        for index in self.writable_slots() {
            self.slots[index].remove(caller);
        }
    }

    /// Clear the current slot and every free slot. Held slots are untouched.
    pub fn compact(&mut self) {
        for index in self.writable_slots() {
            self.slots[index].clear();
        }
    }

    /// Clear every slot and reset both cursors.
    pub fn clear_all(&mut self) {
        self.slots.iter_mut().for_each(SegmentRegistrar::clear);
        self.retired.iter_mut().for_each(|r| *r = false);
        self.release = 0;
        self.acquire = 0;
    }

    /// Slot indices from the current slot up to, not including, the release
    /// cursor. All slots when nothing is held.
    fn writable_slots(&self) -> Vec<usize> {
        let count = self.capacity() - self.held_count();
        (0..count)
            .map(|offset| (self.acquire + offset) % self.capacity())
            .collect()
    }

    fn sweep_retired(&mut self) {
        while self.release != self.acquire && self.retired[self.release] {
            self.retired[self.release] = false;
            self.release = self.next(self.release);
        }
    }

    fn next(&self, index: usize) -> usize {
        (index + 1) % self.capacity()
    }

    fn distance(&self, from: usize, to: usize) -> usize {
        (to + self.capacity() - from) % self.capacity()
    }
}
