//! Allocates and recycles entity handles.
//!
//! # Architecture
//!
//! The allocator keeps a flat `handles` table indexed by slot. A freed slot's entry is
//! overloaded to double as a free-list node: its `index` field holds the next free slot
//! (or the sentinel [`Handle::MAX_INDEX`]) if it's the tail), and its `version` field
//! holds the generation the *next* handle issued for that slot will carry. This avoids
//! a separate free-list allocation at the cost of one extra comparison on `alive`.
//!
//! ```rust,ignore
//! let mut allocator = Allocator::<Medium>::new();
//! let e = allocator.create().unwrap();     // Entity { index: 0, version: 0 }
//! allocator.remove(e).unwrap();
//! let reused = allocator.create().unwrap(); // Entity { index: 0, version: 1 }
//! assert!(!allocator.alive(e));
//! assert!(allocator.alive(reused));
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::entity::Handle;

/// Recoverable failures from entity allocation and removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The allocator has issued every index its profile can represent.
    OutOfActiveHandles,
    /// The handle passed to `remove` was already freed, or was never issued.
    RemovedInvalidHandle,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfActiveHandles => write!(f, "out of active entity handles"),
            Error::RemovedInvalidHandle => write!(f, "removed an invalid or stale entity handle"),
        }
    }
}

impl std::error::Error for Error {}

/// Allocates handles of type `E` and recycles freed ones via an intrusive free list.
///
/// Requires `&mut self` for every operation: the registry that owns an allocator is
/// `!Send`, so no internal synchronization is needed.
#[derive(Debug)]
pub struct Allocator<E: Handle> {
    /// One entry per issued slot. A live slot holds the handle currently valid for it;
    /// a freed slot holds `{index: next_free_or_sentinel, version: next_generation}`.
    handles: Vec<E>,
    /// Parallel to `handles`: whether a slot has been permanently retired (its version
    /// reached `E::MAX_VERSION` and it was removed at that version).
    retired: Vec<bool>,
    /// The next never-used slot index.
    append_cursor: u32,
    /// Head of the intrusive free list, or `None` if empty.
    free_slot: Option<u32>,
    /// Count of permanently retired slots, excluded from [`Allocator::len`].
    retired_count: usize,
    _marker: PhantomData<E>,
}

impl<E: Handle> Default for Allocator<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Handle> Allocator<E> {
    /// Create a new, empty allocator.
    #[inline]
    pub const fn new() -> Self {
        Self {
            handles: Vec::new(),
            retired: Vec::new(),
            append_cursor: 0,
            free_slot: None,
            retired_count: 0,
            _marker: PhantomData,
        }
    }

    /// Create an empty allocator with slot storage pre-reserved for `capacity` entities.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut allocator = Self::new();
        allocator.reserve(capacity);
        allocator
    }

    /// Reserve slot storage for at least `additional` more entities without reallocating.
    pub fn reserve(&mut self, additional: usize) {
        self.handles.reserve(additional);
        self.retired.reserve(additional);
    }

    /// Number of currently-live handles.
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len() - self.free_list_len() - self.retired_count
    }

    /// Whether there are no live handles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn free_list_len(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.free_slot;
        while let Some(slot) = cursor {
            count += 1;
            let next = self.handles[slot as usize].index();
            cursor = if next == E::MAX_INDEX { None } else { Some(next) };
        }
        count
    }

    /// Allocate a new handle, reusing a freed slot if one is available.
    ///
    /// # Errors
    /// Returns [`Error::OutOfActiveHandles`] when every index this profile can
    /// represent has been issued and none are free.
    pub fn create(&mut self) -> Result<E, Error> {
        if let Some(slot) = self.free_slot {
            let recycled = self.handles[slot as usize];
            let next_free = recycled.index();
            self.free_slot = if next_free == E::MAX_INDEX {
                None
            } else {
                Some(next_free)
            };
            let handle = E::new(slot, recycled.version());
            self.handles[slot as usize] = handle;
            return Ok(handle);
        }

        if self.append_cursor >= E::MAX_INDEX {
            return Err(Error::OutOfActiveHandles);
        }

        let index = self.append_cursor;
        self.append_cursor += 1;
        let handle = E::new(index, 0);
        self.handles.push(handle);
        self.retired.push(false);
        Ok(handle)
    }

    /// Free a handle, making its slot available for reuse with a bumped generation.
    ///
    /// A slot whose version has reached [`Handle::MAX_VERSION`] is retired instead of
    /// recycled: it is dropped from the free list for good, rather than wrapping its
    /// version back to `0` and risking a stale old handle aliasing a live new one.
    ///
    /// # Errors
    /// Returns [`Error::RemovedInvalidHandle`] if `handle` is not currently alive
    /// (double free, or a handle from a different allocator/generation).
    pub fn remove(&mut self, handle: E) -> Result<(), Error> {
        if !self.alive(handle) {
            return Err(Error::RemovedInvalidHandle);
        }

        if handle.version() == E::MAX_VERSION {
            // Retired: mark the slot dead and never link it back into the free list,
            // so it can never be reissued.
            self.retired[handle.index() as usize] = true;
            self.retired_count += 1;
            return Ok(());
        }

        let next_free = self.free_slot.unwrap_or(E::MAX_INDEX);
        self.handles[handle.index() as usize] = E::new(next_free, handle.bumped().version());
        self.free_slot = Some(handle.index());
        Ok(())
    }

    /// Whether `handle` refers to a slot that is both in range, not retired, and
    /// carries this handle's exact generation.
    #[inline]
    pub fn alive(&self, handle: E) -> bool {
        handle.index() < self.append_cursor
            && !self.retired[handle.index() as usize]
            && self.handles[handle.index() as usize] == handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{self, Medium, Small};

    type A = Allocator<Medium>;

    #[test]
    fn allocates_sequential_indices_from_empty() {
        let mut allocator = A::new();

        let e0 = allocator.create().unwrap();
        let e1 = allocator.create().unwrap();

        assert_eq!(e0.index(), 0);
        assert_eq!(e1.index(), 1);
        assert_eq!(e0.version(), 0);
        assert_eq!(e1.version(), 0);
    }

    #[test]
    fn recycles_freed_slot_with_bumped_version() {
        let mut allocator = A::new();
        let e0 = allocator.create().unwrap();

        allocator.remove(e0).unwrap();
        assert!(!allocator.alive(e0));

        let reused = allocator.create().unwrap();
        assert_eq!(reused.index(), e0.index());
        assert_eq!(reused.version(), 1);
        assert!(allocator.alive(reused));
    }

    #[test]
    fn free_list_is_lifo() {
        let mut allocator = A::new();
        let entities: Vec<_> = (0..5).map(|_| allocator.create().unwrap()).collect();

        for &e in entities.iter() {
            allocator.remove(e).unwrap();
        }

        // Then - recreated in reverse order of freeing (LIFO free list)
        let mut recycled = Vec::new();
        for _ in 0..5 {
            recycled.push(allocator.create().unwrap());
        }
        let expected_indices: Vec<_> = entities.iter().rev().map(|e| e.index()).collect();
        let actual_indices: Vec<_> = recycled.iter().map(|e| e.index()).collect();
        assert_eq!(actual_indices, expected_indices);
        assert!(recycled.iter().all(|e| e.version() == 1));
    }

    #[test]
    fn removing_invalid_handle_errors() {
        let mut allocator = A::new();
        let e0 = allocator.create().unwrap();
        allocator.remove(e0).unwrap();

        // Double-free
        assert_eq!(allocator.remove(e0), Err(Error::RemovedInvalidHandle));

        // Stale handle to a recycled slot
        let reused = allocator.create().unwrap();
        assert_ne!(reused, e0);
        assert_eq!(allocator.remove(e0), Err(Error::RemovedInvalidHandle));
    }

    #[test]
    fn removing_never_issued_handle_errors() {
        let mut allocator = A::new();
        let bogus = entity::Medium::new(999, 0);
        assert_eq!(allocator.remove(bogus), Err(Error::RemovedInvalidHandle));
    }

    #[test]
    fn out_of_active_handles_when_index_space_exhausted() {
        // Given - Small's 12-bit index is still too big to exhaust in a unit test, so
        // use a narrower profile directly.
        type Tiny = entity::Entity<2, 4>;
        let mut allocator = Allocator::<Tiny>::new();

        for _ in 0..3 {
            allocator.create().unwrap();
        }

        // Then
        assert_eq!(allocator.create(), Err(Error::OutOfActiveHandles));
    }

    #[test]
    fn handle_recycle_scenario() {
        // S6 - (index_bits=4, version_bits=4): create 15 handles, free one of the early
        // ones, create one more and observe it reuses that slot with a bumped version.
        type Profile = entity::Entity<4, 4>;
        let mut allocator = Allocator::<Profile>::new();
        let mut entities: Vec<_> = (0..15).map(|_| allocator.create().unwrap()).collect();

        let freed = entities.remove(2);
        allocator.remove(freed).unwrap();

        let recreated = allocator.create().unwrap();
        assert_eq!(recreated.index(), freed.index());
        assert_eq!(recreated.version(), 1);

        // When - free everything and recreate: second-generation handles come back
        // LIFO, each with an incremented version.
        entities.push(recreated);
        for &e in entities.iter() {
            allocator.remove(e).unwrap();
        }
        let mut second_gen = Vec::new();
        for _ in 0..15 {
            second_gen.push(allocator.create().unwrap());
        }
        let expected: Vec<_> = entities.iter().rev().map(|e| e.index()).collect();
        let actual: Vec<_> = second_gen.iter().map(|e| e.index()).collect();
        assert_eq!(actual, expected);
        assert!(second_gen.iter().all(|e| e.version() == 2));
    }

    #[test]
    fn len_tracks_live_handles() {
        let mut allocator = A::new();
        assert!(allocator.is_empty());

        let e0 = allocator.create().unwrap();
        let e1 = allocator.create().unwrap();
        assert_eq!(allocator.len(), 2);

        allocator.remove(e0).unwrap();
        assert_eq!(allocator.len(), 1);

        allocator.remove(e1).unwrap();
        assert!(allocator.is_empty());
    }

    #[test]
    fn exhausted_version_retires_the_slot_instead_of_recycling() {
        // Given - a 1-bit version profile: only versions 0 and 1 exist
        type OneBitVersion = entity::Entity<8, 1>;
        let mut allocator = Allocator::<OneBitVersion>::new();
        let e = allocator.create().unwrap();
        assert_eq!(e.version(), 0);

        allocator.remove(e).unwrap();
        let reused = allocator.create().unwrap();
        assert_eq!(reused.index(), e.index());
        assert_eq!(reused.version(), 1);

        // When - removed at the maximum version
        allocator.remove(reused).unwrap();

        // Then - the slot is gone for good, not back on the free list
        assert!(!allocator.alive(reused));
        let next = allocator.create().unwrap();
        assert_ne!(next.index(), reused.index());
    }

    #[test]
    fn with_capacity_preallocates_without_issuing_handles() {
        let allocator = Allocator::<Medium>::with_capacity(64);
        assert!(allocator.is_empty());
        assert!(allocator.handles.capacity() >= 64);
    }

    #[test]
    fn small_profile_allocates_and_recycles() {
        let mut allocator = Allocator::<Small>::new();
        let e = allocator.create().unwrap();
        allocator.remove(e).unwrap();
        assert!(allocator.is_empty());
    }
}
