//! A paged sparse→dense index giving O(1) insert/remove/lookup with stable, packed
//! iteration order.
//!
//! # Architecture
//!
//! Two parallel structures are kept:
//!
//! - `dense`: an ordered, gap-free list of live entities. Positions `0..len` are packed.
//! - `sparse`: a table mapping `entity.index() → position in dense`, split into fixed-size
//!   pages so memory is proportional to the index *ranges actually touched*, not to the
//!   largest index ever seen. A page is allocated lazily on first use and never freed
//!   until [`SparseSet::clear`].
//!
//! This is the same block/page trick as a classic paged sparse index (allocate only the
//! pages that have entries, use a plain array within a page for O(1) access); the
//! constant-size array inside each page additionally means every present entity can be
//! removed with a single swap against the last dense entry, touching at most one other
//! entity's back-pointer.
//!
//! ```rust,ignore
//! let mut set = SparseSet::<Medium>::new();
//! let e = Medium::new(0, 0);
//! set.add(e);
//! assert!(set.contains(e));
//! set.remove(e);
//! assert!(!set.contains(e));
//! ```

use std::cmp::Ordering;

use crate::entity::Handle;

/// Number of sparse index slots per page.
pub const PAGE_SIZE: usize = 4096;

const TOMBSTONE: u32 = u32::MAX;

type Page = Box<[u32; PAGE_SIZE]>;

fn new_page() -> Page {
    Box::new([TOMBSTONE; PAGE_SIZE])
}

#[inline]
fn locate(index: u32) -> (usize, usize) {
    let index = index as usize;
    (index / PAGE_SIZE, index % PAGE_SIZE)
}

/// A paged sparse-set of entity handles.
///
/// `ComponentStorage<E, T>` wraps one of these and keeps a parallel `instances: Vec<T>`
/// in lockstep; `SparseSet` alone is also used directly by non-owning groups to cache
/// their match set, where there is no parallel array to maintain.
#[derive(Debug)]
pub struct SparseSet<E: Handle> {
    sparse: Vec<Option<Page>>,
    dense: Vec<E>,
}

impl<E: Handle> Default for SparseSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Handle> SparseSet<E> {
    /// Create a new, empty sparse set.
    pub fn new() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
        }
    }

    /// Number of live entities in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Whether the set holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// The packed, ordered sequence of entities. `dense()[i]` is the entity at dense
    /// position `i`; this is the layout groups rely on to stay aligned with other
    /// owned storages.
    #[inline]
    pub fn dense(&self) -> &[E] {
        &self.dense
    }

    /// Whether `e` currently has an entry in this set.
    #[inline]
    pub fn contains(&self, e: E) -> bool {
        let (page, offset) = locate(e.index());
        self.sparse
            .get(page)
            .and_then(|p| p.as_ref())
            .is_some_and(|p| p[offset] != TOMBSTONE)
    }

    /// The dense position of `e`, or `None` if it is not present.
    #[inline]
    pub fn position(&self, e: E) -> Option<usize> {
        let (page, offset) = locate(e.index());
        self.sparse
            .get(page)
            .and_then(|p| p.as_ref())
            .map(|p| p[offset])
            .filter(|&pos| pos != TOMBSTONE)
            .map(|pos| pos as usize)
    }

    /// Insert `e`, appending it to the dense array.
    ///
    /// Returns the dense position `e` now occupies.
    ///
    /// # Panics
    /// Panics (debug and release) if `e` is already present: inserting a duplicate
    /// would silently desynchronize the sparse back-pointer from the dense array.
    pub fn add(&mut self, e: E) -> usize {
        assert!(!self.contains(e), "entity already present in sparse set");

        let (page, offset) = locate(e.index());
        if page >= self.sparse.len() {
            self.sparse.resize_with(page + 1, || None);
        }
        let slot = self.sparse[page].get_or_insert_with(new_page);

        let pos = self.dense.len();
        slot[offset] = pos as u32;
        self.dense.push(e);
        pos
    }

    /// Remove `e` via swap-remove: the last dense entry takes its place.
    ///
    /// Returns the dense position `e` occupied (the same index a parallel array's
    /// own `swap_remove` at that index must be given to stay in lockstep).
    ///
    /// # Panics
    /// Panics if `e` is not present.
    pub fn remove(&mut self, e: E) -> usize {
        let pos = self
            .position(e)
            .expect("removed an entity that is not present in this sparse set");

        let last = self.dense.len() - 1;
        if pos != last {
            let moved = self.dense[last];
            self.dense[pos] = moved;
            let (mp, mo) = locate(moved.index());
            self.sparse[mp].as_mut().unwrap()[mo] = pos as u32;
        }
        self.dense.pop();

        let (page, offset) = locate(e.index());
        self.sparse[page].as_mut().unwrap()[offset] = TOMBSTONE;
        pos
    }

    /// Exchange the dense positions of two present entities.
    ///
    /// # Panics
    /// Panics if either entity is absent.
    pub fn swap(&mut self, a: E, b: E) {
        let pa = self.position(a).expect("swap of absent entity");
        let pb = self.position(b).expect("swap of absent entity");
        self.swap_positions(pa, pb);
    }

    /// Exchange the entities occupying two dense positions, fixing up both sparse
    /// back-pointers. The positions themselves must be in bounds.
    pub fn swap_positions(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.dense.swap(i, j);
        let (pi, oi) = locate(self.dense[i].index());
        let (pj, oj) = locate(self.dense[j].index());
        self.sparse[pi].as_mut().unwrap()[oi] = i as u32;
        self.sparse[pj].as_mut().unwrap()[oj] = j as u32;
    }

    /// Sort `dense[0..prefix_len]` (clamped to `len()`) using `less`, an insertion sort
    /// that invokes `on_swap(i, j)` for every transposition of dense positions `i` and
    /// `j` so a parallel array (e.g. `ComponentStorage`'s `instances`) can be permuted
    /// identically. Passing `prefix_len = len()` sorts the whole set; a smaller prefix
    /// is how an owning group resorts only the slice it owns (§4.6).
    ///
    /// Insertion sort is used rather than a divide-and-conquer sort because it is
    /// straightforward to hook a swap callback into, and because the prefixes owning
    /// groups re-sort are typically small and already close to sorted.
    pub fn arrange<F, S>(&mut self, prefix_len: usize, mut less: F, mut on_swap: S)
    where
        F: FnMut(&E, &E) -> Ordering,
        S: FnMut(usize, usize),
    {
        let len = prefix_len.min(self.dense.len());
        for i in 1..len {
            let mut j = i;
            while j > 0 && less(&self.dense[j], &self.dense[j - 1]) == Ordering::Less {
                self.swap_positions(j, j - 1);
                on_swap(j, j - 1);
                j -= 1;
            }
        }
    }

    /// Full stable sort of the dense array by entity identity, with no parallel array
    /// to keep in sync.
    pub fn sort_by<F>(&mut self, less: F)
    where
        F: FnMut(&E, &E) -> Ordering,
    {
        let len = self.dense.len();
        self.arrange(len, less, |_, _| {});
    }

    /// Reorder `self` so that entities also present in `other` appear, at the front of
    /// `self`'s dense array, in the same relative order they have in `other`'s dense
    /// array. Entities not present in `other` are left after them, order unspecified.
    pub fn respect(&mut self, other: &SparseSet<E>) {
        let mut pos = 0usize;
        for &e in other.dense.iter() {
            if let Some(cur) = self.position(e) {
                if cur != pos {
                    self.swap_positions(pos, cur);
                }
                pos += 1;
            }
        }
    }

    /// Iterate live entities in reverse-dense order — the only iteration direction this
    /// type exposes, since a swap-remove of the entity currently being visited relocates
    /// an entity from a *later* (already-visited) position, making in-loop removal safe.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = E> + '_ {
        self.dense.iter().rev().copied()
    }

    /// Remove every entity and release all pages.
    pub fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Medium;

    fn e(i: u32) -> Medium {
        Medium::new(i, 0)
    }

    #[test]
    fn add_and_contains() {
        let mut set = SparseSet::<Medium>::new();
        let a = e(0);
        let b = e(4096); // second page

        assert_eq!(set.add(a), 0);
        assert_eq!(set.add(b), 1);

        assert!(set.contains(a));
        assert!(set.contains(b));
        assert!(!set.contains(e(1)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    #[should_panic(expected = "already present")]
    fn add_duplicate_panics() {
        let mut set = SparseSet::<Medium>::new();
        set.add(e(0));
        set.add(e(0));
    }

    #[test]
    fn remove_swaps_last_into_vacated_slot() {
        let mut set = SparseSet::<Medium>::new();
        let a = e(0);
        let b = e(1);
        let c = e(2);
        set.add(a);
        set.add(b);
        set.add(c);

        // When - remove the middle entity
        let vacated = set.remove(b);

        // Then - c (formerly last) now occupies b's old slot
        assert_eq!(vacated, 1);
        assert!(!set.contains(b));
        assert_eq!(set.position(c), Some(1));
        assert_eq!(set.position(a), Some(0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    #[should_panic(expected = "not present")]
    fn remove_absent_panics() {
        let mut set = SparseSet::<Medium>::new();
        set.remove(e(0));
    }

    #[test]
    fn swap_exchanges_positions() {
        let mut set = SparseSet::<Medium>::new();
        let a = e(0);
        let b = e(1);
        set.add(a);
        set.add(b);

        set.swap(a, b);

        assert_eq!(set.position(a), Some(1));
        assert_eq!(set.position(b), Some(0));
        assert_eq!(set.dense(), &[b, a]);
    }

    #[test]
    fn arrange_sorts_prefix_and_calls_back() {
        let mut set = SparseSet::<Medium>::new();
        for i in [3u32, 1, 4, 1, 5].iter().enumerate() {
            let (_, v) = i;
            set.add(e(*v * 10 + i.0 as u32));
        }
        // Build a simpler, duplicate-free case: entities whose index encodes a sort key.
        let mut set = SparseSet::<Medium>::new();
        let keys = [5u32, 3, 4, 1, 2];
        for k in keys {
            set.add(e(k));
        }

        let mut swaps = Vec::new();
        set.arrange(
            keys.len(),
            |a, b| a.index().cmp(&b.index()),
            |i, j| swaps.push((i, j)),
        );

        let sorted: Vec<_> = set.dense().iter().map(|e| e.index()).collect();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
        assert!(!swaps.is_empty());

        // Then - invariant (1) still holds for every entity after sorting
        for k in keys {
            let pos = set.position(e(k)).unwrap();
            assert_eq!(set.dense()[pos], e(k));
        }
    }

    #[test]
    fn arrange_respects_prefix_len() {
        let mut set = SparseSet::<Medium>::new();
        let keys = [5u32, 3, 4, 1, 2];
        for k in keys {
            set.add(e(k));
        }

        // Only sort the first 3 positions.
        set.arrange(3, |a, b| a.index().cmp(&b.index()), |_, _| {});

        let prefix: Vec<_> = set.dense()[..3].iter().map(|e| e.index()).collect();
        assert_eq!(prefix, vec![3, 4, 5]);
    }

    #[test]
    fn sort_by_full_set() {
        let mut set = SparseSet::<Medium>::new();
        for k in [5u32, 3, 4, 1, 2] {
            set.add(e(k));
        }

        set.sort_by(|a, b| b.index().cmp(&a.index())); // descending

        let sorted: Vec<_> = set.dense().iter().map(|e| e.index()).collect();
        assert_eq!(sorted, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn respect_orders_common_entities_like_other() {
        let mut a = SparseSet::<Medium>::new();
        let mut b = SparseSet::<Medium>::new();

        for k in [0u32, 1, 2, 3] {
            a.add(e(k));
        }
        // b holds a subset, in a different relative order.
        for k in [3u32, 1, 0] {
            b.add(e(k));
        }

        a.respect(&b);

        let front: Vec<_> = a.dense()[..3].iter().map(|e| e.index()).collect();
        assert_eq!(front, vec![3, 1, 0]);
    }

    #[test]
    fn reverse_iteration_order() {
        let mut set = SparseSet::<Medium>::new();
        for k in [0u32, 1, 2] {
            set.add(e(k));
        }

        let order: Vec<_> = set.iter().map(|e| e.index()).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn swap_remove_during_reverse_iteration_is_safe() {
        // Removing the entity currently visited during reverse iteration relocates an
        // already-visited entity into its slot, never one still to be visited.
        let mut set = SparseSet::<Medium>::new();
        for k in [0u32, 1, 2, 3] {
            set.add(e(k));
        }

        let mut visited = Vec::new();
        let snapshot: Vec<_> = set.dense().to_vec();
        for entity in snapshot.into_iter().rev() {
            visited.push(entity.index());
            set.remove(entity);
        }

        assert_eq!(visited, vec![3, 2, 1, 0]);
        assert!(set.is_empty());
    }

    #[test]
    fn clear_releases_pages_and_entries() {
        let mut set = SparseSet::<Medium>::new();
        set.add(e(0));
        set.add(e(5000));

        set.clear();

        assert!(set.is_empty());
        assert!(!set.contains(e(0)));
        assert!(!set.contains(e(5000)));
    }
}
