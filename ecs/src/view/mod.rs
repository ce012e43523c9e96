//! Ad hoc, unmaintained queries.
//!
//! Unlike a [`crate::group::Group`], a view costs nothing to create and nothing to keep
//! around between calls — it just walks the smallest relevant storage's dense array each
//! time, filtering by the others. That makes it the right tool for a query run once or
//! rarely; for one run every frame over the same component combination, a group pays the
//! bookkeeping cost once at each add/remove instead of at every iteration.

use crate::component::{ComponentStorage, Component, ErasedStorage, Id};
use crate::entity::Handle;

/// A direct view over a single component type's storage: the literal fast path, with no
/// per-entity filtering at all.
pub struct SingleView<'a, E: Handle, T: Component> {
    storage: &'a ComponentStorage<E, T>,
}

impl<'a, E: Handle, T: Component> SingleView<'a, E, T> {
    pub(crate) fn new(storage: &'a ComponentStorage<E, T>) -> Self {
        Self { storage }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// The component values in storage order, with no entity information at all — the
    /// fastest possible access when only the values matter.
    pub fn raw(&self) -> &[T] {
        self.storage.instances()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = E> + 'a {
        self.storage.dense().iter().copied().rev()
    }

    pub fn each(&self) -> impl DoubleEndedIterator<Item = (E, &'a T)> {
        self.storage
            .dense()
            .iter()
            .copied()
            .rev()
            .zip(self.storage.instances().iter().rev())
    }
}

/// A view over entities that have every type in one set of storages and none in another.
///
/// Drives iteration from whichever include storage currently has the fewest entities,
/// walking it in reverse (the same direction every other iteration in this crate takes,
/// for swap-remove safety) and testing each candidate against the rest.
pub struct MultiView<'a, E: Handle> {
    storages: &'a [Option<Box<dyn ErasedStorage<E>>>],
    driver_dense: &'a [E],
    pos: usize,
    include: Vec<Id>,
    exclude: Vec<Id>,
    empty: bool,
}

impl<'a, E: Handle> MultiView<'a, E> {
    pub(crate) fn new(
        storages: &'a [Option<Box<dyn ErasedStorage<E>>>],
        driver_dense: &'a [E],
        include: Vec<Id>,
        exclude: Vec<Id>,
    ) -> Self {
        let pos = driver_dense.len();
        Self {
            storages,
            driver_dense,
            pos,
            include,
            exclude,
            empty: false,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            storages: &[],
            driver_dense: &[],
            pos: 0,
            include: Vec::new(),
            exclude: Vec::new(),
            empty: true,
        }
    }

    fn qualifies(&self, e: E) -> bool {
        self.include
            .iter()
            .all(|id| self.storages[id.index()].as_ref().unwrap().contains(e))
            && self
                .exclude
                .iter()
                .all(|id| !self.storages[id.index()].as_ref().is_some_and(|s| s.contains(e)))
    }
}

impl<'a, E: Handle> Iterator for MultiView<'a, E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        if self.empty {
            return None;
        }
        while self.pos > 0 {
            self.pos -= 1;
            let e = self.driver_dense[self.pos];
            if self.qualifies(e) {
                return Some(e);
            }
        }
        None
    }
}
