//! Incrementally-maintained queries.
//!
//! A group tracks, as entities change, which ones currently have every owned/included
//! component type and none of the excluded ones. Two flavors:
//!
//! - **Non-owning**: the group keeps its own [`SparseSet`] of matching entities,
//!   populated and pruned by the registry's `add`/`remove` calls.
//! - **Owning**: the group owns one or more component storages outright and instead
//!   maintains the *prefix invariant* — the first `current` dense positions of every
//!   owned storage are exactly the matching entities, in the same relative order — which
//!   makes iteration a plain slice walk with no per-entity filtering at all.
//!
//! Nested owning groups (e.g. `group([Position], [], [])` and
//! `group([Position, Velocity], [], [])`) are permitted provided their `owned ∪
//! included` sets are subset-ordered: the more specific group's prefix must always be a
//! prefix of the less specific group's prefix. [`validate_nesting`] enforces this at
//! group-creation time; [`notify_construct`]/[`notify_destroy`] process nested groups
//! most-specific-first (on destroy) or least-specific-first (on construct) to maintain it.

mod owned_tuple;

pub use owned_tuple::OwnedTuple;

use std::cmp::Ordering;
use std::marker::PhantomData;

use fixedbitset::FixedBitSet;

use crate::component::{ErasedStorage, Id};
use crate::entity::Handle;
use crate::registry::Registry;
use crate::sparse_set::SparseSet;

pub(crate) enum GroupKind<E: Handle> {
    NonOwning(SparseSet<E>),
    Owning { current: usize },
}

pub(crate) struct GroupData<E: Handle> {
    pub(crate) owned: Vec<Id>,
    pub(crate) included: Vec<Id>,
    pub(crate) excluded: Vec<Id>,
    pub(crate) owned_set: FixedBitSet,
    included_set: FixedBitSet,
    excluded_set: FixedBitSet,
    pub(crate) kind: GroupKind<E>,
}

impl<E: Handle> GroupData<E> {
    pub(crate) fn new(owned: Vec<Id>, included: Vec<Id>, excluded: Vec<Id>, is_owning: bool) -> Self {
        let bits = owned
            .iter()
            .chain(&included)
            .chain(&excluded)
            .map(|id| id.index() + 1)
            .max()
            .unwrap_or(0)
            .max(1);
        let mut owned_set = FixedBitSet::with_capacity(bits);
        let mut included_set = FixedBitSet::with_capacity(bits);
        let mut excluded_set = FixedBitSet::with_capacity(bits);
        for id in &owned {
            owned_set.insert(id.index());
        }
        for id in &included {
            included_set.insert(id.index());
        }
        for id in &excluded {
            excluded_set.insert(id.index());
        }
        let kind = if is_owning {
            GroupKind::Owning { current: 0 }
        } else {
            GroupKind::NonOwning(SparseSet::new())
        };
        Self {
            owned,
            included,
            excluded,
            owned_set,
            included_set,
            excluded_set,
            kind,
        }
    }

    fn specificity(&self) -> usize {
        self.owned.len() + self.included.len()
    }

    pub(crate) fn requires(&self, id: Id) -> bool {
        self.owned_set.contains(id.index()) || self.included_set.contains(id.index())
    }

    pub(crate) fn excludes(&self, id: Id) -> bool {
        self.excluded_set.contains(id.index())
    }

    pub(crate) fn requirement_set(&self) -> FixedBitSet {
        let mut set = self.owned_set.clone();
        set.union_with(&self.included_set);
        set
    }

    fn matches<Fs>(&self, storages: &[Option<Fs>], e: E) -> bool
    where
        Fs: AsRef<dyn ErasedStorage<E>>,
    {
        self.owned
            .iter()
            .chain(&self.included)
            .all(|id| contains(storages, *id, e))
            && self.excluded.iter().all(|id| !contains(storages, *id, e))
    }

    pub(crate) fn maybe_valid_if<Fs>(&mut self, storages: &mut [Option<Fs>], e: E)
    where
        Fs: AsRef<dyn ErasedStorage<E>> + AsMut<dyn ErasedStorage<E>>,
    {
        if !self.matches(storages, e) {
            return;
        }
        match &mut self.kind {
            GroupKind::NonOwning(set) => {
                if !set.contains(e) {
                    set.add(e);
                }
            }
            GroupKind::Owning { current } => {
                for &id in &self.owned {
                    let storage = storages[id.index()].as_mut().unwrap().as_mut();
                    if let Some(pos) = storage.position(e)
                        && pos >= *current
                    {
                        storage.swap_positions(pos, *current);
                    }
                }
                *current += 1;
            }
        }
    }

    pub(crate) fn discard_if<Fs>(&mut self, storages: &mut [Option<Fs>], e: E)
    where
        Fs: AsRef<dyn ErasedStorage<E>> + AsMut<dyn ErasedStorage<E>>,
    {
        match &mut self.kind {
            GroupKind::NonOwning(set) => {
                if set.contains(e) {
                    set.remove(e);
                }
            }
            GroupKind::Owning { current } => {
                if *current == 0 {
                    return;
                }
                let Some(&first) = self.owned.first() else {
                    return;
                };
                let in_prefix = storages[first.index()]
                    .as_ref()
                    .unwrap()
                    .as_ref()
                    .position(e)
                    .is_some_and(|p| p < *current);
                if !in_prefix {
                    return;
                }
                for &id in &self.owned {
                    let storage = storages[id.index()].as_mut().unwrap().as_mut();
                    if let Some(p) = storage.position(e) {
                        storage.swap_positions(p, *current - 1);
                    }
                }
                *current -= 1;
            }
        }
    }
}

fn contains<E: Handle, Fs>(storages: &[Option<Fs>], id: Id, e: E) -> bool
where
    Fs: AsRef<dyn ErasedStorage<E>>,
{
    storages
        .get(id.index())
        .and_then(Option::as_ref)
        .is_some_and(|storage| storage.as_ref().contains(e))
}

fn is_subset(a: &FixedBitSet, b: &FixedBitSet) -> bool {
    a.ones().all(|i| b.contains(i))
}

fn sets_equal(a: &FixedBitSet, b: &FixedBitSet) -> bool {
    is_subset(a, b) && is_subset(b, a)
}

fn same_ids(a: &[Id], b: &[Id]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Find a group already defined with exactly this owned/included/excluded signature.
pub(crate) fn find_existing<E: Handle>(
    groups: &[GroupData<E>],
    owned: &[Id],
    included: &[Id],
    excluded: &[Id],
) -> Option<usize> {
    groups
        .iter()
        .position(|g| same_ids(&g.owned, owned) && same_ids(&g.included, included) && same_ids(&g.excluded, excluded))
}

pub(crate) fn assert_disjoint(owned: &[Id], included: &[Id], excluded: &[Id]) {
    assert!(
        owned.iter().all(|id| !included.contains(id) && !excluded.contains(id))
            && included.iter().all(|id| !excluded.contains(id)),
        "a group's owned, included, and excluded component types must be pairwise disjoint"
    );
}

/// Every owning group sharing an owned storage with `(owned, included)` must have an
/// `owned ∪ included` set that is a subset, or superset, of it — never incomparable.
pub(crate) fn validate_nesting<E: Handle>(groups: &[GroupData<E>], owned: &[Id], included: &[Id]) {
    let bits = owned
        .iter()
        .chain(included)
        .map(|id| id.index() + 1)
        .max()
        .unwrap_or(0)
        .max(1);
    let mut new_set = FixedBitSet::with_capacity(bits);
    for id in owned.iter().chain(included) {
        new_set.insert(id.index());
    }
    for g in groups.iter().filter(|g| matches!(g.kind, GroupKind::Owning { .. })) {
        let shares = owned.iter().any(|id| g.owned_set.contains(id.index()));
        if !shares {
            continue;
        }
        let existing_set = g.requirement_set();
        assert!(
            is_subset(&new_set, &existing_set) || is_subset(&existing_set, &new_set),
            "owning groups sharing a storage must nest: one group's owned ∪ included set must be a subset of the other's"
        );
    }
}

/// Populate a freshly-created group from whichever relevant storage currently has the
/// fewest entities.
pub(crate) fn backfill<E: Handle>(storages: &mut [Option<Box<dyn ErasedStorage<E>>>], data: &mut GroupData<E>) {
    let smallest = data
        .owned
        .iter()
        .chain(&data.included)
        .min_by_key(|id| storages[id.index()].as_ref().map_or(0, |s| s.len()))
        .copied();
    let Some(smallest) = smallest else {
        return;
    };
    let candidates: Vec<E> = storages[smallest.index()].as_ref().unwrap().dense().to_vec();
    for e in candidates {
        data.maybe_valid_if(storages, e);
    }
}

/// Process construction of a component of type `id`: groups excluding `id` may lose a
/// member (processed most-specific-first), then groups owning/including `id` may gain
/// one (processed least-specific-first, so a newly-qualifying entity enters any
/// less-specific enclosing group's prefix before a more-specific nested one).
pub(crate) fn notify_construct<E: Handle>(
    storages: &mut [Option<Box<dyn ErasedStorage<E>>>],
    groups: &mut [GroupData<E>],
    id: Id,
    e: E,
) {
    let mut discard: Vec<usize> = (0..groups.len()).filter(|&i| groups[i].excludes(id)).collect();
    discard.sort_by_key(|&i| std::cmp::Reverse(groups[i].specificity()));
    for i in discard {
        groups[i].discard_if(storages, e);
    }

    let mut validate: Vec<usize> = (0..groups.len()).filter(|&i| groups[i].requires(id)).collect();
    validate.sort_by_key(|&i| groups[i].specificity());
    for i in validate {
        groups[i].maybe_valid_if(storages, e);
    }
}

/// Process destruction of a component of type `id`, the mirror image of
/// [`notify_construct`]: groups owning/including `id` may lose a member (most-specific
/// first), then groups excluding `id` may gain one (least-specific first).
pub(crate) fn notify_destroy<E: Handle>(
    storages: &mut [Option<Box<dyn ErasedStorage<E>>>],
    groups: &mut [GroupData<E>],
    id: Id,
    e: E,
) {
    let mut discard: Vec<usize> = (0..groups.len()).filter(|&i| groups[i].requires(id)).collect();
    discard.sort_by_key(|&i| std::cmp::Reverse(groups[i].specificity()));
    for i in discard {
        groups[i].discard_if(storages, e);
    }

    let mut validate: Vec<usize> = (0..groups.len()).filter(|&i| groups[i].excludes(id)).collect();
    validate.sort_by_key(|&i| groups[i].specificity());
    for i in validate {
        groups[i].maybe_valid_if(storages, e);
    }
}

fn is_most_specific<E: Handle>(groups: &[GroupData<E>], idx: usize) -> bool {
    let self_set = groups[idx].requirement_set();
    for (j, other) in groups.iter().enumerate() {
        if j == idx || !matches!(other.kind, GroupKind::Owning { .. }) {
            continue;
        }
        let shares = other.owned.iter().any(|id| groups[idx].owned_set.contains(id.index()));
        if !shares {
            continue;
        }
        let other_set = other.requirement_set();
        if is_subset(&other_set, &self_set) && !sets_equal(&other_set, &self_set) {
            return false;
        }
    }
    true
}

fn apply_order<E: Handle>(registry: &mut Registry<E>, owned_ids: &[Id], target: &[E]) {
    let primary = owned_ids[0];
    for (i, &e) in target.iter().enumerate() {
        let pos = registry.erased(primary).position(e).unwrap();
        if pos != i {
            for &id in owned_ids {
                registry.erased_mut(id).swap_positions(pos, i);
            }
        }
    }
}

/// A stable handle to a defined group: an index into the registry's group list plus
/// phantom type parameters recording the owned/included/excluded types it was defined
/// with. Cheap to copy; every operation takes the registry explicitly rather than
/// borrowing it, so a `Group` never outlives a mutation the way a live iterator would.
pub struct Group<E: Handle, Own, Inc, Exc> {
    index: usize,
    _marker: PhantomData<fn() -> (E, Own, Inc, Exc)>,
}

impl<E: Handle, Own, Inc, Exc> Clone for Group<E, Own, Inc, Exc> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: Handle, Own, Inc, Exc> Copy for Group<E, Own, Inc, Exc> {}

impl<E: Handle, Own, Inc, Exc> Group<E, Own, Inc, Exc> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }
}

impl<E: Handle, Own: OwnedTuple, Inc, Exc> Group<E, Own, Inc, Exc> {
    pub fn len(&self, registry: &Registry<E>) -> usize {
        match &registry.groups[self.index].kind {
            GroupKind::NonOwning(set) => set.len(),
            GroupKind::Owning { current } => *current,
        }
    }

    pub fn is_empty(&self, registry: &Registry<E>) -> bool {
        self.len(registry) == 0
    }

    pub fn iter<'a>(&self, registry: &'a Registry<E>) -> GroupIter<'a, E, Own> {
        let data = &registry.groups[self.index];
        let entities: &'a [E] = match &data.kind {
            GroupKind::NonOwning(set) => set.dense(),
            GroupKind::Owning { current } => {
                let primary = data.owned[0];
                &registry.erased(primary).dense()[..*current]
            }
        };
        GroupIter {
            registry,
            owned_ids: &data.owned,
            entities,
            pos: entities.len(),
            _marker: PhantomData,
        }
    }

    /// Sort an owning group's prefix by a key computed from each member entity.
    ///
    /// # Panics
    /// Panics if this group is non-owning, or if it is not the most specific group in
    /// its nesting chain (only the innermost owning group may reorder a shared storage).
    pub fn sort_by<F, K>(&self, registry: &mut Registry<E>, mut key_fn: F)
    where
        K: Ord,
        F: FnMut(&Registry<E>, E) -> K,
    {
        assert!(
            matches!(registry.groups[self.index].kind, GroupKind::Owning { .. }),
            "sort is only meaningful for an owning group"
        );
        assert!(
            is_most_specific(&registry.groups, self.index),
            "only the most specific owning group in a nesting chain may be sorted"
        );

        let current = match registry.groups[self.index].kind {
            GroupKind::Owning { current } => current,
            GroupKind::NonOwning(_) => unreachable!(),
        };
        if current < 2 {
            return;
        }
        let owned_ids = registry.groups[self.index].owned.clone();
        let primary = owned_ids[0];

        let entities: Vec<E> = registry.erased(primary).dense()[..current].to_vec();
        let mut keyed: Vec<(E, K)> = entities
            .into_iter()
            .map(|e| {
                let key = key_fn(registry, e);
                (e, key)
            })
            .collect();
        keyed.sort_by(|a, b| a.1.cmp(&b.1));
        // GroupIter walks the owned prefix back-to-front (dense position `current - 1`
        // first), matching every other reverse iterator in this crate. Lay the
        // ascending-by-key order into dense positions back-to-front too, so the
        // comparator's first element is the first one `iter()` yields.
        let target: Vec<E> = keyed.into_iter().rev().map(|(e, _)| e).collect();

        apply_order(registry, &owned_ids, &target);
    }
}

/// Iterator over a group's current members, most-recently-added first (matching the
/// sparse set's reverse-iteration convention).
pub struct GroupIter<'a, E: Handle, Own: OwnedTuple> {
    registry: &'a Registry<E>,
    owned_ids: &'a [Id],
    entities: &'a [E],
    pos: usize,
    _marker: PhantomData<Own>,
}

impl<'a, E: Handle, Own: OwnedTuple> Iterator for GroupIter<'a, E, Own> {
    type Item = (E, Own::Ref<'a, E>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos == 0 {
            return None;
        }
        self.pos -= 1;
        let e = self.entities[self.pos];
        Some((e, Own::fetch_at(self.registry, self.owned_ids, self.pos)))
    }
}
