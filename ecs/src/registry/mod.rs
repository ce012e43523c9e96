//! The registry: owns entities, their component storages, and the groups defined over
//! them. The crate's single everyday entry point.
//!
//! A `Registry` is `!Send`/`!Sync` by construction (see the `_not_send` marker field):
//! nothing here is internally synchronized, and that is a deliberate simplification
//! rather than an oversight.

mod type_list;

pub use type_list::TypeList;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::component::{Component, ComponentStorage, ErasedStorage, Id, TypeIds};
use crate::entity::{self, Handle};
use crate::group::{self, Group, GroupData, OwnedTuple};
use crate::signal::Sink;
use crate::view::{MultiView, SingleView};

pub struct Registry<E: Handle> {
    allocator: entity::Allocator<E>,
    type_ids: TypeIds,
    storages: Vec<Option<Box<dyn ErasedStorage<E>>>>,
    context: HashMap<TypeId, Box<dyn Any>>,
    pub(crate) groups: Vec<GroupData<E>>,
    _not_send: PhantomData<*mut ()>,
}

impl<E: Handle> Default for Registry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Handle> Registry<E> {
    pub fn new() -> Self {
        Self {
            allocator: entity::Allocator::new(),
            type_ids: TypeIds::new(),
            storages: Vec::new(),
            context: HashMap::new(),
            groups: Vec::new(),
            _not_send: PhantomData,
        }
    }

    /// Create a registry with entity-slot storage pre-reserved for `capacity` entities.
    ///
    /// Component storages are still created lazily on first use; this only avoids
    /// reallocating the handle table itself while the entity count ramps up.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            allocator: entity::Allocator::with_capacity(capacity),
            type_ids: TypeIds::new(),
            storages: Vec::new(),
            context: HashMap::new(),
            groups: Vec::new(),
            _not_send: PhantomData,
        }
    }

    // --- Entity lifecycle -------------------------------------------------------

    /// Allocate a new entity.
    ///
    /// # Errors
    /// Returns [`entity::Error::OutOfActiveHandles`] if every index this
    /// entity profile can represent is in use.
    pub fn create(&mut self) -> Result<E, entity::Error> {
        self.allocator.create()
    }

    /// Whether `e` refers to a currently-live entity.
    #[inline]
    pub fn valid(&self, e: E) -> bool {
        self.allocator.alive(e)
    }

    /// Remove every component `e` has, then free its handle.
    ///
    /// # Errors
    /// Returns [`entity::Error::RemovedInvalidHandle`] if `e` is not alive.
    pub fn destroy(&mut self, e: E) -> Result<(), entity::Error> {
        self.remove_all(e);
        self.allocator.remove(e)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.allocator.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocator.is_empty()
    }

    // --- Component storage access -------------------------------------------------

    /// The id already assigned to `T`, if any component of this type has ever existed.
    pub fn type_id<T: Component>(&self) -> Option<Id> {
        self.type_ids.get::<T>()
    }

    /// Assign (if needed) and return the id for `T`, creating its storage if absent.
    pub(crate) fn assure_id<T: Component>(&mut self) -> Id {
        let id = self.type_ids.assure::<T>();
        if id.index() >= self.storages.len() {
            self.storages.resize_with(id.index() + 1, || None);
        }
        if self.storages[id.index()].is_none() {
            log::trace!("registry: creating storage for component id {}", id.index());
            self.storages[id.index()] = Some(Box::new(ComponentStorage::<E, T>::new()));
        }
        id
    }

    /// The storage for `T`, creating it (empty) if this is the first time `T` is seen.
    pub fn assure<T: Component>(&mut self) -> &mut ComponentStorage<E, T> {
        let id = self.assure_id::<T>();
        self.storage_mut::<T>(id).expect("storage was just assured")
    }

    pub(crate) fn storage_ref<T: Component>(&self, id: Id) -> Option<&ComponentStorage<E, T>> {
        self.storages
            .get(id.index())?
            .as_ref()?
            .as_any()
            .downcast_ref::<ComponentStorage<E, T>>()
    }

    pub(crate) fn storage_mut<T: Component>(&mut self, id: Id) -> Option<&mut ComponentStorage<E, T>> {
        self.storages
            .get_mut(id.index())?
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<ComponentStorage<E, T>>()
    }

    /// Type-erased access to the storage for `id`. Used by the `group` module, which
    /// needs to read/swap dense positions without knowing the owned type at hand.
    pub(crate) fn erased(&self, id: Id) -> &dyn ErasedStorage<E> {
        self.storages[id.index()]
            .as_ref()
            .expect("erased() called with an id that has no storage")
            .as_ref()
    }

    pub(crate) fn erased_mut(&mut self, id: Id) -> &mut dyn ErasedStorage<E> {
        self.storages[id.index()]
            .as_mut()
            .expect("erased_mut() called with an id that has no storage")
            .as_mut()
    }

    // --- Component operations ----------------------------------------------------

    pub fn has<T: Component>(&self, e: E) -> bool {
        match self.type_ids.get::<T>() {
            Some(id) => self
                .storage_ref::<T>(id)
                .is_some_and(|storage| storage.has(e)),
            None => false,
        }
    }

    pub fn get<T: Component>(&self, e: E) -> &T {
        let id = self
            .type_ids
            .get::<T>()
            .expect("get of a component type that has never been added to any entity");
        self.storage_ref::<T>(id)
            .expect("storage missing for a registered component type")
            .get(e)
    }

    pub fn get_mut<T: Component>(&mut self, e: E) -> &mut T {
        let id = self.assure_id::<T>();
        self.storage_mut::<T>(id)
            .expect("storage was just assured")
            .get_mut(e)
    }

    pub fn try_get<T: Component>(&self, e: E) -> Option<&T> {
        let id = self.type_ids.get::<T>()?;
        self.storage_ref::<T>(id)?.try_get(e)
    }

    pub fn try_get_mut<T: Component>(&mut self, e: E) -> Option<&mut T> {
        let id = self.type_ids.get::<T>()?;
        self.storage_mut::<T>(id)?.try_get_mut(e)
    }

    /// Add `value` as `e`'s component of type `T`, notifying any group that owns,
    /// includes, or excludes `T`.
    ///
    /// # Panics
    /// Panics if `e` is not alive, or already has a component of type `T`.
    pub fn add<T: Component>(&mut self, e: E, value: T) -> &mut T {
        assert!(self.valid(e), "added a component to an invalid entity");
        let id = self.assure_id::<T>();
        assert!(
            !self.storage_ref::<T>(id).unwrap().has(e),
            "entity already has this component"
        );
        self.storage_mut::<T>(id).unwrap().add(e, value);
        self.notify_construct(id, e);
        self.storage_mut::<T>(id).unwrap().get_mut(e)
    }

    /// Overwrite `e`'s existing component of type `T`. Does not affect group membership:
    /// an update never changes which groups an entity belongs to.
    ///
    /// # Panics
    /// Panics if `e` does not have a component of type `T`.
    pub fn replace<T: Component>(&mut self, e: E, value: T) -> &mut T {
        assert!(self.valid(e), "replaced a component on an invalid entity");
        let id = self.assure_id::<T>();
        self.storage_mut::<T>(id).unwrap().replace(e, value)
    }

    pub fn add_or_replace<T: Component>(&mut self, e: E, value: T) -> &mut T {
        if self.has::<T>(e) {
            self.replace(e, value)
        } else {
            self.add(e, value)
        }
    }

    pub fn get_or_add<T: Component + Default>(&mut self, e: E) -> &mut T {
        if !self.has::<T>(e) {
            self.add(e, T::default());
        }
        self.get_mut::<T>(e)
    }

    /// Remove `e`'s component of type `T`, notifying any group that owns, includes, or
    /// excludes `T` before the value is actually dropped.
    ///
    /// # Panics
    /// Panics if `e` is not alive, or does not have a component of type `T`.
    pub fn remove<T: Component>(&mut self, e: E) {
        assert!(self.valid(e), "removed a component from an invalid entity");
        assert!(self.has::<T>(e), "removed a component the entity does not have");
        let id = self.assure_id::<T>();
        self.notify_destroy(id, e);
        self.storage_mut::<T>(id).unwrap().remove(e);
    }

    pub fn remove_if_exists<T: Component>(&mut self, e: E) -> bool {
        assert!(self.valid(e));
        if !self.has::<T>(e) {
            return false;
        }
        self.remove::<T>(e);
        true
    }

    /// Remove every component `e` currently has, across every registered type.
    pub fn remove_all(&mut self, e: E) {
        for idx in 0..self.storages.len() {
            self.remove_component_by_index(idx, e);
        }
    }

    fn remove_component_by_index(&mut self, idx: usize, e: E) -> bool {
        let present = self.storages[idx]
            .as_ref()
            .is_some_and(|storage| storage.contains(e));
        if !present {
            return false;
        }
        self.notify_destroy(Id::new(idx as u32), e);
        self.storages[idx].as_mut().unwrap().remove_if_contains(e);
        true
    }

    pub fn on_construct<T: Component>(&mut self) -> Sink<E> {
        self.assure::<T>().on_construct()
    }

    pub fn on_update<T: Component>(&mut self) -> Sink<E> {
        self.assure::<T>().on_update()
    }

    pub fn on_destroy<T: Component>(&mut self) -> Sink<E> {
        self.assure::<T>().on_destroy()
    }

    // --- Context variables --------------------------------------------------------

    pub fn set_context<T: 'static>(&mut self, value: T) {
        self.context.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get_context<T: 'static>(&self) -> Option<&T> {
        self.context.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    pub fn get_context_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.context.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()
    }

    pub fn unset_context<T: 'static>(&mut self) -> Option<T> {
        let boxed = self.context.remove(&TypeId::of::<T>())?;
        Some(*boxed.downcast::<T>().expect("context type tag mismatch"))
    }

    // --- Views ---------------------------------------------------------------------

    /// The fast-path single-type view: a direct reference to `T`'s storage.
    pub fn single_view<T: Component>(&mut self) -> SingleView<'_, E, T> {
        SingleView::new(self.assure::<T>())
    }

    /// A view over entities with every type in `Inc` and none in `Exc`. `Inc`/`Exc` are a
    /// bare component type, `()`, or a tuple of component types.
    ///
    /// # Panics
    /// Panics if `Inc` is `()` — a view needs at least one include type to drive
    /// iteration.
    pub fn view<Inc: TypeList, Exc: TypeList>(&self) -> MultiView<'_, E> {
        let include_lookup = Inc::lookup(self);
        assert!(
            !include_lookup.is_empty(),
            "a view requires at least one include type"
        );
        if include_lookup.iter().any(Option::is_none) {
            return MultiView::empty();
        }
        let include: Vec<Id> = include_lookup.into_iter().map(Option::unwrap).collect();
        let exclude: Vec<Id> = Exc::lookup(self).into_iter().flatten().collect();

        let driver = *include
            .iter()
            .min_by_key(|id| self.storages[id.index()].as_ref().unwrap().len())
            .unwrap();
        let rest: Vec<Id> = include.into_iter().filter(|&id| id != driver).collect();
        let driver_dense = self.storages[driver.index()].as_ref().unwrap().dense();
        MultiView::new(&self.storages, driver_dense, rest, exclude)
    }

    // --- Groups ----------------------------------------------------------------------

    /// Define (or look up, if already defined) the group owning `Own`, including `Inc`,
    /// and excluding `Exc`. `Own` may be `()` for a non-owning group.
    ///
    /// # Panics
    /// Panics if `Own`/`Inc`/`Exc` overlap, or if an owning group is requested that
    /// shares an owned storage with an existing owning group without one's
    /// `owned ∪ included` set being a subset of the other's.
    pub fn group<Own: OwnedTuple, Inc: TypeList, Exc: TypeList>(&mut self) -> Group<E, Own, Inc, Exc> {
        let owned = Own::resolve(self);
        let included = Inc::resolve(self);
        let excluded = Exc::resolve(self);

        if let Some(index) = group::find_existing(&self.groups, &owned, &included, &excluded) {
            return Group::new(index);
        }

        group::assert_disjoint(&owned, &included, &excluded);
        let is_owning = !owned.is_empty();
        if is_owning {
            group::validate_nesting(&self.groups, &owned, &included);
        }

        let mut data = GroupData::new(owned.clone(), included, excluded, is_owning);
        {
            let Self { storages, .. } = self;
            group::backfill(storages, &mut data);
        }
        if is_owning {
            for &id in &owned {
                self.storages[id.index()].as_mut().unwrap().bump_super();
            }
        }

        self.groups.push(data);
        Group::new(self.groups.len() - 1)
    }

    // --- Group maintenance (internal) -----------------------------------------------

    /// Notify every group whose membership predicate touches `id` that `e` just gained a
    /// component of that type.
    fn notify_construct(&mut self, id: Id, e: E) {
        let Self { storages, groups, .. } = self;
        group::notify_construct(storages, groups, id, e);
    }

    /// Notify every group whose membership predicate touches `id` that `e` is about to
    /// lose its component of that type. Must run *before* the component is actually
    /// removed, so owning groups can still read `e`'s position in the owned storage.
    fn notify_destroy(&mut self, id: Id, e: E) {
        let Self { storages, groups, .. } = self;
        group::notify_destroy(storages, groups, id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Medium;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct Position {
        x: i32,
        y: i32,
    }
    impl Component for Position {}

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Velocity(i32);
    impl Component for Velocity {}

    #[test]
    fn with_capacity_starts_empty() {
        let registry = Registry::<Medium>::with_capacity(128);
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn assure_is_idempotent_across_calls() {
        let mut registry = Registry::<Medium>::new();
        let a = registry.assure_id::<Position>();
        let b = registry.assure_id::<Position>();
        assert_eq!(a, b);
    }

    #[test]
    fn add_get_and_remove_round_trip() {
        let mut registry = Registry::<Medium>::new();
        let e = registry.create().unwrap();

        registry.add(e, Position { x: 1, y: 2 });
        assert!(registry.has::<Position>(e));
        assert_eq!(*registry.get::<Position>(e), Position { x: 1, y: 2 });

        registry.remove::<Position>(e);
        assert!(!registry.has::<Position>(e));
    }

    #[test]
    #[should_panic(expected = "invalid entity")]
    fn add_to_dead_entity_panics() {
        let mut registry = Registry::<Medium>::new();
        let e = registry.create().unwrap();
        registry.destroy(e).unwrap();
        registry.add(e, Position::default());
    }

    #[test]
    #[should_panic(expected = "already has")]
    fn add_duplicate_component_panics() {
        let mut registry = Registry::<Medium>::new();
        let e = registry.create().unwrap();
        registry.add(e, Position::default());
        registry.add(e, Position::default());
    }

    #[test]
    fn add_or_replace_never_double_adds() {
        let mut registry = Registry::<Medium>::new();
        let e = registry.create().unwrap();

        registry.add_or_replace(e, Position { x: 1, y: 1 });
        registry.add_or_replace(e, Position { x: 2, y: 2 });

        assert_eq!(*registry.get::<Position>(e), Position { x: 2, y: 2 });
    }

    #[test]
    fn get_or_add_default_initializes_once() {
        let mut registry = Registry::<Medium>::new();
        let e = registry.create().unwrap();

        registry.get_or_add::<Position>(e).x = 7;
        assert_eq!(registry.get_or_add::<Position>(e).x, 7);
    }

    #[test]
    fn destroy_removes_every_component_and_frees_the_handle() {
        let mut registry = Registry::<Medium>::new();
        let e = registry.create().unwrap();
        registry.add(e, Position::default());
        registry.add(e, Velocity(3));

        registry.destroy(e).unwrap();

        assert!(!registry.valid(e));
    }

    #[test]
    fn context_slot_holds_at_most_one_value_per_type() {
        let mut registry = Registry::<Medium>::new();
        registry.set_context(42u32);
        assert_eq!(*registry.get_context::<u32>().unwrap(), 42);

        registry.set_context(99u32);
        assert_eq!(*registry.get_context::<u32>().unwrap(), 99);

        assert_eq!(registry.unset_context::<u32>(), Some(99));
        assert!(registry.get_context::<u32>().is_none());
    }

    #[test]
    fn single_view_reflects_storage_additions() {
        let mut registry = Registry::<Medium>::new();
        let e0 = registry.create().unwrap();
        let e1 = registry.create().unwrap();
        registry.add(e0, Position::default());
        registry.add(e1, Position::default());

        assert_eq!(registry.single_view::<Position>().len(), 2);
    }

    #[test]
    #[should_panic(expected = "at least one include type")]
    fn view_with_no_include_types_panics() {
        let registry = Registry::<Medium>::new();
        let _ = registry.view::<(), ()>();
    }
}
