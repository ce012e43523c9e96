//! Component type identity.
//!
//! A [`Component`] is any plain-data type a consumer attaches to entities. The registry
//! needs a compact, stable identifier for each distinct component type so it can key a
//! heterogeneous map of storages; [`TypeIds`] is that identifier allocator.

mod erased;
pub mod storage;

pub use erased::ErasedStorage;
pub use storage::ComponentStorage;

use std::any::TypeId;
use std::collections::HashMap;

/// Marker trait for types usable as component values.
///
/// At present this only sets the bounds a component must satisfy; `#[derive(Component)]`
/// (from `sparse_ecs_macros`) implements it without any per-field logic.
pub trait Component: 'static {}

/// A compact identifier for a registered component type.
///
/// Distinct from [`std::any::TypeId`]: `Id` is a small, densely-assigned integer suitable
/// for use as a direct index (e.g. into a `Vec` of per-type bookkeeping), whereas
/// `TypeId` is an opaque hash with no such locality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// This id's value as a `Vec` index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Assigns a dense, stable [`Id`] to each distinct component type on first encounter.
///
/// Single-threaded: the registry that owns a `TypeIds` table is itself `!Send`/`!Sync`, so
/// there is no concurrent-registration race to guard against (contrast with a
/// multi-world engine's concurrent, `DashMap`-backed type registry).
#[derive(Debug, Default)]
pub struct TypeIds {
    ids: HashMap<TypeId, Id>,
}

impl TypeIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id for `C`, assigning a new one if this is the first time `C` is seen.
    pub fn assure<C: Component>(&mut self) -> Id {
        let type_id = TypeId::of::<C>();
        let next = Id::new(self.ids.len() as u32);
        *self.ids.entry(type_id).or_insert(next)
    }

    /// The id already assigned to `C`, if any.
    pub fn get<C: Component>(&self) -> Option<Id> {
        self.ids.get(&TypeId::of::<C>()).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    impl Component for Position {}

    struct Velocity;
    impl Component for Velocity {}

    #[test]
    fn assure_is_idempotent_per_type() {
        // Given
        let mut ids = TypeIds::new();

        // When
        let a = ids.assure::<Position>();
        let b = ids.assure::<Position>();

        // Then
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_types_get_distinct_ids() {
        let mut ids = TypeIds::new();

        let pos = ids.assure::<Position>();
        let vel = ids.assure::<Velocity>();

        assert_ne!(pos, vel);
    }

    #[test]
    fn get_before_assure_is_none() {
        let ids = TypeIds::new();
        assert!(ids.get::<Position>().is_none());
    }
}
