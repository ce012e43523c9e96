//! Maps compile-time lists of component types (a bare type, `()`, or a tuple) onto the
//! registry's runtime [`Id`]s, so `Registry::view`/`Registry::group` can take their
//! include/exclude/owned sets as type parameters instead of runtime value lists.

use crate::component::{Component, Id};
use crate::entity::Handle;
use crate::registry::Registry;

/// A compile-time list of component types, resolved to runtime [`Id`]s.
///
/// Implemented for `()` (the empty list), any single `C: Component`, and tuples of up to
/// six component types.
pub trait TypeList {
    /// Resolve every type in the list to an [`Id`], creating storage for types that have
    /// never been touched. Used by `group()`, which must be able to constrain a storage
    /// even before any entity has received that component.
    fn resolve<E: Handle>(registry: &mut Registry<E>) -> Vec<Id>;

    /// Look up every type in the list without creating storage. A type that has never
    /// been touched resolves to `None` — used by `view()`, which treats an untouched
    /// include type as "definitely no matches" and an untouched exclude type as
    /// "never excludes anything", without forcing storage to exist just to query it.
    fn lookup<E: Handle>(registry: &Registry<E>) -> Vec<Option<Id>>;
}

impl TypeList for () {
    fn resolve<E: Handle>(_registry: &mut Registry<E>) -> Vec<Id> {
        Vec::new()
    }

    fn lookup<E: Handle>(_registry: &Registry<E>) -> Vec<Option<Id>> {
        Vec::new()
    }
}

impl<C: Component> TypeList for C {
    fn resolve<E: Handle>(registry: &mut Registry<E>) -> Vec<Id> {
        vec![registry.assure_id::<C>()]
    }

    fn lookup<E: Handle>(registry: &Registry<E>) -> Vec<Option<Id>> {
        vec![registry.type_id::<C>()]
    }
}

macro_rules! impl_type_list_for_tuple {
    ($($t:ident),+) => {
        impl<$($t: Component),+> TypeList for ($($t,)+) {
            fn resolve<E: Handle>(registry: &mut Registry<E>) -> Vec<Id> {
                vec![$(registry.assure_id::<$t>()),+]
            }

            fn lookup<E: Handle>(registry: &Registry<E>) -> Vec<Option<Id>> {
                vec![$(registry.type_id::<$t>()),+]
            }
        }
    };
}

impl_type_list_for_tuple!(A, B);
impl_type_list_for_tuple!(A, B, C);
impl_type_list_for_tuple!(A, B, C, D);
impl_type_list_for_tuple!(A, B, C, D, E2);
impl_type_list_for_tuple!(A, B, C, D, E2, F);
