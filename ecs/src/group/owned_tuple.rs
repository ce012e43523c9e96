//! Fetches typed component references from an owning group's member positions.

use crate::component::{Component, Id};
use crate::entity::Handle;
use crate::registry::{Registry, TypeList};

/// The owned side of a group definition: `()` for a non-owning group, a bare component
/// type for a single-owned group, or a tuple of up to four for a multi-owned group.
///
/// Extends [`TypeList`] (so `registry.group::<Own, _, _>()` can resolve `Own` to ids the
/// same way it resolves `Inc`/`Exc`) with the ability to fetch typed references at a
/// dense position once the group's prefix invariant guarantees every owned storage holds
/// the same entity there.
pub trait OwnedTuple: TypeList {
    type Ref<'a, E: Handle>;

    fn fetch_at<'a, E: Handle>(registry: &'a Registry<E>, owned_ids: &[Id], pos: usize) -> Self::Ref<'a, E>;
}

impl OwnedTuple for () {
    type Ref<'a, E: Handle> = ();

    fn fetch_at<'a, E: Handle>(_registry: &'a Registry<E>, _owned_ids: &[Id], _pos: usize) -> Self::Ref<'a, E> {}
}

impl<C: Component> OwnedTuple for C {
    type Ref<'a, E: Handle> = &'a C;

    fn fetch_at<'a, E: Handle>(registry: &'a Registry<E>, owned_ids: &[Id], pos: usize) -> Self::Ref<'a, E> {
        registry.storage_ref::<C>(owned_ids[0]).unwrap().get_at(pos)
    }
}

macro_rules! impl_owned_tuple {
    ($(($t:ident, $idx:tt)),+) => {
        impl<$($t: Component),+> OwnedTuple for ($($t,)+) {
            type Ref<'a, E: Handle> = ($(&'a $t,)+);

            fn fetch_at<'a, E: Handle>(registry: &'a Registry<E>, owned_ids: &[Id], pos: usize) -> Self::Ref<'a, E> {
                ($(registry.storage_ref::<$t>(owned_ids[$idx]).unwrap().get_at(pos),)+)
            }
        }
    };
}

impl_owned_tuple!((A, 0), (B, 1));
impl_owned_tuple!((A, 0), (B, 1), (C, 2));
impl_owned_tuple!((A, 0), (B, 1), (C, 2), (D, 3));
