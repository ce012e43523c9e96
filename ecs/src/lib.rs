//! A sparse-set-per-component-type entity-component-system store.
//!
//! Entities are versioned handles ([`entity::Handle`]) allocated and recycled by
//! [`entity::Allocator`]. Each component type gets its own [`component::ComponentStorage`]:
//! a [`sparse_set::SparseSet`] of entities paired with a dense array of values. A
//! [`Registry`] owns the entities, the storages, and any [`group::Group`]s defined over
//! them, and is the crate's single entry point for everyday use.
//!
//! Iteration comes in two shapes: [`view`] for ad hoc, unmaintained queries over whatever
//! combination of component types, and [`group`] for queries maintained incrementally as
//! entities change, trading a little bookkeeping on `add`/`remove` for O(1) iteration with
//! no filtering.

// Lets `#[derive(Component)]` emit `::sparse_ecs::component::Component` and have it
// resolve both inside this crate's own tests and from downstream consumers.
extern crate self as sparse_ecs;

pub mod component;
pub mod entity;
pub mod group;
pub mod registry;
pub mod signal;
pub mod sparse_set;
pub mod view;

pub use component::{Component, ComponentStorage};
pub use entity::{Entity, Handle, Large, Medium, Small};
pub use group::Group;
pub use registry::Registry;
pub use signal::{ConnectionId, Signal, Sink};
pub use sparse_set::SparseSet;
pub use view::{MultiView, SingleView};

pub use sparse_ecs_macros::Component;
