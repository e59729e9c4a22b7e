//! Component tables and the type-level description of component sets.
//!
//! Each component type gets its own [`Table`], keyed by [`EntityId`] and
//! ordered so iteration is deterministic. The store keeps tables behind the
//! object-safe [`ErasedTable`] trait so it can destroy an entity across every
//! table without knowing their concrete types.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;

use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker for types that can be stored as components.
///
/// Blanket-implemented: any `'static + Send + Sync` type qualifies.
pub trait Component: Any + Send + Sync {}

impl<T: Any + Send + Sync> Component for T {}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Storage for every value of one component type.
#[derive(Debug)]
pub(crate) struct Table<T> {
    pub(crate) rows: BTreeMap<EntityId, T>,
}

impl<T> Table<T> {
    pub(crate) fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

/// Type-erased view of a [`Table`] used for cross-table operations.
pub(crate) trait ErasedTable: Send + Sync {
    /// Drop the row for `id`, if any. Returns whether a row was removed.
    fn remove_row(&mut self, id: EntityId) -> bool;
    fn contains(&self, id: EntityId) -> bool;
    fn len(&self) -> usize;
    fn ids(&self) -> Vec<EntityId>;
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedTable for Table<T> {
    fn remove_row(&mut self, id: EntityId) -> bool {
        self.rows.remove(&id).is_some()
    }

    fn contains(&self, id: EntityId) -> bool {
        self.rows.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn ids(&self) -> Vec<EntityId> {
        self.rows.keys().copied().collect()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// A tuple of component types used to describe a query: `(A,)`, `(A, B)`, ...
pub trait ComponentSet {
    /// The `TypeId` of every member, in declaration order.
    fn type_ids() -> Vec<TypeId>;
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$name>()),+]
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
