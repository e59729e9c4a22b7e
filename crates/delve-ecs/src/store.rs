//! The [`EntityStore`] is the per-level registry of entities and their
//! components. It owns the entity allocator and one table per component type.

use std::any::TypeId;
use std::collections::HashMap;

use tracing::trace;

use crate::component::{Component, ComponentSet, ErasedTable, Table};
use crate::entity::{EntityAllocator, EntityId};
use crate::StoreError;

/// Entity registry with per-type component tables.
///
/// Invariant: a table never holds a row for an entity that is not alive.
/// [`destroy`](Self::destroy) purges every table and
/// [`insert`](Self::insert) rejects dead ids.
#[derive(Default)]
pub struct EntityStore {
    allocator: EntityAllocator,
    tables: HashMap<TypeId, Box<dyn ErasedTable>>,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("entity_count", &self.allocator.alive_count())
            .field("table_count", &self.tables.len())
            .finish()
    }
}

/// Attaches components to a freshly spawned entity.
///
/// The builder holds the store mutably, so the entity stays alive until the
/// builder is dropped and every insert succeeds.
pub struct EntityBuilder<'a> {
    store: &'a mut EntityStore,
    id: EntityId,
}

impl EntityBuilder<'_> {
    pub fn with<T: Component>(self, value: T) -> Self {
        self.store.table_mut_or_create::<T>().rows.insert(self.id, value);
        self
    }

    /// Attach `value` when present.
    pub fn maybe<T: Component>(self, value: Option<T>) -> Self {
        match value {
            Some(v) => self.with(v),
            None => self,
        }
    }

    pub fn id(self) -> EntityId {
        self.id
    }
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Create a fresh entity with no components.
    pub fn create(&mut self) -> EntityId {
        self.allocator.allocate()
    }

    /// Create an entity and attach components to it in one chain.
    ///
    /// ```
    /// use delve_ecs::prelude::*;
    ///
    /// struct Hp(i32);
    /// struct Name(&'static str);
    ///
    /// let mut store = EntityStore::new();
    /// let e = store.spawn().with(Hp(4)).with(Name("rat")).id();
    /// assert!(store.has::<Hp>(e) && store.has::<Name>(e));
    /// ```
    pub fn spawn(&mut self) -> EntityBuilder<'_> {
        let id = self.allocator.allocate();
        EntityBuilder { store: self, id }
    }

    /// Destroy an entity and drop every component attached to it.
    ///
    /// Idempotent: returns `false` for ids that are already dead.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        if !self.allocator.deallocate(id) {
            return false;
        }
        let mut removed = 0usize;
        for table in self.tables.values_mut() {
            if table.remove_row(id) {
                removed += 1;
            }
        }
        trace!(entity = %id, components = removed, "entity destroyed");
        true
    }

    /// Whether `id` refers to a live entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.allocator.is_alive(id)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.allocator.alive_count()
    }

    /// Whether the store has no live entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- component access ---------------------------------------------------

    /// Attach `value` to `id`, returning the previous value of that type.
    pub fn insert<T: Component>(&mut self, id: EntityId, value: T) -> Result<Option<T>, StoreError> {
        if !self.allocator.is_alive(id) {
            return Err(StoreError::DeadEntity { entity: id });
        }
        Ok(self.table_mut_or_create::<T>().rows.insert(id, value))
    }

    /// Shared reference to the `T` component of `id`, if present.
    pub fn get<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.table::<T>()?.rows.get(&id)
    }

    /// Mutable reference to the `T` component of `id`, if present.
    pub fn get_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        self.table_mut::<T>()?.rows.get_mut(&id)
    }

    /// Detach and return the `T` component of `id`.
    pub fn remove<T: Component>(&mut self, id: EntityId) -> Option<T> {
        self.table_mut::<T>()?.rows.remove(&id)
    }

    /// Whether `id` has a `T` component.
    pub fn has<T: Component>(&self, id: EntityId) -> bool {
        self.table::<T>().is_some_and(|t| t.rows.contains_key(&id))
    }

    /// Number of entities with a `T` component.
    pub fn count<T: Component>(&self) -> usize {
        self.table::<T>().map_or(0, |t| t.rows.len())
    }

    /// Iterate `(id, &T)` over every entity with a `T`, in id order.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.table::<T>()
            .into_iter()
            .flat_map(|t| t.rows.iter().map(|(id, v)| (*id, v)))
    }

    // -- queries ------------------------------------------------------------

    /// Every live entity holding all components in `Q`, in ascending id order.
    ///
    /// ```
    /// use delve_ecs::prelude::*;
    ///
    /// struct Hp(i32);
    /// struct Hostile;
    ///
    /// let mut store = EntityStore::new();
    /// let a = store.create();
    /// store.insert(a, Hp(3)).unwrap();
    /// store.insert(a, Hostile).unwrap();
    /// let b = store.create();
    /// store.insert(b, Hp(5)).unwrap();
    ///
    /// assert_eq!(store.query::<(Hp, Hostile)>(), vec![a]);
    /// ```
    pub fn query<Q: ComponentSet>(&self) -> Vec<EntityId> {
        self.query_ids(&Q::type_ids())
    }

    /// Untyped form of [`query`](Self::query).
    ///
    /// The smallest participating table provides the candidates; the rest are
    /// membership filters. A type with no table yields an empty result.
    pub fn query_ids(&self, types: &[TypeId]) -> Vec<EntityId> {
        let mut tables = Vec::with_capacity(types.len());
        for ty in types {
            match self.tables.get(ty) {
                Some(table) => tables.push(&**table),
                None => return Vec::new(),
            }
        }
        let Some((smallest_idx, smallest)) = tables
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| t.len())
        else {
            return Vec::new();
        };
        smallest
            .ids()
            .into_iter()
            .filter(|id| {
                tables
                    .iter()
                    .enumerate()
                    .all(|(i, t)| i == smallest_idx || t.contains(*id))
            })
            .collect()
    }

    /// Names of the component types that currently have a table.
    pub fn table_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tables.values().map(|t| t.type_name()).collect();
        names.sort_unstable();
        names
    }

    // -- internals ----------------------------------------------------------

    fn table<T: Component>(&self) -> Option<&Table<T>> {
        self.tables
            .get(&TypeId::of::<T>())
            .and_then(|t| t.as_any().downcast_ref::<Table<T>>())
    }

    fn table_mut<T: Component>(&mut self) -> Option<&mut Table<T>> {
        self.tables
            .get_mut(&TypeId::of::<T>())
            .and_then(|t| t.as_any_mut().downcast_mut::<Table<T>>())
    }

    fn table_mut_or_create<T: Component>(&mut self) -> &mut Table<T> {
        self.tables
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Table::<T>::new()) as Box<dyn ErasedTable>)
            .as_any_mut()
            .downcast_mut::<Table<T>>()
            .expect("table registered under TypeId::of::<T>() always holds Table<T>")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
