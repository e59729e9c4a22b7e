//! Delve ECS -- the entity store shared by every dungeon level.
//!
//! Entities are generational integer handles; components live in one ordered
//! table per Rust type. There are no archetypes and no schemas: the store only
//! has to support one simulation, so it keeps to create/destroy, typed
//! component access, and multi-type queries that scan the smallest table.
//!
//! # Quick Start
//!
//! ```
//! use delve_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: i32, y: i32 }
//!
//! let mut store = EntityStore::new();
//! let entity = store.create();
//! store.insert(entity, Position { x: 3, y: 4 }).unwrap();
//!
//! assert_eq!(store.get::<Position>(entity), Some(&Position { x: 3, y: 4 }));
//! store.destroy(entity);
//! assert_eq!(store.get::<Position>(entity), None);
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod store;

pub use component::{Component, ComponentSet};
pub use entity::EntityId;
pub use store::{EntityBuilder, EntityStore};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by entity store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The entity does not exist (destroyed, stale generation or never allocated).
    #[error("entity {entity:?} does not exist (destroyed or never allocated)")]
    DeadEntity {
        entity: entity::EntityId,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentSet};
    pub use crate::entity::EntityId;
    pub use crate::store::{EntityBuilder, EntityStore};
    pub use crate::StoreError;
}
