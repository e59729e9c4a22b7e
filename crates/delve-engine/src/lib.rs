//! Delve Engine -- the shared-world core of a multiplayer dungeon crawler.
//!
//! This crate builds on [`delve_ecs`] to provide everything a front end needs:
//! procedural levels ([`gen`]), field of view ([`fov`]), the step, combat and
//! AI resolvers, per-participant sessions, and a [`TickLoop`](tick::TickLoop)
//! that advances one [`World`](world::World) shared by every participant.
//! Front ends only enqueue intents, tick, and read back
//! [`Frame`](render::Frame)s.
//!
//! # Quick Start
//!
//! ```
//! use delve_engine::prelude::*;
//!
//! let world = World::new(
//!     WorldConfig::default(),
//!     Box::new(StandardContent),
//!     Box::new(MemoryRunLog::new()),
//! );
//! let mut tick_loop = TickLoop::new(world, TickConfig::default());
//!
//! let id = tick_loop.world_mut().connect("ada", PlayerClass::Cleric).unwrap();
//! tick_loop.world_mut().enqueue_intent(id, "k".parse().unwrap());
//! tick_loop.run_ticks(5);
//!
//! let frame = tick_loop.world().render_snapshot_for(id, 40, 15).unwrap();
//! assert_eq!(frame.hud.max_hp, 32);
//! assert_eq!(frame.tick, 5);
//! ```

#![deny(unsafe_code)]

pub mod action;
pub mod ai;
pub mod combat;
pub mod components;
pub mod content;
pub mod fov;
pub mod gen;
pub mod geom;
pub mod inventory;
pub mod level;
pub mod map;
pub mod render;
pub mod runlog;
pub mod session;
pub mod tick;
pub mod world;

/// Re-export the entity store crate for convenience.
pub use delve_ecs;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for front ends.
pub mod prelude {
    pub use delve_ecs::prelude::*;

    pub use crate::action::Intent;
    pub use crate::content::{Content, PlayerClass, StandardContent};
    pub use crate::geom::{Direction, Point};
    pub use crate::inventory::{EditError, EditOp, EditSummary, InventoryEdit};
    pub use crate::map::TileKind;
    pub use crate::render::{Cell, Frame, Hud};
    pub use crate::runlog::{JsonLinesRunLog, MemoryRunLog, RunLogSink, RunOutcome, RunSummary};
    pub use crate::session::SessionId;
    pub use crate::tick::{TickConfig, TickDiagnostics, TickLoop, TickReport};
    pub use crate::world::{ConnectError, Interaction, World, WorldConfig};
}
