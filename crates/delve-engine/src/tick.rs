//! Fixed-interval tick loop for the shared world.
//!
//! The [`TickLoop`] drives the [`World`] forward. Each tick:
//!
//! 1. Every participant is resolved once, in ascending session id order:
//!    the dead count down towards respawn, the living consume their pending
//!    intent (if any).
//! 2. Every active level (one with at least one living participant) runs the
//!    registered level phases in registration order. The standard phases are
//!    `effects`, `ai`, `upkeep` and `respawn`.
//! 3. Each participant's field of view is recomputed and snapshotted.
//! 4. The tick counter advances and a [`TickReport`] is returned.
//!
//! Nothing in a tick reads the clock or an unseeded random source, so the
//! same seed and the same intents produce the same world. The interval in
//! [`TickConfig`] is only consulted by whoever schedules the ticks.
//!
//! # Example
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
//! let id = tick_loop.world_mut().connect("ada", PlayerClass::Warrior).unwrap();
//!
//! tick_loop.world_mut().enqueue_intent(id, Intent::Wait);
//! let report = tick_loop.tick();
//!
//! assert_eq!(report.intents, 1);
//! assert_eq!(tick_loop.tick_count(), 1);
//! ```

use std::time::{Duration, Instant};

use tracing::trace;

use crate::session::SessionId;
use crate::world::{Interaction, World};

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickConfig {
    /// Wall-clock time between ticks. Must be nonzero.
    pub tick_interval: Duration,
}

impl Default for TickConfig {
    /// Ten ticks per second.
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
        }
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Time spent resolving participants.
    pub participant_time: Duration,
    /// Wall-clock time per level phase, summed over active levels.
    pub phase_times: Vec<(String, Duration)>,
    /// Time spent on field-of-view refresh.
    pub view_time: Duration,
    pub total_time: Duration,
    pub active_levels: usize,
}

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick number just completed (1-based).
    pub tick: u64,
    /// Intents consumed this tick.
    pub intents: usize,
    /// Attacks resolved, by participants and monsters alike.
    pub attacks: usize,
    pub deaths: Vec<SessionId>,
    pub respawns: Vec<SessionId>,
    pub victories: Vec<SessionId>,
    pub interactions: Vec<(SessionId, Interaction)>,
    pub respawn_waves: usize,
}

// ---------------------------------------------------------------------------
// PhaseFn
// ---------------------------------------------------------------------------

/// A level phase: runs once per tick for each active depth.
pub type PhaseFn = fn(&mut World, u32, &mut TickReport);

#[derive(Debug)]
struct RegisteredPhase {
    name: String,
    func: PhaseFn,
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

/// Owns the world and advances it one tick at a time.
pub struct TickLoop {
    world: World,
    phases: Vec<RegisteredPhase>,
    config: TickConfig,
    last_diagnostics: TickDiagnostics,
}

impl TickLoop {
    /// A loop with the standard phases registered.
    ///
    /// # Panics
    ///
    /// Panics if `config.tick_interval` is zero.
    pub fn new(world: World, config: TickConfig) -> Self {
        let mut tick_loop = Self::bare(world, config);
        tick_loop.add_phase("effects", World::phase_effects);
        tick_loop.add_phase("ai", World::phase_ai);
        tick_loop.add_phase("upkeep", World::phase_upkeep);
        tick_loop.add_phase("respawn", World::phase_respawn);
        tick_loop
    }

    /// A loop with no level phases. Participants and views still resolve.
    pub fn bare(world: World, config: TickConfig) -> Self {
        assert!(
            !config.tick_interval.is_zero(),
            "tick_interval must be nonzero"
        );
        Self {
            world,
            phases: Vec::new(),
            config,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    /// Register a level phase to run after those already registered.
    ///
    /// # Panics
    ///
    /// Panics if a phase with the same name is already registered.
    pub fn add_phase(&mut self, name: &str, func: PhaseFn) {
        assert!(
            !self.phases.iter().any(|p| p.name == name),
            "duplicate phase name: {name:?}"
        );
        self.phases.push(RegisteredPhase {
            name: name.to_owned(),
            func,
        });
    }

    /// Execute one tick.
    pub fn tick(&mut self) -> TickReport {
        let tick_start = Instant::now();
        let mut report = TickReport {
            tick: self.world.tick + 1,
            ..TickReport::default()
        };

        // Phase 1: participants.
        let start = Instant::now();
        self.world.resolve_participants(&mut report);
        let participant_time = start.elapsed();

        // Phase 2: level phases over every active depth.
        let depths = self.world.active_depths();
        let mut phase_times: Vec<(String, Duration)> = self
            .phases
            .iter()
            .map(|p| (p.name.clone(), Duration::ZERO))
            .collect();
        for &depth in &depths {
            for (phase, slot) in self.phases.iter().zip(phase_times.iter_mut()) {
                let start = Instant::now();
                (phase.func)(&mut self.world, depth, &mut report);
                slot.1 += start.elapsed();
            }
        }

        // Phase 3: field of view.
        let start = Instant::now();
        self.world.refresh_views();
        let view_time = start.elapsed();

        // Phase 4: advance.
        self.world.tick += 1;
        self.last_diagnostics = TickDiagnostics {
            participant_time,
            phase_times,
            view_time,
            total_time: tick_start.elapsed(),
            active_levels: depths.len(),
        };
        trace!(
            tick = report.tick,
            intents = report.intents,
            levels = depths.len(),
            "tick complete"
        );
        report
    }

    /// Run `count` ticks, returning the last report.
    pub fn run_ticks(&mut self, count: u64) -> TickReport {
        let mut last = TickReport::default();
        for _ in 0..count {
            last = self.tick();
        }
        last
    }

    // -- accessors ----------------------------------------------------------

    pub fn tick_count(&self) -> u64 {
        self.world.tick
    }

    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the world, for intents, connections and setup
    /// between ticks.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn into_world(self) -> World {
        self.world
    }

    /// The names of all registered phases, in execution order.
    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

impl std::fmt::Debug for TickLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickLoop")
            .field("world", &self.world)
            .field("phases", &self.phase_names())
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
