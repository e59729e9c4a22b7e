//! Per-participant state.

use std::collections::VecDeque;
use std::fmt;

use delve_ecs::EntityId;
use serde::{Deserialize, Serialize};

use crate::action::Intent;
use crate::components::{Color, Effects, Equipment, Health, Inventory};
use crate::content::PlayerClass;
use crate::map::VisibilitySnapshot;

/// Identifies one connected participant. Assigned in connection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Cumulative statistics for the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub deepest_floor: u32,
    pub turns: u64,
    pub kills: u32,
    pub items_used: u32,
    pub damage_dealt: u64,
    pub damage_taken: u64,
    pub gold_earned: u32,
}

/// Avatar state carried by value across level transitions, since the avatar
/// entity itself is destroyed and recreated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarriedState {
    pub health: Health,
    pub inventory: Inventory,
    pub equipment: Equipment,
    pub effects: Effects,
}

/// One participant.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub color: Color,
    pub class: PlayerClass,
    /// `None` only while dead.
    pub avatar: Option<EntityId>,
    pub depth: u32,
    /// Private copy of the level's visibility after this participant's own
    /// field-of-view pass.
    pub view: VisibilitySnapshot,
    pending: Option<Intent>,
    pub stats: RunStats,
    /// Ticks until respawn; zero while alive.
    pub death_countdown: u32,
    pub ability_cooldown: u32,
    pub regen_counter: u32,
    messages: VecDeque<String>,
    message_cap: usize,
}

impl Session {
    pub fn new(id: SessionId, name: String, class: PlayerClass, color: Color, message_cap: usize) -> Self {
        Self {
            id,
            name,
            color,
            class,
            avatar: None,
            depth: 0,
            view: VisibilitySnapshot::default(),
            pending: None,
            stats: RunStats::default(),
            death_countdown: 0,
            ability_cooldown: 0,
            regen_counter: 0,
            messages: VecDeque::new(),
            message_cap: message_cap.max(1),
        }
    }

    /// Store `intent`, replacing anything not yet consumed.
    pub fn set_intent(&mut self, intent: Intent) {
        self.pending = Some(intent);
    }

    pub fn take_intent(&mut self) -> Option<Intent> {
        self.pending.take()
    }

    pub fn pending_intent(&self) -> Option<&Intent> {
        self.pending.as_ref()
    }

    pub fn is_dead(&self) -> bool {
        self.death_countdown > 0
    }

    pub fn push_message(&mut self, msg: impl Into<String>) {
        if self.messages.len() == self.message_cap {
            self.messages.pop_front();
        }
        self.messages.push_back(msg.into());
    }

    /// Up to `n` most recent messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> Vec<String> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    pub fn last_message(&self) -> Option<&str> {
        self.messages.back().map(String::as_str)
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }
}
