//! Component types stored in each level's entity store.
//!
//! Components are plain data. Behaviour lives in the resolvers
//! ([`combat`](crate::combat), [`action`](crate::action), [`ai`](crate::ai)).

use serde::{Deserialize, Serialize};

use crate::geom::Point;
use crate::session::SessionId;

// ---------------------------------------------------------------------------
// Spatial and vital components
// ---------------------------------------------------------------------------

/// Grid position of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position(pub Point);

/// Hit points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub hp: i32,
    pub max_hp: i32,
}

impl Health {
    pub fn full(max_hp: i32) -> Self {
        Self { hp: max_hp, max_hp }
    }

    /// Restore up to `amount` HP, capped at max. Returns the HP actually gained.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.hp = (self.hp + amount.max(0)).min(self.max_hp);
        self.hp - before
    }
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

/// The on-hit special an attacker may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialKind {
    Poison,
    Weaken,
    LifeDrain,
    Stun,
    ArmorBreak,
}

/// On-hit special attack parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialAttack {
    pub kind: SpecialKind,
    /// Percent chance (0-100) to trigger on each hit.
    pub chance_pct: u8,
    /// Per-turn damage for poison, stat delta for weaken/armor-break,
    /// tenths of damage healed for life-drain. Unused by stun.
    pub magnitude: i32,
    /// Turns the attached effect lasts. Unused by life-drain.
    pub duration: u32,
}

/// Base combat statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    pub attack: i32,
    pub defense: i32,
    pub special: Option<SpecialAttack>,
}

// ---------------------------------------------------------------------------
// Timed effects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Poison,
    Weaken,
    Stun,
    ArmorBreak,
    AttackBoost,
    DefenseBoost,
}

impl EffectKind {
    pub fn label(self) -> &'static str {
        match self {
            EffectKind::Poison => "poisoned",
            EffectKind::Weaken => "weakened",
            EffectKind::Stun => "stunned",
            EffectKind::ArmorBreak => "armor broken",
            EffectKind::AttackBoost => "empowered",
            EffectKind::DefenseBoost => "shielded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    pub kind: EffectKind,
    pub magnitude: i32,
    pub remaining: u32,
}

/// Active timed effects on an entity, at most one per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effects(pub Vec<Effect>);

impl Effects {
    pub fn get(&self, kind: EffectKind) -> Option<&Effect> {
        self.0.iter().find(|e| e.kind == kind)
    }

    pub fn has(&self, kind: EffectKind) -> bool {
        self.get(kind).is_some()
    }

    /// Sum of magnitudes of `kind` (zero when absent).
    pub fn magnitude(&self, kind: EffectKind) -> i32 {
        self.0
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.magnitude)
            .sum()
    }

    /// Attach `effect`. An existing effect of the same kind is replaced only
    /// when the new one lasts strictly longer. Returns whether it was applied.
    pub fn apply(&mut self, effect: Effect) -> bool {
        match self.0.iter_mut().find(|e| e.kind == effect.kind) {
            Some(existing) if effect.remaining > existing.remaining => {
                *existing = effect;
                true
            }
            Some(_) => false,
            None => {
                self.0.push(effect);
                true
            }
        }
    }

    pub fn remove(&mut self, kind: EffectKind) -> bool {
        let before = self.0.len();
        self.0.retain(|e| e.kind != kind);
        self.0.len() != before
    }
}

// ---------------------------------------------------------------------------
// AI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiBehavior {
    Stationary,
    Chase,
    Cowardly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ai {
    pub behavior: AiBehavior,
    pub sight_range: i32,
}

// ---------------------------------------------------------------------------
// Items and equipment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Weapon,
    Armor,
    Trinket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentPiece {
    pub name: String,
    pub slot: Slot,
    pub attack_bonus: i32,
    pub defense_bonus: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumableEffect {
    Heal(i32),
    Boost {
        kind: EffectKind,
        magnitude: i32,
        turns: u32,
    },
    /// Removes poison.
    Cure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumable {
    pub name: String,
    pub effect: ConsumableEffect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Consumable(Consumable),
    Equipment(EquipmentPiece),
    Gold(u32),
}

impl ItemKind {
    pub fn name(&self) -> String {
        match self {
            ItemKind::Consumable(c) => c.name.clone(),
            ItemKind::Equipment(e) => e.name.clone(),
            ItemKind::Gold(n) => format!("{n} gold"),
        }
    }
}

/// A carried pack plus purse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<ItemKind>,
    pub capacity: usize,
    pub gold: u32,
}

impl Inventory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity,
            gold: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }
}

/// Worn equipment, one piece per slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub weapon: Option<EquipmentPiece>,
    pub armor: Option<EquipmentPiece>,
    pub trinket: Option<EquipmentPiece>,
}

impl Equipment {
    pub fn slot_mut(&mut self, slot: Slot) -> &mut Option<EquipmentPiece> {
        match slot {
            Slot::Weapon => &mut self.weapon,
            Slot::Armor => &mut self.armor,
            Slot::Trinket => &mut self.trinket,
        }
    }

    pub fn pieces(&self) -> impl Iterator<Item = &EquipmentPiece> {
        [&self.weapon, &self.armor, &self.trinket]
            .into_iter()
            .flatten()
    }

    pub fn attack_bonus(&self) -> i32 {
        self.pieces().map(|p| p.attack_bonus).sum()
    }

    pub fn defense_bonus(&self) -> i32 {
        self.pieces().map(|p| p.defense_bonus).sum()
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Gray,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
}

/// How the renderer draws an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glyph {
    pub ch: char,
    pub color: Color,
}

impl Glyph {
    pub const fn new(ch: char, color: Color) -> Self {
        Self { ch, color }
    }
}

// ---------------------------------------------------------------------------
// Tags and markers
// ---------------------------------------------------------------------------

/// Occupies its tile: nothing else may step onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blocking;

/// Fights participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hostile;

/// The elite of its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elite;

/// A participant's avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerAvatar {
    pub session: SessionId,
}

/// An item lying on the floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item(pub ItemKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NpcRole {
    Healer,
    Merchant,
    Sage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Npc {
    pub role: NpcRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Rare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Furniture {
    pub name: String,
    pub rarity: Rarity,
    pub searched: bool,
}

/// Text written on the floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inscription(pub String);

/// Gold credited to whoever kills the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounty(pub u32);
