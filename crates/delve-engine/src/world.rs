//! The shared world: every participant, every level, and what one tick does
//! to them.
//!
//! [`World`] is driven by [`TickLoop`](crate::tick::TickLoop). Front ends call
//! [`World::connect`], [`World::enqueue_intent`] and
//! [`World::render_snapshot_for`] between ticks; all mutation happens inside
//! the tick.

use std::collections::{BTreeMap, BTreeSet};

use delve_ecs::EntityId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::{resolve_step, Intent, StepOutcome};
use crate::ai::{self, HitReport};
use crate::combat::{self, AttackReport, SpecialOutcome};
use crate::components::{
    CombatStats, Color, Effect, EffectKind, Effects, Equipment, Furniture, Health, Hostile,
    Inscription, Inventory, Item, ItemKind, Npc, NpcRole, Position, Rarity,
};
use crate::content::{Ability, ClassProfile, Content, PlayerClass};
use crate::fov::compute_fov;
use crate::geom::{Direction, Point};
use crate::level::{Level, LevelRegistry};
use crate::map::{TileKind, VisibilitySnapshot};
use crate::runlog::{RunLogSink, RunOutcome, RunSummary};
use crate::session::{CarriedState, RunStats, Session, SessionId};
use crate::tick::TickReport;

/// Avatar colors, assigned round-robin by session id.
const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Blue,
    Color::White,
];

// ---------------------------------------------------------------------------
// Configuration and errors
// ---------------------------------------------------------------------------

/// Tunables of the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Root seed; every level seed is derived from it.
    pub seed: u64,
    /// Field-of-view radius in tiles.
    pub view_radius: i32,
    /// Ticks a dead participant waits before waking in town.
    pub respawn_delay_ticks: u32,
    /// Ticks a cleared level waits before an enemy wave.
    pub enemy_respawn_ticks: u32,
    pub max_sessions: usize,
    pub inventory_capacity: usize,
    /// Ticks per point of natural regeneration. Zero disables it.
    pub regen_interval: u32,
    pub message_log_cap: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            view_radius: 8,
            respawn_delay_ticks: 30,
            enemy_respawn_ticks: 150,
            max_sessions: 16,
            inventory_capacity: 10,
            regen_interval: 20,
            message_log_cap: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("the world is full ({max} participants)")]
    SessionLimit { max: usize },
    #[error("a name is required")]
    EmptyName,
}

/// Something a participant triggered that a front end may want to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Healed,
    /// The merchant's offers should be shown; purchases go through
    /// [`World::commit_inventory`].
    OpenShop,
    Spoke,
    Searched { gold: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    Spawn,
    StairsUp,
    StairsDown,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) content: Box<dyn Content>,
    pub(crate) levels: LevelRegistry,
    pub(crate) sessions: BTreeMap<SessionId, Session>,
    next_session: u64,
    run_log: Box<dyn RunLogSink>,
    /// Ticks completed so far.
    pub(crate) tick: u64,
}

impl World {
    pub fn new(config: WorldConfig, content: Box<dyn Content>, run_log: Box<dyn RunLogSink>) -> Self {
        Self {
            levels: LevelRegistry::new(config.seed),
            config,
            content,
            sessions: BTreeMap::new(),
            next_session: 1,
            run_log,
            tick: 0,
        }
    }

    // -- participants -------------------------------------------------------

    /// Admit a new participant. They appear in town with their class kit.
    pub fn connect(&mut self, name: &str, class: PlayerClass) -> Result<SessionId, ConnectError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConnectError::EmptyName);
        }
        if self.sessions.len() >= self.config.max_sessions {
            return Err(ConnectError::SessionLimit {
                max: self.config.max_sessions,
            });
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;
        let color = PALETTE[(id.0 as usize) % PALETTE.len()];
        let mut session = Session::new(id, name.to_string(), class, color, self.config.message_log_cap);
        session.push_message(format!("Welcome, {name} the {class}."));
        self.sessions.insert(id, session);

        let kit = fresh_kit(&self.content.class_profile(class), self.config.inventory_capacity);
        self.place_avatar(id, 0, kit, Arrival::Spawn);
        self.refresh_views();
        info!(session = %id, name, %class, "participant connected");
        Ok(id)
    }

    /// Remove a participant and their avatar. Returns whether they existed.
    pub fn disconnect(&mut self, id: SessionId) -> bool {
        let Some(session) = self.sessions.remove(&id) else {
            return false;
        };
        if let Some(avatar) = session.avatar {
            if let Some(level) = self.levels.get_mut(session.depth) {
                level.store.destroy(avatar);
            }
        }
        info!(session = %id, name = %session.name, "participant disconnected");
        true
    }

    /// Store `intent` for the next tick, replacing any unconsumed one.
    pub fn enqueue_intent(&mut self, id: SessionId, intent: Intent) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.set_intent(intent);
                true
            }
            None => false,
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn content(&self) -> &dyn Content {
        self.content.as_ref()
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn levels(&self) -> &LevelRegistry {
        &self.levels
    }

    /// Direct level access, for setup and tests.
    pub fn levels_mut(&mut self) -> &mut LevelRegistry {
        &mut self.levels
    }

    /// The level a participant currently stands on.
    pub fn level_of(&self, id: SessionId) -> Option<&Level> {
        self.levels.get(self.sessions.get(&id)?.depth)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Depths with at least one living participant, ascending.
    pub fn active_depths(&self) -> BTreeSet<u32> {
        self.sessions
            .values()
            .filter(|s| s.avatar.is_some())
            .map(|s| s.depth)
            .collect()
    }

    fn avatar_of(&self, id: SessionId) -> Option<(u32, EntityId)> {
        let session = self.sessions.get(&id)?;
        Some((session.depth, session.avatar?))
    }

    fn say(&mut self, id: SessionId, msg: impl Into<String>) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.push_message(msg);
        }
    }

    // -- participant phase --------------------------------------------------

    /// Resolve every participant once, in ascending session id order.
    pub(crate) fn resolve_participants(&mut self, report: &mut TickReport) {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            let Some(session) = self.sessions.get_mut(&id) else {
                continue;
            };
            if session.is_dead() {
                session.take_intent();
                session.death_countdown -= 1;
                if session.death_countdown == 0 {
                    self.respawn(id);
                    report.respawns.push(id);
                }
                continue;
            }
            let Some(intent) = session.take_intent() else {
                continue;
            };
            session.stats.turns += 1;
            report.intents += 1;

            if self.is_stunned(id) {
                self.say(id, "You are stunned and cannot act.");
                continue;
            }
            match intent {
                Intent::Move(dir) => self.step(id, dir, report),
                Intent::Pickup => self.pickup(id),
                Intent::Ascend => self.ascend(id),
                Intent::Descend => self.descend(id),
                Intent::Ability => self.use_ability(id, report),
                // Inventory edits arrive out of band; quitting is the front
                // end's business.
                Intent::Wait | Intent::Inventory | Intent::Quit => {}
            }
        }
    }

    fn is_stunned(&self, id: SessionId) -> bool {
        self.avatar_of(id)
            .and_then(|(depth, avatar)| self.levels.get(depth)?.store.get::<Effects>(avatar))
            .is_some_and(|fx| fx.has(EffectKind::Stun))
    }

    fn step(&mut self, id: SessionId, dir: Direction, report: &mut TickReport) {
        let Some((depth, avatar)) = self.avatar_of(id) else {
            return;
        };
        let Some(level) = self.levels.get_mut(depth) else {
            return;
        };
        let safe = level.safe_zone;
        match resolve_step(level, avatar, dir) {
            StepOutcome::Moved { to, .. } => self.notice_arrival(id, depth, to),
            StepOutcome::Blocked { opened_door: true } => self.say(id, "You open the door."),
            StepOutcome::Blocked { opened_door: false } => {}
            StepOutcome::Interact(target) => self.interact(id, depth, avatar, target, report),
            StepOutcome::Attack(_) if safe => self.say(id, "You cannot fight here."),
            StepOutcome::Attack(target) => self.player_attack(id, depth, avatar, target, report),
        }
    }

    /// Messages for whatever lies on the tile just entered.
    fn notice_arrival(&mut self, id: SessionId, depth: u32, to: Point) {
        let Some(level) = self.levels.get(depth) else {
            return;
        };
        let mut notes = Vec::new();
        for e in level.entities_at(to) {
            if let Some(text) = level.store.get::<Inscription>(e) {
                notes.push(format!("Something is written here: \"{}\"", text.0));
            }
            if let Some(item) = level.store.get::<Item>(e) {
                notes.push(format!("You see {} here.", item.0.name()));
            }
        }
        match level.map.kind(to) {
            Some(TileKind::StairsDown) => notes.push("There is a staircase down here.".to_string()),
            Some(TileKind::StairsUp) => notes.push("There is a staircase up here.".to_string()),
            _ => {}
        }
        for note in notes {
            self.say(id, note);
        }
    }

    fn interact(&mut self, id: SessionId, depth: u32, avatar: EntityId, target: EntityId, report: &mut TickReport) {
        let Some(level) = self.levels.get_mut(depth) else {
            return;
        };

        if let Some(npc) = level.store.get::<Npc>(target).copied() {
            let (interaction, line) = match npc.role {
                NpcRole::Healer => {
                    if let Some(hp) = level.store.get_mut::<Health>(avatar) {
                        hp.hp = hp.max_hp;
                    }
                    if let Some(fx) = level.store.get_mut::<Effects>(avatar) {
                        fx.remove(EffectKind::Poison);
                    }
                    (Interaction::Healed, "The healer tends your wounds. You feel restored.".to_string())
                }
                NpcRole::Merchant => (Interaction::OpenShop, "The merchant spreads out their wares.".to_string()),
                NpcRole::Sage => (
                    Interaction::Spoke,
                    format!("The sage says: \"{}\"", self.content.sage_line(self.tick)),
                ),
            };
            report.interactions.push((id, interaction));
            self.say(id, line);
            return;
        }

        let Some(piece) = level.store.get_mut::<Furniture>(target) else {
            return;
        };
        let name = piece.name.clone();
        if piece.searched {
            self.say(id, format!("You find nothing more in the {name}."));
            return;
        }
        piece.searched = true;
        let gold = match piece.rarity {
            Rarity::Common if level.rng.gen_range(0..100) < 50 => level.rng.gen_range(2..=8),
            Rarity::Common => 0,
            Rarity::Rare => level.rng.gen_range(15..=40),
        };
        report.interactions.push((id, Interaction::Searched { gold }));
        if gold == 0 {
            self.say(id, format!("You search the {name} but find nothing."));
            return;
        }
        credit_gold(level, avatar, gold);
        if let Some(session) = self.sessions.get_mut(&id) {
            session.stats.gold_earned += gold;
            session.push_message(format!("You search the {name} and find {gold} gold."));
        }
    }

    fn pickup(&mut self, id: SessionId) {
        let Some((depth, avatar)) = self.avatar_of(id) else {
            return;
        };
        let Some(level) = self.levels.get_mut(depth) else {
            return;
        };
        let Some(pos) = level.position(avatar) else {
            return;
        };
        let Some(item) = level
            .entities_at(pos)
            .into_iter()
            .find(|e| level.store.has::<Item>(*e))
        else {
            self.say(id, "There is nothing here to pick up.");
            return;
        };
        let Some(kind) = level.store.get::<Item>(item).map(|i| i.0.clone()) else {
            return;
        };

        let message = match kind {
            ItemKind::Gold(n) => {
                credit_gold(level, avatar, n);
                level.store.destroy(item);
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.stats.gold_earned += n;
                }
                format!("You pick up {n} gold.")
            }
            other => {
                let Some(inventory) = level.store.get_mut::<Inventory>(avatar) else {
                    return;
                };
                if inventory.is_full() {
                    "Your pack is full.".to_string()
                } else {
                    let name = other.name();
                    inventory.items.push(other);
                    level.store.destroy(item);
                    format!("You pick up the {name}.")
                }
            }
        };
        self.say(id, message);
    }

    fn descend(&mut self, id: SessionId) {
        let Some((depth, avatar)) = self.avatar_of(id) else {
            return;
        };
        if depth >= self.content.max_depth() {
            self.say(id, "There is nowhere further down.");
            return;
        }
        if self.tile_under(depth, avatar) != Some(TileKind::StairsDown) {
            self.say(id, "There are no stairs down here.");
            return;
        }
        self.change_level(id, depth + 1, Arrival::StairsUp);
    }

    fn ascend(&mut self, id: SessionId) {
        let Some((depth, avatar)) = self.avatar_of(id) else {
            return;
        };
        if depth == 0 {
            self.say(id, "The sky is above you.");
            return;
        }
        if self.tile_under(depth, avatar) != Some(TileKind::StairsUp) {
            self.say(id, "There are no stairs up here.");
            return;
        }
        self.change_level(id, depth - 1, Arrival::StairsDown);
    }

    fn tile_under(&self, depth: u32, e: EntityId) -> Option<TileKind> {
        let level = self.levels.get(depth)?;
        level.map.kind(level.position(e)?)
    }

    fn change_level(&mut self, id: SessionId, to: u32, arrival: Arrival) {
        let Some(carried) = self.take_carried(id) else {
            return;
        };
        self.place_avatar(id, to, carried, arrival);
        let name = self.levels.get(to).map(|l| l.name.clone()).unwrap_or_default();
        let verb = if arrival == Arrival::StairsUp {
            "descend to"
        } else {
            "climb up to"
        };
        self.say(id, format!("You {verb} {name}."));
        debug!(session = %id, depth = to, "level change");
    }

    fn use_ability(&mut self, id: SessionId, report: &mut TickReport) {
        let Some((depth, avatar)) = self.avatar_of(id) else {
            return;
        };
        let Some((class, cooldown)) = self.sessions.get(&id).map(|s| (s.class, s.ability_cooldown)) else {
            return;
        };
        let profile = self.content.class_profile(class);
        let ability = profile.ability;
        if cooldown > 0 {
            self.say(id, format!("{} is not ready ({cooldown} turns).", ability.name()));
            return;
        }
        let Some(level) = self.levels.get_mut(depth) else {
            return;
        };
        if ability.is_offensive() && level.safe_zone {
            self.say(id, "You cannot fight here.");
            return;
        }
        let Some(me) = level.position(avatar) else {
            return;
        };

        match ability {
            Ability::Whirlwind => {
                let targets: Vec<EntityId> = Direction::ALL
                    .into_iter()
                    .filter_map(|d| level.blocker_at(me.step(d)))
                    .filter(|e| level.store.has::<Hostile>(*e))
                    .collect();
                self.say(id, "You spin in a whirlwind of steel!");
                for target in targets {
                    if !self.still_fielded(id, avatar) {
                        break;
                    }
                    self.player_attack(id, depth, avatar, target, report);
                }
            }
            Ability::FrostNova {
                radius,
                damage,
                stun_turns,
            } => {
                let targets: Vec<EntityId> = level
                    .store
                    .query::<(Hostile, Position)>()
                    .into_iter()
                    .filter(|e| level.position(*e).is_some_and(|p| p.distance_sq(me) <= radius * radius))
                    .collect();
                self.say(id, "A ring of frost bursts from you!");
                for target in targets {
                    // A victory mid-blast sends the caster home; the rest stay untouched.
                    if !self.still_fielded(id, avatar) {
                        break;
                    }
                    let Some(level) = self.levels.get_mut(depth) else {
                        break;
                    };
                    let hit = combat::apply_damage(&mut level.store, target, damage);
                    if !hit.killed {
                        combat::apply_effect(
                            &mut level.store,
                            target,
                            Effect {
                                kind: EffectKind::Stun,
                                magnitude: 0,
                                remaining: stun_turns,
                            },
                        );
                    }
                    report.attacks += 1;
                    self.after_player_hit(id, depth, avatar, hit, report);
                }
            }
            Ability::Mend { percent } => {
                let healed = level.store.get_mut::<Health>(avatar).map_or(0, |hp| {
                    let amount = (hp.max_hp * percent / 100).max(1);
                    hp.heal(amount)
                });
                self.say(id, format!("You mend your wounds (+{healed} HP)."));
            }
        }

        if let Some(session) = self.sessions.get_mut(&id) {
            session.ability_cooldown = profile.ability_cooldown;
        }
    }

    /// Whether `avatar` is still the body `id` plays through.
    fn still_fielded(&self, id: SessionId, avatar: EntityId) -> bool {
        self.sessions.get(&id).and_then(|s| s.avatar) == Some(avatar)
    }

    fn player_attack(&mut self, id: SessionId, depth: u32, avatar: EntityId, target: EntityId, report: &mut TickReport) {
        let Some(level) = self.levels.get_mut(depth) else {
            return;
        };
        let hit = combat::attack(&mut level.store, avatar, target, &mut level.rng);
        report.attacks += 1;
        self.after_player_hit(id, depth, avatar, hit, report);
    }

    /// Messages, statistics, bounty and victory for a participant's hit.
    fn after_player_hit(&mut self, id: SessionId, depth: u32, avatar: EntityId, hit: AttackReport, report: &mut TickReport) {
        if hit.damage == 0 {
            return;
        }
        let name = &hit.defender_name;
        let mut lines = vec![if hit.killed {
            format!("You kill the {name}!")
        } else {
            format!("You hit the {name} for {}.", hit.damage)
        }];
        match hit.special {
            Some(SpecialOutcome::Afflicted { effect, applied: true }) => {
                lines.push(format!("The {name} is {}.", effect.label()));
            }
            Some(SpecialOutcome::Drained { healed }) if healed > 0 => {
                lines.push(format!("You drain {healed} HP."));
            }
            _ => {}
        }
        if hit.killed && hit.bounty > 0 {
            if let Some(level) = self.levels.get_mut(depth) {
                credit_gold(level, avatar, hit.bounty);
            }
            lines.push(format!("You collect {} gold.", hit.bounty));
        }

        if let Some(session) = self.sessions.get_mut(&id) {
            session.stats.damage_dealt += u64::try_from(hit.damage).unwrap_or(0);
            if hit.killed {
                session.stats.kills += 1;
                session.stats.gold_earned += hit.bounty;
            }
            for line in lines {
                session.push_message(line);
            }
        }

        if hit.killed && hit.defender_was_elite && depth == self.content.max_depth() {
            self.victory(id, report);
        }
    }

    // -- level phases -------------------------------------------------------

    /// Decay timed effects. Poison only hurts outside safe zones.
    pub(crate) fn phase_effects(&mut self, depth: u32, report: &mut TickReport) {
        let Some(level) = self.levels.get_mut(depth) else {
            return;
        };
        let ticks = combat::decay_effects(&mut level.store, !level.safe_zone);
        for tick in ticks {
            let Some(id) = tick.session else {
                continue;
            };
            if let Some(session) = self.sessions.get_mut(&id) {
                if tick.poison_damage > 0 {
                    session.stats.damage_taken += u64::try_from(tick.poison_damage).unwrap_or(0);
                    session.push_message(format!("Poison burns you for {}.", tick.poison_damage));
                }
                if !tick.killed {
                    for kind in &tick.expired {
                        session.push_message(format!("You are no longer {}.", kind.label()));
                    }
                }
            }
            if tick.killed {
                self.handle_death(id, depth, "poison".to_string(), report);
            }
        }
    }

    pub(crate) fn phase_ai(&mut self, depth: u32, report: &mut TickReport) {
        let Some(level) = self.levels.get_mut(depth) else {
            return;
        };
        if level.safe_zone {
            return;
        }
        let hits = ai::run_ai(level);
        report.attacks += hits.len();
        for hit in hits {
            self.absorb_hit(depth, hit, report);
        }
    }

    fn absorb_hit(&mut self, depth: u32, hit: HitReport, report: &mut TickReport) {
        let Some(id) = hit.victim_session else {
            return;
        };
        let attacker = &hit.attacker_name;
        if let Some(session) = self.sessions.get_mut(&id) {
            session.stats.damage_taken += u64::try_from(hit.report.damage).unwrap_or(0);
            session.push_message(format!("The {attacker} hits you for {}.", hit.report.damage));
            match hit.report.special {
                Some(SpecialOutcome::Afflicted { effect, applied: true }) if !hit.report.killed => {
                    session.push_message(format!("You are {}!", effect.label()));
                }
                Some(SpecialOutcome::Drained { .. }) => {
                    session.push_message(format!("The {attacker} drains your life."));
                }
                _ => {}
            }
        }
        if hit.report.killed {
            self.handle_death(id, depth, attacker.clone(), report);
        }
    }

    /// Cooldowns tick down and participants regenerate.
    pub(crate) fn phase_upkeep(&mut self, depth: u32, _report: &mut TickReport) {
        let interval = self.config.regen_interval;
        let Some(level) = self.levels.get_mut(depth) else {
            return;
        };
        for session in self.sessions.values_mut().filter(|s| s.depth == depth) {
            let Some(avatar) = session.avatar else {
                continue;
            };
            session.ability_cooldown = session.ability_cooldown.saturating_sub(1);
            if interval == 0 {
                continue;
            }
            session.regen_counter += 1;
            if session.regen_counter >= interval {
                session.regen_counter = 0;
                if let Some(hp) = level.store.get_mut::<Health>(avatar) {
                    hp.heal(1);
                }
            }
        }
    }

    pub(crate) fn phase_respawn(&mut self, depth: u32, report: &mut TickReport) {
        let delay = self.config.enemy_respawn_ticks;
        let views: Vec<&VisibilitySnapshot> = self
            .sessions
            .values()
            .filter(|s| s.depth == depth && s.avatar.is_some())
            .map(|s| &s.view)
            .collect();
        let Some(level) = self.levels.get_mut(depth) else {
            return;
        };
        if let Some(spawned) = level.advance_respawn(!views.is_empty(), delay, &views) {
            report.respawn_waves += 1;
            debug!(depth, spawned, "respawn wave reported");
        }
    }

    /// Recompute every living participant's field of view and keep a private
    /// copy of the result.
    pub(crate) fn refresh_views(&mut self) {
        let radius = self.config.view_radius;
        for session in self.sessions.values_mut() {
            let Some(avatar) = session.avatar else {
                continue;
            };
            let Some(level) = self.levels.get_mut(session.depth) else {
                continue;
            };
            let Some(origin) = level.position(avatar) else {
                continue;
            };
            compute_fov(&mut level.map, origin, radius);
            session.view = level.map.visibility_snapshot();
        }
    }

    // -- life and death -----------------------------------------------------

    fn handle_death(&mut self, id: SessionId, depth: u32, cause: String, report: &mut TickReport) {
        let delay = self.config.respawn_delay_ticks.max(1);
        let tick = self.tick;
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if session.is_dead() {
            return;
        }
        // The resolver already destroyed the avatar entity.
        session.avatar = None;
        session.death_countdown = delay;
        session.push_message(format!("You die, killed by {cause}."));
        session.push_message(format!("You will wake in town in {delay} turns."));
        let summary = RunSummary::new(
            &session.name,
            session.class,
            RunOutcome::Death {
                cause: cause.clone(),
                depth,
            },
            &session.stats,
            tick,
        );
        info!(session = %id, depth, %cause, "participant died");
        report.deaths.push(id);
        self.emit(summary);
    }

    fn victory(&mut self, id: SessionId, report: &mut TickReport) {
        let tick = self.tick;
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let summary = RunSummary::new(&session.name, session.class, RunOutcome::Victory, &session.stats, tick);
        session.stats = RunStats::default();
        session.push_message("You have conquered the delve!");
        session.push_message("You are carried back to the surface.");
        info!(session = %id, "participant won");
        report.victories.push(id);
        self.emit(summary);

        if let Some(carried) = self.take_carried(id) {
            self.place_avatar(id, 0, carried, Arrival::Spawn);
        }
    }

    fn respawn(&mut self, id: SessionId) {
        let capacity = self.config.inventory_capacity;
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let kit = fresh_kit(&self.content.class_profile(session.class), capacity);
        session.stats = RunStats::default();
        session.death_countdown = 0;
        session.ability_cooldown = 0;
        session.regen_counter = 0;
        session.push_message("You wake in town, whole again.");
        self.place_avatar(id, 0, kit, Arrival::Spawn);
        info!(session = %id, "participant respawned");
    }

    fn emit(&mut self, summary: RunSummary) {
        if let Err(err) = self.run_log.record(&summary) {
            warn!(error = %err, name = %summary.name, "run summary discarded");
        }
    }

    /// Strip a participant's avatar down to what travels with them and
    /// destroy the entity.
    fn take_carried(&mut self, id: SessionId) -> Option<CarriedState> {
        let (depth, avatar) = self.avatar_of(id)?;
        let level = self.levels.get_mut(depth)?;
        let carried = CarriedState {
            health: level.store.remove::<Health>(avatar)?,
            inventory: level.store.remove::<Inventory>(avatar).unwrap_or_default(),
            equipment: level.store.remove::<Equipment>(avatar).unwrap_or_default(),
            effects: level.store.remove::<Effects>(avatar).unwrap_or_default(),
        };
        level.store.destroy(avatar);
        if let Some(session) = self.sessions.get_mut(&id) {
            session.avatar = None;
        }
        Some(carried)
    }

    fn place_avatar(&mut self, id: SessionId, depth: u32, carried: CarriedState, arrival: Arrival) {
        let Some(session) = self.sessions.get(&id) else {
            return;
        };
        let (name, color, class) = (session.name.clone(), session.color, session.class);
        let profile = self.content.class_profile(class);
        let level = self.levels.get_or_create(depth, self.content.as_ref());
        let target = match arrival {
            Arrival::Spawn => level.spawn,
            Arrival::StairsUp => level.stairs_up.unwrap_or(level.spawn),
            Arrival::StairsDown => level.stairs_down.unwrap_or(level.spawn),
        };
        let pos = level.free_tile_near(target);
        let stats = CombatStats {
            attack: profile.attack,
            defense: profile.defense,
            special: None,
        };
        let avatar = level.spawn_avatar(id, &name, color, stats, carried, pos);
        if let Some(session) = self.sessions.get_mut(&id) {
            session.avatar = Some(avatar);
            session.depth = depth;
            session.stats.deepest_floor = session.stats.deepest_floor.max(depth);
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("levels", &self.levels.depths())
            .field("sessions", &self.sessions.len())
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

/// Full health, the class's starting items and gear, no effects.
pub(crate) fn fresh_kit(profile: &ClassProfile, capacity: usize) -> CarriedState {
    let mut inventory = Inventory::with_capacity(capacity);
    inventory.items = profile.starting_items.iter().take(capacity).cloned().collect();
    CarriedState {
        health: Health::full(profile.max_hp),
        inventory,
        equipment: profile.starting_equipment.clone(),
        effects: Effects::default(),
    }
}

fn credit_gold(level: &mut Level, avatar: EntityId, amount: u32) {
    if let Some(inventory) = level.store.get_mut::<Inventory>(avatar) {
        inventory.gold += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::StandardContent;
    use crate::runlog::MemoryRunLog;

    fn world_with(config: WorldConfig) -> (World, MemoryRunLog) {
        let log = MemoryRunLog::new();
        let world = World::new(config, Box::new(StandardContent), Box::new(log.clone()));
        (world, log)
    }

    fn world() -> World {
        world_with(WorldConfig::default()).0
    }

    fn act(world: &mut World, id: SessionId, intent: Intent) -> TickReport {
        let mut report = TickReport::default();
        world.enqueue_intent(id, intent);
        world.resolve_participants(&mut report);
        report
    }

    fn avatar(world: &World, id: SessionId) -> EntityId {
        world.session(id).and_then(|s| s.avatar).expect("alive")
    }

    fn teleport(world: &mut World, id: SessionId, p: Point) {
        let (depth, e) = world.avatar_of(id).expect("alive");
        world.levels.get_mut(depth).unwrap().store.get_mut::<Position>(e).unwrap().0 = p;
    }

    fn health(world: &World, id: SessionId) -> Health {
        let (depth, e) = world.avatar_of(id).expect("alive");
        *world.levels.get(depth).unwrap().store.get::<Health>(e).unwrap()
    }

    fn descend_from_town(world: &mut World, id: SessionId) {
        let stairs = world.levels.get(0).unwrap().stairs_down.unwrap();
        teleport(world, id, stairs);
        act(world, id, Intent::Descend);
        assert_eq!(world.session(id).unwrap().depth, 1);
    }

    #[test]
    fn connect_spawns_in_town_at_full_health() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let session = w.session(id).unwrap();
        assert_eq!(session.depth, 0);
        assert_eq!(health(&w, id), Health::full(40));
        assert!(session.view.visible_count() > 0);
        assert!(w.levels.get(0).unwrap().safe_zone);
    }

    #[test]
    fn connect_rejects_blank_names_and_full_worlds() {
        let (mut w, _) = world_with(WorldConfig {
            max_sessions: 1,
            ..WorldConfig::default()
        });
        assert_eq!(w.connect("   ", PlayerClass::Mage), Err(ConnectError::EmptyName));
        w.connect("ada", PlayerClass::Mage).unwrap();
        assert_eq!(
            w.connect("bob", PlayerClass::Mage),
            Err(ConnectError::SessionLimit { max: 1 })
        );
    }

    #[test]
    fn disconnect_removes_the_avatar() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Cleric).unwrap();
        let e = avatar(&w, id);
        assert!(w.disconnect(id));
        assert!(!w.levels.get(0).unwrap().store.is_alive(e));
        assert!(!w.disconnect(id));
        assert!(!w.enqueue_intent(id, Intent::Wait));
    }

    #[test]
    fn stairs_messages() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        act(&mut w, id, Intent::Ascend);
        assert_eq!(w.session(id).unwrap().last_message(), Some("The sky is above you."));
        act(&mut w, id, Intent::Descend);
        assert_eq!(w.session(id).unwrap().last_message(), Some("There are no stairs down here."));
    }

    #[test]
    fn descending_carries_state_and_arrives_on_stairs_up() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let before = avatar(&w, id);
        descend_from_town(&mut w, id);

        assert!(!w.levels.get(0).unwrap().store.is_alive(before));
        let level = w.levels.get(1).unwrap();
        let e = avatar(&w, id);
        let pos = level.position(e).unwrap();
        let up = level.stairs_up.unwrap();
        assert!(pos.distance_sq(up) <= 8, "arrived at {pos:?}, stairs at {up:?}");
        assert_eq!(health(&w, id), Health::full(40));
        assert_eq!(w.session(id).unwrap().stats.deepest_floor, 1);
    }

    #[test]
    fn town_npcs_heal_trade_and_talk() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let npcs: Vec<(NpcRole, Point)> = {
            let town = w.levels.get(0).unwrap();
            town.store
                .query::<(Npc, Position)>()
                .into_iter()
                .map(|e| (town.store.get::<Npc>(e).unwrap().role, town.position(e).unwrap()))
                .collect()
        };
        assert_eq!(npcs.len(), 3);

        let (depth, e) = w.avatar_of(id).unwrap();
        w.levels.get_mut(depth).unwrap().store.get_mut::<Health>(e).unwrap().hp = 5;

        for (role, p) in npcs {
            teleport(&mut w, id, Point::new(p.x + 1, p.y));
            let report = act(&mut w, id, Intent::Move(Direction::West));
            let expected = match role {
                NpcRole::Healer => Interaction::Healed,
                NpcRole::Merchant => Interaction::OpenShop,
                NpcRole::Sage => Interaction::Spoke,
            };
            assert_eq!(report.interactions, vec![(id, expected)]);
        }
        assert_eq!(health(&w, id).hp, 40);
    }

    #[test]
    fn fighting_is_refused_in_town() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        act(&mut w, id, Intent::Ability);
        assert_eq!(w.session(id).unwrap().last_message(), Some("You cannot fight here."));
        assert_eq!(w.session(id).unwrap().ability_cooldown, 0);
    }

    #[test]
    fn mend_heals_and_goes_on_cooldown() {
        let mut w = world();
        let id = w.connect("cy", PlayerClass::Cleric).unwrap();
        let (depth, e) = w.avatar_of(id).unwrap();
        w.levels.get_mut(depth).unwrap().store.get_mut::<Health>(e).unwrap().hp = 10;

        act(&mut w, id, Intent::Ability);
        assert_eq!(health(&w, id).hp, 10 + 32 * 40 / 100);
        assert_eq!(w.session(id).unwrap().ability_cooldown, 20);

        act(&mut w, id, Intent::Ability);
        assert_eq!(w.session(id).unwrap().last_message(), Some("Mend is not ready (20 turns)."));
    }

    #[test]
    fn picking_up_gold_fills_the_purse() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let (depth, e) = w.avatar_of(id).unwrap();
        let level = w.levels.get_mut(depth).unwrap();
        let here = level.position(e).unwrap();
        level.spawn_item(ItemKind::Gold(12), here);

        act(&mut w, id, Intent::Pickup);
        let inv = w.levels.get(0).unwrap().store.get::<Inventory>(e).unwrap().clone();
        assert_eq!(inv.gold, 12);
        assert_eq!(w.session(id).unwrap().stats.gold_earned, 12);
        act(&mut w, id, Intent::Pickup);
        assert_eq!(w.session(id).unwrap().last_message(), Some("There is nothing here to pick up."));
    }

    #[test]
    fn full_pack_leaves_item_on_the_floor() {
        let (mut w, _) = world_with(WorldConfig {
            inventory_capacity: 1,
            ..WorldConfig::default()
        });
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let (depth, e) = w.avatar_of(id).unwrap();
        let level = w.levels.get_mut(depth).unwrap();
        let here = level.position(e).unwrap();
        let piece = crate::components::EquipmentPiece {
            name: "buckler".into(),
            slot: crate::components::Slot::Armor,
            attack_bonus: 0,
            defense_bonus: 1,
        };
        let item = level.spawn_item(ItemKind::Equipment(piece), here);

        act(&mut w, id, Intent::Pickup);
        assert_eq!(w.session(id).unwrap().last_message(), Some("Your pack is full."));
        assert!(w.levels.get(0).unwrap().store.is_alive(item));
    }

    #[test]
    fn death_logs_a_run_and_respawns_in_town() {
        let (mut w, log) = world_with(WorldConfig {
            respawn_delay_ticks: 2,
            ..WorldConfig::default()
        });
        let id = w.connect("ada", PlayerClass::Mage).unwrap();
        descend_from_town(&mut w, id);
        let (depth, e) = w.avatar_of(id).unwrap();
        let store = &mut w.levels.get_mut(depth).unwrap().store;
        store.get_mut::<Health>(e).unwrap().hp = 2;
        combat::apply_effect(
            store,
            e,
            Effect {
                kind: EffectKind::Poison,
                magnitude: 5,
                remaining: 3,
            },
        );

        let mut report = TickReport::default();
        w.phase_effects(1, &mut report);
        assert_eq!(report.deaths, vec![id]);
        assert!(w.session(id).unwrap().is_dead());
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].outcome,
            RunOutcome::Death {
                cause: "poison".into(),
                depth: 1
            }
        );
        assert_eq!(records[0].deepest_floor, 1);

        let mut report = TickReport::default();
        w.resolve_participants(&mut report);
        assert!(report.respawns.is_empty());
        w.resolve_participants(&mut report);
        assert_eq!(report.respawns, vec![id]);
        let session = w.session(id).unwrap();
        assert_eq!(session.depth, 0);
        assert_eq!(session.stats, RunStats::default());
        assert_eq!(health(&w, id), Health::full(26));
    }

    #[test]
    fn regeneration_follows_the_interval() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let (depth, e) = w.avatar_of(id).unwrap();
        w.levels.get_mut(depth).unwrap().store.get_mut::<Health>(e).unwrap().hp = 30;
        let mut report = TickReport::default();
        for _ in 0..19 {
            w.phase_upkeep(0, &mut report);
        }
        assert_eq!(health(&w, id).hp, 30);
        w.phase_upkeep(0, &mut report);
        assert_eq!(health(&w, id).hp, 31);
    }

    #[test]
    fn sink_failures_do_not_stop_the_world() {
        struct Broken;
        impl RunLogSink for Broken {
            fn record(&mut self, _: &RunSummary) -> Result<(), crate::runlog::RunLogError> {
                Err(std::io::Error::other("disk gone").into())
            }
        }
        let mut w = World::new(WorldConfig::default(), Box::new(StandardContent), Box::new(Broken));
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let mut report = TickReport::default();
        w.handle_death(id, 0, "testing".into(), &mut report);
        assert!(w.session(id).unwrap().is_dead());
    }
}
