//! Participant-private frames.
//!
//! A [`Frame`] is a plain copy of everything a front end needs to draw one
//! participant's screen. It is built from that participant's own
//! [`VisibilitySnapshot`](crate::map::VisibilitySnapshot), so nobody sees
//! through anybody else's eyes, and it borrows nothing from the world: the
//! server copies it under the lock and formats it after releasing.

use serde::Serialize;

use crate::combat::{effective_attack, effective_defense};
use crate::components::{Blocking, CombatStats, EffectKind, Effects, Glyph, Health, Inventory, Item};
use crate::content::PlayerClass;
use crate::geom::Point;
use crate::map::TileKind;
use crate::session::SessionId;
use crate::world::World;

/// What one screen cell shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cell {
    /// Never seen.
    Unknown,
    /// Seen before, not in view now.
    Remembered(TileKind),
    Visible(TileKind),
    /// An entity standing on a visible tile.
    Actor(Glyph),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hud {
    pub name: String,
    pub class: PlayerClass,
    pub depth: u32,
    pub level_name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    /// Attack from equipment and effects on top of the class base.
    pub attack_bonus: i32,
    pub defense_bonus: i32,
    pub ability: &'static str,
    pub ability_cooldown: u32,
    pub gold: u32,
    pub effects: Vec<(EffectKind, u32)>,
    /// Ticks until respawn; zero while alive.
    pub death_countdown: u32,
    pub turns: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub width: i32,
    pub height: i32,
    /// Map coordinate of the top-left cell.
    pub origin: Point,
    /// Row-major, `width * height` cells.
    pub cells: Vec<Cell>,
    pub hud: Hud,
    /// Most recent messages, oldest first.
    pub messages: Vec<String>,
    pub tick: u64,
}

impl Frame {
    pub fn cell(&self, x: i32, y: i32) -> Option<Cell> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get((y * self.width + x) as usize).copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.width.max(1) as usize)
    }
}

/// Messages shown under the map.
const FRAME_MESSAGES: usize = 5;

/// Offset that centers `focus` in a window of `view` cells over a map of
/// `extent` cells, clamped so the window stays on the map when it fits.
fn window_origin(focus: i32, view: i32, extent: i32) -> i32 {
    if view >= extent {
        return 0;
    }
    (focus - view / 2).clamp(0, extent - view)
}

impl World {
    /// A `view_w` by `view_h` window centered on the participant's avatar.
    ///
    /// Dead participants get a frame centered on the map with an empty HUD
    /// showing their respawn countdown.
    pub fn render_snapshot_for(&self, id: SessionId, view_w: i32, view_h: i32) -> Option<Frame> {
        let session = self.sessions.get(&id)?;
        let level = self.levels.get(session.depth)?;
        let (view_w, view_h) = (view_w.max(1), view_h.max(1));
        let map = &level.map;

        let avatar = session.avatar.filter(|e| level.store.is_alive(*e));
        let focus = avatar
            .and_then(|e| level.position(e))
            .unwrap_or_else(|| map.bounds().center());
        let origin = Point::new(
            window_origin(focus.x, view_w, map.width()),
            window_origin(focus.y, view_h, map.height()),
        );

        let mut cells = Vec::with_capacity((view_w * view_h) as usize);
        for y in 0..view_h {
            for x in 0..view_w {
                let p = Point::new(origin.x + x, origin.y + y);
                let cell = match map.kind(p) {
                    None => Cell::Unknown,
                    Some(kind) if session.view.is_visible(p) => Cell::Visible(kind),
                    Some(kind) if session.view.is_explored(p) => Cell::Remembered(kind),
                    Some(_) => Cell::Unknown,
                };
                cells.push(cell);
            }
        }

        // Blocking actors are drawn last so they end up on top of items.
        let mut actors: Vec<(u8, Point, Glyph)> = level
            .store
            .iter::<Glyph>()
            .filter_map(|(e, glyph)| {
                let p = level.position(e)?;
                let rank = if level.store.has::<Blocking>(e) {
                    0
                } else if level.store.has::<Item>(e) {
                    1
                } else {
                    2
                };
                Some((rank, p, *glyph))
            })
            .filter(|(_, p, _)| session.view.is_visible(*p))
            .collect();
        actors.sort_by_key(|(rank, _, _)| std::cmp::Reverse(*rank));
        for (_, p, glyph) in actors {
            let (x, y) = (p.x - origin.x, p.y - origin.y);
            if x >= 0 && y >= 0 && x < view_w && y < view_h {
                cells[(y * view_w + x) as usize] = Cell::Actor(glyph);
            }
        }

        let profile = self.content.class_profile(session.class);
        let mut hud = Hud {
            name: session.name.clone(),
            class: session.class,
            depth: session.depth,
            level_name: level.name.clone(),
            hp: 0,
            max_hp: profile.max_hp,
            attack: profile.attack,
            defense: profile.defense,
            attack_bonus: 0,
            defense_bonus: 0,
            ability: profile.ability.name(),
            ability_cooldown: session.ability_cooldown,
            gold: 0,
            effects: Vec::new(),
            death_countdown: session.death_countdown,
            turns: session.stats.turns,
        };
        if let Some(e) = avatar {
            let store = &level.store;
            if let Some(hp) = store.get::<Health>(e) {
                hud.hp = hp.hp;
                hud.max_hp = hp.max_hp;
            }
            let base = store.get::<CombatStats>(e).copied();
            hud.attack = effective_attack(store, e);
            hud.defense = effective_defense(store, e);
            hud.attack_bonus = hud.attack - base.map_or(0, |s| s.attack);
            hud.defense_bonus = hud.defense - base.map_or(0, |s| s.defense);
            hud.gold = store.get::<Inventory>(e).map_or(0, |inv| inv.gold);
            hud.effects = store
                .get::<Effects>(e)
                .map(|fx| fx.0.iter().map(|eff| (eff.kind, eff.remaining)).collect())
                .unwrap_or_default();
        }

        Some(Frame {
            width: view_w,
            height: view_h,
            origin,
            cells,
            hud,
            messages: session.recent_messages(FRAME_MESSAGES),
            tick: self.tick,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Npc;
    use crate::content::StandardContent;
    use crate::runlog::MemoryRunLog;
    use crate::world::WorldConfig;

    fn world() -> World {
        World::new(WorldConfig::default(), Box::new(StandardContent), Box::new(MemoryRunLog::new()))
    }

    #[test]
    fn window_clamps_to_the_map() {
        assert_eq!(window_origin(2, 10, 60), 0);
        assert_eq!(window_origin(58, 10, 60), 50);
        assert_eq!(window_origin(30, 10, 60), 25);
        assert_eq!(window_origin(5, 80, 60), 0);
    }

    #[test]
    fn frame_shows_own_avatar_and_full_hud() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let frame = w.render_snapshot_for(id, 21, 11).unwrap();
        assert_eq!(frame.cells.len(), 21 * 11);
        assert_eq!(frame.rows().count(), 11);

        let avatar = w.session(id).unwrap().avatar.unwrap();
        let at = w.level_of(id).unwrap().position(avatar).unwrap();
        let cell = frame.cell(at.x - frame.origin.x, at.y - frame.origin.y);
        assert!(matches!(cell, Some(Cell::Actor(g)) if g.ch == '@'));

        assert_eq!(frame.hud.hp, 40);
        assert_eq!(frame.hud.max_hp, 40);
        // Starting sword and vest.
        assert_eq!(frame.hud.attack_bonus, 1);
        assert_eq!(frame.hud.defense_bonus, 1);
        assert_eq!(frame.hud.depth, 0);
        assert_eq!(frame.messages.last().map(String::as_str), Some("Welcome, ada the warrior."));
    }

    #[test]
    fn unseen_tiles_are_unknown() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Mage).unwrap();
        let level = w.level_of(id).unwrap();
        let frame = w.render_snapshot_for(id, level.map.width(), level.map.height()).unwrap();
        let view = &w.session(id).unwrap().view;
        for y in 0..frame.height {
            for x in 0..frame.width {
                let p = Point::new(x, y);
                if !view.is_explored(p) {
                    assert_eq!(frame.cell(x, y), Some(Cell::Unknown));
                }
            }
        }
    }

    #[test]
    fn views_are_private_per_participant() {
        let mut w = world();
        let a = w.connect("ada", PlayerClass::Warrior).unwrap();
        let b = w.connect("bob", PlayerClass::Warrior).unwrap();
        // Move bob far away on the same map and only refresh his view.
        let e = w.session(b).unwrap().avatar.unwrap();
        let far = Point::new(2, 2);
        w.levels_mut().get_mut(0).unwrap().store.get_mut::<crate::components::Position>(e).unwrap().0 = far;
        w.refresh_views();

        let va = &w.session(a).unwrap().view;
        let vb = &w.session(b).unwrap().view;
        assert!(vb.is_visible(far));
        assert!(!va.is_visible(far));
    }

    #[test]
    fn npcs_render_when_visible() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Cleric).unwrap();
        let level = w.level_of(id).unwrap();
        let frame = w.render_snapshot_for(id, level.map.width(), level.map.height()).unwrap();
        let visible_npcs = level
            .store
            .query::<(Npc,)>()
            .into_iter()
            .filter_map(|e| level.position(e))
            .filter(|p| w.session(id).unwrap().view.is_visible(*p))
            .count();
        let drawn = frame
            .cells
            .iter()
            .filter(|c| matches!(c, Cell::Actor(g) if g.ch != '@'))
            .count();
        assert!(visible_npcs > 0);
        assert!(drawn >= visible_npcs);
    }
}
