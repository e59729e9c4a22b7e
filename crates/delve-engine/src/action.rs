//! Intents and the single-step resolver every move goes through.

use std::str::FromStr;

use delve_ecs::EntityId;
use serde::{Deserialize, Serialize};

use crate::components::{Furniture, Hostile, Npc, PlayerAvatar, Position};
use crate::geom::{Direction, Point};
use crate::level::Level;
use crate::map::TileKind;

/// One discrete action requested by a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Move(Direction),
    Wait,
    Pickup,
    Ascend,
    Descend,
    Ability,
    /// Handled by the front end through an out-of-band edit.
    Inventory,
    Quit,
}

impl FromStr for Intent {
    type Err = String;

    /// Parse one line of player input. Accepts compass words and letters,
    /// vi keys and roguelike symbols.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let intent = match s.trim().to_ascii_lowercase().as_str() {
            "k" | "n" | "north" | "up" => Intent::Move(Direction::North),
            "j" | "s" | "south" | "down" => Intent::Move(Direction::South),
            "l" | "e" | "east" | "right" => Intent::Move(Direction::East),
            "h" | "w" | "west" | "left" => Intent::Move(Direction::West),
            "u" | "ne" | "northeast" => Intent::Move(Direction::NorthEast),
            "y" | "nw" | "northwest" => Intent::Move(Direction::NorthWest),
            "m" | "se" | "southeast" => Intent::Move(Direction::SouthEast),
            "b" | "sw" | "southwest" => Intent::Move(Direction::SouthWest),
            "" | "." | "wait" => Intent::Wait,
            "g" | "," | "pickup" | "get" => Intent::Pickup,
            "<" | "ascend" => Intent::Ascend,
            ">" | "descend" => Intent::Descend,
            "a" | "ability" | "special" => Intent::Ability,
            "i" | "inv" | "inventory" => Intent::Inventory,
            "q" | "quit" => Intent::Quit,
            other => return Err(format!("unknown command '{other}'")),
        };
        Ok(intent)
    }
}

/// Result of one attempted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Moved { from: Point, to: Point },
    /// Nothing moved. A closed door in the way is opened instead.
    Blocked { opened_door: bool },
    /// An NPC or furniture piece is in the way; the caller handles it.
    Interact(EntityId),
    /// A hostile (for participants) or a participant (for monsters) is in the
    /// way; the caller resolves combat.
    Attack(EntityId),
}

/// Resolve one step of `actor` in `dir`.
///
/// Precedence at the destination is NPC, then furniture, then any other
/// blocking entity, then terrain. Participants never attack each other and
/// monsters never attack monsters: such steps are silently blocked.
pub fn resolve_step(level: &mut Level, actor: EntityId, dir: Direction) -> StepOutcome {
    let Some(from) = level.position(actor) else {
        return StepOutcome::Blocked { opened_door: false };
    };
    let to = from.step(dir);
    if !level.map.in_bounds(to) {
        return StepOutcome::Blocked { opened_door: false };
    }

    let actor_is_participant = level.store.has::<PlayerAvatar>(actor);
    let here: Vec<EntityId> = level.entities_at(to).into_iter().filter(|e| *e != actor).collect();

    if let Some(npc) = here.iter().copied().find(|e| level.store.has::<Npc>(*e)) {
        return if actor_is_participant {
            StepOutcome::Interact(npc)
        } else {
            StepOutcome::Blocked { opened_door: false }
        };
    }
    if let Some(piece) = here.iter().copied().find(|e| level.store.has::<Furniture>(*e)) {
        return if actor_is_participant {
            StepOutcome::Interact(piece)
        } else {
            StepOutcome::Blocked { opened_door: false }
        };
    }
    if let Some(target) = level.blocker_at(to) {
        let target_is_participant = level.store.has::<PlayerAvatar>(target);
        let target_is_hostile = level.store.has::<Hostile>(target);
        let hostile_pair = if actor_is_participant {
            target_is_hostile
        } else {
            target_is_participant
        };
        return if hostile_pair {
            StepOutcome::Attack(target)
        } else {
            StepOutcome::Blocked { opened_door: false }
        };
    }

    if level.map.is_walkable(to) {
        if let Some(pos) = level.store.get_mut::<Position>(actor) {
            pos.0 = to;
        }
        return StepOutcome::Moved { from, to };
    }
    if level.map.kind(to) == Some(TileKind::DoorClosed) {
        level.map.open_door(to);
        return StepOutcome::Blocked { opened_door: true };
    }
    StepOutcome::Blocked { opened_door: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AiBehavior, Blocking, Color, Glyph, NpcRole, Rarity};
    use crate::gen::populate::EnemyTemplate;
    use crate::geom::Rect;
    use crate::map::TileMap;

    fn level() -> Level {
        let mut map = TileMap::filled(7, 5, TileKind::Wall);
        for p in Rect::new(1, 1, 5, 3).points() {
            map.set_kind(p, TileKind::Floor);
        }
        Level::from_map(1, map, vec![Rect::new(1, 1, 5, 3)], 0)
    }

    fn rat() -> EnemyTemplate {
        EnemyTemplate {
            name: "rat".into(),
            glyph: Glyph::new('r', Color::Gray),
            threat_cost: 1,
            hp: 4,
            attack: 2,
            defense: 0,
            special: None,
            behavior: AiBehavior::Chase,
            sight_range: 6,
            bounty: 1,
        }
    }

    fn avatar(level: &mut Level, p: Point, session: u64) -> EntityId {
        level
            .store
            .spawn()
            .with(Position(p))
            .with(Blocking)
            .with(PlayerAvatar {
                session: crate::session::SessionId(session),
            })
            .id()
    }

    #[test]
    fn moves_onto_free_floor() {
        let mut lvl = level();
        let me = avatar(&mut lvl, Point::new(1, 1), 1);
        let out = resolve_step(&mut lvl, me, Direction::SouthEast);
        assert_eq!(
            out,
            StepOutcome::Moved {
                from: Point::new(1, 1),
                to: Point::new(2, 2)
            }
        );
        assert_eq!(lvl.position(me), Some(Point::new(2, 2)));
    }

    #[test]
    fn walls_and_edges_block() {
        let mut lvl = level();
        let me = avatar(&mut lvl, Point::new(1, 1), 1);
        assert_eq!(
            resolve_step(&mut lvl, me, Direction::North),
            StepOutcome::Blocked { opened_door: false }
        );
        assert_eq!(lvl.position(me), Some(Point::new(1, 1)));
    }

    #[test]
    fn bumping_a_door_opens_it_without_moving() {
        let mut lvl = level();
        lvl.map.set_kind(Point::new(2, 1), TileKind::DoorClosed);
        let me = avatar(&mut lvl, Point::new(1, 1), 1);
        assert_eq!(
            resolve_step(&mut lvl, me, Direction::East),
            StepOutcome::Blocked { opened_door: true }
        );
        assert_eq!(lvl.position(me), Some(Point::new(1, 1)));
        assert_eq!(lvl.map.kind(Point::new(2, 1)), Some(TileKind::DoorOpen));
        assert!(matches!(resolve_step(&mut lvl, me, Direction::East), StepOutcome::Moved { .. }));
    }

    #[test]
    fn npc_wins_over_hostile_on_the_same_tile() {
        let mut lvl = level();
        let me = avatar(&mut lvl, Point::new(1, 1), 1);
        let target = Point::new(2, 1);
        let t = rat();
        lvl.spawn_monster(&t, target, false);
        let npc = lvl.spawn_npc(NpcRole::Sage, target);
        assert_eq!(resolve_step(&mut lvl, me, Direction::East), StepOutcome::Interact(npc));
    }

    #[test]
    fn furniture_wins_over_hostile() {
        let mut lvl = level();
        let me = avatar(&mut lvl, Point::new(1, 1), 1);
        let target = Point::new(2, 1);
        let t = rat();
        lvl.spawn_monster(&t, target, false);
        let crate_ = lvl
            .store
            .spawn()
            .with(Position(target))
            .with(Blocking)
            .with(Furniture {
                name: "crate".into(),
                rarity: Rarity::Common,
                searched: false,
            })
            .id();
        assert_eq!(resolve_step(&mut lvl, me, Direction::East), StepOutcome::Interact(crate_));
    }

    #[test]
    fn participants_attack_hostiles_and_never_each_other() {
        let mut lvl = level();
        let me = avatar(&mut lvl, Point::new(1, 1), 1);
        let friend = avatar(&mut lvl, Point::new(2, 1), 2);
        assert_eq!(
            resolve_step(&mut lvl, me, Direction::East),
            StepOutcome::Blocked { opened_door: false }
        );
        let t = rat();
        let monster = lvl.spawn_monster(&t, Point::new(1, 2), false);
        assert_eq!(resolve_step(&mut lvl, me, Direction::South), StepOutcome::Attack(monster));
        assert_eq!(resolve_step(&mut lvl, monster, Direction::North), StepOutcome::Attack(me));
        assert_eq!(resolve_step(&mut lvl, monster, Direction::NorthEast), StepOutcome::Attack(friend));

        lvl.spawn_monster(&t, Point::new(2, 2), false);
        assert_eq!(
            resolve_step(&mut lvl, monster, Direction::East),
            StepOutcome::Blocked { opened_door: false }
        );
    }

    #[test]
    fn parses_commands() {
        assert_eq!("k".parse(), Ok(Intent::Move(Direction::North)));
        assert_eq!(" SW ".parse(), Ok(Intent::Move(Direction::SouthWest)));
        assert_eq!(">".parse(), Ok(Intent::Descend));
        assert_eq!("".parse(), Ok(Intent::Wait));
        assert!("dance".parse::<Intent>().is_err());
    }
}
