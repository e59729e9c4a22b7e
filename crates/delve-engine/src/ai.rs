//! The per-tick pass over autonomous actors.

use delve_ecs::EntityId;
use tracing::trace;

use crate::action::{resolve_step, StepOutcome};
use crate::combat::{self, AttackReport};
use crate::components::{Ai, AiBehavior, EffectKind, Effects, Name, PlayerAvatar, Position};
use crate::geom::{Direction, Point};
use crate::level::Level;
use crate::session::SessionId;

/// Distance within which a cowardly actor lashes out instead of fleeing.
const COWARD_STRIKE_RANGE: f64 = 1.5;

/// One monster hitting one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitReport {
    pub attacker: EntityId,
    pub attacker_name: String,
    pub victim: EntityId,
    pub victim_session: Option<SessionId>,
    pub report: AttackReport,
}

/// Let every autonomous actor on `level` take its turn, in id order.
///
/// Each actor takes at most one step and makes at most one attack.
pub fn run_ai(level: &mut Level) -> Vec<HitReport> {
    let mut hits = Vec::new();
    for actor in level.store.query::<(Ai, Position)>() {
        let stunned = level
            .store
            .get::<Effects>(actor)
            .is_some_and(|fx| fx.has(EffectKind::Stun));
        if stunned {
            trace!(%actor, "stunned, skipping turn");
            continue;
        }
        let Some(ai) = level.store.get::<Ai>(actor).copied() else {
            continue;
        };
        let Some(me) = level.position(actor) else {
            continue;
        };

        let hit = match ai.behavior {
            AiBehavior::Stationary => None,
            AiBehavior::Chase => nearest_participant(level, me, f64::from(ai.sight_range))
                .and_then(|(_, target)| chase(level, actor, me, target)),
            // Striking ignores sight; only fleeing needs a visible threat.
            AiBehavior::Cowardly => match nearest_participant(level, me, COWARD_STRIKE_RANGE) {
                Some((victim, _)) => strike(level, actor, victim),
                None => {
                    if let Some((_, threat)) = nearest_participant(level, me, f64::from(ai.sight_range)) {
                        flee(level, actor, me, threat);
                    }
                    None
                }
            },
        };
        hits.extend(hit);
    }
    hits
}

/// Closest avatar within `range` (Euclidean), ties broken by lowest id.
fn nearest_participant(level: &Level, from: Point, range: f64) -> Option<(EntityId, Point)> {
    level
        .store
        .query::<(PlayerAvatar, Position)>()
        .into_iter()
        .filter_map(|e| level.position(e).map(|p| (e, p)))
        .filter(|(_, p)| p.distance(from) <= range)
        .min_by_key(|(e, p)| (p.distance_sq(from), *e))
}

fn chase(level: &mut Level, actor: EntityId, me: Point, target: Point) -> Option<HitReport> {
    let (dx, dy) = (target.x - me.x, target.y - me.y);
    let (primary, secondary) = if dx.abs() >= dy.abs() {
        (Direction::from_delta(dx, 0), Direction::from_delta(0, dy))
    } else {
        (Direction::from_delta(0, dy), Direction::from_delta(dx, 0))
    };

    for dir in [primary, secondary].into_iter().flatten() {
        match resolve_step(level, actor, dir) {
            StepOutcome::Attack(victim) => return strike(level, actor, victim),
            StepOutcome::Moved { .. } | StepOutcome::Blocked { opened_door: true } => return None,
            StepOutcome::Blocked { opened_door: false } | StepOutcome::Interact(_) => {}
        }
    }
    None
}

fn flee(level: &mut Level, actor: EntityId, me: Point, threat: Point) {
    let (dx, dy) = (me.x - threat.x, me.y - threat.y);
    let candidates = [
        Direction::from_delta(dx, dy),
        Direction::from_delta(dx, 0),
        Direction::from_delta(0, dy),
    ];
    for dir in candidates.into_iter().flatten() {
        match resolve_step(level, actor, dir) {
            StepOutcome::Moved { .. } | StepOutcome::Blocked { opened_door: true } => return,
            // Fleeing never turns into an attack.
            _ => {}
        }
    }
}

fn strike(level: &mut Level, attacker: EntityId, victim: EntityId) -> Option<HitReport> {
    let attacker_name = level
        .store
        .get::<Name>(attacker)
        .map_or_else(|| "something".to_string(), |n| n.0.clone());
    let report = combat::attack(&mut level.store, attacker, victim, &mut level.rng);
    if report.damage == 0 {
        return None;
    }
    Some(HitReport {
        attacker,
        attacker_name,
        victim,
        victim_session: report.defender_session,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Blocking, CombatStats, Color, Effect, Glyph, Health};
    use crate::gen::populate::EnemyTemplate;
    use crate::geom::Rect;
    use crate::map::{TileKind, TileMap};

    fn level() -> Level {
        let mut map = TileMap::filled(12, 12, TileKind::Wall);
        let room = Rect::new(1, 1, 10, 10);
        for p in room.points() {
            map.set_kind(p, TileKind::Floor);
        }
        Level::from_map(1, map, vec![room], 7)
    }

    fn template(behavior: AiBehavior) -> EnemyTemplate {
        EnemyTemplate {
            name: "thing".into(),
            glyph: Glyph::new('t', Color::Red),
            threat_cost: 1,
            hp: 10,
            attack: 3,
            defense: 0,
            special: None,
            behavior,
            sight_range: 6,
            bounty: 0,
        }
    }

    fn avatar(level: &mut Level, p: Point) -> EntityId {
        level
            .store
            .spawn()
            .with(Position(p))
            .with(Blocking)
            .with(Health::full(100))
            .with(CombatStats {
                attack: 1,
                defense: 0,
                special: None,
            })
            .with(PlayerAvatar {
                session: SessionId(1),
            })
            .id()
    }

    #[test]
    fn chaser_steps_along_dominant_axis() {
        let mut lvl = level();
        avatar(&mut lvl, Point::new(8, 4));
        let m = lvl.spawn_monster(&template(AiBehavior::Chase), Point::new(3, 3), false);
        assert!(run_ai(&mut lvl).is_empty());
        assert_eq!(lvl.position(m), Some(Point::new(4, 3)));
    }

    #[test]
    fn chaser_attacks_when_adjacent_and_does_not_move() {
        let mut lvl = level();
        let me = avatar(&mut lvl, Point::new(4, 3));
        let m = lvl.spawn_monster(&template(AiBehavior::Chase), Point::new(3, 3), false);
        let hits = run_ai(&mut lvl);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].victim, me);
        assert_eq!(hits[0].victim_session, Some(SessionId(1)));
        assert_eq!(lvl.position(m), Some(Point::new(3, 3)));
        let hp = lvl.store.get::<Health>(me).unwrap().hp;
        assert_eq!(hp, 100 - hits[0].report.damage);
    }

    #[test]
    fn chaser_tries_other_axis_when_blocked() {
        let mut lvl = level();
        avatar(&mut lvl, Point::new(8, 5));
        lvl.map.set_kind(Point::new(4, 3), TileKind::Wall);
        let m = lvl.spawn_monster(&template(AiBehavior::Chase), Point::new(3, 3), false);
        run_ai(&mut lvl);
        assert_eq!(lvl.position(m), Some(Point::new(3, 4)));
    }

    #[test]
    fn out_of_sight_means_no_action() {
        let mut lvl = level();
        avatar(&mut lvl, Point::new(10, 10));
        let m = lvl.spawn_monster(&template(AiBehavior::Chase), Point::new(1, 1), false);
        run_ai(&mut lvl);
        assert_eq!(lvl.position(m), Some(Point::new(1, 1)));
    }

    #[test]
    fn stationary_never_acts() {
        let mut lvl = level();
        avatar(&mut lvl, Point::new(4, 3));
        let m = lvl.spawn_monster(&template(AiBehavior::Stationary), Point::new(3, 3), false);
        assert!(run_ai(&mut lvl).is_empty());
        assert_eq!(lvl.position(m), Some(Point::new(3, 3)));
    }

    #[test]
    fn coward_flees_then_strikes_when_cornered() {
        let mut lvl = level();
        avatar(&mut lvl, Point::new(5, 5));
        let m = lvl.spawn_monster(&template(AiBehavior::Cowardly), Point::new(7, 5), false);
        assert!(run_ai(&mut lvl).is_empty());
        assert_eq!(lvl.position(m), Some(Point::new(8, 5)));

        let mut lvl = level();
        avatar(&mut lvl, Point::new(5, 5));
        lvl.spawn_monster(&template(AiBehavior::Cowardly), Point::new(6, 6), false);
        assert_eq!(run_ai(&mut lvl).len(), 1);
    }

    #[test]
    fn short_sighted_coward_still_strikes_diagonally() {
        let mut lvl = level();
        let me = avatar(&mut lvl, Point::new(5, 5));
        let blind = EnemyTemplate {
            sight_range: 1,
            ..template(AiBehavior::Cowardly)
        };
        let m = lvl.spawn_monster(&blind, Point::new(6, 6), false);
        let hits = run_ai(&mut lvl);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].victim, me);
        assert_eq!(lvl.position(m), Some(Point::new(6, 6)));
    }

    #[test]
    fn coward_with_no_sight_ignores_distant_participants() {
        let mut lvl = level();
        avatar(&mut lvl, Point::new(5, 5));
        let blind = EnemyTemplate {
            sight_range: 1,
            ..template(AiBehavior::Cowardly)
        };
        let m = lvl.spawn_monster(&blind, Point::new(8, 5), false);
        assert!(run_ai(&mut lvl).is_empty());
        assert_eq!(lvl.position(m), Some(Point::new(8, 5)));
    }

    #[test]
    fn stunned_actors_skip() {
        let mut lvl = level();
        avatar(&mut lvl, Point::new(4, 3));
        let m = lvl.spawn_monster(&template(AiBehavior::Chase), Point::new(3, 3), false);
        combat::apply_effect(
            &mut lvl.store,
            m,
            Effect {
                kind: EffectKind::Stun,
                magnitude: 0,
                remaining: 2,
            },
        );
        assert!(run_ai(&mut lvl).is_empty());
    }
}
