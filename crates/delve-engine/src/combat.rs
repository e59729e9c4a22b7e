//! Damage, on-hit specials and timed effects.

use delve_ecs::{EntityId, EntityStore};
use rand::Rng;
use tracing::trace;

use crate::components::{
    Bounty, CombatStats, Effect, EffectKind, Effects, Elite, Equipment, Health, Name, PlayerAvatar,
    SpecialKind,
};
use crate::session::SessionId;

/// Base attack plus equipment and effect modifiers. Zero without stats.
pub fn effective_attack(store: &EntityStore, e: EntityId) -> i32 {
    let Some(stats) = store.get::<CombatStats>(e) else {
        return 0;
    };
    let gear = store.get::<Equipment>(e).map_or(0, Equipment::attack_bonus);
    let (boost, weaken) = store.get::<Effects>(e).map_or((0, 0), |fx| {
        (fx.magnitude(EffectKind::AttackBoost), fx.magnitude(EffectKind::Weaken))
    });
    stats.attack + gear + boost - weaken
}

/// Base defense plus equipment and effect modifiers. Zero without stats.
pub fn effective_defense(store: &EntityStore, e: EntityId) -> i32 {
    let Some(stats) = store.get::<CombatStats>(e) else {
        return 0;
    };
    let gear = store.get::<Equipment>(e).map_or(0, Equipment::defense_bonus);
    let (boost, broken) = store.get::<Effects>(e).map_or((0, 0), |fx| {
        (fx.magnitude(EffectKind::DefenseBoost), fx.magnitude(EffectKind::ArmorBreak))
    });
    stats.defense + gear + boost - broken
}

/// `max(1, atk - def) + uniform(0..=2)`.
pub fn roll_damage<R: Rng + ?Sized>(attack: i32, defense: i32, rng: &mut R) -> i32 {
    (attack - defense).max(1) + rng.gen_range(0..=2)
}

/// What a triggered special did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialOutcome {
    /// A timed effect was attached (or an existing longer one kept).
    Afflicted { effect: EffectKind, applied: bool },
    /// The attacker healed.
    Drained { healed: i32 },
}

/// Result of one attack.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttackReport {
    pub damage: i32,
    pub killed: bool,
    pub special: Option<SpecialOutcome>,
    /// Defender's name, read before a kill destroys it.
    pub defender_name: String,
    /// Gold the defender carried as a bounty, if killed.
    pub bounty: u32,
    pub defender_was_elite: bool,
    /// Set when the defender is a participant's avatar.
    pub defender_session: Option<SessionId>,
}

/// `attacker` hits `defender` once.
///
/// A defender reduced to 0 HP or less is destroyed before this returns.
/// Missing stats or health on either side yields an empty report.
pub fn attack<R: Rng + ?Sized>(
    store: &mut EntityStore,
    attacker: EntityId,
    defender: EntityId,
    rng: &mut R,
) -> AttackReport {
    let Some(stats) = store.get::<CombatStats>(attacker).copied() else {
        return AttackReport::default();
    };
    if !store.has::<Health>(defender) || !store.has::<CombatStats>(defender) {
        return AttackReport::default();
    }

    let damage = roll_damage(effective_attack(store, attacker), effective_defense(store, defender), rng);
    let mut report = AttackReport {
        damage,
        defender_name: display_name(store, defender),
        defender_session: store.get::<PlayerAvatar>(defender).map(|p| p.session),
        defender_was_elite: store.has::<Elite>(defender),
        ..AttackReport::default()
    };

    let hp_left = match store.get_mut::<Health>(defender) {
        Some(hp) => {
            hp.hp -= damage;
            hp.hp
        }
        None => return report,
    };

    if let Some(special) = stats.special {
        if rng.gen_range(0..100) < u32::from(special.chance_pct) {
            report.special = Some(match special.kind {
                SpecialKind::LifeDrain => {
                    let healed = (damage * special.magnitude / 10).max(1);
                    let healed = store.get_mut::<Health>(attacker).map_or(0, |hp| hp.heal(healed));
                    SpecialOutcome::Drained { healed }
                }
                kind => {
                    let effect = match kind {
                        SpecialKind::Poison => EffectKind::Poison,
                        SpecialKind::Weaken => EffectKind::Weaken,
                        SpecialKind::Stun => EffectKind::Stun,
                        _ => EffectKind::ArmorBreak,
                    };
                    let applied = hp_left > 0
                        && apply_effect(
                            store,
                            defender,
                            Effect {
                                kind: effect,
                                magnitude: special.magnitude,
                                remaining: special.duration,
                            },
                        );
                    SpecialOutcome::Afflicted { effect, applied }
                }
            });
        }
    }

    if hp_left <= 0 {
        report.killed = true;
        report.bounty = store.get::<Bounty>(defender).map_or(0, |b| b.0);
        store.destroy(defender);
    }
    trace!(%attacker, %defender, damage, killed = report.killed, "attack resolved");
    report
}

/// Deal a fixed `amount` of damage to `target`, bypassing defense.
///
/// Used by abilities. Kills destroy the target as in [`attack`].
pub fn apply_damage(store: &mut EntityStore, target: EntityId, amount: i32) -> AttackReport {
    if !store.has::<Health>(target) || amount <= 0 {
        return AttackReport::default();
    }
    let mut report = AttackReport {
        damage: amount,
        defender_name: display_name(store, target),
        defender_session: store.get::<PlayerAvatar>(target).map(|p| p.session),
        defender_was_elite: store.has::<Elite>(target),
        ..AttackReport::default()
    };
    let dead = store.get_mut::<Health>(target).is_some_and(|hp| {
        hp.hp -= amount;
        hp.hp <= 0
    });
    if dead {
        report.killed = true;
        report.bounty = store.get::<Bounty>(target).map_or(0, |b| b.0);
        store.destroy(target);
    }
    report
}

/// Attach `effect` to `e`, creating its effect list if needed.
///
/// Returns whether the effect took hold; an existing effect of the same kind
/// is only replaced by a strictly longer one.
pub fn apply_effect(store: &mut EntityStore, e: EntityId, effect: Effect) -> bool {
    if effect.remaining == 0 || !store.is_alive(e) {
        return false;
    }
    if let Some(fx) = store.get_mut::<Effects>(e) {
        return fx.apply(effect);
    }
    store.insert(e, Effects(vec![effect])).is_ok()
}

/// What one decay pass did to one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectTick {
    pub entity: EntityId,
    pub name: String,
    pub session: Option<SessionId>,
    pub poison_damage: i32,
    pub killed: bool,
    pub expired: Vec<EffectKind>,
}

/// Advance every timed effect in `store` by one turn.
///
/// Poison deals its magnitude first when `apply_damage` is set. Effects at
/// zero turns are pruned. Entities killed by poison are destroyed.
pub fn decay_effects(store: &mut EntityStore, apply_damage: bool) -> Vec<EffectTick> {
    let mut ticks = Vec::new();
    for e in store.query::<(Effects,)>() {
        let poison = if apply_damage {
            store.get::<Effects>(e).map_or(0, |fx| fx.magnitude(EffectKind::Poison))
        } else {
            0
        };

        let mut expired = Vec::new();
        if let Some(fx) = store.get_mut::<Effects>(e) {
            for effect in &mut fx.0 {
                effect.remaining = effect.remaining.saturating_sub(1);
                if effect.remaining == 0 {
                    expired.push(effect.kind);
                }
            }
            fx.0.retain(|effect| effect.remaining > 0);
        }

        let mut killed = false;
        if poison > 0 {
            if let Some(hp) = store.get_mut::<Health>(e) {
                hp.hp -= poison;
                killed = hp.hp <= 0;
            }
        }

        if poison > 0 || !expired.is_empty() {
            ticks.push(EffectTick {
                entity: e,
                name: display_name(store, e),
                session: store.get::<PlayerAvatar>(e).map(|p| p.session),
                poison_damage: poison,
                killed,
                expired,
            });
        }
        if killed {
            store.destroy(e);
        }
    }
    ticks
}

pub(crate) fn display_name(store: &EntityStore, e: EntityId) -> String {
    store
        .get::<Name>(e)
        .map_or_else(|| "something".to_string(), |n| n.0.clone())
}
