//! Out-of-band inventory and shop edits.
//!
//! A front end opens an [`InventoryEdit`] against a participant's current
//! avatar, lets the player queue operations at their own pace, then commits.
//! The world may have moved on in between: the commit re-validates and
//! rejects the whole edit as [`EditError::Stale`] if the avatar died,
//! respawned, changed level or had its pack change under it. Operations
//! apply all-or-nothing.

use delve_ecs::EntityId;
use tracing::{debug, warn};

use crate::components::{
    ConsumableEffect, Effect, EffectKind, Effects, Equipment, Health, Inventory, ItemKind, Slot,
};
use crate::session::SessionId;
use crate::world::World;

/// One queued change to a participant's belongings. Indices refer to the
/// pack as captured when the edit was opened, adjusted by earlier ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Use(usize),
    Equip(usize),
    Unequip(Slot),
    Drop(usize),
    /// Buy the merchant offer at this index. Only in town.
    Buy(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("the world changed since this edit was opened")]
    Stale,
    #[error("no item at index {0}")]
    BadIndex(usize),
    #[error("the pack is full")]
    InventoryFull,
    #[error("not enough gold (need {need}, have {have})")]
    NotEnoughGold { need: u32, have: u32 },
    #[error("that cannot be equipped")]
    NotEquippable,
    #[error("that cannot be used")]
    NotUsable,
    #[error("nothing is worn in the {0:?} slot")]
    NothingEquipped(Slot),
    #[error("there is no shop here")]
    NotInShop,
}

/// A pending edit plus the state it was opened against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEdit {
    session: SessionId,
    avatar: EntityId,
    depth: u32,
    pub items: Vec<ItemKind>,
    pub capacity: usize,
    pub gold: u32,
    pub equipment: Equipment,
    ops: Vec<EditOp>,
}

impl InventoryEdit {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn push(&mut self, op: EditOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }
}

/// What a committed edit did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSummary {
    pub messages: Vec<String>,
    pub items_used: u32,
}

/// Working copies the ops mutate before anything is written back.
struct Draft {
    items: Vec<ItemKind>,
    capacity: usize,
    gold: u32,
    equipment: Equipment,
    health: Health,
    effects: Effects,
    dropped: Vec<ItemKind>,
    summary: EditSummary,
}

impl Draft {
    fn take(&mut self, index: usize) -> Result<ItemKind, EditError> {
        if index >= self.items.len() {
            return Err(EditError::BadIndex(index));
        }
        Ok(self.items.remove(index))
    }

    fn apply(&mut self, op: EditOp, shop: Option<&[crate::content::ShopOffer]>) -> Result<(), EditError> {
        match op {
            EditOp::Use(index) => {
                let Some(ItemKind::Consumable(potion)) = self.items.get(index).cloned() else {
                    return Err(if index < self.items.len() {
                        EditError::NotUsable
                    } else {
                        EditError::BadIndex(index)
                    });
                };
                self.items.remove(index);
                match potion.effect {
                    ConsumableEffect::Heal(amount) => {
                        let gained = self.health.heal(amount);
                        self.note(format!("You drink the {} and recover {gained} HP.", potion.name));
                    }
                    ConsumableEffect::Boost { kind, magnitude, turns } => {
                        self.effects.apply(Effect {
                            kind,
                            magnitude,
                            remaining: turns,
                        });
                        self.note(format!("You drink the {}. You feel {}.", potion.name, kind.label()));
                    }
                    ConsumableEffect::Cure => {
                        self.effects.remove(EffectKind::Poison);
                        self.note(format!("You drink the {}. The poison fades.", potion.name));
                    }
                }
                self.summary.items_used += 1;
            }
            EditOp::Equip(index) => {
                let Some(ItemKind::Equipment(piece)) = self.items.get(index).cloned() else {
                    return Err(if index < self.items.len() {
                        EditError::NotEquippable
                    } else {
                        EditError::BadIndex(index)
                    });
                };
                self.items.remove(index);
                let name = piece.name.clone();
                if let Some(old) = self.equipment.slot_mut(piece.slot).replace(piece) {
                    self.items.push(ItemKind::Equipment(old));
                }
                self.note(format!("You equip the {name}."));
            }
            EditOp::Unequip(slot) => {
                if self.items.len() >= self.capacity {
                    return Err(EditError::InventoryFull);
                }
                let piece = self
                    .equipment
                    .slot_mut(slot)
                    .take()
                    .ok_or(EditError::NothingEquipped(slot))?;
                self.note(format!("You take off the {}.", piece.name));
                self.items.push(ItemKind::Equipment(piece));
            }
            EditOp::Drop(index) => {
                let item = self.take(index)?;
                self.note(format!("You drop the {}.", item.name()));
                self.dropped.push(item);
            }
            EditOp::Buy(index) => {
                let offers = shop.ok_or(EditError::NotInShop)?;
                let offer = offers.get(index).ok_or(EditError::BadIndex(index))?;
                if self.gold < offer.price {
                    return Err(EditError::NotEnoughGold {
                        need: offer.price,
                        have: self.gold,
                    });
                }
                if self.items.len() >= self.capacity {
                    return Err(EditError::InventoryFull);
                }
                self.gold -= offer.price;
                self.items.push(offer.item.clone());
                self.note(format!("You buy the {} for {} gold.", offer.item.name(), offer.price));
            }
        }
        Ok(())
    }

    fn note(&mut self, msg: String) {
        self.summary.messages.push(msg);
    }
}

impl World {
    /// Capture a participant's belongings for an out-of-band edit. `None`
    /// while dead or unknown.
    pub fn open_inventory(&self, id: SessionId) -> Option<InventoryEdit> {
        let session = self.sessions.get(&id)?;
        let avatar = session.avatar?;
        let level = self.levels.get(session.depth)?;
        let inventory = level.store.get::<Inventory>(avatar)?;
        Some(InventoryEdit {
            session: id,
            avatar,
            depth: session.depth,
            items: inventory.items.clone(),
            capacity: inventory.capacity,
            gold: inventory.gold,
            equipment: level.store.get::<Equipment>(avatar).cloned().unwrap_or_default(),
            ops: Vec::new(),
        })
    }

    /// Apply every queued op, or none of them.
    pub fn commit_inventory(&mut self, edit: InventoryEdit) -> Result<EditSummary, EditError> {
        let current = self
            .sessions
            .get(&edit.session)
            .filter(|s| s.avatar == Some(edit.avatar) && s.depth == edit.depth)
            .and_then(|_| self.levels.get(edit.depth))
            .and_then(|level| {
                Some((
                    level.store.get::<Inventory>(edit.avatar)?.clone(),
                    *level.store.get::<Health>(edit.avatar)?,
                    level.store.get::<Equipment>(edit.avatar).cloned().unwrap_or_default(),
                    level.store.get::<Effects>(edit.avatar).cloned().unwrap_or_default(),
                ))
            });
        let Some((inventory, health, equipment, effects)) = current else {
            warn!(session = %edit.session, depth = edit.depth, "stale inventory edit discarded");
            return Err(EditError::Stale);
        };
        if inventory.items != edit.items {
            warn!(session = %edit.session, "inventory edit discarded, pack changed underneath");
            return Err(EditError::Stale);
        }

        let shop = (edit.depth == 0).then(|| self.content.shop_offers());
        let mut draft = Draft {
            items: inventory.items,
            capacity: inventory.capacity,
            gold: inventory.gold,
            equipment,
            health,
            effects,
            dropped: Vec::new(),
            summary: EditSummary::default(),
        };
        for op in &edit.ops {
            draft.apply(*op, shop.as_deref())?;
        }

        let Some(level) = self.levels.get_mut(edit.depth) else {
            return Err(EditError::Stale);
        };
        let store = &mut level.store;
        if let Some(inv) = store.get_mut::<Inventory>(edit.avatar) {
            inv.items = draft.items;
            inv.gold = draft.gold;
        }
        if let Some(eq) = store.get_mut::<Equipment>(edit.avatar) {
            *eq = draft.equipment;
        }
        if let Some(hp) = store.get_mut::<Health>(edit.avatar) {
            *hp = draft.health;
        }
        if let Some(fx) = store.get_mut::<Effects>(edit.avatar) {
            *fx = draft.effects;
        }
        if let Some(at) = level.position(edit.avatar) {
            for item in draft.dropped {
                level.spawn_item(item, at);
            }
        }

        let summary = draft.summary;
        if let Some(session) = self.sessions.get_mut(&edit.session) {
            session.stats.items_used += summary.items_used;
            for msg in &summary.messages {
                session.push_message(msg.clone());
            }
        }
        debug!(session = %edit.session, ops = edit.ops.len(), "inventory edit committed");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Intent;
    use crate::components::{Consumable, EquipmentPiece, Item};
    use crate::content::{PlayerClass, StandardContent};
    use crate::runlog::MemoryRunLog;
    use crate::tick::TickReport;
    use crate::world::WorldConfig;

    fn world() -> World {
        World::new(WorldConfig::default(), Box::new(StandardContent), Box::new(MemoryRunLog::new()))
    }

    fn give_gold(world: &mut World, id: SessionId, gold: u32) {
        let edit = world.open_inventory(id).unwrap();
        let level = world.levels_mut().get_mut(0).unwrap();
        level.store.get_mut::<Inventory>(edit.avatar).unwrap().gold = gold;
    }

    #[test]
    fn using_a_potion_heals_and_consumes_it() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let mut edit = w.open_inventory(id).unwrap();
        let e = edit.avatar;
        w.levels_mut().get_mut(0).unwrap().store.get_mut::<Health>(e).unwrap().hp = 10;

        assert!(matches!(edit.items[0], ItemKind::Consumable(_)));
        let before = edit.items.len();
        edit.push(EditOp::Use(0));
        let summary = w.commit_inventory(edit).unwrap();

        assert_eq!(summary.items_used, 1);
        let level = w.levels().get(0).unwrap();
        assert!(level.store.get::<Health>(e).unwrap().hp > 10);
        assert_eq!(level.store.get::<Inventory>(e).unwrap().items.len(), before - 1);
        assert_eq!(w.session(id).unwrap().stats.items_used, 1);
    }

    #[test]
    fn equipping_swaps_the_old_piece_into_the_pack() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let edit = w.open_inventory(id).unwrap();
        let e = edit.avatar;
        let blade = EquipmentPiece {
            name: "long blade".into(),
            slot: Slot::Weapon,
            attack_bonus: 4,
            defense_bonus: 0,
        };
        w.levels_mut()
            .get_mut(0)
            .unwrap()
            .store
            .get_mut::<Inventory>(e)
            .unwrap()
            .items
            .push(ItemKind::Equipment(blade.clone()));

        let mut edit = w.open_inventory(id).unwrap();
        let index = edit.items.len() - 1;
        edit.push(EditOp::Equip(index));
        w.commit_inventory(edit).unwrap();

        let level = w.levels().get(0).unwrap();
        let eq = level.store.get::<Equipment>(e).unwrap();
        assert_eq!(eq.weapon.as_ref(), Some(&blade));
        let items = &level.store.get::<Inventory>(e).unwrap().items;
        assert!(items
            .iter()
            .any(|i| matches!(i, ItemKind::Equipment(p) if p.name == "rusty sword")));
    }

    #[test]
    fn buying_needs_gold_and_a_shop() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();

        let mut edit = w.open_inventory(id).unwrap();
        edit.push(EditOp::Buy(0));
        assert_eq!(
            w.commit_inventory(edit),
            Err(EditError::NotEnoughGold { need: 15, have: 0 })
        );

        give_gold(&mut w, id, 20);
        let mut edit = w.open_inventory(id).unwrap();
        edit.push(EditOp::Buy(0)).push(EditOp::Buy(99));
        assert_eq!(w.commit_inventory(edit), Err(EditError::BadIndex(99)));

        let mut edit = w.open_inventory(id).unwrap();
        let before = edit.items.len();
        edit.push(EditOp::Buy(0));
        w.commit_inventory(edit).unwrap();
        let edit = w.open_inventory(id).unwrap();
        assert_eq!(edit.gold, 5);
        assert_eq!(edit.items.len(), before + 1);
    }

    #[test]
    fn failing_op_rolls_back_earlier_ones() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let mut edit = w.open_inventory(id).unwrap();
        let before = edit.clone();
        edit.push(EditOp::Drop(0)).push(EditOp::Use(42));
        assert_eq!(w.commit_inventory(edit), Err(EditError::BadIndex(42)));
        let after = w.open_inventory(id).unwrap();
        assert_eq!(after.items, before.items);
        assert_eq!(w.levels().get(0).unwrap().store.count::<Item>(), 0);
    }

    #[test]
    fn dropping_leaves_the_item_underfoot() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let mut edit = w.open_inventory(id).unwrap();
        let e = edit.avatar;
        edit.push(EditOp::Drop(0));
        w.commit_inventory(edit).unwrap();
        let level = w.levels().get(0).unwrap();
        let here = level.position(e).unwrap();
        assert!(level
            .entities_at(here)
            .iter()
            .any(|x| level.store.has::<Item>(*x)));
    }

    #[test]
    fn unusable_and_unequippable_items_are_refused() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let mut edit = w.open_inventory(id).unwrap();
        edit.push(EditOp::Equip(0));
        assert_eq!(w.commit_inventory(edit), Err(EditError::NotEquippable));
        let mut edit = w.open_inventory(id).unwrap();
        edit.push(EditOp::Unequip(Slot::Trinket));
        assert_eq!(w.commit_inventory(edit), Err(EditError::NothingEquipped(Slot::Trinket)));
    }

    #[test]
    fn edits_go_stale_when_the_avatar_moves_on() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let mut edit = w.open_inventory(id).unwrap();
        edit.push(EditOp::Use(0));

        let stairs = w.levels().get(0).unwrap().stairs_down.unwrap();
        let e = edit.avatar;
        w.levels_mut()
            .get_mut(0)
            .unwrap()
            .store
            .get_mut::<crate::components::Position>(e)
            .unwrap()
            .0 = stairs;
        w.enqueue_intent(id, Intent::Descend);
        w.resolve_participants(&mut TickReport::default());

        assert_eq!(w.commit_inventory(edit), Err(EditError::Stale));
    }

    #[test]
    fn edits_go_stale_when_the_pack_changes() {
        let mut w = world();
        let id = w.connect("ada", PlayerClass::Warrior).unwrap();
        let mut edit = w.open_inventory(id).unwrap();
        edit.push(EditOp::Drop(0));
        let potion = ItemKind::Consumable(Consumable {
            name: "odd draught".into(),
            effect: ConsumableEffect::Cure,
        });
        w.levels_mut()
            .get_mut(0)
            .unwrap()
            .store
            .get_mut::<Inventory>(edit.avatar)
            .unwrap()
            .items
            .insert(0, potion);
        assert_eq!(w.commit_inventory(edit), Err(EditError::Stale));
    }
}
