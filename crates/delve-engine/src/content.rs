//! Game content: classes, floors, monsters, loot and shop stock.
//!
//! The engine reads content only through the [`Content`] trait.
//! [`StandardContent`] is the built-in table set.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::components::{
    AiBehavior, Color, Consumable, ConsumableEffect, EffectKind, EquipmentPiece, Equipment, Glyph,
    ItemKind, Rarity, Slot, SpecialAttack, SpecialKind,
};
use crate::gen::bsp::{CorridorStyle, GenConfig};
use crate::gen::populate::{EnemyTemplate, FurnitureTemplate, PopulationConfig};

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerClass {
    Warrior,
    Mage,
    Cleric,
}

impl PlayerClass {
    pub const ALL: [PlayerClass; 3] = [PlayerClass::Warrior, PlayerClass::Mage, PlayerClass::Cleric];
}

impl fmt::Display for PlayerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlayerClass::Warrior => "warrior",
            PlayerClass::Mage => "mage",
            PlayerClass::Cleric => "cleric",
        })
    }
}

impl FromStr for PlayerClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "w" | "warrior" => Ok(PlayerClass::Warrior),
            "m" | "mage" => Ok(PlayerClass::Mage),
            "c" | "cleric" => Ok(PlayerClass::Cleric),
            other => Err(format!("unknown class '{other}'")),
        }
    }
}

/// A class's special ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ability {
    /// Attack every adjacent hostile.
    Whirlwind,
    /// Damage and stun hostiles within `radius`.
    FrostNova { radius: i32, damage: i32, stun_turns: u32 },
    /// Heal a percentage of max HP.
    Mend { percent: i32 },
}

impl Ability {
    pub fn name(&self) -> &'static str {
        match self {
            Ability::Whirlwind => "Whirlwind",
            Ability::FrostNova { .. } => "Frost Nova",
            Ability::Mend { .. } => "Mend",
        }
    }

    /// Offensive abilities are refused in safe zones.
    pub fn is_offensive(&self) -> bool {
        !matches!(self, Ability::Mend { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassProfile {
    pub class: PlayerClass,
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub ability: Ability,
    /// Ticks between ability uses.
    pub ability_cooldown: u32,
    pub starting_items: Vec<ItemKind>,
    pub starting_equipment: Equipment,
}

// ---------------------------------------------------------------------------
// Floors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FloorLayout {
    Town { width: i32, height: i32 },
    Dungeon(GenConfig),
}

/// Everything needed to build the level at one depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorSpec {
    pub depth: u32,
    pub name: String,
    pub layout: FloorLayout,
    pub population: PopulationConfig,
    /// Disables combat, AI and enemy respawn.
    pub safe_zone: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopOffer {
    pub item: ItemKind,
    pub price: u32,
}

/// Source of all content the engine reads.
pub trait Content: Send + Sync {
    fn floor(&self, depth: u32) -> FloorSpec;
    fn class_profile(&self, class: PlayerClass) -> ClassProfile;
    fn shop_offers(&self) -> Vec<ShopOffer>;
    /// Deepest reachable depth. Depth 0 is the town.
    fn max_depth(&self) -> u32;
    /// Line spoken by the sage.
    fn sage_line(&self, n: u64) -> String {
        let _ = n;
        "The deeper you go, the older the stones.".to_string()
    }
}

// ---------------------------------------------------------------------------
// Built-in tables
// ---------------------------------------------------------------------------

/// The built-in five-floor dungeon under a small town.
#[derive(Debug, Clone, Default)]
pub struct StandardContent;

fn potion(name: &str, effect: ConsumableEffect) -> ItemKind {
    ItemKind::Consumable(Consumable {
        name: name.to_string(),
        effect,
    })
}

fn piece(name: &str, slot: Slot, attack_bonus: i32, defense_bonus: i32) -> EquipmentPiece {
    EquipmentPiece {
        name: name.to_string(),
        slot,
        attack_bonus,
        defense_bonus,
    }
}

fn healing_potion() -> ItemKind {
    potion("healing potion", ConsumableEffect::Heal(12))
}

fn special(kind: SpecialKind, chance_pct: u8, magnitude: i32, duration: u32) -> Option<SpecialAttack> {
    Some(SpecialAttack {
        kind,
        chance_pct,
        magnitude,
        duration,
    })
}

#[allow(clippy::too_many_arguments)]
fn enemy(
    name: &str,
    glyph: char,
    color: Color,
    threat_cost: u32,
    (hp, attack, defense): (i32, i32, i32),
    special: Option<SpecialAttack>,
    behavior: AiBehavior,
    bounty: u32,
) -> EnemyTemplate {
    EnemyTemplate {
        name: name.to_string(),
        glyph: Glyph::new(glyph, color),
        threat_cost,
        hp,
        attack,
        defense,
        special,
        behavior,
        sight_range: 8,
        bounty,
    }
}

impl StandardContent {
    pub const MAX_DEPTH: u32 = 5;

    /// `(first depth it appears on, template)`.
    fn bestiary() -> Vec<(u32, EnemyTemplate)> {
        use AiBehavior::*;
        use Color::*;
        vec![
            (1, enemy("rat", 'r', Gray, 1, (4, 2, 0), None, Chase, 1)),
            (1, enemy("bat", 'b', Magenta, 2, (5, 2, 0), None, Cowardly, 1)),
            (1, enemy("kobold", 'k', Yellow, 2, (6, 3, 1), None, Chase, 2)),
            (2, enemy("spider", 's', Green, 3, (7, 3, 1), special(SpecialKind::Poison, 30, 1, 4), Chase, 3)),
            (2, enemy("totem", 'T', Cyan, 3, (10, 4, 2), None, Stationary, 4)),
            (3, enemy("orc", 'o', Green, 5, (14, 5, 2), special(SpecialKind::Weaken, 20, 2, 3), Chase, 5)),
            (3, enemy("wraith", 'W', Blue, 6, (12, 5, 2), special(SpecialKind::LifeDrain, 40, 5, 0), Chase, 6)),
            (4, enemy("ogre", 'O', Yellow, 8, (24, 7, 3), special(SpecialKind::Stun, 15, 0, 2), Chase, 9)),
            (4, enemy("golem", 'G', Gray, 10, (30, 6, 5), special(SpecialKind::ArmorBreak, 25, 2, 4), Chase, 12)),
        ]
    }

    fn elite_for(depth: u32) -> Option<EnemyTemplate> {
        match depth {
            3 => Some(enemy(
                "orc warlord",
                'O',
                Color::Red,
                0,
                (30, 7, 3),
                special(SpecialKind::Weaken, 30, 3, 4),
                AiBehavior::Chase,
                25,
            )),
            d if d == Self::MAX_DEPTH => Some(enemy(
                "the Delve Warden",
                'W',
                Color::Red,
                0,
                (60, 9, 5),
                special(SpecialKind::LifeDrain, 35, 6, 0),
                AiBehavior::Chase,
                100,
            )),
            _ => None,
        }
    }

    fn loot() -> Vec<ItemKind> {
        vec![
            healing_potion(),
            potion("antidote", ConsumableEffect::Cure),
            potion(
                "draught of might",
                ConsumableEffect::Boost {
                    kind: EffectKind::AttackBoost,
                    magnitude: 3,
                    turns: 20,
                },
            ),
            potion(
                "stoneskin tonic",
                ConsumableEffect::Boost {
                    kind: EffectKind::DefenseBoost,
                    magnitude: 3,
                    turns: 20,
                },
            ),
            ItemKind::Gold(10),
            ItemKind::Gold(25),
        ]
    }

    fn armory(depth: u32) -> Vec<EquipmentPiece> {
        let tier = depth as i32;
        vec![
            piece(&format!("+{tier} short sword"), Slot::Weapon, 1 + tier, 0),
            piece(&format!("+{tier} war axe"), Slot::Weapon, 2 + tier, -1),
            piece(&format!("+{tier} leather armor"), Slot::Armor, 0, 1 + tier / 2),
            piece(&format!("+{tier} chain mail"), Slot::Armor, 0, 2 + tier / 2),
            piece("amulet of vigor", Slot::Trinket, 1, 1),
        ]
    }

    fn furniture() -> Vec<FurnitureTemplate> {
        let f = |name: &str, ch: char, color: Color, rarity: Rarity| FurnitureTemplate {
            name: name.to_string(),
            glyph: Glyph::new(ch, color),
            rarity,
        };
        vec![
            f("crate", '=', Color::Yellow, Rarity::Common),
            f("barrel", '0', Color::Yellow, Rarity::Common),
            f("bookshelf", '&', Color::Yellow, Rarity::Common),
            f("altar", '_', Color::Magenta, Rarity::Rare),
            f("iron chest", '$', Color::Cyan, Rarity::Rare),
        ]
    }

    fn inscriptions() -> Vec<String> {
        [
            "Turn back while the torch still burns.",
            "The warden does not sleep.",
            "Gold weighs nothing to the dead.",
            "Spiders fear the antidote more than the blade.",
            "Here lies Brannoc, who fought an ogre bare-handed.",
            "Count the doors. One is missing.",
            "The stairs remember every foot.",
            "Rest is a weapon too.",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

impl Content for StandardContent {
    fn floor(&self, depth: u32) -> FloorSpec {
        if depth == 0 {
            return FloorSpec {
                depth,
                name: "Town of Lowmere".to_string(),
                layout: FloorLayout::Town {
                    width: 60,
                    height: 24,
                },
                population: PopulationConfig::default(),
                safe_zone: true,
            };
        }

        let corridor = match depth % 3 {
            1 => CorridorStyle::LShaped,
            2 => CorridorStyle::ZShaped,
            _ => CorridorStyle::Straight,
        };
        let enemies = Self::bestiary()
            .into_iter()
            .filter(|(min_depth, _)| *min_depth <= depth)
            .map(|(_, t)| t)
            .collect();

        FloorSpec {
            depth,
            name: format!("Depth {depth}"),
            layout: FloorLayout::Dungeon(GenConfig {
                corridor,
                ..GenConfig::default()
            }),
            population: PopulationConfig {
                monster_budget: 6 + 5 * depth,
                enemies,
                items: Self::loot(),
                equipment: Self::armory(depth),
                item_count: 3 + depth as usize / 2,
                equipment_count: 1,
                elite: Self::elite_for(depth),
                inscriptions: Self::inscriptions(),
                inscription_count: 2,
                furniture: Self::furniture(),
                furniture_per_room: 2,
            },
            safe_zone: false,
        }
    }

    fn class_profile(&self, class: PlayerClass) -> ClassProfile {
        match class {
            PlayerClass::Warrior => ClassProfile {
                class,
                max_hp: 40,
                attack: 6,
                defense: 3,
                ability: Ability::Whirlwind,
                ability_cooldown: 12,
                starting_items: vec![healing_potion()],
                starting_equipment: Equipment {
                    weapon: Some(piece("rusty sword", Slot::Weapon, 1, 0)),
                    armor: Some(piece("padded vest", Slot::Armor, 0, 1)),
                    trinket: None,
                },
            },
            PlayerClass::Mage => ClassProfile {
                class,
                max_hp: 26,
                attack: 4,
                defense: 1,
                ability: Ability::FrostNova {
                    radius: 2,
                    damage: 6,
                    stun_turns: 3,
                },
                ability_cooldown: 15,
                starting_items: vec![healing_potion(), healing_potion()],
                starting_equipment: Equipment {
                    weapon: Some(piece("oak staff", Slot::Weapon, 1, 0)),
                    armor: None,
                    trinket: Some(piece("focus stone", Slot::Trinket, 1, 0)),
                },
            },
            PlayerClass::Cleric => ClassProfile {
                class,
                max_hp: 32,
                attack: 5,
                defense: 2,
                ability: Ability::Mend { percent: 40 },
                ability_cooldown: 20,
                starting_items: vec![healing_potion(), potion("antidote", ConsumableEffect::Cure)],
                starting_equipment: Equipment {
                    weapon: Some(piece("mace", Slot::Weapon, 1, 0)),
                    armor: Some(piece("chain shirt", Slot::Armor, 0, 2)),
                    trinket: None,
                },
            },
        }
    }

    fn shop_offers(&self) -> Vec<ShopOffer> {
        vec![
            ShopOffer {
                item: healing_potion(),
                price: 15,
            },
            ShopOffer {
                item: potion("antidote", ConsumableEffect::Cure),
                price: 10,
            },
            ShopOffer {
                item: ItemKind::Equipment(piece("steel sword", Slot::Weapon, 3, 0)),
                price: 60,
            },
            ShopOffer {
                item: ItemKind::Equipment(piece("scale armor", Slot::Armor, 0, 3)),
                price: 70,
            },
        ]
    }

    fn max_depth(&self) -> u32 {
        Self::MAX_DEPTH
    }

    fn sage_line(&self, n: u64) -> String {
        const LINES: [&str; 4] = [
            "The deeper you go, the older the stones.",
            "Spiders poison; carry an antidote.",
            "A warden guards the lowest floor. Slay it and the delve is yours.",
            "Cleared halls do not stay empty for long.",
        ];
        LINES[(n % LINES.len() as u64) as usize].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn town_is_safe_and_dungeon_is_not() {
        let c = StandardContent;
        assert!(c.floor(0).safe_zone);
        assert!(matches!(c.floor(0).layout, FloorLayout::Town { .. }));
        for depth in 1..=c.max_depth() {
            let floor = c.floor(depth);
            assert!(!floor.safe_zone);
            assert!(!floor.population.enemies.is_empty());
        }
    }

    #[test]
    fn deepest_floor_has_an_elite() {
        let c = StandardContent;
        assert!(c.floor(c.max_depth()).population.elite.is_some());
        assert!(c.floor(1).population.elite.is_none());
    }

    #[test]
    fn class_names_parse() {
        for class in PlayerClass::ALL {
            assert_eq!(class.to_string().parse::<PlayerClass>(), Ok(class));
        }
        assert_eq!("M".parse::<PlayerClass>(), Ok(PlayerClass::Mage));
        assert!("bard".parse::<PlayerClass>().is_err());
    }
}
