//! Threat-budgeted placement of monsters, loot, inscriptions and furniture.
//!
//! [`plan`] only decides *what goes where*; [`Level`](crate::level::Level)
//! turns the resulting [`PopulationPlan`] into entities.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::components::{AiBehavior, EquipmentPiece, Glyph, ItemKind, Rarity, SpecialAttack};
use crate::geom::{Point, Rect};

/// Attempts at finding a free tile before settling for an occupied one.
pub const MAX_PLACEMENT_ATTEMPTS: usize = 20;

/// Chance, in percent, that a furniture roll picks a common piece.
const COMMON_FURNITURE_PCT: u32 = 85;

/// A monster kind the planner may place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyTemplate {
    pub name: String,
    pub glyph: Glyph,
    pub threat_cost: u32,
    pub hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub special: Option<SpecialAttack>,
    pub behavior: AiBehavior,
    pub sight_range: i32,
    pub bounty: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FurnitureTemplate {
    pub name: String,
    pub glyph: Glyph,
    pub rarity: Rarity,
}

/// What a level is populated with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub monster_budget: u32,
    pub enemies: Vec<EnemyTemplate>,
    pub items: Vec<ItemKind>,
    pub equipment: Vec<EquipmentPiece>,
    pub item_count: usize,
    pub equipment_count: usize,
    pub elite: Option<EnemyTemplate>,
    pub inscriptions: Vec<String>,
    pub inscription_count: usize,
    pub furniture: Vec<FurnitureTemplate>,
    pub furniture_per_room: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementKind {
    Monster(EnemyTemplate),
    Elite(EnemyTemplate),
    Item(ItemKind),
    Equipment(EquipmentPiece),
    Inscription(String),
    Furniture(FurnitureTemplate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub pos: Point,
    pub what: PlacementKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulationPlan {
    pub placements: Vec<Placement>,
}

impl PopulationPlan {
    /// Sum of threat costs of placed non-elite monsters.
    pub fn monster_cost(&self) -> u32 {
        self.placements
            .iter()
            .map(|p| match &p.what {
                PlacementKind::Monster(t) => t.threat_cost,
                _ => 0,
            })
            .sum()
    }

    /// Positions of every monster, elite included.
    pub fn monster_positions(&self) -> impl Iterator<Item = Point> + '_ {
        self.placements.iter().filter_map(|p| match p.what {
            PlacementKind::Monster(_) | PlacementKind::Elite(_) => Some(p.pos),
            _ => None,
        })
    }

    pub fn inscriptions(&self) -> impl Iterator<Item = &str> {
        self.placements.iter().filter_map(|p| match &p.what {
            PlacementKind::Inscription(text) => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Tiles already claimed during one population pass.
#[derive(Debug, Default)]
pub(crate) struct Occupancy {
    taken: HashSet<Point>,
}

impl Occupancy {
    pub(crate) fn with_reserved(points: impl IntoIterator<Item = Point>) -> Self {
        Self {
            taken: points.into_iter().collect(),
        }
    }

    pub(crate) fn reserve(&mut self, p: Point) {
        self.taken.insert(p);
    }

    /// A random free tile of `room`. After [`MAX_PLACEMENT_ATTEMPTS`] misses
    /// the last candidate is used even if taken.
    pub(crate) fn claim_in(&mut self, room: &Rect, rng: &mut Pcg64) -> Point {
        self.claim_with(rng, |rng| random_point(room, rng))
    }

    /// A random free tile on the inner edge of `room`.
    fn claim_on_edge(&mut self, room: &Rect, rng: &mut Pcg64) -> Point {
        self.claim_with(rng, |rng| random_edge_point(room, rng))
    }

    fn claim_with(&mut self, rng: &mut Pcg64, mut candidate: impl FnMut(&mut Pcg64) -> Point) -> Point {
        let mut p = candidate(rng);
        for _ in 1..MAX_PLACEMENT_ATTEMPTS {
            if !self.taken.contains(&p) {
                break;
            }
            p = candidate(rng);
        }
        self.taken.insert(p);
        p
    }
}

fn random_point(room: &Rect, rng: &mut Pcg64) -> Point {
    Point::new(rng.gen_range(room.x..room.x2()), rng.gen_range(room.y..room.y2()))
}

fn random_edge_point(room: &Rect, rng: &mut Pcg64) -> Point {
    let x = rng.gen_range(room.x..room.x2());
    let y = rng.gen_range(room.y..room.y2());
    match rng.gen_range(0..4) {
        0 => Point::new(x, room.y),
        1 => Point::new(x, room.y2() - 1),
        2 => Point::new(room.x, y),
        _ => Point::new(room.x2() - 1, y),
    }
}

/// Cheapest template that fits in `budget`.
fn cheapest_affordable(enemies: &[EnemyTemplate], budget: u32) -> Option<&EnemyTemplate> {
    enemies
        .iter()
        .filter(|t| t.threat_cost <= budget)
        .min_by_key(|t| t.threat_cost)
}

/// Place monsters worth at most `budget` in random rooms of `rooms`, drawing
/// from every affordable template until none fits. Returns the cost spent.
pub(crate) fn spend_budget(
    rooms: &[Rect],
    enemies: &[EnemyTemplate],
    budget: u32,
    occupied: &mut Occupancy,
    rng: &mut Pcg64,
    out: &mut Vec<Placement>,
) -> u32 {
    let mut spent = 0;
    if rooms.is_empty() {
        return spent;
    }
    loop {
        let remaining = budget - spent;
        let affordable: Vec<&EnemyTemplate> = enemies
            .iter()
            .filter(|t| t.threat_cost > 0 && t.threat_cost <= remaining)
            .collect();
        let Some(template) = affordable.choose(rng) else {
            break;
        };
        let room = rooms[rng.gen_range(0..rooms.len())];
        let pos = occupied.claim_in(&room, rng);
        spent += template.threat_cost;
        out.push(Placement {
            pos,
            what: PlacementKind::Monster((*template).clone()),
        });
    }
    spent
}

/// Decide the contents of a level laid out as `rooms`.
///
/// The first room (spawn) and last room (stairs down) never receive monsters,
/// and levels with two or fewer rooms receive none at all.
pub fn plan(rooms: &[Rect], cfg: &PopulationConfig, rng: &mut Pcg64) -> PopulationPlan {
    let mut placements = Vec::new();
    let mut occupied = Occupancy::with_reserved(
        rooms.first().map(Rect::center).into_iter().chain(rooms.last().map(Rect::center)),
    );
    if rooms.is_empty() {
        return PopulationPlan { placements };
    }

    let placeable: &[Rect] = if rooms.len() > 2 {
        &rooms[1..rooms.len() - 1]
    } else {
        &[]
    };

    // 1. Elite, budget-free.
    if let Some(elite) = &cfg.elite {
        if !placeable.is_empty() {
            let room = placeable[rng.gen_range(0..placeable.len())];
            placements.push(Placement {
                pos: occupied.claim_in(&room, rng),
                what: PlacementKind::Elite(elite.clone()),
            });
        }
    }

    // 2. Guarantee pass: one cheapest affordable monster per room.
    let mut budget = cfg.monster_budget;
    for room in placeable {
        let Some(template) = cheapest_affordable(&cfg.enemies, budget) else {
            break;
        };
        budget -= template.threat_cost;
        placements.push(Placement {
            pos: occupied.claim_in(room, rng),
            what: PlacementKind::Monster(template.clone()),
        });
    }

    // 3. Remainder.
    spend_budget(placeable, &cfg.enemies, budget, &mut occupied, rng, &mut placements);

    // 4. Loot, anywhere.
    if !cfg.items.is_empty() {
        for _ in 0..cfg.item_count {
            let item = cfg.items[rng.gen_range(0..cfg.items.len())].clone();
            let room = rooms[rng.gen_range(0..rooms.len())];
            placements.push(Placement {
                pos: occupied.claim_in(&room, rng),
                what: PlacementKind::Item(item),
            });
        }
    }
    if !cfg.equipment.is_empty() {
        for _ in 0..cfg.equipment_count {
            let piece = cfg.equipment[rng.gen_range(0..cfg.equipment.len())].clone();
            let room = rooms[rng.gen_range(0..rooms.len())];
            placements.push(Placement {
                pos: occupied.claim_in(&room, rng),
                what: PlacementKind::Equipment(piece),
            });
        }
    }

    // 5. Inscriptions, without repeats.
    let mut pool: Vec<&String> = cfg.inscriptions.iter().collect();
    pool.shuffle(rng);
    for text in pool.into_iter().take(cfg.inscription_count) {
        let room = rooms[rng.gen_range(0..rooms.len())];
        placements.push(Placement {
            pos: occupied.claim_in(&room, rng),
            what: PlacementKind::Inscription(text.clone()),
        });
    }

    // 6. Furniture against the walls of placeable rooms.
    if cfg.furniture_per_room > 0 && !cfg.furniture.is_empty() {
        let (common, rare): (Vec<&FurnitureTemplate>, Vec<&FurnitureTemplate>) =
            cfg.furniture.iter().partition(|f| f.rarity == Rarity::Common);
        for room in placeable {
            for _ in 0..rng.gen_range(1..=cfg.furniture_per_room) {
                let roll_common = rng.gen_range(0..100) < COMMON_FURNITURE_PCT;
                let pool = match (roll_common, common.is_empty(), rare.is_empty()) {
                    (true, false, _) | (false, false, true) => &common,
                    _ => &rare,
                };
                let Some(template) = pool.choose(rng) else {
                    continue;
                };
                placements.push(Placement {
                    pos: occupied.claim_on_edge(room, rng),
                    what: PlacementKind::Furniture((*template).clone()),
                });
            }
        }
    }

    let plan = PopulationPlan { placements };
    debug!(
        rooms = rooms.len(),
        placements = plan.placements.len(),
        monster_cost = plan.monster_cost(),
        budget = cfg.monster_budget,
        "planned level population"
    );
    plan
}
