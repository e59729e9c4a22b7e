//! Binary-space-partition dungeon layout.
//!
//! The map rectangle is split recursively into a tree of leaves stored in an
//! arena. Each leaf carves at most one room; every internal node then joins a
//! room from its left subtree to a room from its right subtree, bottom-up,
//! which makes every room (and every corridor) one connected region.

use rand::Rng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geom::{Point, Rect};
use crate::map::{TileKind, TileMap};

/// Corridor shape used to join two rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorridorStyle {
    /// One horizontal and one vertical run, order chosen at random.
    LShaped,
    /// Horizontal, vertical, horizontal, bending at a random column.
    ZShaped,
    /// A 4-connected staircase approximating the direct line.
    Straight,
}

/// Level generator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenConfig {
    pub width: i32,
    pub height: i32,
    /// Smallest leaf a split may produce.
    pub min_leaf: i32,
    /// Leaves within this size may stop splitting (75% chance).
    pub max_leaf: i32,
    pub min_room: i32,
    /// Gap kept between a room and its leaf's edge. Treated as at least 1.
    pub padding: i32,
    pub corridor: CorridorStyle,
    /// Chance that a corridor mouth next to a room becomes a closed door.
    pub door_chance_pct: u8,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            width: 72,
            height: 32,
            min_leaf: 8,
            max_leaf: 16,
            min_room: 4,
            padding: 1,
            corridor: CorridorStyle::LShaped,
            door_chance_pct: 30,
        }
    }
}

/// Output of [`generate`].
#[derive(Debug, Clone)]
pub struct GeneratedMap {
    pub map: TileMap,
    /// Rooms in leaf order: the first holds the spawn, the last the stairs down.
    pub rooms: Vec<Rect>,
    pub player_start: Point,
}

// ---------------------------------------------------------------------------
// Partition tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Node {
    rect: Rect,
    children: Option<(usize, usize)>,
    room: Option<Rect>,
}

struct Partition<'a> {
    cfg: &'a GenConfig,
    nodes: Vec<Node>,
}

impl<'a> Partition<'a> {
    fn new(cfg: &'a GenConfig) -> Self {
        Self {
            cfg,
            nodes: vec![Node {
                rect: Rect::new(0, 0, cfg.width, cfg.height),
                children: None,
                room: None,
            }],
        }
    }

    fn split(&mut self, idx: usize, rng: &mut Pcg64) {
        let rect = self.nodes[idx].rect;
        let (min_leaf, max_leaf) = (self.cfg.min_leaf.max(1), self.cfg.max_leaf);

        if rect.w <= max_leaf && rect.h <= max_leaf && rng.gen_bool(0.75) {
            return;
        }

        let horizontal = if f64::from(rect.h) / f64::from(rect.w) >= 1.25 {
            true
        } else if f64::from(rect.w) / f64::from(rect.h) >= 1.25 {
            false
        } else {
            rng.gen_bool(0.5)
        };
        let extent = if horizontal { rect.h } else { rect.w };
        if extent < 2 * min_leaf {
            return;
        }

        let cut = rng.gen_range(min_leaf..=extent - min_leaf);
        let (a, b) = if horizontal {
            (
                Rect::new(rect.x, rect.y, rect.w, cut),
                Rect::new(rect.x, rect.y + cut, rect.w, rect.h - cut),
            )
        } else {
            (
                Rect::new(rect.x, rect.y, cut, rect.h),
                Rect::new(rect.x + cut, rect.y, rect.w - cut, rect.h),
            )
        };

        let left = self.push(a);
        let right = self.push(b);
        self.nodes[idx].children = Some((left, right));
        self.split(left, rng);
        self.split(right, rng);
    }

    fn push(&mut self, rect: Rect) -> usize {
        self.nodes.push(Node {
            rect,
            children: None,
            room: None,
        });
        self.nodes.len() - 1
    }

    /// Carve one room per leaf, in left-to-right leaf order.
    fn carve_rooms(&mut self, idx: usize, map: &mut TileMap, rooms: &mut Vec<Rect>, rng: &mut Pcg64) {
        if let Some((l, r)) = self.nodes[idx].children {
            self.carve_rooms(l, map, rooms, rng);
            self.carve_rooms(r, map, rooms, rng);
            return;
        }
        let leaf = self.nodes[idx].rect;
        let pad = self.cfg.padding.max(1);
        let avail_w = leaf.w - 2 * pad;
        let avail_h = leaf.h - 2 * pad;
        if avail_w < 3 || avail_h < 3 {
            return;
        }
        let w = rng.gen_range(self.cfg.min_room.clamp(3, avail_w)..=avail_w);
        let h = rng.gen_range(self.cfg.min_room.clamp(3, avail_h)..=avail_h);
        let x = rng.gen_range(leaf.x + pad..=leaf.x + pad + avail_w - w);
        let y = rng.gen_range(leaf.y + pad..=leaf.y + pad + avail_h - h);
        let room = Rect::new(x, y, w, h);
        for p in room.points() {
            map.set_kind(p, TileKind::Floor);
        }
        self.nodes[idx].room = Some(room);
        rooms.push(room);
    }

    fn rooms_under(&self, idx: usize, out: &mut Vec<Rect>) {
        match self.nodes[idx].children {
            Some((l, r)) => {
                self.rooms_under(l, out);
                self.rooms_under(r, out);
            }
            None => out.extend(self.nodes[idx].room),
        }
    }

    /// Post-order: children are joined before their parent.
    fn connect(&self, idx: usize, map: &mut TileMap, rng: &mut Pcg64) {
        let Some((l, r)) = self.nodes[idx].children else {
            return;
        };
        self.connect(l, map, rng);
        self.connect(r, map, rng);

        let (mut left_rooms, mut right_rooms) = (Vec::new(), Vec::new());
        self.rooms_under(l, &mut left_rooms);
        self.rooms_under(r, &mut right_rooms);
        if left_rooms.is_empty() || right_rooms.is_empty() {
            return;
        }
        let a = left_rooms[rng.gen_range(0..left_rooms.len())].center();
        let b = right_rooms[rng.gen_range(0..right_rooms.len())].center();
        carve_corridor(map, a, b, self.cfg.corridor, rng);
    }
}

// ---------------------------------------------------------------------------
// Corridors
// ---------------------------------------------------------------------------

fn carve_h(map: &mut TileMap, x1: i32, x2: i32, y: i32) {
    for x in x1.min(x2)..=x1.max(x2) {
        map.set_kind(Point::new(x, y), TileKind::Floor);
    }
}

fn carve_v(map: &mut TileMap, y1: i32, y2: i32, x: i32) {
    for y in y1.min(y2)..=y1.max(y2) {
        map.set_kind(Point::new(x, y), TileKind::Floor);
    }
}

fn carve_corridor(map: &mut TileMap, a: Point, b: Point, style: CorridorStyle, rng: &mut Pcg64) {
    match style {
        CorridorStyle::LShaped => {
            if rng.gen_bool(0.5) {
                carve_h(map, a.x, b.x, a.y);
                carve_v(map, a.y, b.y, b.x);
            } else {
                carve_v(map, a.y, b.y, a.x);
                carve_h(map, a.x, b.x, b.y);
            }
        }
        CorridorStyle::ZShaped => {
            let mid = rng.gen_range(a.x.min(b.x)..=a.x.max(b.x));
            carve_h(map, a.x, mid, a.y);
            carve_v(map, a.y, b.y, mid);
            carve_h(map, mid, b.x, b.y);
        }
        CorridorStyle::Straight => {
            // Bresenham, emitting an extra orthogonal cell on diagonal steps
            // so the corridor stays 4-connected.
            let (dx, dy) = ((b.x - a.x).abs(), -(b.y - a.y).abs());
            let (sx, sy) = ((b.x - a.x).signum(), (b.y - a.y).signum());
            let mut err = dx + dy;
            let mut p = a;
            map.set_kind(p, TileKind::Floor);
            while p != b {
                let e2 = 2 * err;
                if e2 >= dy && p.x != b.x {
                    err += dy;
                    p.x += sx;
                    map.set_kind(p, TileKind::Floor);
                }
                if e2 <= dx && p.y != b.y {
                    err += dx;
                    p.y += sy;
                    map.set_kind(p, TileKind::Floor);
                }
            }
        }
    }
}

/// Turn some corridor mouths into closed doors: floor cells directly outside a
/// room edge, flanked by wall on both sides.
fn place_doors(map: &mut TileMap, rooms: &[Rect], chance_pct: u8, rng: &mut Pcg64) {
    if chance_pct == 0 {
        return;
    }
    for room in rooms {
        let mut mouths = Vec::new();
        for x in room.x..room.x2() {
            mouths.push((Point::new(x, room.y - 1), true));
            mouths.push((Point::new(x, room.y2()), true));
        }
        for y in room.y..room.y2() {
            mouths.push((Point::new(room.x - 1, y), false));
            mouths.push((Point::new(room.x2(), y), false));
        }
        for (p, horizontal_edge) in mouths {
            if map.kind(p) != Some(TileKind::Floor) {
                continue;
            }
            let (s1, s2) = if horizontal_edge {
                (Point::new(p.x - 1, p.y), Point::new(p.x + 1, p.y))
            } else {
                (Point::new(p.x, p.y - 1), Point::new(p.x, p.y + 1))
            };
            let flanked = map.kind(s1) == Some(TileKind::Wall) && map.kind(s2) == Some(TileKind::Wall);
            if flanked && rng.gen_range(0..100) < u32::from(chance_pct) {
                map.set_kind(p, TileKind::DoorClosed);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Generate one dungeon level layout.
///
/// Always returns a usable grid: if every leaf is degenerate, a single 3×3 room
/// is carved at the center.
pub fn generate(cfg: &GenConfig, rng: &mut Pcg64) -> GeneratedMap {
    let mut map = TileMap::filled(cfg.width, cfg.height, TileKind::Wall);
    let mut partition = Partition::new(cfg);
    partition.split(0, rng);

    let mut rooms = Vec::new();
    partition.carve_rooms(0, &mut map, &mut rooms, rng);

    if rooms.is_empty() {
        let c = Point::new(cfg.width / 2, cfg.height / 2);
        let room = Rect::new(c.x - 1, c.y - 1, 3, 3);
        for p in room.points() {
            map.set_kind(p, TileKind::Floor);
        }
        rooms.push(room);
    } else {
        partition.connect(0, &mut map, rng);
        place_doors(&mut map, &rooms, cfg.door_chance_pct, rng);
    }

    debug!(
        leaves = partition.nodes.iter().filter(|n| n.children.is_none()).count(),
        rooms = rooms.len(),
        corridor = ?cfg.corridor,
        "generated level layout"
    );

    let player_start = rooms[0].center();
    GeneratedMap {
        map,
        rooms,
        player_start,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
