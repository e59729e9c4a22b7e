//! The surface level: an open meadow ringed by trees, with a pond, a few
//! NPC spots and the stairs down at the center.

use rand::Rng;
use rand_pcg::Pcg64;

use super::bsp::GeneratedMap;
use crate::geom::{Point, Rect};
use crate::map::{TileKind, TileMap};

/// Town layout plus the fixed spots its NPCs stand on.
#[derive(Debug, Clone)]
pub struct TownMap {
    pub layout: GeneratedMap,
    pub stairs_down: Point,
    /// Healer, merchant and sage, in that order.
    pub npc_spots: [Point; 3],
}

pub fn generate(width: i32, height: i32, rng: &mut Pcg64) -> TownMap {
    let width = width.max(12);
    let height = height.max(10);
    let mut map = TileMap::filled(width, height, TileKind::Tree);
    let field = Rect::new(1, 1, width - 2, height - 2);
    for p in field.points() {
        map.set_kind(p, TileKind::Grass);
    }

    // Pond in the upper-left quadrant.
    let pond = Point::new(width / 4, height / 4);
    let (rx, ry) = ((width / 10).max(2), (height / 8).max(1));
    for p in field.points() {
        let (dx, dy) = (f64::from(p.x - pond.x) / f64::from(rx), f64::from(p.y - pond.y) / f64::from(ry));
        if dx * dx + dy * dy <= 1.0 {
            map.set_kind(p, TileKind::Water);
        }
    }

    for p in field.points() {
        if map.kind(p) == Some(TileKind::Grass) && rng.gen_range(0..100) < 4 {
            map.set_kind(p, TileKind::Tree);
        }
    }

    let center = field.center();
    let stairs_down = center;
    let player_start = Point::new(center.x, center.y + 2);
    let npc_spots = [
        Point::new(center.x - 4, center.y - 2),
        Point::new(center.x + 4, center.y - 2),
        Point::new(center.x, center.y - 4),
    ];

    // Clear a plaza around the center so nothing important is walled in.
    let plaza = Rect::new(center.x - 5, center.y - 5, 11, 11);
    for p in plaza.points().filter(|p| field.contains(*p)) {
        map.set_kind(p, TileKind::Grass);
    }
    map.set_kind(stairs_down, TileKind::StairsDown);

    seal_unreachable(&mut map, player_start);

    TownMap {
        layout: GeneratedMap {
            map,
            rooms: vec![field],
            player_start,
        },
        stairs_down,
        npc_spots,
    }
}

/// Turn grass cut off from `from` into trees.
fn seal_unreachable(map: &mut TileMap, from: Point) {
    let mut reached = vec![false; (map.width() * map.height()) as usize];
    let w = map.width();
    let idx = move |p: Point| (p.y * w + p.x) as usize;
    let mut stack = vec![from];
    reached[idx(from)] = true;
    while let Some(p) = stack.pop() {
        for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let n = Point::new(p.x + dx, p.y + dy);
            if map.is_walkable(n) && !reached[idx(n)] {
                reached[idx(n)] = true;
                stack.push(n);
            }
        }
    }
    for p in map.bounds().points().collect::<Vec<_>>() {
        if map.is_walkable(p) && !reached[idx(p)] {
            map.set_kind(p, TileKind::Tree);
        }
    }
}
