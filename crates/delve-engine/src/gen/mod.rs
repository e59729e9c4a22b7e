//! Procedural level construction: layout ([`bsp`], [`town`]) and contents
//! ([`populate`]).

pub mod bsp;
pub mod populate;
pub mod town;

use std::collections::VecDeque;

use crate::geom::Point;
use crate::map::{TileKind, TileMap};

/// Walkable, or a closed door that a bump would open.
pub fn is_passable(map: &TileMap, p: Point) -> bool {
    map.is_walkable(p) || map.kind(p) == Some(TileKind::DoorClosed)
}

/// Sizes of the 4-connected passable regions of `map`, largest first.
///
/// A well-formed level has exactly one.
pub fn passable_component_sizes(map: &TileMap) -> Vec<usize> {
    passable_components_excluding(map, |_| false)
}

/// Like [`passable_component_sizes`], treating every point for which
/// `blocked` holds as impassable.
pub fn passable_components_excluding(map: &TileMap, blocked: impl Fn(Point) -> bool) -> Vec<usize> {
    let w = map.width() as usize;
    let mut seen = vec![false; w * map.height() as usize];
    let mut sizes = Vec::new();

    for start in map.bounds().points() {
        let idx = start.y as usize * w + start.x as usize;
        if seen[idx] || !is_passable(map, start) || blocked(start) {
            continue;
        }
        seen[idx] = true;
        let mut queue = VecDeque::from([start]);
        let mut size = 0;
        while let Some(p) = queue.pop_front() {
            size += 1;
            for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let n = Point::new(p.x + dx, p.y + dy);
                if !map.in_bounds(n) {
                    continue;
                }
                let ni = n.y as usize * w + n.x as usize;
                if !seen[ni] && is_passable(map, n) && !blocked(n) {
                    seen[ni] = true;
                    queue.push_back(n);
                }
            }
        }
        sizes.push(size);
    }

    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes
}
