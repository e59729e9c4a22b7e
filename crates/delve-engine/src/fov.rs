//! Field of view by recursive shadow-casting.
//!
//! The plane around the origin is cut into eight octants, each scanned row by
//! row outward. A row is walked as a slope interval; an opaque tile narrows the
//! beam and the remainder of the row past it is scanned by a recursive call.
//! Opaque tiles are themselves lit. The radius is a Euclidean cutoff on the
//! squared distance.

use crate::geom::Point;
use crate::map::TileMap;

/// Octant transforms: `(xx, xy, yx, yy)`.
const OCTANTS: [(i32, i32, i32, i32); 8] = [
    (1, 0, 0, 1),
    (0, 1, 1, 0),
    (0, -1, 1, 0),
    (-1, 0, 0, 1),
    (-1, 0, 0, -1),
    (0, -1, -1, 0),
    (0, 1, -1, 0),
    (1, 0, 0, -1),
];

/// Recompute `map`'s visible flags from `origin`.
///
/// Every visible flag is cleared first; newly lit tiles also become explored.
pub fn compute_fov(map: &mut TileMap, origin: Point, radius: i32) {
    map.clear_visible();
    map.reveal(origin);
    if radius <= 0 {
        return;
    }
    for octant in OCTANTS {
        cast_light(map, origin, radius, 1, 1.0, 0.0, octant);
    }
}

fn cast_light(
    map: &mut TileMap,
    origin: Point,
    radius: i32,
    row: i32,
    mut start: f64,
    end: f64,
    (xx, xy, yx, yy): (i32, i32, i32, i32),
) {
    if start < end {
        return;
    }
    let radius_sq = radius * radius;
    let mut next_start = start;

    for distance in row..=radius {
        let dy = -distance;
        let mut blocked = false;

        for dx in -distance..=0 {
            let left_slope = (f64::from(dx) - 0.5) / (f64::from(dy) + 0.5);
            let right_slope = (f64::from(dx) + 0.5) / (f64::from(dy) - 0.5);
            if start < right_slope {
                continue;
            }
            if end > left_slope {
                break;
            }

            let p = Point::new(origin.x + dx * xx + dy * xy, origin.y + dx * yx + dy * yy);
            if dx * dx + dy * dy < radius_sq {
                map.reveal(p);
            }

            let opaque = !map.is_transparent(p);
            if blocked {
                if opaque {
                    next_start = right_slope;
                } else {
                    blocked = false;
                    start = next_start;
                }
            } else if opaque && distance < radius {
                blocked = true;
                cast_light(map, origin, radius, distance + 1, start, left_slope, (xx, xy, yx, yy));
                next_start = right_slope;
            }
        }

        if blocked {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::TileKind;

    fn open_room() -> TileMap {
        let mut map = TileMap::filled(21, 21, TileKind::Floor);
        for p in map.bounds().points().collect::<Vec<_>>() {
            if p.x == 0 || p.y == 0 || p.x == 20 || p.y == 20 {
                map.set_kind(p, TileKind::Wall);
            }
        }
        map
    }

    #[test]
    fn origin_is_visible_and_explored() {
        let mut map = open_room();
        let o = Point::new(10, 10);
        compute_fov(&mut map, o, 0);
        assert!(map.is_visible(o));
        assert_eq!(map.visibility_snapshot().visible_count(), 1);
        assert!(map.tile(o).is_some_and(|t| t.explored));
    }

    #[test]
    fn radius_is_a_strict_euclidean_cutoff() {
        let mut map = open_room();
        let o = Point::new(10, 10);
        compute_fov(&mut map, o, 5);
        assert!(map.is_visible(Point::new(14, 10)));
        assert!(!map.is_visible(Point::new(15, 10)));
        // 3-4-5 triangle: distance exactly 5 is out, Chebyshev 4 is in.
        assert!(!map.is_visible(Point::new(13, 14)));
        assert!(map.is_visible(Point::new(13, 13)));
        assert!(!map.is_visible(Point::new(14, 14)));
    }

    #[test]
    fn single_wall_shadows_only_what_lies_behind_it() {
        let o = Point::new(10, 10);
        let mut east = open_room();
        east.set_kind(Point::new(12, 10), TileKind::Wall);
        compute_fov(&mut east, o, 8);

        assert!(east.is_visible(Point::new(12, 10)), "wall face is lit");
        assert!(!east.is_visible(Point::new(14, 10)), "tile behind the wall is dark");
        assert!(east.is_visible(Point::new(14, 13)));
        assert!(east.is_visible(Point::new(14, 7)));
        assert!(east.is_visible(Point::new(8, 10)));

        // Mirror the wall to the west: the lit set mirrors too.
        let mut west = open_room();
        west.set_kind(Point::new(8, 10), TileKind::Wall);
        compute_fov(&mut west, o, 8);
        for p in east.bounds().points() {
            let mirrored = Point::new(20 - p.x, p.y);
            assert_eq!(east.is_visible(p), west.is_visible(mirrored), "{p:?}");
        }
    }

    #[test]
    fn explored_persists_after_moving_away() {
        let mut map = open_room();
        compute_fov(&mut map, Point::new(3, 3), 3);
        assert!(map.is_visible(Point::new(4, 4)));
        compute_fov(&mut map, Point::new(17, 17), 3);
        assert!(!map.is_visible(Point::new(4, 4)));
        assert!(map.tile(Point::new(4, 4)).is_some_and(|t| t.explored));
    }

    #[test]
    fn walls_block_sight_between_rooms() {
        let mut map = open_room();
        for y in 1..20 {
            map.set_kind(Point::new(10, y), TileKind::Wall);
        }
        compute_fov(&mut map, Point::new(5, 10), 10);
        assert!(map.is_visible(Point::new(10, 10)));
        assert!(!map.is_visible(Point::new(12, 10)));
        assert!(!map.is_visible(Point::new(15, 4)));
    }
}
