//! Tile grid for one level.
//!
//! A tile's walkability and transparency follow from its [`TileKind`]. The
//! `explored` flag is persistent; `visible` is rewritten by every field-of-view
//! pass and copied into each participant's [`VisibilitySnapshot`].

use serde::{Deserialize, Serialize};

use crate::geom::{Point, Rect};

/// What occupies a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Wall,
    Floor,
    DoorClosed,
    DoorOpen,
    StairsUp,
    StairsDown,
    Grass,
    Tree,
    Water,
}

impl TileKind {
    pub fn is_walkable(self) -> bool {
        matches!(
            self,
            TileKind::Floor
                | TileKind::DoorOpen
                | TileKind::StairsUp
                | TileKind::StairsDown
                | TileKind::Grass
        )
    }

    pub fn is_transparent(self) -> bool {
        !matches!(self, TileKind::Wall | TileKind::DoorClosed | TileKind::Tree)
    }
}

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub kind: TileKind,
    pub walkable: bool,
    pub transparent: bool,
    pub explored: bool,
    pub visible: bool,
}

impl Tile {
    pub fn new(kind: TileKind) -> Self {
        Self {
            kind,
            walkable: kind.is_walkable(),
            transparent: kind.is_transparent(),
            explored: false,
            visible: false,
        }
    }
}

/// Row-major grid of tiles.
#[derive(Debug, Clone)]
pub struct TileMap {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

impl TileMap {
    /// A map filled with `kind`.
    pub fn filled(width: i32, height: i32, kind: TileKind) -> Self {
        assert!(width > 0 && height > 0, "map dimensions must be positive");
        Self {
            width,
            height,
            tiles: vec![Tile::new(kind); (width * height) as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn in_bounds(&self, p: Point) -> bool {
        p.x >= 0 && p.y >= 0 && p.x < self.width && p.y < self.height
    }

    fn index(&self, p: Point) -> Option<usize> {
        self.in_bounds(p)
            .then(|| (p.y * self.width + p.x) as usize)
    }

    pub fn tile(&self, p: Point) -> Option<&Tile> {
        self.index(p).map(|i| &self.tiles[i])
    }

    pub fn tile_mut(&mut self, p: Point) -> Option<&mut Tile> {
        let i = self.index(p)?;
        Some(&mut self.tiles[i])
    }

    pub fn kind(&self, p: Point) -> Option<TileKind> {
        self.tile(p).map(|t| t.kind)
    }

    /// Replace the kind of a tile, keeping its exploration flags.
    pub fn set_kind(&mut self, p: Point, kind: TileKind) {
        if let Some(tile) = self.tile_mut(p) {
            tile.kind = kind;
            tile.walkable = kind.is_walkable();
            tile.transparent = kind.is_transparent();
        }
    }

    /// Out-of-bounds points are not walkable.
    pub fn is_walkable(&self, p: Point) -> bool {
        self.tile(p).is_some_and(|t| t.walkable)
    }

    /// Out-of-bounds points are opaque.
    pub fn is_transparent(&self, p: Point) -> bool {
        self.tile(p).is_some_and(|t| t.transparent)
    }

    pub fn is_visible(&self, p: Point) -> bool {
        self.tile(p).is_some_and(|t| t.visible)
    }

    /// Turn a closed door into an open one. Returns whether a door was opened.
    pub fn open_door(&mut self, p: Point) -> bool {
        if self.kind(p) == Some(TileKind::DoorClosed) {
            self.set_kind(p, TileKind::DoorOpen);
            true
        } else {
            false
        }
    }

    pub fn clear_visible(&mut self) {
        for tile in &mut self.tiles {
            tile.visible = false;
        }
    }

    /// Mark a tile visible and explored.
    pub fn reveal(&mut self, p: Point) {
        if let Some(tile) = self.tile_mut(p) {
            tile.visible = true;
            tile.explored = true;
        }
    }

    /// Every walkable point, row-major.
    pub fn walkable_points(&self) -> Vec<Point> {
        self.bounds()
            .points()
            .filter(|p| self.is_walkable(*p))
            .collect()
    }

    /// Copy the current visibility flags out of the shared grid.
    pub fn visibility_snapshot(&self) -> VisibilitySnapshot {
        VisibilitySnapshot {
            width: self.width,
            height: self.height,
            visible: self.tiles.iter().map(|t| t.visible).collect(),
            explored: self.tiles.iter().map(|t| t.explored).collect(),
        }
    }

    pub(crate) fn tiles(&self) -> &[Tile] {
        &self.tiles
    }
}

/// A participant-private copy of a grid's visibility flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilitySnapshot {
    width: i32,
    height: i32,
    visible: Vec<bool>,
    explored: Vec<bool>,
}

impl VisibilitySnapshot {
    fn index(&self, p: Point) -> Option<usize> {
        (p.x >= 0 && p.y >= 0 && p.x < self.width && p.y < self.height)
            .then(|| (p.y * self.width + p.x) as usize)
    }

    pub fn is_visible(&self, p: Point) -> bool {
        self.index(p).is_some_and(|i| self.visible[i])
    }

    pub fn is_explored(&self, p: Point) -> bool {
        self.index(p).is_some_and(|i| self.explored[i])
    }

    pub fn visible_count(&self) -> usize {
        self.visible.iter().filter(|v| **v).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_flags_follow_kind() {
        let wall = Tile::new(TileKind::Wall);
        assert!(!wall.walkable && !wall.transparent);
        let door = Tile::new(TileKind::DoorClosed);
        assert!(!door.walkable && !door.transparent);
        let water = Tile::new(TileKind::Water);
        assert!(!water.walkable && water.transparent);
        let grass = Tile::new(TileKind::Grass);
        assert!(grass.walkable && grass.transparent);
    }

    #[test]
    fn opening_a_door_makes_it_passable() {
        let mut map = TileMap::filled(3, 3, TileKind::Floor);
        let p = Point::new(1, 1);
        map.set_kind(p, TileKind::DoorClosed);
        assert!(!map.is_walkable(p));
        assert!(map.open_door(p));
        assert!(map.is_walkable(p) && map.is_transparent(p));
        assert!(!map.open_door(p));
    }

    #[test]
    fn out_of_bounds_is_wall_like() {
        let map = TileMap::filled(2, 2, TileKind::Floor);
        assert!(!map.is_walkable(Point::new(-1, 0)));
        assert!(!map.is_transparent(Point::new(2, 0)));
        assert!(map.tile(Point::new(0, 5)).is_none());
    }

    #[test]
    fn snapshot_is_independent_of_later_changes() {
        let mut map = TileMap::filled(4, 4, TileKind::Floor);
        map.reveal(Point::new(1, 1));
        let snap = map.visibility_snapshot();
        map.clear_visible();
        map.reveal(Point::new(2, 2));
        assert!(snap.is_visible(Point::new(1, 1)));
        assert!(!snap.is_visible(Point::new(2, 2)));
        assert!(snap.is_explored(Point::new(1, 1)));
        assert_eq!(snap.visible_count(), 1);
    }
}
