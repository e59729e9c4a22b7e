//! Levels and the registry that owns them.
//!
//! A [`Level`] is built on first access to its depth and then lives for the
//! rest of the process. Everyone standing on a depth shares its store, grid
//! and random source.

use std::collections::{BTreeMap, VecDeque};

use delve_ecs::{EntityId, EntityStore};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use tracing::{debug, info};

use crate::components::{
    Ai, Blocking, Bounty, CombatStats, Color, Effects, Elite, Furniture, Glyph, Health, Hostile,
    Inscription, Item, ItemKind, Name, Npc, NpcRole, PlayerAvatar, Position,
};
use crate::content::{Content, FloorLayout, FloorSpec};
use crate::gen::bsp::{self, GeneratedMap};
use crate::gen::populate::{self, EnemyTemplate, Occupancy, PlacementKind, PopulationPlan};
use crate::gen::{passable_components_excluding, town};
use crate::geom::{Point, Rect};
use crate::map::{TileKind, TileMap, VisibilitySnapshot};
use crate::session::{CarriedState, SessionId};

/// One dungeon floor.
#[derive(Debug)]
pub struct Level {
    pub depth: u32,
    pub name: String,
    pub store: EntityStore,
    pub map: TileMap,
    /// Rooms in generation order: spawn first, stairs down last.
    pub rooms: Vec<Rect>,
    pub rng: Pcg64,
    pub safe_zone: bool,
    /// Where participants appear when (re)spawning here.
    pub spawn: Point,
    pub stairs_up: Option<Point>,
    pub stairs_down: Option<Point>,
    pub monster_budget: u32,
    pub enemies: Vec<EnemyTemplate>,
    /// Ticks left before a respawn wave; `None` while not counting down.
    pub respawn_countdown: Option<u32>,
}

impl Level {
    /// Build the level described by `spec`, seeding its random source with
    /// `seed`.
    pub fn create(spec: &FloorSpec, seed: u64) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        match &spec.layout {
            FloorLayout::Town { width, height } => {
                let town = town::generate(*width, *height, &mut rng);
                let mut level = Self::from_layout(spec, town.layout, rng);
                level.stairs_down = Some(town.stairs_down);
                let roles = [NpcRole::Healer, NpcRole::Merchant, NpcRole::Sage];
                for (role, spot) in roles.into_iter().zip(town.npc_spots) {
                    level.spawn_npc(role, spot);
                }
                level
            }
            FloorLayout::Dungeon(cfg) => {
                let generated = bsp::generate(cfg, &mut rng);
                let mut level = Self::from_layout(spec, generated, rng);
                level.place_stairs();
                let plan = populate::plan(&level.rooms, &spec.population, &mut level.rng);
                level.materialize(&plan);
                level
            }
        }
    }

    fn from_layout(spec: &FloorSpec, layout: GeneratedMap, rng: Pcg64) -> Self {
        Self {
            depth: spec.depth,
            name: spec.name.clone(),
            store: EntityStore::new(),
            map: layout.map,
            rooms: layout.rooms,
            rng,
            safe_zone: spec.safe_zone,
            spawn: layout.player_start,
            stairs_up: None,
            stairs_down: None,
            monster_budget: spec.population.monster_budget,
            enemies: spec.population.enemies.clone(),
            respawn_countdown: None,
        }
    }

    /// An unpopulated level over an existing grid.
    pub fn from_map(depth: u32, map: TileMap, rooms: Vec<Rect>, seed: u64) -> Self {
        let spawn = rooms.first().map_or(Point::new(1, 1), Rect::center);
        Self {
            depth,
            name: format!("Depth {depth}"),
            store: EntityStore::new(),
            map,
            rooms,
            rng: Pcg64::seed_from_u64(seed),
            safe_zone: false,
            spawn,
            stairs_up: None,
            stairs_down: None,
            monster_budget: 0,
            enemies: Vec::new(),
            respawn_countdown: None,
        }
    }

    /// Stairs up on the spawn point, stairs down in the last room.
    fn place_stairs(&mut self) {
        let up = self.spawn;
        self.map.set_kind(up, TileKind::StairsUp);
        self.stairs_up = Some(up);

        let Some(last) = self.rooms.last().copied() else {
            return;
        };
        let mut down = last.center();
        if down == up {
            down = Point::new(last.x, last.y);
        }
        self.map.set_kind(down, TileKind::StairsDown);
        self.stairs_down = Some(down);
    }

    /// Rooms that may hold monsters: all but the first and last.
    pub fn placeable_rooms(&self) -> &[Rect] {
        if self.rooms.len() > 2 {
            &self.rooms[1..self.rooms.len() - 1]
        } else {
            &[]
        }
    }

    // -- population ---------------------------------------------------------

    /// Turn a population plan into entities.
    ///
    /// Furniture that would cut the level in two is left out.
    pub fn materialize(&mut self, plan: &PopulationPlan) {
        let mut furniture_spots: Vec<Point> = Vec::new();
        let mut skipped = 0usize;
        for placement in &plan.placements {
            let pos = placement.pos;
            match &placement.what {
                PlacementKind::Monster(t) => {
                    self.spawn_monster(t, pos, false);
                }
                PlacementKind::Elite(t) => {
                    self.spawn_monster(t, pos, true);
                }
                PlacementKind::Item(kind) => {
                    self.spawn_item(kind.clone(), pos);
                }
                PlacementKind::Equipment(piece) => {
                    self.spawn_item(ItemKind::Equipment(piece.clone()), pos);
                }
                PlacementKind::Inscription(text) => {
                    self.store
                        .spawn()
                        .with(Position(pos))
                        .with(Inscription(text.clone()))
                        .with(Glyph::new('~', Color::Gray));
                }
                PlacementKind::Furniture(f) => {
                    let splits = passable_components_excluding(&self.map, |p| {
                        p == pos || furniture_spots.contains(&p)
                    })
                    .len()
                        > 1;
                    if splits || !self.map.is_walkable(pos) || !self.entities_at(pos).is_empty() {
                        skipped += 1;
                        continue;
                    }
                    furniture_spots.push(pos);
                    self.store
                        .spawn()
                        .with(Position(pos))
                        .with(Name(f.name.clone()))
                        .with(f.glyph)
                        .with(Blocking)
                        .with(Furniture {
                            name: f.name.clone(),
                            rarity: f.rarity,
                            searched: false,
                        });
                }
            }
        }
        debug!(
            depth = self.depth,
            entities = self.store.len(),
            furniture_skipped = skipped,
            "materialized level population"
        );
    }

    pub fn spawn_monster(&mut self, t: &EnemyTemplate, pos: Point, elite: bool) -> EntityId {
        let builder = self
            .store
            .spawn()
            .with(Position(pos))
            .with(Health::full(t.hp))
            .with(CombatStats {
                attack: t.attack,
                defense: t.defense,
                special: t.special,
            })
            .with(Ai {
                behavior: t.behavior,
                sight_range: t.sight_range,
            })
            .with(Name(t.name.clone()))
            .with(t.glyph)
            .with(Effects::default())
            .with(Blocking)
            .with(Hostile)
            .with(Bounty(t.bounty));
        if elite {
            builder.with(Elite).id()
        } else {
            builder.id()
        }
    }

    pub fn spawn_item(&mut self, kind: ItemKind, pos: Point) -> EntityId {
        let glyph = match &kind {
            ItemKind::Consumable(_) => Glyph::new('!', Color::Magenta),
            ItemKind::Equipment(_) => Glyph::new('[', Color::Cyan),
            ItemKind::Gold(_) => Glyph::new('$', Color::Yellow),
        };
        self.store
            .spawn()
            .with(Position(pos))
            .with(Name(kind.name()))
            .with(glyph)
            .with(Item(kind))
            .id()
    }

    pub fn spawn_npc(&mut self, role: NpcRole, pos: Point) -> EntityId {
        let (name, glyph) = match role {
            NpcRole::Healer => ("healer", Glyph::new('H', Color::Green)),
            NpcRole::Merchant => ("merchant", Glyph::new('M', Color::Yellow)),
            NpcRole::Sage => ("sage", Glyph::new('S', Color::Blue)),
        };
        self.store
            .spawn()
            .with(Position(pos))
            .with(Name(name.to_string()))
            .with(glyph)
            .with(Blocking)
            .with(Npc { role })
            .id()
    }

    /// Create a participant's avatar at `pos` from carried state.
    pub fn spawn_avatar(
        &mut self,
        session: SessionId,
        name: &str,
        color: Color,
        stats: CombatStats,
        carried: CarriedState,
        pos: Point,
    ) -> EntityId {
        self.store
            .spawn()
            .with(Position(pos))
            .with(Name(name.to_string()))
            .with(Glyph::new('@', color))
            .with(stats)
            .with(carried.health)
            .with(carried.inventory)
            .with(carried.equipment)
            .with(carried.effects)
            .with(Blocking)
            .with(PlayerAvatar { session })
            .id()
    }

    // -- spatial lookups ----------------------------------------------------

    pub fn position(&self, e: EntityId) -> Option<Point> {
        self.store.get::<Position>(e).map(|p| p.0)
    }

    /// Every entity standing on `p`, in id order.
    pub fn entities_at(&self, p: Point) -> Vec<EntityId> {
        self.store
            .iter::<Position>()
            .filter(|(_, pos)| pos.0 == p)
            .map(|(e, _)| e)
            .collect()
    }

    /// The first blocking entity on `p`.
    pub fn blocker_at(&self, p: Point) -> Option<EntityId> {
        self.entities_at(p).into_iter().find(|e| self.store.has::<Blocking>(*e))
    }

    /// The walkable, unblocked tile closest to `p` by breadth-first search,
    /// or `p` itself when none exists.
    pub fn free_tile_near(&self, p: Point) -> Point {
        let w = self.map.width();
        let mut seen = vec![false; (w * self.map.height()) as usize];
        let mut queue = VecDeque::new();
        if self.map.in_bounds(p) {
            seen[(p.y * w + p.x) as usize] = true;
            queue.push_back(p);
        }
        while let Some(q) = queue.pop_front() {
            if self.map.is_walkable(q) && self.blocker_at(q).is_none() {
                return q;
            }
            for dir in crate::geom::Direction::ALL {
                let n = q.step(dir);
                if self.map.in_bounds(n) && !seen[(n.y * w + n.x) as usize] && self.map.is_walkable(n) {
                    seen[(n.y * w + n.x) as usize] = true;
                    queue.push_back(n);
                }
            }
        }
        p
    }

    pub fn hostile_count(&self) -> usize {
        self.store.count::<Hostile>()
    }

    /// Avatars on this level, in entity order.
    pub fn participants(&self) -> Vec<(EntityId, SessionId)> {
        self.store.iter::<PlayerAvatar>().map(|(e, p)| (e, p.session)).collect()
    }

    // -- enemy respawn ------------------------------------------------------

    /// Advance the enemy-respawn countdown by one tick.
    ///
    /// The countdown starts when the level is cleared of hostiles while
    /// participants are present, pauses while nobody is here and is cancelled
    /// if a hostile shows up. At zero a wave worth half the monster budget is
    /// spawned out of everyone's sight. Returns the size of a spawned wave.
    pub fn advance_respawn(&mut self, present: bool, delay: u32, views: &[&VisibilitySnapshot]) -> Option<usize> {
        if self.safe_zone || self.monster_budget == 0 || !present {
            return None;
        }
        if self.hostile_count() > 0 {
            if self.respawn_countdown.take().is_some() {
                debug!(depth = self.depth, "respawn countdown cancelled");
            }
            return None;
        }
        let remaining = match self.respawn_countdown {
            None => {
                debug!(depth = self.depth, delay, "level cleared, respawn countdown started");
                self.respawn_countdown = Some(delay);
                return None;
            }
            Some(n) => n.saturating_sub(1),
        };
        if remaining > 0 {
            self.respawn_countdown = Some(remaining);
            return None;
        }
        self.respawn_countdown = None;
        Some(self.spawn_wave(views))
    }

    fn spawn_wave(&mut self, views: &[&VisibilitySnapshot]) -> usize {
        let in_view = |p: Point| views.iter().any(|v| v.is_visible(p));
        let taken: Vec<Point> = self.store.iter::<Position>().map(|(_, p)| p.0).collect();
        let mut occupied = Occupancy::with_reserved(taken.iter().copied());
        for p in self.map.bounds().points().filter(|p| in_view(*p)) {
            occupied.reserve(p);
        }

        let rooms = self.placeable_rooms().to_vec();
        let enemies = self.enemies.clone();
        let mut placements = Vec::new();
        populate::spend_budget(
            &rooms,
            &enemies,
            self.monster_budget / 2,
            &mut occupied,
            &mut self.rng,
            &mut placements,
        );

        let mut spawned = 0;
        for placement in placements {
            let pos = placement.pos;
            if in_view(pos) || !self.map.is_walkable(pos) || self.blocker_at(pos).is_some() {
                continue;
            }
            if let PlacementKind::Monster(t) = &placement.what {
                self.spawn_monster(t, pos, false);
                spawned += 1;
            }
        }
        info!(depth = self.depth, spawned, "enemy respawn wave");
        spawned
    }

    // -- determinism --------------------------------------------------------

    /// BLAKE3 hex digest over the tile grid and every positioned entity.
    pub fn state_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.depth.to_le_bytes());
        hasher.update(&self.map.width().to_le_bytes());
        hasher.update(&self.map.height().to_le_bytes());
        for tile in self.map.tiles() {
            hasher.update(&[tile.kind as u8]);
        }
        for (e, pos) in self.store.iter::<Position>() {
            hasher.update(&e.to_raw().to_le_bytes());
            hasher.update(&pos.0.x.to_le_bytes());
            hasher.update(&pos.0.y.to_le_bytes());
            if let Some(hp) = self.store.get::<Health>(e) {
                hasher.update(&hp.hp.to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Every level created so far, keyed by depth.
#[derive(Debug)]
pub struct LevelRegistry {
    seed: u64,
    levels: BTreeMap<u32, Level>,
}

impl LevelRegistry {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            levels: BTreeMap::new(),
        }
    }

    /// Seed of the level at `depth`, derived from the world seed.
    pub fn level_seed(&self, depth: u32) -> u64 {
        self.seed ^ u64::from(depth).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    /// The level at `depth`, built from `content` on first access.
    pub fn get_or_create(&mut self, depth: u32, content: &dyn Content) -> &mut Level {
        let seed = self.level_seed(depth);
        self.levels.entry(depth).or_insert_with(|| {
            let spec = content.floor(depth);
            let level = Level::create(&spec, seed);
            info!(
                depth,
                name = %level.name,
                rooms = level.rooms.len(),
                entities = level.store.len(),
                "level created"
            );
            level
        })
    }

    pub fn get(&self, depth: u32) -> Option<&Level> {
        self.levels.get(&depth)
    }

    pub fn get_mut(&mut self, depth: u32) -> Option<&mut Level> {
        self.levels.get_mut(&depth)
    }

    pub fn depths(&self) -> Vec<u32> {
        self.levels.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
