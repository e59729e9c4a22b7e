//! Property tests for level generation and population.
//!
//! These use `proptest` to draw seeds and configurations and check the
//! structural guarantees every generated level must keep.

use delve_engine::components::{AiBehavior, Color, Glyph};
use delve_engine::gen::bsp::{self, CorridorStyle, GenConfig};
use delve_engine::gen::passable_component_sizes;
use delve_engine::gen::populate::{self, EnemyTemplate, PopulationConfig};
use delve_engine::geom::Rect;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_pcg::Pcg64;

fn style() -> impl Strategy<Value = CorridorStyle> {
    prop_oneof![
        Just(CorridorStyle::LShaped),
        Just(CorridorStyle::ZShaped),
        Just(CorridorStyle::Straight),
    ]
}

fn enemy(cost: u32) -> EnemyTemplate {
    EnemyTemplate {
        name: format!("cost{cost}"),
        glyph: Glyph::new('m', Color::Red),
        threat_cost: cost,
        hp: 5,
        attack: 2,
        defense: 0,
        special: None,
        behavior: AiBehavior::Chase,
        sight_range: 6,
        bounty: 0,
    }
}

/// `n` disjoint 6x6 rooms in a row.
fn rooms(n: i32) -> Vec<Rect> {
    (0..n).map(|i| Rect::new(1 + i * 8, 1, 6, 6)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn every_level_is_one_connected_region(
        seed in any::<u64>(),
        corridor in style(),
        width in 40..100i32,
        height in 24..48i32,
        door_chance_pct in 0..=100u8,
    ) {
        let cfg = GenConfig { width, height, corridor, door_chance_pct, ..GenConfig::default() };
        let generated = bsp::generate(&cfg, &mut Pcg64::seed_from_u64(seed));
        prop_assert_eq!(passable_component_sizes(&generated.map).len(), 1);
        prop_assert!(generated.map.is_walkable(generated.player_start));
    }

    #[test]
    fn rooms_never_overlap(seed in any::<u64>(), corridor in style()) {
        let cfg = GenConfig { corridor, ..GenConfig::default() };
        let generated = bsp::generate(&cfg, &mut Pcg64::seed_from_u64(seed));
        for (i, a) in generated.rooms.iter().enumerate() {
            for b in &generated.rooms[i + 1..] {
                prop_assert!(!a.intersects(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn inscriptions_never_repeat(
        seed in any::<u64>(),
        pool_size in 0..12usize,
        count in 0..16usize,
    ) {
        let cfg = PopulationConfig {
            inscriptions: (0..pool_size).map(|i| format!("line {i}")).collect(),
            inscription_count: count,
            ..PopulationConfig::default()
        };
        let plan = populate::plan(&rooms(5), &cfg, &mut Pcg64::seed_from_u64(seed));
        let mut texts: Vec<&str> = plan.inscriptions().collect();
        prop_assert_eq!(texts.len(), count.min(pool_size));
        texts.sort_unstable();
        texts.dedup();
        prop_assert_eq!(texts.len(), count.min(pool_size));
    }

    #[test]
    fn guarantee_pass_covers_every_interior_room(seed in any::<u64>(), n in 3..9i32) {
        let layout = rooms(n);
        let cfg = PopulationConfig {
            monster_budget: 3 * n as u32,
            enemies: vec![enemy(3), enemy(7)],
            ..PopulationConfig::default()
        };
        let plan = populate::plan(&layout, &cfg, &mut Pcg64::seed_from_u64(seed));
        let positions: Vec<_> = plan.monster_positions().collect();
        for room in &layout[1..layout.len() - 1] {
            prop_assert!(positions.iter().any(|p| room.contains(*p)), "{:?} left empty", room);
        }
        for room in [layout[0], layout[layout.len() - 1]] {
            prop_assert!(!positions.iter().any(|p| room.contains(*p)));
        }
    }
}

#[test]
fn budget_is_never_exceeded_over_a_thousand_seeds() {
    let cfg = PopulationConfig {
        monster_budget: 10,
        enemies: vec![enemy(2), enemy(5), enemy(10)],
        ..PopulationConfig::default()
    };
    let layout = rooms(6);
    for seed in 0..1000 {
        let plan = populate::plan(&layout, &cfg, &mut Pcg64::seed_from_u64(seed));
        let cost = plan.monster_cost();
        assert!(cost <= 10, "seed {seed} spent {cost}");
        assert!(cost >= 9, "seed {seed} left {} unspent", 10 - cost);
    }
}

#[test]
fn elite_comes_on_top_of_the_budget() {
    let cfg = PopulationConfig {
        monster_budget: 4,
        enemies: vec![enemy(2)],
        elite: Some(enemy(50)),
        ..PopulationConfig::default()
    };
    let plan = populate::plan(&rooms(4), &cfg, &mut Pcg64::seed_from_u64(3));
    assert_eq!(plan.monster_cost(), 4);
    assert_eq!(plan.monster_positions().count(), 3);
}
