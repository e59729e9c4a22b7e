//! Property tests for entity store operations.
//!
//! Random sequences of create/destroy/insert/remove/query are applied to a
//! store and to a simple model; the store's invariants must hold after every
//! step.

use std::collections::BTreeMap;

use delve_ecs::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Pos {
    x: i32,
    y: i32,
}

#[derive(Debug, Clone, PartialEq)]
struct Hp(i32);

#[derive(Debug, Clone, PartialEq)]
struct Blocking;

#[derive(Debug, Clone)]
enum StoreOp {
    Create,
    CreatePos(i32, i32),
    Destroy(usize),
    DestroyTwice(usize),
    InsertHp(usize, i32),
    RemoveHp(usize),
    TagBlocking(usize),
    Query,
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        Just(StoreOp::Create),
        (-100i32..100, -100i32..100).prop_map(|(x, y)| StoreOp::CreatePos(x, y)),
        (0..64usize).prop_map(StoreOp::Destroy),
        (0..64usize).prop_map(StoreOp::DestroyTwice),
        (0..64usize, -50i32..50).prop_map(|(i, hp)| StoreOp::InsertHp(i, hp)),
        (0..64usize).prop_map(StoreOp::RemoveHp),
        (0..64usize).prop_map(StoreOp::TagBlocking),
        Just(StoreOp::Query),
    ]
}

#[derive(Default)]
struct Model {
    pos: BTreeMap<EntityId, Pos>,
    hp: BTreeMap<EntityId, Hp>,
    blocking: BTreeMap<EntityId, ()>,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn random_ops_preserve_invariants(ops in prop::collection::vec(store_op_strategy(), 1..60)) {
        let mut store = EntityStore::new();
        let mut alive: Vec<EntityId> = Vec::new();
        let mut dead: Vec<EntityId> = Vec::new();
        let mut model = Model::default();

        for op in ops {
            match op {
                StoreOp::Create => alive.push(store.create()),
                StoreOp::CreatePos(x, y) => {
                    let e = store.create();
                    store.insert(e, Pos { x, y }).unwrap();
                    model.pos.insert(e, Pos { x, y });
                    alive.push(e);
                }
                StoreOp::Destroy(idx) | StoreOp::DestroyTwice(idx) => {
                    if !alive.is_empty() {
                        let e = alive.remove(idx % alive.len());
                        prop_assert!(store.destroy(e));
                        if matches!(op, StoreOp::DestroyTwice(_)) {
                            prop_assert!(!store.destroy(e));
                        }
                        model.pos.remove(&e);
                        model.hp.remove(&e);
                        model.blocking.remove(&e);
                        dead.push(e);
                    }
                }
                StoreOp::InsertHp(idx, hp) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        store.insert(e, Hp(hp)).unwrap();
                        model.hp.insert(e, Hp(hp));
                    }
                }
                StoreOp::RemoveHp(idx) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        prop_assert_eq!(store.remove::<Hp>(e), model.hp.remove(&e));
                    }
                }
                StoreOp::TagBlocking(idx) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        store.insert(e, Blocking).unwrap();
                        model.blocking.insert(e, ());
                    }
                }
                StoreOp::Query => {
                    let expected: Vec<EntityId> = model
                        .pos
                        .keys()
                        .filter(|e| model.hp.contains_key(e))
                        .copied()
                        .collect();
                    prop_assert_eq!(store.query::<(Pos, Hp)>(), expected);
                }
            }

            prop_assert_eq!(store.len(), alive.len());
            prop_assert_eq!(store.count::<Pos>(), model.pos.len());
            prop_assert_eq!(store.count::<Hp>(), model.hp.len());
            prop_assert_eq!(store.count::<Blocking>(), model.blocking.len());

            // No table holds a row for a destroyed entity.
            for &e in &dead {
                prop_assert!(!store.is_alive(e));
                prop_assert!(!store.has::<Pos>(e));
                prop_assert!(!store.has::<Hp>(e));
                prop_assert!(!store.has::<Blocking>(e));
                prop_assert!(store.insert(e, Hp(1)).is_err());
            }
        }
    }
}
