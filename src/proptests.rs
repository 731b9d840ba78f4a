use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

use crate::tests::validate;

#[derive(Clone, Debug)]
enum Op {
    Insert(Vec<u8>, u64),
    Remove(Vec<u8>),
    Get(Vec<u8>),
    Optimize,
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // Short keys over a small alphabet force shared prefixes, which is where
    // removal and pruning earn their keep.
    prop::collection::vec(0u8..=7, 1..=8)
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        25 => key.clone().prop_map(Op::Remove),
        20 => key.clone().prop_map(Op::Get),
        5 => Just(Op::Optimize),
    ];
    prop::collection::vec(op, 0..=400)
}

fn apply(ops: &[Op]) -> (TernaryTree<u8, u64>, BTreeMap<Vec<u8>, u64>) {
    let mut t: TernaryTree<u8, u64> = TernaryTree::new();
    let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
    for op in ops {
        match op {
            Op::Insert(key, value) => {
                t.insert(key, *value);
                m.insert(key.clone(), *value);
            }
            Op::Remove(key) => {
                t.remove(key);
                m.remove(key);
            }
            Op::Get(key) => {
                let _ = t.get(key);
            }
            Op::Optimize => t.optimize(),
        }
    }
    (t, m)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 192,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in ops_strategy()) {
        let mut t: TernaryTree<u8, u64> = TernaryTree::new();
        let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    t.insert(&key, value);
                    m.insert(key, value);
                }
                Op::Remove(key) => {
                    let was_stored = m.remove(&key).is_some();
                    let changed = t.remove(&key);
                    if was_stored {
                        prop_assert!(changed, "removing a stored key must change the tree");
                    }
                }
                Op::Get(key) => {
                    prop_assert_eq!(t.get(&key), m.get(&key));
                }
                Op::Optimize => t.optimize(),
            }

            prop_assert_eq!(t.payload_count(), m.len());
        }

        validate(&t);
        for (key, value) in &m {
            prop_assert_eq!(t.get(key), Some(value));
        }
    }

    #[test]
    fn prop_optimize_is_structure_preserving(ops in ops_strategy()) {
        let (mut t, m) = apply(&ops);
        t.optimize();
        validate(&t);
        prop_assert_eq!(t.payload_count(), m.len());
        for (key, value) in &m {
            prop_assert_eq!(t.get(key), Some(value));
        }
    }

    #[test]
    fn prop_persistence_round_trip(ops in ops_strategy()) {
        let (mut t, m) = apply(&ops);

        let text = t.save_to_string(|tok| tok.to_string(), |p| p.to_string());
        let mut loaded: TernaryTree<u8, u64> = TernaryTree::new();
        loaded
            .load_from_str(&text, |s| s.parse().unwrap(), |s| s.parse().unwrap())
            .unwrap();

        prop_assert_eq!(loaded.node_count(), t.node_count());
        prop_assert_eq!(loaded.payload_count(), t.payload_count());
        validate(&loaded);
        for (key, value) in &m {
            prop_assert_eq!(loaded.get(key), Some(value));
        }
    }
}

#[test]
fn random_insert_order_agrees_with_model() {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let mut keys: Vec<Vec<u8>> = (0..200u32)
        .map(|i| format!("k{i:03}").into_bytes())
        .collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xA11CE);

    for round in 0..8 {
        keys.shuffle(&mut rng);
        let mut t: TernaryTree<u8, u64> = TernaryTree::new();
        for (i, key) in keys.iter().enumerate() {
            t.insert(key, i as u64);
        }
        if round % 2 == 0 {
            t.optimize();
        }
        validate(&t);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(t.get(key), Some(&(i as u64)), "round {round}");
        }
    }
}
