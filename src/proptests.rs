use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

fn validate_tree<V>(t: &ScapegoatTree<u16, V>) {
    // Arena accounting: live slots match the size counter, vacated slots are
    // all on the free list.
    let live = t.slots.iter().filter(|slot| slot.is_some()).count();
    assert_eq!(live, t.len, "live slot count must match len");
    assert_eq!(
        live + t.free.len(),
        t.slots.len(),
        "every vacant slot must be on the free list"
    );
    assert!(t.high_water >= t.len, "high-water mark must dominate len");

    // Reachability and BST order.
    let mut keys = Vec::new();
    collect_in_order(t, t.root, &mut keys);
    assert_eq!(keys.len(), t.len, "traversal count must match len");
    assert!(
        keys.windows(2).all(|w| w[0] < w[1]),
        "in-order keys must be strictly increasing"
    );
}

fn collect_in_order<V>(t: &ScapegoatTree<u16, V>, r: Ref, out: &mut Vec<u16>) {
    if r.is_null() {
        return;
    }
    let node = t.node(r);
    collect_in_order(t, node.left, out);
    out.push(node.key);
    collect_in_order(t, node.right, out);
}

#[derive(Clone, Debug)]
enum Op {
    Insert(u16, u64),
    Remove(u16),
    Get(u16),
}

fn key_strategy() -> impl Strategy<Value = u16> + Clone {
    // A narrow key space so inserts collide with live keys (exercising the
    // DuplicateKey path) and removals hit often enough to trigger global
    // rebuilds.
    0u16..300
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        30 => key.clone().prop_map(Op::Remove),
        20 => key.prop_map(Op::Get),
    ];
    prop::collection::vec(op, 0..=1500)
}

fn unique_keys_two_orders() -> impl Strategy<Value = (Vec<u16>, Vec<u16>)> {
    prop::collection::hash_set(any::<u16>(), 1..200).prop_flat_map(|set| {
        let keys: Vec<u16> = set.into_iter().collect();
        (Just(keys.clone()).prop_shuffle(), Just(keys).prop_shuffle())
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    /// Mixed workload behaves exactly like `BTreeMap`, modulo the
    /// insert-rejects-duplicates contract.
    #[test]
    fn prop_equivalence(ops in ops_strategy()) {
        let mut t: ScapegoatTree<u16, u64> = ScapegoatTree::new();
        let mut m: BTreeMap<u16, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => match t.insert(key, value) {
                    Ok(()) => {
                        prop_assert_eq!(m.insert(key, value), None);
                    }
                    Err(TreeError::DuplicateKey(k, v)) => {
                        prop_assert_eq!(k, key);
                        prop_assert_eq!(v, value);
                        prop_assert!(m.contains_key(&key));
                    }
                },
                Op::Remove(key) => {
                    prop_assert_eq!(t.remove(&key), m.remove(&key));
                }
                Op::Get(key) => {
                    prop_assert_eq!(t.get(&key), m.get(&key));
                }
            }

            prop_assert_eq!(t.len(), m.len());
            prop_assert_eq!(t.is_empty(), m.is_empty());
        }

        validate_tree(&t);
        if !t.is_empty() {
            // Deletions never deepen the tree, so depth stays bounded by the
            // balance limit for the high-water size.
            prop_assert!(t.height() <= h_alpha(t.alpha, t.high_water) + 1);
        }
        let mut got: Vec<(u16, u64)> = t.entries().map(|(k, v)| (*k, *v)).collect();
        got.sort();
        let expected: Vec<(u16, u64)> = m.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(got, expected);
    }

    /// With insertions only, the tree never exceeds the alpha height bound
    /// for its current size: every over-deep insertion must be repaired by a
    /// local scapegoat rebuild before returning.
    #[test]
    fn prop_insert_only_height_bound(keys in prop::collection::vec(any::<u16>(), 1..400)) {
        let mut t: ScapegoatTree<u16, ()> = ScapegoatTree::new();

        for key in keys {
            match t.insert(key, ()) {
                Ok(()) | Err(TreeError::DuplicateKey(..)) => {}
            }
            prop_assert!(
                t.height() <= h_alpha(t.alpha, t.len()),
                "height {} exceeds h_alpha({}) = {}",
                t.height(),
                t.len(),
                h_alpha(t.alpha, t.len())
            );
        }

        validate_tree(&t);
    }

    /// Inserting N distinct keys and removing all of them, in independent
    /// random orders, yields an empty tree with every arena slot recycled.
    #[test]
    fn prop_round_trip_empties_the_tree((insert_order, remove_order) in unique_keys_two_orders()) {
        let mut t: ScapegoatTree<u16, u16> = ScapegoatTree::new();

        for key in &insert_order {
            t.insert(*key, *key).unwrap();
        }
        prop_assert_eq!(t.len(), insert_order.len());
        validate_tree(&t);

        for key in &remove_order {
            prop_assert_eq!(t.remove(key), Some(*key));
        }
        prop_assert_eq!(t.len(), 0);
        prop_assert!(t.is_empty());
        prop_assert!(t.root.is_null());
        prop_assert_eq!(t.free.len(), t.slots.len());
    }

    /// Queries never mutate: repeated lookups agree with themselves and with
    /// the pre-order enumeration.
    #[test]
    fn prop_get_is_idempotent(keys in prop::collection::hash_set(any::<u16>(), 0..100), probe in any::<u16>()) {
        let mut t: ScapegoatTree<u16, u16> = ScapegoatTree::new();
        for key in &keys {
            t.insert(*key, key.wrapping_mul(3)).unwrap();
        }

        let first = t.get(&probe).copied();
        for _ in 0..4 {
            prop_assert_eq!(t.get(&probe).copied(), first);
        }
        prop_assert_eq!(first.is_some(), keys.contains(&probe));
        prop_assert_eq!(t.entries().count(), keys.len());
    }
}
