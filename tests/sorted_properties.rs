//! Sorted-collection behavior under randomized and scripted workloads,
//! checked against a plain sorted-`Vec` model.

use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use tether::{KeyOrder, RelativePosition, RemoveOptions, SortedAvl};

#[test]
fn insertion_keeps_balance_and_order_at_every_step() {
    let mut avl: SortedAvl<i32> = SortedAvl::new();
    for key in [5, 3, 8, 1, 4, 7, 9, 2, 6] {
        assert!(avl.add(key));
        avl.check_invariants();
    }
    assert_eq!(avl.iter().copied().collect::<Vec<_>>(), (1..=9).collect::<Vec<_>>());
}

#[test]
fn multi_key_run_reports_count_and_reaches_both_ends() {
    let order = |a: &(u32, char), b: &(u32, char)| {
        if a.0 < b.0 {
            KeyOrder::Less
        } else if a.0 > b.0 {
            KeyOrder::Greater
        } else {
            KeyOrder::Equal
        }
    };
    let mut avl = SortedAvl::multi_with_comparator(order);
    for (i, payload) in ['p', 'q', 'r', 's', 't'].into_iter().enumerate() {
        avl.add((40, payload));
        avl.add((i as u32, '_'));
        avl.add((100 + i as u32, '_'));
    }
    avl.check_invariants();

    let mut cur = avl.cursor();
    let found = avl.locate(&(40, '?'), &mut cur);
    assert!(found.is_exact());
    assert_eq!(found.count, 5);

    // Equal keys keep insertion order; the run ends are reachable from
    // any hit inside it.
    avl.set_to_run_first(&mut cur);
    assert_eq!(avl.get(&cur), Some(&(40, 'p')));
    avl.set_to_run_last(&mut cur);
    assert_eq!(avl.get(&cur), Some(&(40, 't')));
    avl.set_to_run_index(&mut cur, 4, 2);
    assert_eq!(avl.get(&cur), Some(&(40, 'r')));
}

#[test]
fn locate_miss_is_a_usable_insertion_hint() {
    let mut avl: SortedAvl<i32> = SortedAvl::new();
    for key in [10, 20, 30] {
        avl.add(key);
    }
    let mut cur = avl.cursor();
    let miss = avl.locate(&25, &mut cur);
    assert!(!miss.is_exact());
    assert_ne!(miss.relation, RelativePosition::Undefined);

    avl.add_at(25, &cur, miss.relation);
    avl.check_invariants();
    assert_eq!(avl.iter().copied().collect::<Vec<_>>(), vec![10, 20, 25, 30]);
}

#[test]
fn shuffled_bulk_insert_then_drain_stays_balanced() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let mut keys: Vec<u32> = (0..2048).collect();
    keys.shuffle(&mut rng);

    let mut avl: SortedAvl<u32> = SortedAvl::new();
    for &key in &keys {
        avl.add(key);
    }
    avl.check_invariants();
    assert_eq!(avl.count(), 2048);

    // Drain in a different random order; the shape must hold at every step.
    keys.shuffle(&mut rng);
    for key in keys {
        assert!(avl.remove_key(&key, &RemoveOptions::new().detach()).is_some());
        avl.check_invariants();
    }
    assert!(avl.is_empty());
}

#[derive(Clone, Debug)]
enum Op {
    Add(u8),
    RemoveKey(u8),
    RemoveFirst,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u8>().prop_map(Op::Add),
        2 => any::<u8>().prop_map(Op::RemoveKey),
        1 => Just(Op::RemoveFirst),
    ]
}

proptest! {
    /// Random add/remove interleavings agree with a sorted-Vec model and
    /// never break the shape invariants. A long-lived cursor rides along
    /// the whole sequence: after every operation it must be either honestly
    /// invalid or parked on an element the model still contains, never
    /// silently dangling on a recycled slot.
    #[test]
    fn random_ops_match_sorted_vec_model(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let mut avl: SortedAvl<u8> = SortedAvl::new_multi();
        let mut model: Vec<u8> = Vec::new();
        let mut watcher = avl.cursor();

        for op in ops {
            match op {
                Op::Add(key) => {
                    avl.add(key);
                    let at = model.partition_point(|&k| k <= key);
                    model.insert(at, key);
                }
                Op::RemoveKey(key) => {
                    let taken = avl.remove_key(&key, &RemoveOptions::new().detach());
                    match model.iter().position(|&k| k == key) {
                        Some(at) => {
                            prop_assert_eq!(taken, Some(model.remove(at)));
                        }
                        None => prop_assert_eq!(taken, None),
                    }
                }
                Op::RemoveFirst => {
                    let mut cur = avl.cursor();
                    if cur.set_to_first(&avl) {
                        let taken = avl.remove(&mut cur, &RemoveOptions::new().detach());
                        prop_assert_eq!(taken, Some(model.remove(0)));
                    } else {
                        prop_assert!(model.is_empty());
                    }
                }
            }
            avl.check_invariants();
            if let Some(&held) = watcher.element(&avl) {
                prop_assert!(
                    model.contains(&held),
                    "cursor survived on a removed element: {}",
                    held
                );
            }
            // Re-anchor a knocked-off cursor so the next step checks a
            // live one again.
            if !watcher.is_valid() {
                watcher.set_to_first(&avl);
            }
        }

        prop_assert_eq!(avl.iter().copied().collect::<Vec<_>>(), model);
    }

    /// Walking a cursor forward visits exactly the in-order sequence.
    #[test]
    fn cursor_walk_agrees_with_iterator(keys in prop::collection::vec(any::<u16>(), 0..100)) {
        let mut avl: SortedAvl<u16> = SortedAvl::new_multi();
        for &key in &keys {
            avl.add(key);
        }
        let mut walked = Vec::new();
        let mut cur = avl.cursor();
        while cur.set_to_next(&avl) {
            walked.push(*cur.element(&avl).unwrap());
        }
        prop_assert_eq!(walked, avl.iter().copied().collect::<Vec<_>>());
    }
}
