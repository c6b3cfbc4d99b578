//! Property-based tests for the concurrent map using proptest
//!
//! Random operation sequences are applied both to a [`ConcurrentMap`] and to a
//! `std::collections::HashMap` model; every result and the final contents must agree.

use super::ConcurrentMap;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone)]
enum Op {
    Load(u8),
    Store(u8, u16),
    Delete(u8),
    LoadAndDelete(u8),
    LoadOrStore(u8, u16),
    Swap(u8, u16),
    CompareAndSwap(u8, u16, u16),
    CompareAndDelete(u8, u16),
    Range,
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    // A small key and value space makes hits and compare matches likely
    let key = 0u8..16;
    let value = 0u16..8;
    prop_oneof![
        4 => key.clone().prop_map(Op::Load),
        4 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::Store(k, v)),
        2 => key.clone().prop_map(Op::Delete),
        2 => key.clone().prop_map(Op::LoadAndDelete),
        3 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::LoadOrStore(k, v)),
        2 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::Swap(k, v)),
        3 => (key.clone(), value.clone(), value.clone()).prop_map(|(k, o, n)| Op::CompareAndSwap(k, o, n)),
        2 => (key.clone(), value.clone()).prop_map(|(k, o)| Op::CompareAndDelete(k, o)),
        1 => Just(Op::Range),
        1 => Just(Op::Clear),
    ]
}

fn contents(map: &ConcurrentMap<u8, u16>) -> HashMap<u8, u16> {
    let mut seen = HashMap::new();
    map.range(|key, value| {
        assert!(seen.insert(*key, *value).is_none(), "key {} visited twice", key);
        true
    });
    seen
}

#[cfg(test)]
mod sequential_properties {
    use super::*;

    proptest! {
        #[test]
        fn test_matches_hashmap_model(ops in prop::collection::vec(op_strategy(), 1..200)) {
            let map: ConcurrentMap<u8, u16> = ConcurrentMap::new();
            let mut model: HashMap<u8, u16> = HashMap::new();

            for op in ops {
                match op {
                    Op::Load(k) => {
                        prop_assert_eq!(map.load(&k), model.get(&k).copied());
                    }
                    Op::Store(k, v) => {
                        map.store(k, v);
                        model.insert(k, v);
                    }
                    Op::Delete(k) => {
                        map.delete(&k);
                        model.remove(&k);
                    }
                    Op::LoadAndDelete(k) => {
                        prop_assert_eq!(map.load_and_delete(&k), model.remove(&k));
                    }
                    Op::LoadOrStore(k, v) => {
                        let expected = match model.get(&k) {
                            Some(existing) => (*existing, true),
                            None => {
                                model.insert(k, v);
                                (v, false)
                            }
                        };
                        prop_assert_eq!(map.load_or_store(k, v), expected);
                    }
                    Op::Swap(k, v) => {
                        prop_assert_eq!(map.swap(k, v), model.insert(k, v));
                    }
                    Op::CompareAndSwap(k, old, new) => {
                        let expected = model.get(&k) == Some(&old);
                        if expected {
                            model.insert(k, new);
                        }
                        prop_assert_eq!(map.compare_and_swap(&k, &old, new), expected);
                    }
                    Op::CompareAndDelete(k, old) => {
                        let expected = model.get(&k) == Some(&old);
                        if expected {
                            model.remove(&k);
                        }
                        prop_assert_eq!(map.compare_and_delete(&k, &old), expected);
                    }
                    Op::Range => {
                        prop_assert_eq!(&contents(&map), &model);
                    }
                    Op::Clear => {
                        map.clear();
                        model.clear();
                    }
                }
            }

            prop_assert_eq!(&contents(&map), &model);
            prop_assert_eq!(map.len(), model.len());
        }

        #[test]
        fn test_range_stops_when_visitor_declines(
            entries in prop::collection::hash_map(any::<u8>(), any::<u16>(), 1..64),
            limit in 1usize..64
        ) {
            let map: ConcurrentMap<u8, u16> = entries.clone().into_iter().collect();

            let mut visited = 0;
            map.range(|key, value| {
                assert_eq!(entries.get(key), Some(value));
                visited += 1;
                visited < limit
            });

            prop_assert_eq!(visited, limit.min(entries.len()));
        }
    }
}

#[cfg(test)]
mod concurrent_properties {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_disjoint_writers_agree_with_model(
            per_thread in prop::collection::vec(prop::collection::vec(op_strategy(), 1..100), 2..5)
        ) {
            let map: Arc<ConcurrentMap<u8, u16>> = Arc::new(ConcurrentMap::new());
            let num_threads = per_thread.len() as u8;

            // Each thread owns the keys congruent to its index, so the per-key history
            // is sequential and can be replayed against a private model
            let handles: Vec<_> = per_thread
                .into_iter()
                .enumerate()
                .map(|(index, ops)| {
                    let map = Arc::clone(&map);
                    let index = index as u8;
                    thread::spawn(move || {
                        let owned = |k: u8| k * num_threads + index;
                        let mut model = HashMap::new();
                        for op in ops {
                            match op {
                                Op::Load(k) => {
                                    assert_eq!(map.load(&owned(k)), model.get(&owned(k)).copied());
                                }
                                Op::Store(k, v) | Op::Swap(k, v) => {
                                    assert_eq!(map.swap(owned(k), v), model.insert(owned(k), v));
                                }
                                Op::Delete(k) | Op::LoadAndDelete(k) => {
                                    assert_eq!(map.load_and_delete(&owned(k)), model.remove(&owned(k)));
                                }
                                Op::LoadOrStore(k, v) => {
                                    let expected = *model.entry(owned(k)).or_insert(v);
                                    assert_eq!(map.load_or_store(owned(k), v).0, expected);
                                }
                                Op::CompareAndSwap(k, old, new) => {
                                    let expected = model.get(&owned(k)) == Some(&old);
                                    if expected {
                                        model.insert(owned(k), new);
                                    }
                                    assert_eq!(map.compare_and_swap(&owned(k), &old, new), expected);
                                }
                                Op::CompareAndDelete(k, old) => {
                                    let expected = model.get(&owned(k)) == Some(&old);
                                    if expected {
                                        model.remove(&owned(k));
                                    }
                                    assert_eq!(map.compare_and_delete(&owned(k), &old), expected);
                                }
                                // Whole-map operations would step on other threads' keys
                                Op::Range => {
                                    map.range(|_, _| true);
                                }
                                Op::Clear => {}
                            }
                        }
                        model
                    })
                })
                .collect();

            let mut expected = HashMap::new();
            for handle in handles {
                expected.extend(handle.join().unwrap());
            }

            prop_assert_eq!(&contents(&map), &expected);
        }
    }
}
