//! Integration tests for syncmap
//!
//! These tests drive the public API only: a typical read/write session, the full
//! operation set racing on a single key, and the documented edge cases.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use syncmap::{ConcurrentMap, Error, MetricsCollector};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_typical_session() {
    init_logging();

    let map: ConcurrentMap<String, String> = ConcurrentMap::new();
    map.store("foo".to_string(), "bar".to_string());

    assert_eq!(map.load("foo"), Some("bar".to_string()));
    assert_eq!(
        map.load_or_store("foo".to_string(), "baz".to_string()),
        ("bar".to_string(), true)
    );
    assert_eq!(
        map.swap("foo".to_string(), "qux".to_string()),
        Some("bar".to_string())
    );

    // A stale compare leaves the entry alone
    assert!(!map.compare_and_swap("foo", &"bar".to_string(), "x".to_string()));
    assert!(map.compare_and_swap("foo", &"qux".to_string(), "x".to_string()));
    assert!(!map.compare_and_delete("foo", &"qux".to_string()));
    assert!(map.compare_and_delete("foo", &"x".to_string()));

    assert_eq!(map.load("foo"), None);
    assert_eq!(map.load_and_delete("foo"), None);
    assert!(map.is_empty());
}

#[test]
fn test_absent_key_edge_cases() {
    let map: ConcurrentMap<&'static str, i32> = ConcurrentMap::new();

    // Deleting an absent key is a no-op
    map.delete("missing");
    assert_eq!(map.load_and_delete("missing"), None);
    assert_eq!(map.swap("missing", 1), None);
    assert_eq!(map.load("missing"), Some(1));

    // Compare operations never create entries
    assert!(!map.compare_and_swap("other", &0, 1));
    assert!(!map.compare_and_delete("other", &0));
    assert!(!map.contains_key("other"));

    // A stored zero value is present, not absent
    map.store("zero", 0);
    assert_eq!(map.load_or_default("zero"), (0, true));
    assert_eq!(map.load_or_default("other"), (0, false));
    assert_eq!(map.len(), 2);
}

#[test]
fn test_range_early_stop_and_reentrancy() {
    let map: ConcurrentMap<u32, u32> = (0..100).map(|i| (i, i * i)).collect();

    let mut visited = HashMap::new();
    map.range(|key, value| {
        visited.insert(*key, *value);
        // The visitor may call back into the map
        map.store(key + 1000, *value);
        visited.len() < 10
    });
    assert_eq!(visited.len(), 10);
    for (key, value) in &visited {
        assert_eq!(key * key, *value);
        assert_eq!(map.load(&(key + 1000)), Some(*value));
    }
}

#[test]
fn test_checked_constructor() {
    let map = ConcurrentMap::<u64, u64>::try_with_capacity_and_hasher(
        128,
        syncmap::DefaultHashBuilder::default(),
    )
    .unwrap();
    map.store(1, 1);
    assert_eq!(map.load(&1), Some(1));

    let err = ConcurrentMap::<u64, u64>::try_with_capacity_and_hasher(
        usize::MAX,
        syncmap::DefaultHashBuilder::default(),
    )
    .unwrap_err();
    assert_eq!(err, Error::CapacityOverflow { requested: usize::MAX });
}

#[test]
fn test_every_operation_races_on_one_key() {
    init_logging();

    let map: Arc<ConcurrentMap<&'static str, usize>> = Arc::new(ConcurrentMap::new());
    map.set_metrics_enabled(true);

    let num_threads = 1000;
    let iterations = 1000;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..iterations {
                    // Rotate the operation order per thread so every pairing occurs
                    match (thread_id + i) % 9 {
                        0 => {
                            map.load("key");
                        }
                        1 => map.store("key", i),
                        2 => {
                            map.load_or_store("key", i);
                        }
                        3 => {
                            map.load_and_delete("key");
                        }
                        4 => map.delete("key"),
                        5 => {
                            map.swap("key", i);
                        }
                        6 => {
                            if let Some(current) = map.load("key") {
                                map.compare_and_swap("key", &current, i);
                            }
                        }
                        7 => {
                            if let Some(current) = map.load("key") {
                                map.compare_and_delete("key", &current);
                            }
                        }
                        8 => map.range(|key, value| {
                            assert_eq!(*key, "key");
                            assert!(*value < iterations);
                            true
                        }),
                        _ => unreachable!(),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // The map is still coherent after the storm
    map.store("key", 7);
    assert_eq!(map.load("key"), Some(7));
    assert_eq!(map.len(), 1);

    let metrics = map.metrics();
    assert!(metrics.total_operations >= (num_threads * iterations) as u64);
}

#[test]
fn test_load_or_store_race_stores_once() {
    let num_threads = 64;
    let map: Arc<ConcurrentMap<u32, usize>> = Arc::new(ConcurrentMap::new());
    let barrier = Arc::new(Barrier::new(num_threads));
    let stored = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            let stored = Arc::clone(&stored);
            thread::spawn(move || {
                barrier.wait();
                for key in 0..100 {
                    let (_, loaded) = map.load_or_store(key, thread_id);
                    if !loaded {
                        stored.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(stored.load(Ordering::Relaxed), 100);
    assert_eq!(map.len(), 100);
}

#[test]
fn test_clone_is_independent() {
    let original: ConcurrentMap<u8, Vec<u8>> = (0..10).map(|i| (i, vec![i])).collect();
    let copy = original.clone();

    original.store(0, vec![42]);
    copy.delete(&1);

    assert_eq!(copy.load(&0), Some(vec![0]));
    assert_eq!(original.load(&1), Some(vec![1]));
    assert_eq!(original.len(), 10);
    assert_eq!(copy.len(), 9);
}
