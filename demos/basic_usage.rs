//! Basic usage example for syncmap
//!
//! Walks through the map's operations from a single thread, then shares a map
//! between several threads that race to claim the same keys.

use std::sync::Arc;
use std::thread;
use syncmap::{ConcurrentMap, DefaultHashBuilder, MetricsCollector};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("syncmap Usage Example");
    println!("=====================");

    let map: Arc<ConcurrentMap<String, u32>> = Arc::new(
        ConcurrentMap::try_with_capacity_and_hasher(64, DefaultHashBuilder::default())?,
    );
    map.set_metrics_enabled(true);

    println!("\n1. Basic Operations:");
    map.store("apples".to_string(), 3);
    println!("   load(apples) = {:?}", map.load("apples"));
    println!("   load(pears)  = {:?}", map.load("pears"));
    println!(
        "   load_or_store(pears, 5) = {:?}",
        map.load_or_store("pears".to_string(), 5)
    );
    println!("   swap(apples, 4) = {:?}", map.swap("apples".to_string(), 4));

    println!("\n2. Compare Operations:");
    println!(
        "   compare_and_swap(apples, 3 -> 10) = {}",
        map.compare_and_swap("apples", &3, 10)
    );
    println!(
        "   compare_and_swap(apples, 4 -> 10) = {}",
        map.compare_and_swap("apples", &4, 10)
    );
    println!(
        "   compare_and_delete(pears, 5) = {}",
        map.compare_and_delete("pears", &5)
    );

    println!("\n3. Racing Claims:");
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                let mut claimed = 0;
                for slot in 0..10 {
                    let (_, loaded) = map.load_or_store(format!("slot_{}", slot), worker);
                    if !loaded {
                        claimed += 1;
                    }
                }
                (worker, claimed)
            })
        })
        .collect();

    for handle in handles {
        let (worker, claimed) = handle.join().map_err(|_| "worker panicked")?;
        println!("   worker {} claimed {} slots", worker, claimed);
    }

    println!("\n4. Traversal:");
    let mut entries = Vec::new();
    map.range(|key, value| {
        entries.push((key.clone(), *value));
        true
    });
    entries.sort();
    for (key, value) in &entries {
        println!("   {} => {}", key, value);
    }

    let metrics = map.metrics();
    println!("\n5. Metrics:");
    println!("   Total operations: {}", metrics.total_operations);
    println!("   Fast path rate: {:.1}%", metrics.fast_path_rate());
    println!("   Compare success rate: {:.1}%", metrics.compare_success_rate());
    println!("   Promotions: {}", metrics.promotions);

    Ok(())
}
