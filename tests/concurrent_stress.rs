#![allow(missing_docs, clippy::missing_docs_in_private_items, clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::indexing_slicing)]
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use hopscotch::{
    HopscotchConfig, HopscotchTable, HopscotchTableExtensions, InsertOutcome, Key, NEIGHBORHOOD,
    home_index, jenkins_one_at_a_time, key_from_index,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type Table = HopscotchTable<12, u64>;

const THREADS: u32 = 8;
const KEYS_PER_THREAD: u32 = 1000;

#[test]
fn test_disjoint_concurrent_inserts() {
    let table = Arc::new(Table::init(14).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in t * KEYS_PER_THREAD..(t + 1) * KEYS_PER_THREAD {
                    assert_eq!(table.insert(key_from_index(i), u64::from(i)), Ok(InsertOutcome::Inserted));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = THREADS * KEYS_PER_THREAD;
    assert_eq!(table.len(), total as usize);
    for i in 0..total {
        assert_eq!(table.lookup(&key_from_index(i)), Some(u64::from(i)));
    }
    table.verify().unwrap();
}

#[test]
fn test_disjoint_inserts_with_grouped_locks() {
    let config = HopscotchConfig::new().exponent(13).buckets_per_lock(10_000);
    let table = Arc::new(Table::with_config(config).unwrap());

    thread::scope(|s| {
        for t in 0..THREADS {
            let table = &table;
            s.spawn(move || {
                for i in t * 500..(t + 1) * 500 {
                    table.insert(key_from_index(i), u64::from(i) + 1).unwrap();
                }
            });
        }
    });

    assert_eq!(table.len(), (THREADS * 500) as usize);
    for i in 0..THREADS * 500 {
        assert_eq!(table.lookup(&key_from_index(i)), Some(u64::from(i) + 1));
    }
    table.verify().unwrap();
}

#[test]
fn test_readers_never_see_stable_keys_disappear() {
    // Keys 0..2000 stay put while writers churn keys 2000..
    let table = Table::init(13).unwrap();
    for i in 0..2000 {
        table.insert(key_from_index(i), u64::from(i)).unwrap();
    }
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for w in 0..4u32 {
            let table = &table;
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(u64::from(w));
                for round in 0..20u32 {
                    let base = 2000 + w * 100_000 + round * 500;
                    for i in base..base + 500 {
                        table.insert(key_from_index(i), u64::from(rng.random::<u32>())).unwrap();
                    }
                    for i in base..base + 500 {
                        assert!(table.remove(&key_from_index(i)).is_some());
                    }
                }
            });
        }
        for r in 0..4u64 {
            let table = &table;
            let done = &done;
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(100 + r);
                while !done.load(Ordering::Relaxed) {
                    let i = rng.random_range(0..2000u32);
                    assert_eq!(table.lookup(&key_from_index(i)), Some(u64::from(i)));
                }
            });
        }
        // Releases the readers once every writer has removed all of its keys
        s.spawn(|| {
            while table.len() > 2000 || table.stats().removes < 4 * 20 * 500 {
                thread::yield_now();
            }
            done.store(true, Ordering::Relaxed);
        });
    });

    assert_eq!(table.len(), 2000);
    table.verify().unwrap();
}

#[test]
fn test_mixed_random_operations_match_per_thread_model() {
    let table = Arc::new(Table::init(12).unwrap());

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                // Each thread owns the indices congruent to t modulo 4
                let mut rng = StdRng::seed_from_u64(u64::from(t) * 7919);
                let mut model: HashMap<Key<12>, u64> = HashMap::new();
                for _ in 0..5000 {
                    let key = key_from_index(rng.random_range(0..200u32) * 4 + t);
                    match rng.random_range(0..3) {
                        0 => {
                            let value = rng.random::<u64>();
                            let expected = if model.insert(key, value).is_some() {
                                InsertOutcome::Updated
                            } else {
                                InsertOutcome::Inserted
                            };
                            assert_eq!(table.insert(key, value), Ok(expected));
                        }
                        1 => assert_eq!(table.remove(&key), model.remove(&key)),
                        _ => assert_eq!(table.lookup(&key), model.get(&key).copied()),
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

    assert_eq!(table.len(), expected.len());
    for (key, value) in &expected {
        assert_eq!(table.lookup(key), Some(*value));
    }
    table.verify().unwrap();
}

fn high_load_churn(buckets_per_lock: usize) {
    let config = HopscotchConfig::new().exponent(10).buckets_per_lock(buckets_per_lock);
    let table = Table::with_config(config).unwrap();

    // Around 80% load before the writers start
    let fixed: Vec<u32> =
        (0..820u32).filter(|&i| table.insert(key_from_index(i), u64::from(i)).is_ok()).collect();
    assert!(fixed.len() >= 800, "only {} of 820 keys placed", fixed.len());
    let finished_writers = AtomicUsize::new(0);

    thread::scope(|s| {
        for w in 0..8u32 {
            let table = &table;
            let finished_writers = &finished_writers;
            s.spawn(move || {
                for round in 0..20u32 {
                    let base = 10_000 + w * 1_000 + round * 10;
                    let placed: Vec<u32> = (base..base + 10)
                        .filter(|&i| table.insert(key_from_index(i), u64::from(i)).is_ok())
                        .collect();
                    for i in placed {
                        assert_eq!(table.remove(&key_from_index(i)), Some(u64::from(i)));
                    }
                }
                finished_writers.fetch_add(1, Ordering::Release);
            });
        }
        for r in 0..4u64 {
            let table = &table;
            let fixed = &fixed;
            let finished_writers = &finished_writers;
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(r);
                while finished_writers.load(Ordering::Acquire) < 8 {
                    let i = fixed[rng.random_range(0..fixed.len())];
                    assert_eq!(table.lookup(&key_from_index(i)), Some(u64::from(i)));
                }
            });
        }
    });

    assert!(table.stats().displacements > 0);
    assert_eq!(table.len(), fixed.len());
    for &i in &fixed {
        assert_eq!(table.lookup(&key_from_index(i)), Some(u64::from(i)));
    }
    table.verify().unwrap();
}

#[test]
fn test_fixed_keys_survive_displacement_at_high_load() {
    high_load_churn(1);
}

#[test]
fn test_fixed_keys_survive_displacement_with_grouped_locks() {
    high_load_churn(4);
}

#[test]
fn test_lookup_falls_back_when_neighborhood_changes() {
    let exponent = 10;
    let mask = (1usize << exponent) - 1;
    let config = HopscotchConfig::new().exponent(exponent).max_lockless_retries(0);
    let table = Table::with_config(config).unwrap();

    // Keys sharing one home bucket: the first stays, the rest are churned
    let same_home: Vec<u32> = (0..u32::MAX)
        .filter(|&i| home_index(jenkins_one_at_a_time(&key_from_index::<12>(i)), mask) == 0)
        .take(12)
        .collect();
    let (watched, churned) = same_home.split_first().unwrap();
    table.insert(key_from_index(*watched), 7).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            while !done.load(Ordering::Relaxed) {
                for &i in churned {
                    table.insert(key_from_index(i), u64::from(i)).unwrap();
                }
                for &i in churned {
                    assert_eq!(table.remove(&key_from_index(i)), Some(u64::from(i)));
                }
            }
        });
        s.spawn(|| {
            let deadline = Instant::now() + Duration::from_secs(20);
            loop {
                assert_eq!(table.lookup(&key_from_index(*watched)), Some(7));
                let stats = table.stats();
                if stats.lookup_retries + stats.lookup_escalations > 0 || Instant::now() > deadline {
                    break;
                }
            }
            done.store(true, Ordering::Relaxed);
        });
    });

    let stats = table.stats();
    assert!(stats.lookup_retries + stats.lookup_escalations > 0);
    assert_eq!(stats.lookup_retries, 0);
    assert_eq!(table.lookup(&key_from_index(*watched)), Some(7));
    table.verify().unwrap();
}

proptest! {
    #[test]
    fn prop_inserted_keys_are_found(entries in prop::collection::hash_map(any::<u32>(), any::<u64>(), 0..300)) {
        let table = Table::init(10).unwrap();
        for (index, value) in &entries {
            table.insert(key_from_index(*index), *value).unwrap();
        }
        prop_assert_eq!(table.len(), entries.len());
        for (index, value) in &entries {
            prop_assert_eq!(table.lookup(&key_from_index(*index)), Some(*value));
        }
    }

    #[test]
    fn prop_keys_are_unique(indices in prop::collection::vec(0..500u32, 0..600)) {
        let table = Table::init(10).unwrap();
        for (n, index) in indices.iter().enumerate() {
            table.insert(key_from_index(*index), n as u64).unwrap();
        }
        let distinct: HashSet<u32> = indices.iter().copied().collect();
        let keys = table.keys();
        prop_assert_eq!(keys.len(), distinct.len());
        prop_assert_eq!(keys.iter().collect::<HashSet<_>>().len(), distinct.len());
    }

    #[test]
    fn prop_removed_keys_are_gone(
        entries in prop::collection::hash_set(any::<u32>(), 1..300),
        keep_every in 2..5usize,
    ) {
        let table = Table::init(10).unwrap();
        for index in &entries {
            table.insert(key_from_index(*index), u64::from(*index)).unwrap();
        }
        for (n, index) in entries.iter().enumerate() {
            let key = key_from_index(*index);
            if n % keep_every == 0 {
                prop_assert_eq!(table.lookup(&key), Some(u64::from(*index)));
            } else {
                prop_assert_eq!(table.remove(&key), Some(u64::from(*index)));
                prop_assert_eq!(table.lookup(&key), None);
            }
        }
        table.verify().unwrap();
    }

    #[test]
    fn prop_entries_stay_in_their_neighborhood(indices in prop::collection::hash_set(any::<u32>(), 0..900)) {
        let table = Table::init(10).unwrap();
        for index in &indices {
            // At high load an unlucky neighborhood may legitimately be full
            let _ = table.insert(key_from_index(*index), 0);
        }
        table.verify().unwrap();
        let histogram = table.offset_histogram();
        prop_assert_eq!(histogram.len(), NEIGHBORHOOD);
        prop_assert_eq!(histogram.iter().sum::<usize>(), table.len());
    }

    #[test]
    fn prop_resize_preserves_contents(
        entries in prop::collection::hash_map(any::<u32>(), any::<u64>(), 0..200),
        delta in 0..3i32,
    ) {
        let mut table = Table::init(9).unwrap();
        for (index, value) in &entries {
            table.insert(key_from_index(*index), *value).unwrap();
        }
        table.resize(delta).unwrap();
        prop_assert_eq!(table.capacity(), 1usize << (9 + delta));
        prop_assert_eq!(table.len(), entries.len());
        for (index, value) in &entries {
            prop_assert_eq!(table.lookup(&key_from_index(*index)), Some(*value));
        }
        table.verify().unwrap();
    }
}
