//! # Hopscotch
//!
//! A concurrent hopscotch hash table for fixed-width byte keys.
//!
//! Every key is stored within [`NEIGHBORHOOD`] slots of the bucket it hashes to, and
//! each bucket keeps a bitmap of which nearby slots hold its keys. Lookups scan that
//! bitmap without taking the bucket's structural lock and validate the scan against a
//! per-bucket timestamp. Inserts and removes lock only the home bucket (plus the
//! buckets they displace items from), so writers on different buckets proceed in
//! parallel.
//!
//! ## Basic Usage
//!
//! ```rust
//! use hopscotch::{HopscotchTable, InsertOutcome, key_from_index};
//!
//! // 2^10 buckets, 12-byte keys, u64 values
//! let table = HopscotchTable::<12>::init(10).unwrap();
//!
//! let key = key_from_index::<12>(7);
//! assert_eq!(table.insert(key, 70), Ok(InsertOutcome::Inserted));
//! assert_eq!(table.lookup(&key), Some(70));
//!
//! // Inserting an existing key replaces its value
//! assert_eq!(table.insert(key, 71), Ok(InsertOutcome::Updated));
//! assert_eq!(table.lookup(&key), Some(71));
//!
//! assert_eq!(table.remove(&key), Some(71));
//! assert_eq!(table.lookup(&key), None);
//! ```
//!
//! ## Concurrent Usage
//!
//! ```rust
//! use hopscotch::{HopscotchTable, key_from_index};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let table = Arc::new(HopscotchTable::<12>::init(12).unwrap());
//!
//! let handles: Vec<_> = (0..4u32)
//!     .map(|t| {
//!         let table = Arc::clone(&table);
//!         thread::spawn(move || {
//!             for i in t * 500..(t + 1) * 500 {
//!                 table.insert(key_from_index(i), u64::from(i)).unwrap();
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! // Inserts of distinct keys never get lost
//! assert_eq!(table.len(), 2000);
//! assert_eq!(table.lookup(&key_from_index(1234)), Some(1234));
//! ```
//!
//! ## Resizing and custom allocation
//!
//! ```rust
//! use hopscotch::{BudgetAllocator, HopscotchConfig, HopscotchTable, key_from_index};
//!
//! let config = HopscotchConfig::new().exponent(4).buckets_per_lock(8);
//! let mut table = HopscotchTable::<12, u32, _>::with_config_in(config, BudgetAllocator::new(1 << 20))
//!     .unwrap();
//! for i in 0..16 {
//!     table.insert(key_from_index(i), i).unwrap();
//! }
//!
//! // The table never grows on its own; resize takes exclusive access
//! table.resize(2).unwrap();
//! assert_eq!(table.capacity(), 64);
//! assert_eq!(table.lookup(&key_from_index(9)), Some(9));
//! ```

/// Pluggable allocation of bucket storage
mod allocator;
/// Bucket array, per-bucket metadata and kv locks
mod bucket;
/// Table configuration and constants
mod config;
/// Free-slot probing and neighborhood displacement
mod displacement;
/// Error types
mod error;
/// Key hashing
mod hash;
/// The concurrent hopscotch hash table
mod hopscotch_table;
/// Operation counters
mod stats;
/// Key helpers and extension traits
mod utils;

pub use allocator::{BucketAllocator, BudgetAllocator, GlobalAllocator};
pub use config::{
    DEFAULT_EXPONENT, DEFAULT_MAX_LOCKLESS_RETRIES, HopscotchConfig, MAX_EXPONENT, NEIGHBORHOOD,
};
pub use error::{
    AllocationError, ConfigError, HopscotchError, InsertError, InvariantViolation, ResizeError,
};
pub use hash::{home_index, jenkins_one_at_a_time};
pub use hopscotch_table::{HopscotchTable, InsertOutcome};
pub use stats::TableStats;
pub use utils::{HopscotchTableExtensions, Key, key_from_index};
