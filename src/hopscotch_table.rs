use std::collections::HashMap;

use log::{debug, info, warn};

use crate::allocator::{BucketAllocator, GlobalAllocator};
use crate::bucket::BucketStore;
use crate::config::{HopscotchConfig, MAX_EXPONENT, NEIGHBORHOOD};
use crate::error::{HopscotchError, InsertError, InvariantViolation, ResizeError};
use crate::stats::{TableCounters, TableStats};
use crate::utils::Key;

/// What an insert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was not present and has been stored
    Inserted,
    /// The key was present and its value has been overwritten
    Updated,
}

/// A concurrent hopscotch hash table from fixed-width byte keys to small copyable values.
///
/// Every key lives within `NEIGHBORHOOD` slots of the bucket it hashes to. Writers
/// (`insert`, `remove`) serialize on the structural lock of the key's home bucket, so
/// writers on different home buckets run in parallel. `lookup` scans the neighborhood
/// without the structural lock and validates the scan against the home bucket's
/// timestamp, retrying a bounded number of times before it takes the lock.
///
/// Inserting an existing key overwrites its value. A key that cannot be placed yields
/// [`InsertError::TableFull`]; the table does not grow on its own, call
/// [`HopscotchTable::resize`] for that.
///
/// The table is `Sync`: share it behind an `Arc` or a scoped borrow. `resize` needs
/// `&mut self`, which rules out concurrent access for its duration.
#[derive(Debug)]
pub struct HopscotchTable<const K: usize, V = u64, A: BucketAllocator = GlobalAllocator> {
    /// Buckets, kv locks and the entry count
    store: BucketStore<K, V>,
    /// Configuration the table was built with; `exponent` tracks resizes
    config: HopscotchConfig,
    /// Source of bucket memory
    allocator: A,
    /// Operation counters
    counters: TableCounters,
}

impl<const K: usize, V: Copy> HopscotchTable<K, V, GlobalAllocator> {
    /// Creates a table of `2^exponent` buckets on the heap
    ///
    /// # Errors
    ///
    /// Fails if the exponent is out of range or the bucket array cannot be allocated.
    pub fn init(exponent: u32) -> Result<Self, HopscotchError> {
        Self::with_config(HopscotchConfig::new().exponent(exponent))
    }

    /// Creates a table on the heap from a full configuration
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the bucket array cannot be allocated.
    pub fn with_config(config: HopscotchConfig) -> Result<Self, HopscotchError> {
        Self::with_config_in(config, GlobalAllocator)
    }
}

impl<const K: usize, V: Copy, A: BucketAllocator> HopscotchTable<K, V, A> {
    /// Creates a table whose memory comes from `allocator`
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or `allocator` cannot provide the bucket array.
    pub fn with_config_in(config: HopscotchConfig, allocator: A) -> Result<Self, HopscotchError> {
        config.validate()?;
        let store =
            BucketStore::allocate(config.get_exponent(), config.get_buckets_per_lock(), &allocator)?;
        info!(
            "hash table ready: {} buckets, {}-byte keys, {} buckets per kv lock",
            store.capacity(),
            K,
            config.get_buckets_per_lock()
        );
        Ok(Self { store, config, allocator, counters: TableCounters::default() })
    }

    /// Looks up the value stored for `key`
    #[must_use]
    pub fn lookup(&self, key: &Key<K>) -> Option<V> {
        let home = self.store.home_of(key);
        let bucket = self.store.bucket(home);

        for attempt in 0..=self.config.get_max_lockless_retries() {
            if attempt > 0 {
                TableCounters::bump(&self.counters.lookup_retries);
            }
            let timestamp = bucket.timestamp();
            if let Some((_, value)) = self.store.find_linked(home, bucket.hop_info(), key) {
                return Some(value);
            }
            // Unchanged timestamp: nothing moved through this neighborhood during the scan
            if timestamp == bucket.timestamp() {
                return None;
            }
        }

        TableCounters::bump(&self.counters.lookup_escalations);
        debug!("lookup in bucket {home} escalating to the structural lock");
        let _guard = bucket.lock_structure();
        let timestamp = bucket.timestamp();
        let found = self.store.find_linked(home, bucket.hop_info(), key).map(|(_, value)| value);
        debug_assert_eq!(timestamp, bucket.timestamp(), "bucket {home} changed under its lock");
        found
    }

    /// Inserts `key` with `value`, overwriting the value if the key is present
    ///
    /// # Errors
    ///
    /// Returns [`InsertError::TableFull`] when the table already holds `capacity()` entries
    /// or no free slot can be brought into the key's neighborhood. The table is left as
    /// it was.
    pub fn insert(&self, key: Key<K>, value: V) -> Result<InsertOutcome, InsertError> {
        self.store.insert_entry(key, value, &self.counters)
    }

    /// Removes `key`, returning its value
    pub fn remove(&self, key: &Key<K>) -> Option<V> {
        let removed = self.store.remove_entry(key);
        if removed.is_some() {
            TableCounters::bump(&self.counters.removes);
        }
        removed
    }

    /// Rebuilds the table with `2^(exponent + delta)` buckets
    ///
    /// Every entry is reinserted into a freshly allocated array; the old array is released
    /// only once all of them fit. Negative deltas shrink the table.
    ///
    /// # Errors
    ///
    /// Fails when the new exponent is out of range, the new array cannot be allocated, or
    /// an entry cannot be placed. The table is unchanged in every case.
    pub fn resize(&mut self, delta: i32) -> Result<(), ResizeError> {
        let old_exponent = self.store.exponent();
        let requested = i64::from(old_exponent).saturating_add(i64::from(delta));
        let exponent = u32::try_from(requested)
            .ok()
            .filter(|exponent| (1..=MAX_EXPONENT).contains(exponent))
            .ok_or(ResizeError::InvalidExponent { exponent: requested })?;

        let mut rebuilt =
            match BucketStore::allocate(exponent, self.config.get_buckets_per_lock(), &self.allocator) {
                Ok(store) => store,
                Err(err) => {
                    warn!("resize to exponent {exponent} failed: {err}");
                    TableCounters::bump(&self.counters.failed_resizes);
                    return Err(err.into());
                }
            };

        // Reinsertion moves existing entries; it is not counted as traffic
        let scratch = TableCounters::default();
        for (key, value) in self.entries() {
            if let Err(err) = rebuilt.insert_entry(key, value, &scratch) {
                warn!("resize to exponent {exponent} rolled back: {err}");
                rebuilt.release(&self.allocator);
                TableCounters::bump(&self.counters.failed_resizes);
                return Err(err.into());
            }
        }

        let mut old = std::mem::replace(&mut self.store, rebuilt);
        old.release(&self.allocator);
        self.config = self.config.exponent(exponent);
        TableCounters::bump(&self.counters.resizes);
        info!("hash table resized from 2^{old_exponent} to 2^{exponent} buckets");
        Ok(())
    }

    /// Releases the table and its memory
    pub fn release(self) {
        info!("releasing hash table of {} buckets", self.capacity());
        drop(self);
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.entry_count()
    }

    /// True if no entry is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of home buckets, which is also the maximum number of entries
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Current size exponent
    #[must_use]
    pub fn exponent(&self) -> u32 {
        self.store.exponent()
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &HopscotchConfig {
        &self.config
    }

    /// Allocator providing the table's memory
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Snapshot of the operation counters
    #[must_use]
    pub fn stats(&self) -> TableStats {
        self.counters.snapshot()
    }

    /// Copies out every stored entry, in slot order
    ///
    /// Each slot is read under its kv lock, but the snapshot as a whole is not atomic
    /// with respect to concurrent writers.
    #[must_use]
    pub fn entries(&self) -> Vec<(Key<K>, V)> {
        (0..self.store.len())
            .filter_map(|slot| self.store.with_slot(slot, |s| s.value.map(|value| (s.key, value))))
            .collect()
    }

    /// Counts stored entries by their distance from their home bucket
    ///
    /// Entry `i` of the result is the number of keys stored `i` slots past home.
    #[allow(clippy::arithmetic_side_effects)]
    #[must_use]
    pub fn offset_histogram(&self) -> [usize; NEIGHBORHOOD] {
        let mut histogram = [0; NEIGHBORHOOD];
        for home in 0..self.store.capacity() {
            for offset in linked_offsets(self.store.bucket(home).hop_info()) {
                if let Some(count) = histogram.get_mut(offset) {
                    *count += 1;
                }
            }
        }
        histogram
    }

    /// Scans the whole table and checks its structural invariants
    ///
    /// Every entry must lie in its home's neighborhood and be linked from the home's
    /// bitmap, every bitmap bit must point at one of the home's entries, and no key may
    /// be stored twice. Meaningful only while no writer is active.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    #[allow(clippy::arithmetic_side_effects)]
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let mut seen: HashMap<Key<K>, usize> = HashMap::new();

        for slot in 0..self.store.len() {
            let Some(key) = self.store.with_slot(slot, |s| s.value.map(|_| s.key)) else {
                continue;
            };
            let home = self.store.home_of(&key);
            if slot < home || slot - home >= NEIGHBORHOOD {
                return Err(InvariantViolation::OutsideNeighborhood { slot, home });
            }
            if self.store.bucket(home).hop_info() & (1 << (slot - home)) == 0 {
                return Err(InvariantViolation::Unlinked { slot, home });
            }
            if let Some(first) = seen.insert(key, slot) {
                return Err(InvariantViolation::DuplicateKey { first, second: slot });
            }
        }

        for home in 0..self.store.capacity() {
            for offset in linked_offsets(self.store.bucket(home).hop_info()) {
                let slot = home + offset;
                let holds_own_key = self
                    .store
                    .with_slot(slot, |s| s.value.is_some() && self.store.home_of(&s.key) == home);
                if !holds_own_key {
                    return Err(InvariantViolation::DanglingBit { home, offset, slot });
                }
            }
        }
        Ok(())
    }
}

impl<const K: usize, V, A: BucketAllocator> Drop for HopscotchTable<K, V, A> {
    fn drop(&mut self) {
        self.store.release(&self.allocator);
    }
}

/// Offsets of the set bits of a neighborhood bitmap, nearest first
fn linked_offsets(hop_info: u32) -> impl Iterator<Item = usize> {
    (0..NEIGHBORHOOD).filter(move |offset| hop_info & (1 << offset) != 0)
}

impl<const K: usize, V: Copy> BucketStore<K, V> {
    /// Searches the slots linked from `home` in `hop_info` for `key`
    #[allow(clippy::arithmetic_side_effects)]
    fn find_linked(&self, home: usize, hop_info: u32, key: &Key<K>) -> Option<(usize, V)> {
        linked_offsets(hop_info).find_map(|offset| {
            self.with_slot(home + offset, |slot| slot.value_for(key)).map(|value| (offset, value))
        })
    }

    /// Inserts or updates under the home bucket's structural lock
    #[allow(clippy::arithmetic_side_effects)]
    fn insert_entry(
        &self,
        key: Key<K>,
        value: V,
        counters: &TableCounters,
    ) -> Result<InsertOutcome, InsertError> {
        let home = self.home_of(&key);
        let home_bucket = self.bucket(home);
        let _guard = home_bucket.lock_structure();

        let updated = linked_offsets(home_bucket.hop_info()).any(|offset| {
            self.with_slot(home + offset, |slot| {
                let matches = slot.value.is_some() && slot.key == key;
                if matches {
                    slot.value = Some(value);
                }
                matches
            })
        });
        if updated {
            TableCounters::bump(&counters.updates);
            debug!("replaced value in bucket {home}");
            return Ok(InsertOutcome::Updated);
        }

        if !self.try_admit() {
            warn!("hash table full: {} entries stored", self.capacity());
            TableCounters::bump(&counters.table_full);
            return Err(InsertError::TableFull { home });
        }

        let placed = self
            .claim_free_slot(home)
            .ok_or(InsertError::TableFull { home })
            .and_then(|free| self.displace_into_window(home, free, counters));
        let slot = match placed {
            Ok(slot) => slot,
            Err(err) => {
                self.discharge();
                TableCounters::bump(&counters.table_full);
                warn!("cannot insert into bucket {home}: {err}");
                return Err(err);
            }
        };

        self.with_slot(slot, |s| {
            s.key = key;
            s.value = Some(value);
        });
        home_bucket.link(slot - home);
        TableCounters::bump(&counters.inserts);
        debug!("inserted at slot {slot} (bucket {home})");
        Ok(InsertOutcome::Inserted)
    }

    /// Removes `key` under the home bucket's structural lock
    #[allow(clippy::arithmetic_side_effects)]
    fn remove_entry(&self, key: &Key<K>) -> Option<V> {
        let home = self.home_of(key);
        let home_bucket = self.bucket(home);
        let _guard = home_bucket.lock_structure();

        let (offset, value) = linked_offsets(home_bucket.hop_info()).find_map(|offset| {
            self.with_slot(home + offset, |slot| match slot.value_for(key) {
                Some(_) => slot.take().map(|(_, value)| (offset, value)),
                None => None,
            })
        })?;

        home_bucket.unlink(offset);
        self.bucket(home + offset).release_reservation();
        self.discharge();
        Some(value)
    }
}
