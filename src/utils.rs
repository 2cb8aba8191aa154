//! Utility functions and traits for `HopscotchTable`

use crate::HopscotchTable;
use crate::allocator::BucketAllocator;

/// A fixed-width key of `K` bytes
pub type Key<const K: usize> = [u8; K];

/// Builds a workload-style key: the index in the first four bytes (little endian),
/// every remaining byte set to `0xff`.
///
/// Keys narrower than four bytes keep only the low bytes of the index.
#[must_use]
pub fn key_from_index<const K: usize>(index: u32) -> Key<K> {
    let mut key = [0xff; K];
    for (dst, src) in key.iter_mut().zip(index.to_le_bytes()) {
        *dst = src;
    }
    key
}

/// Extension trait for tables that provides additional utility methods
pub trait HopscotchTableExtensions<const K: usize, V> {
    /// Returns the keys currently stored as a Vec
    fn keys(&self) -> Vec<Key<K>>;

    /// Returns the values currently stored as a Vec
    fn values(&self) -> Vec<V>;

    /// Returns true if the table contains the given key
    fn contains_key(&self, key: &Key<K>) -> bool;
}

impl<const K: usize, V, A> HopscotchTableExtensions<K, V> for HopscotchTable<K, V, A>
where
    V: Copy,
    A: BucketAllocator,
{
    fn keys(&self) -> Vec<Key<K>> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }

    fn values(&self) -> Vec<V> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    fn contains_key(&self, key: &Key<K>) -> bool {
        self.lookup(key).is_some()
    }
}
