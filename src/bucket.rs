//! Bucket array and the locks guarding it
//!
//! Slots are addressed by index into one owned array. The array is padded with
//! `NEIGHBORHOOD - 1` trailing buckets so the window of the last home bucket
//! fits without wrapping around.

use std::cell::UnsafeCell;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::allocator::BucketAllocator;
use crate::config::NEIGHBORHOOD;
use crate::error::AllocationError;
use crate::hash::{home_index, jenkins_one_at_a_time};
use crate::utils::Key;

/// Key and value stored in a bucket, only touched under the slot's kv lock
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot<const K: usize, V> {
    /// Stored key, zeroed while the slot is free
    pub(crate) key: Key<K>,
    /// Stored value, `None` while the slot is free or reserved
    pub(crate) value: Option<V>,
}

impl<const K: usize, V: Copy> Slot<K, V> {
    /// An empty slot
    pub(crate) const EMPTY: Self = Self { key: [0; K], value: None };

    /// Returns the value if this slot holds `key`
    pub(crate) fn value_for(&self, key: &Key<K>) -> Option<V> {
        self.value.filter(|_| self.key == *key)
    }

    /// Empties the slot, returning what it held
    pub(crate) fn take(&mut self) -> Option<(Key<K>, V)> {
        let key = mem::replace(&mut self.key, [0; K]);
        self.value.take().map(|value| (key, value))
    }
}

/// One bucket: neighborhood metadata of the home bucket at this index plus the
/// physical slot at this index
pub(crate) struct Bucket<const K: usize, V> {
    /// Bit `i` set when slot `index + i` holds a key whose home is this bucket
    hop_info: AtomicU32,
    /// Bumped on every change of `hop_info`; optimistic readers compare it
    timestamp: AtomicU64,
    /// Set while the slot is claimed by an insert or holds an entry
    reserved: AtomicBool,
    /// Serializes writers whose home is this bucket
    structural: Mutex<()>,
    /// Key/value pair, guarded by the kv lock covering this index
    slot: UnsafeCell<Slot<K, V>>,
}

// Slot contents are only accessed while holding the kv lock that covers them.
unsafe impl<const K: usize, V: Send> Sync for Bucket<K, V> {}

impl<const K: usize, V> std::fmt::Debug for Bucket<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("hop_info", &format_args!("{:#034b}", self.hop_info()))
            .field("timestamp", &self.timestamp())
            .field("reserved", &self.is_reserved())
            .finish_non_exhaustive()
    }
}

impl<const K: usize, V: Copy> Bucket<K, V> {
    /// Creates a free bucket with an empty neighborhood
    fn new() -> Self {
        Self {
            hop_info: AtomicU32::new(0),
            timestamp: AtomicU64::new(0),
            reserved: AtomicBool::new(false),
            structural: Mutex::new(()),
            slot: UnsafeCell::new(Slot::EMPTY),
        }
    }
}

impl<const K: usize, V> Bucket<K, V> {
    /// Neighborhood bitmap
    pub(crate) fn hop_info(&self) -> u32 {
        self.hop_info.load(Ordering::Acquire)
    }

    /// Structural-change counter
    pub(crate) fn timestamp(&self) -> u64 {
        self.timestamp.load(Ordering::Acquire)
    }

    /// Takes the structural lock of this bucket as a home bucket
    pub(crate) fn lock_structure(&self) -> MutexGuard<'_, ()> {
        self.structural.lock()
    }

    /// Records that the slot `offset` past this bucket holds one of its keys
    ///
    /// Caller holds this bucket's structural lock.
    pub(crate) fn link(&self, offset: usize) {
        self.hop_info.fetch_or(bit(offset), Ordering::Release);
        self.bump_timestamp();
    }

    /// Clears the bit for `offset`
    ///
    /// Caller holds this bucket's structural lock.
    pub(crate) fn unlink(&self, offset: usize) {
        self.hop_info.fetch_and(!bit(offset), Ordering::Release);
        self.bump_timestamp();
    }

    /// Advances the timestamp
    fn bump_timestamp(&self) {
        self.timestamp.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether the slot is claimed or occupied
    pub(crate) fn is_reserved(&self) -> bool {
        self.reserved.load(Ordering::Acquire)
    }

    /// Claims the slot; succeeds for exactly one caller while it is free
    pub(crate) fn try_reserve(&self) -> bool {
        !self.is_reserved()
            && self.reserved.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Makes the slot available to future claims
    pub(crate) fn release_reservation(&self) {
        let was_reserved = self.reserved.swap(false, Ordering::AcqRel);
        debug_assert!(was_reserved, "released a slot that was not reserved");
    }
}

/// Bitmap bit for a neighborhood offset
fn bit(offset: usize) -> u32 {
    debug_assert!(offset < NEIGHBORHOOD, "offset {offset} outside the neighborhood");
    1u32 << offset
}

/// Power-of-two bucket array with its kv lock array
pub(crate) struct BucketStore<const K: usize, V> {
    /// `2^exponent + NEIGHBORHOOD - 1` buckets
    buckets: Box<[Bucket<K, V>]>,
    /// One lock per run of `buckets_per_lock` consecutive buckets
    kv_locks: Box<[Mutex<()>]>,
    /// Number of home buckets is `2^exponent`
    exponent: u32,
    /// `2^exponent - 1`
    mask: usize,
    /// Buckets sharing one kv lock
    buckets_per_lock: usize,
    /// Stored entries plus inserts admitted but not yet committed
    entries: AtomicUsize,
}

impl<const K: usize, V> std::fmt::Debug for BucketStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketStore")
            .field("exponent", &self.exponent)
            .field("buckets", &self.buckets.len())
            .field("kv_locks", &self.kv_locks.len())
            .field("entries", &self.entry_count())
            .finish_non_exhaustive()
    }
}

impl<const K: usize, V: Copy> BucketStore<K, V> {
    /// Allocates a zeroed store of `2^exponent` home buckets through `allocator`
    #[allow(clippy::arithmetic_side_effects)]
    pub(crate) fn allocate<A: BucketAllocator>(
        exponent: u32,
        buckets_per_lock: usize,
        allocator: &A,
    ) -> Result<Self, AllocationError> {
        let capacity = 1usize.checked_shl(exponent).ok_or(AllocationError::CapacityOverflow)?;
        let len = capacity.checked_add(NEIGHBORHOOD - 1).ok_or(AllocationError::CapacityOverflow)?;
        let buckets_per_lock = buckets_per_lock.max(1);
        let lock_count = len.div_ceil(buckets_per_lock);

        let buckets = allocator.allocate(len, Bucket::<K, V>::new)?;
        let kv_locks = match allocator.allocate(lock_count, || Mutex::new(())) {
            Ok(locks) => locks,
            Err(err) => {
                allocator.deallocate(buckets);
                return Err(err);
            }
        };

        log::info!(
            "memory for hash table: {} KB in {} buckets, {} kv locks",
            mem::size_of::<Bucket<K, V>>().saturating_mul(len) / 1024,
            len,
            lock_count
        );

        Ok(Self {
            buckets,
            kv_locks,
            exponent,
            mask: capacity - 1,
            buckets_per_lock,
            entries: AtomicUsize::new(0),
        })
    }
}

impl<const K: usize, V> BucketStore<K, V> {
    /// Returns both arrays to `allocator`, leaving the store empty
    pub(crate) fn release<A: BucketAllocator>(&mut self, allocator: &A) {
        allocator.deallocate(mem::take(&mut self.buckets));
        allocator.deallocate(mem::take(&mut self.kv_locks));
    }

    /// Size exponent
    pub(crate) fn exponent(&self) -> u32 {
        self.exponent
    }

    /// Number of home buckets
    #[allow(clippy::arithmetic_side_effects)]
    pub(crate) fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Number of stored entries
    pub(crate) fn entry_count(&self) -> usize {
        self.entries.load(Ordering::Acquire)
    }

    /// Counts one more entry unless the table already holds `capacity()` of them
    pub(crate) fn try_admit(&self) -> bool {
        let capacity = self.capacity();
        self.entries
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < capacity).then_some(count.saturating_add(1))
            })
            .is_ok()
    }

    /// Counts one entry less
    pub(crate) fn discharge(&self) {
        let previous = self.entries.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "entry count underflow");
    }

    /// Number of physical buckets, padding included
    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Home bucket of `key`
    pub(crate) fn home_of(&self, key: &Key<K>) -> usize {
        home_index(jenkins_one_at_a_time(key), self.mask)
    }

    /// Bucket at `index`
    #[allow(clippy::indexing_slicing)]
    pub(crate) fn bucket(&self, index: usize) -> &Bucket<K, V> {
        // Callers derive indices from a home bucket plus an offset below NEIGHBORHOOD,
        // or iterate below len(); both stay inside the padded array.
        &self.buckets[index]
    }

    /// kv lock covering bucket `index`
    #[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
    fn kv_lock(&self, index: usize) -> &Mutex<()> {
        &self.kv_locks[index / self.buckets_per_lock]
    }

    /// Runs `f` on the slot at `index` while holding its kv lock
    pub(crate) fn with_slot<R>(&self, index: usize, f: impl FnOnce(&mut Slot<K, V>) -> R) -> R {
        let _guard = self.kv_lock(index).lock();
        // SAFETY: the kv lock covering `index` is held, so no other reference to this slot exists.
        f(unsafe { &mut *self.bucket(index).slot.get() })
    }

    /// Runs `f` on two distinct slots while holding both of their kv locks
    ///
    /// The caller guarantees `first != second`.
    /// The locks are always taken lower index first, and a lock shared by both slots
    /// is taken once, so concurrent pair operations cannot deadlock.
    #[allow(clippy::arithmetic_side_effects)]
    pub(crate) fn with_slot_pair<R>(
        &self,
        first: usize,
        second: usize,
        f: impl FnOnce(&mut Slot<K, V>, &mut Slot<K, V>) -> R,
    ) -> R {
        debug_assert_ne!(first, second, "a slot cannot be paired with itself");
        let (low, high) = if first < second { (first, second) } else { (second, first) };
        let low_id = low / self.buckets_per_lock;
        let high_id = high / self.buckets_per_lock;

        let _low_guard = self.kv_lock(low).lock();
        let _high_guard = (high_id != low_id).then(|| self.kv_lock(high).lock());
        // SAFETY: both covering kv locks are held and the indices differ, so the two
        // mutable references are unique and do not alias.
        unsafe { f(&mut *self.bucket(first).slot.get(), &mut *self.bucket(second).slot.get()) }
    }
}
