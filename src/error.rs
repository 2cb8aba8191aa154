//! Error types for table construction, insertion and resizing

use thiserror::Error;

/// The injected allocator could not provide a bucket array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// The heap refused the request
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory {
        /// Bytes requested
        requested: usize,
    },
    /// The request would exceed the allocator's byte budget
    #[error("cannot allocate {requested} bytes ({available} bytes left in budget)")]
    BudgetExceeded {
        /// Bytes requested
        requested: usize,
        /// Bytes still available in the budget
        available: usize,
    },
    /// The requested array size does not fit in the address space
    #[error("bucket array size overflows the address space")]
    CapacityOverflow,
}

/// Rejected table configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The size exponent is zero or larger than the supported maximum
    #[error("size exponent {exponent} is outside 1..={max}")]
    ExponentOutOfRange {
        /// Requested exponent
        exponent: u32,
        /// Largest supported exponent
        max: u32,
    },
    /// A kv lock must cover at least one bucket
    #[error("buckets_per_lock must be at least 1")]
    ZeroBucketsPerLock,
}

/// Failure of a single insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InsertError {
    /// No free slot could be brought into the key's neighborhood
    #[error("hash table full: no slot reachable within the neighborhood of bucket {home}")]
    TableFull {
        /// Home bucket of the key that could not be placed
        home: usize,
    },
}

/// Failure of a resize; the table keeps its previous contents and size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResizeError {
    /// The new bucket array could not be allocated
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// The new exponent is outside the supported range
    #[error("cannot resize to exponent {exponent}")]
    InvalidExponent {
        /// Exponent the resize would have produced
        exponent: i64,
    },
    /// An existing entry did not fit in the new table
    #[error("resized table cannot hold the current entries")]
    TableFull(#[from] InsertError),
}

/// Failure to create a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HopscotchError {
    /// Configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The bucket array could not be allocated
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// A structural invariant found broken by [`crate::HopscotchTable::verify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// An entry lies outside the window of its home bucket
    #[error("entry in slot {slot} lies outside the neighborhood of its home bucket {home}")]
    OutsideNeighborhood {
        /// Slot holding the entry
        slot: usize,
        /// Home bucket of the stored key
        home: usize,
    },
    /// A bitmap bit points at a slot that holds no entry for that home
    #[error("bucket {home} has bit {offset} set but slot {slot} does not hold one of its keys")]
    DanglingBit {
        /// Home bucket owning the bitmap
        home: usize,
        /// Bit position
        offset: usize,
        /// Slot the bit points at
        slot: usize,
    },
    /// An occupied slot is not referenced by its home bucket's bitmap
    #[error("slot {slot} holds an entry not linked from home bucket {home}")]
    Unlinked {
        /// Slot holding the entry
        slot: usize,
        /// Home bucket of the stored key
        home: usize,
    },
    /// Two slots hold the same key
    #[error("slots {first} and {second} hold the same key")]
    DuplicateKey {
        /// First slot holding the key
        first: usize,
        /// Second slot holding the key
        second: usize,
    },
}
