//! Pluggable allocation of bucket storage
//!
//! The table never allocates its bucket array directly. Instead it asks a
//! [`BucketAllocator`], so callers can place table memory wherever they need it
//! (the process heap, a bounded far-memory pool, ...).

use std::iter;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::AllocationError;

/// Source of the memory backing a table's bucket and lock arrays
pub trait BucketAllocator: Send + Sync {
    /// Allocates `len` elements, each produced by `init`
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError`] when the memory cannot be obtained.
    fn allocate<T>(&self, len: usize, init: impl FnMut() -> T) -> Result<Box<[T]>, AllocationError>;

    /// Returns an array obtained from [`BucketAllocator::allocate`]
    fn deallocate<T>(&self, slice: Box<[T]>) {
        drop(slice);
    }
}

/// Number of bytes occupied by `len` values of `T`
fn array_bytes<T>(len: usize) -> Result<usize, AllocationError> {
    mem::size_of::<T>().checked_mul(len).ok_or(AllocationError::CapacityOverflow)
}

/// Allocator backed by the global heap
///
/// Allocation failures are reported instead of aborting the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalAllocator;

impl BucketAllocator for GlobalAllocator {
    fn allocate<T>(&self, len: usize, init: impl FnMut() -> T) -> Result<Box<[T]>, AllocationError> {
        let requested = array_bytes::<T>(len)?;
        let mut items = Vec::new();
        items.try_reserve_exact(len).map_err(|_| AllocationError::OutOfMemory { requested })?;
        items.extend(iter::repeat_with(init).take(len));
        Ok(items.into_boxed_slice())
    }
}

/// Allocator with a fixed byte budget, modelling a bounded far-memory pool
///
/// Every allocation is charged against the budget and refunded on deallocation.
#[derive(Debug)]
pub struct BudgetAllocator {
    /// Total number of bytes this allocator may hand out
    budget: usize,
    /// Bytes currently handed out
    used: AtomicUsize,
}

impl BudgetAllocator {
    /// Creates an allocator that hands out at most `budget` bytes at a time
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self { budget, used: AtomicUsize::new(0) }
    }

    /// Returns the total budget in bytes
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Returns the bytes currently allocated
    #[must_use]
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Charges `requested` bytes against the budget
    fn charge(&self, requested: usize) -> Result<(), AllocationError> {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(requested).filter(|total| *total <= self.budget)
            })
            .map(|_| ())
            .map_err(|used| AllocationError::BudgetExceeded {
                requested,
                available: self.budget.saturating_sub(used),
            })
    }

    /// Returns `bytes` to the budget
    ///
    /// Saturates at zero, so a slice handed out by another allocator cannot wrap `used`.
    fn refund(&self, bytes: usize) {
        let _ = self.used.fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
            Some(used.saturating_sub(bytes))
        });
    }
}

impl BucketAllocator for BudgetAllocator {
    fn allocate<T>(&self, len: usize, init: impl FnMut() -> T) -> Result<Box<[T]>, AllocationError> {
        let requested = array_bytes::<T>(len)?;
        self.charge(requested)?;
        GlobalAllocator.allocate(len, init).inspect_err(|_| self.refund(requested))
    }

    fn deallocate<T>(&self, slice: Box<[T]>) {
        let bytes = mem::size_of_val(&*slice);
        drop(slice);
        self.refund(bytes);
    }
}

impl<A: BucketAllocator> BucketAllocator for Arc<A> {
    fn allocate<T>(&self, len: usize, init: impl FnMut() -> T) -> Result<Box<[T]>, AllocationError> {
        (**self).allocate(len, init)
    }

    fn deallocate<T>(&self, slice: Box<[T]>) {
        (**self).deallocate(slice);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_global_allocates_initialized() {
        let items = GlobalAllocator.allocate(4, || 7u32).unwrap();
        assert_eq!(&*items, &[7, 7, 7, 7]);
    }

    #[test]
    fn test_global_reports_overflow() {
        let result = GlobalAllocator.allocate(usize::MAX, || 0u64);
        assert_eq!(result.unwrap_err(), AllocationError::CapacityOverflow);
    }

    #[test]
    fn test_budget_charges_and_refunds() {
        let allocator = BudgetAllocator::new(64);
        let items = allocator.allocate(8, || 0u32).unwrap();
        assert_eq!(allocator.used(), 32);

        allocator.deallocate(items);
        assert_eq!(allocator.used(), 0);
    }

    #[test]
    fn test_budget_rejects_excess() {
        let allocator = BudgetAllocator::new(64);
        let _held = allocator.allocate(12, || 0u32).unwrap();

        let err = allocator.allocate(8, || 0u32).unwrap_err();
        assert_eq!(err, AllocationError::BudgetExceeded { requested: 32, available: 16 });
        assert_eq!(allocator.used(), 48);
    }

    #[test]
    fn test_foreign_slice_does_not_wrap_budget() {
        let allocator = BudgetAllocator::new(64);
        let held = allocator.allocate(4, || 0u32).unwrap();

        allocator.deallocate(GlobalAllocator.allocate(16, || 0u32).unwrap());
        assert_eq!(allocator.used(), 0);

        drop(held);
        let items = allocator.allocate(16, || 0u32).unwrap();
        assert_eq!(items.len(), 16);
        assert_eq!(allocator.used(), 64);
    }

    #[test]
    fn test_shared_budget_through_arc() {
        let allocator = Arc::new(BudgetAllocator::new(1024));
        let shared = Arc::clone(&allocator);
        let items = shared.allocate(16, || 0u64).unwrap();
        assert_eq!(allocator.used(), 128);
        shared.deallocate(items);
        assert_eq!(allocator.used(), 0);
    }
}
