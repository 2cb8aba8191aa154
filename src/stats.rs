//! Operation counters of a table

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated with relaxed atomics on the hot paths
#[derive(Debug, Default)]
pub(crate) struct TableCounters {
    /// New keys stored
    pub(crate) inserts: AtomicU64,
    /// Inserts that overwrote an existing key
    pub(crate) updates: AtomicU64,
    /// Keys removed
    pub(crate) removes: AtomicU64,
    /// Items moved closer to a free slot during inserts
    pub(crate) displacements: AtomicU64,
    /// Longest displacement chain of a single insert
    pub(crate) max_displacement_chain: AtomicU64,
    /// Unlocked lookup scans repeated after a timestamp change
    pub(crate) lookup_retries: AtomicU64,
    /// Lookups that fell back to the structural lock
    pub(crate) lookup_escalations: AtomicU64,
    /// Inserts rejected because no slot could be placed in the neighborhood
    pub(crate) table_full: AtomicU64,
    /// Completed resizes
    pub(crate) resizes: AtomicU64,
    /// Resizes rolled back
    pub(crate) failed_resizes: AtomicU64,
}

impl TableCounters {
    /// Adds one to `counter`
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a finished displacement chain of `moves` steps
    pub(crate) fn record_chain(&self, moves: u64) {
        if moves > 0 {
            self.displacements.fetch_add(moves, Ordering::Relaxed);
            self.max_displacement_chain.fetch_max(moves, Ordering::Relaxed);
        }
    }

    /// Takes a point-in-time copy of every counter
    pub(crate) fn snapshot(&self) -> TableStats {
        TableStats {
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            displacements: self.displacements.load(Ordering::Relaxed),
            max_displacement_chain: self.max_displacement_chain.load(Ordering::Relaxed),
            lookup_retries: self.lookup_retries.load(Ordering::Relaxed),
            lookup_escalations: self.lookup_escalations.load(Ordering::Relaxed),
            table_full: self.table_full.load(Ordering::Relaxed),
            resizes: self.resizes.load(Ordering::Relaxed),
            failed_resizes: self.failed_resizes.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a table's operation counters
///
/// Counters are read individually, so a snapshot taken under concurrent
/// traffic is not an atomic cut across all fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// New keys stored
    pub inserts: u64,
    /// Inserts that overwrote an existing key
    pub updates: u64,
    /// Keys removed
    pub removes: u64,
    /// Items moved during displacement
    pub displacements: u64,
    /// Longest displacement chain of a single insert
    pub max_displacement_chain: u64,
    /// Unlocked lookup scans repeated after a concurrent structural change
    pub lookup_retries: u64,
    /// Lookups that took the structural lock
    pub lookup_escalations: u64,
    /// Inserts rejected with `TableFull`
    pub table_full: u64,
    /// Completed resizes
    pub resizes: u64,
    /// Resizes rolled back
    pub failed_resizes: u64,
}
