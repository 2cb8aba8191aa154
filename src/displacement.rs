//! Probing and displacement
//!
//! An insert claims the first free slot at or after its home bucket. When that
//! slot lies outside the home's neighborhood, items between the two are hopped
//! forward into the free slot, one anchor at a time, until the free slot falls
//! inside the window.

use log::{debug, warn};

use crate::bucket::{BucketStore, Slot};
use crate::config::NEIGHBORHOOD;
use crate::error::InsertError;
use crate::stats::TableCounters;

impl<const K: usize, V: Copy> BucketStore<K, V> {
    /// Claims the first free slot at or after `home` by CAS on its reservation flag
    ///
    /// Probing is linear and never wraps around.
    pub(crate) fn claim_free_slot(&self, home: usize) -> Option<usize> {
        (home..self.len()).find(|&index| self.bucket(index).try_reserve())
    }

    /// Moves the free slot `free`, claimed by the caller, into the window of `home`
    ///
    /// The caller holds the structural lock of `home`. Returns the in-window slot, still
    /// reserved. On failure the reservation is released and `TableFull` returned.
    #[allow(clippy::arithmetic_side_effects)]
    pub(crate) fn displace_into_window(
        &self,
        home: usize,
        mut free: usize,
        counters: &TableCounters,
    ) -> Result<usize, InsertError> {
        debug_assert!(free >= home, "free slot {free} precedes home bucket {home}");
        let mut moves = 0u64;

        while free - home >= NEIGHBORHOOD {
            debug!("bucket {home}: free slot {free} is outside the neighborhood");
            let Some(closer) = self.hop_free_slot_back(home, free) else {
                warn!("hash bucket {home} full: no item can be moved towards slot {free}");
                self.bucket(free).release_reservation();
                counters.record_chain(moves);
                return Err(InsertError::TableFull { home });
            };
            free = closer;
            moves += 1;
        }

        counters.record_chain(moves);
        Ok(free)
    }

    /// Moves one item forward into `free`, returning the slot it vacated
    ///
    /// Anchors are scanned from the farthest one that can still reach `free`, so the
    /// free slot travels back as far as possible per step. An anchor qualifies when its
    /// nearest item sits before `free` within the anchor's window.
    #[allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]
    fn hop_free_slot_back(&self, home: usize, free: usize) -> Option<usize> {
        for distance in (1..NEIGHBORHOOD).rev() {
            let anchor = free - distance;
            // free - home >= NEIGHBORHOOD, so every anchor lies past the caller's home
            // bucket and structural locks are always taken in increasing index order.
            debug_assert!(anchor > home, "anchor {anchor} not past home bucket {home}");

            let anchor_bucket = self.bucket(anchor);
            if anchor_bucket.hop_info() == 0 {
                continue;
            }

            let _anchor_guard = anchor_bucket.lock_structure();
            let hop_info = anchor_bucket.hop_info();
            if hop_info == 0 {
                continue;
            }
            // trailing_zeros of a non-zero u32 is below 32
            let offset = hop_info.trailing_zeros() as usize;
            if offset >= distance {
                continue;
            }

            let from = anchor + offset;
            debug_assert!(self.bucket(from).is_reserved(), "linked slot {from} is not reserved");
            // Both bits stay set while the item moves, and each change bumps the
            // timestamp, so an unlocked reader either finds the item or retries.
            anchor_bucket.link(distance);
            self.with_slot_pair(from, free, |src, dst| {
                *dst = *src;
                *src = Slot::EMPTY;
            });
            anchor_bucket.unlink(offset);
            debug!("moved item of bucket {anchor} from slot {from} to slot {free}");
            return Some(from);
        }
        None
    }
}
