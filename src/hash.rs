//! Hashing of fixed-width keys onto home buckets

/// Jenkins one-at-a-time hash over a byte slice.
///
/// Deterministic and unseeded, so a key always lands on the same home bucket
/// for a given table size.
#[must_use]
pub fn jenkins_one_at_a_time(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    for &byte in bytes {
        hash = hash.wrapping_add(u32::from(byte));
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash.wrapping_add(hash << 15)
}

/// Maps a hash onto a bucket index for a power-of-two table with the given mask.
#[must_use]
#[inline]
pub fn home_index(hash: u32, mask: usize) -> usize {
    // u32 always fits in usize on supported targets
    (hash as usize) & mask
}
