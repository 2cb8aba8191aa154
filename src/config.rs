//! Table configuration

use crate::error::ConfigError;

/// Width of a neighborhood: a key is stored at most `NEIGHBORHOOD - 1` slots past its
/// home bucket. Bounded by the `u32` bitmap.
pub const NEIGHBORHOOD: usize = 32;

/// Largest supported size exponent
pub const MAX_EXPONENT: u32 = 40;

/// Default size exponent (1024 buckets)
pub const DEFAULT_EXPONENT: u32 = 10;

/// Default number of unlocked lookup attempts before escalating to the structural lock
pub const DEFAULT_MAX_LOCKLESS_RETRIES: u32 = 2;

/// Tunables of a [`crate::HopscotchTable`]
///
/// `buckets_per_lock` trades lock memory for contention: with the default of 1 every bucket
/// has its own kv lock, larger values let runs of consecutive buckets share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopscotchConfig {
    /// The table holds `2^exponent` home buckets
    exponent: u32,
    /// Number of consecutive buckets sharing one kv lock
    buckets_per_lock: usize,
    /// Unlocked lookup retries before taking the home bucket's structural lock
    max_lockless_retries: u32,
}

impl Default for HopscotchConfig {
    fn default() -> Self {
        Self {
            exponent: DEFAULT_EXPONENT,
            buckets_per_lock: 1,
            max_lockless_retries: DEFAULT_MAX_LOCKLESS_RETRIES,
        }
    }
}

impl HopscotchConfig {
    /// Creates the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size exponent
    #[must_use]
    pub fn exponent(mut self, exponent: u32) -> Self {
        self.exponent = exponent;
        self
    }

    /// Sets how many consecutive buckets share one kv lock
    #[must_use]
    pub fn buckets_per_lock(mut self, buckets_per_lock: usize) -> Self {
        self.buckets_per_lock = buckets_per_lock;
        self
    }

    /// Sets the number of unlocked lookup retries
    #[must_use]
    pub fn max_lockless_retries(mut self, retries: u32) -> Self {
        self.max_lockless_retries = retries;
        self
    }

    /// Returns the size exponent
    #[must_use]
    pub fn get_exponent(&self) -> u32 {
        self.exponent
    }

    /// Returns how many buckets share one kv lock
    #[must_use]
    pub fn get_buckets_per_lock(&self) -> usize {
        self.buckets_per_lock
    }

    /// Returns the number of unlocked lookup retries
    #[must_use]
    pub fn get_max_lockless_retries(&self) -> u32 {
        self.max_lockless_retries
    }

    /// Checks the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the exponent is outside `1..=MAX_EXPONENT` or
    /// `buckets_per_lock` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exponent == 0 || self.exponent > MAX_EXPONENT {
            return Err(ConfigError::ExponentOutOfRange {
                exponent: self.exponent,
                max: MAX_EXPONENT,
            });
        }
        if self.buckets_per_lock == 0 {
            return Err(ConfigError::ZeroBucketsPerLock);
        }
        Ok(())
    }
}
