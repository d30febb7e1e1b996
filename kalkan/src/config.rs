//! Domain sizing.

use crate::error::{Error, Result};

/// Default number of hazard slots, i.e. concurrently registered handles.
///
/// Comfortably above the core counts of current server parts, while a full
/// scan still reads only 128 cache lines.
pub const DEFAULT_MAX_THREADS: usize = 128;

/// Default multiplier applied to the slot count to get the scan threshold.
///
/// With a threshold of `2 × H` retired entries and at most `H` published
/// hazards, every scan frees at least half of the list, which keeps the
/// amortized reclamation cost per retire constant.
pub const DEFAULT_SCAN_FACTOR: usize = 2;

/// Sizing of a [`Domain`](crate::Domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    max_threads: usize,
    scan_factor: usize,
}

impl Config {
    /// Default configuration: 128 slots, scan at 2 × 128 retired entries.
    pub const fn new() -> Self {
        Self {
            max_threads: DEFAULT_MAX_THREADS,
            scan_factor: DEFAULT_SCAN_FACTOR,
        }
    }

    /// Set the number of hazard slots.
    pub const fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the scan threshold multiplier.
    pub const fn with_scan_factor(mut self, scan_factor: usize) -> Self {
        self.scan_factor = scan_factor;
        self
    }

    /// Number of hazard slots.
    #[inline]
    pub const fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Scan threshold multiplier.
    #[inline]
    pub const fn scan_factor(&self) -> usize {
        self.scan_factor
    }

    /// Length of a retirement list at which a scan runs inline.
    #[inline]
    pub const fn scan_threshold(&self) -> usize {
        self.max_threads.saturating_mul(self.scan_factor)
    }

    /// Reject configurations the domain cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_threads == 0 {
            return Err(Error::InvalidConfig {
                reason: "max_threads must be at least 1",
            });
        }
        if self.scan_factor == 0 {
            return Err(Error::InvalidConfig {
                reason: "scan_factor must be at least 1",
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
