//! The hazard-pointer domain.
//!
//! A [`Domain`] owns the slot table, the orphan list and the reclamation
//! counters. Structures either own a private domain (so dropping the
//! structure frees everything it ever retired) or share the process-wide
//! one returned by [`Domain::global`].

use crate::config::Config;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::reclaim::Hazards;
use crate::retired::Orphans;
use crate::slot::{self, HazardSlot, NO_OWNER};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering, fence};
use crossbeam_utils::CachePadded;
use once_cell::race::OnceBox;

/// Reclamation counters of a domain.
///
/// Read with relaxed loads, so a snapshot taken while other threads are
/// retiring may be slightly behind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Pointers handed to `retire`
    pub retired: u64,
    /// Pointers whose deleter ran during a scan
    pub reclaimed: u64,
    /// Scans run, inline or on handle drop
    pub scans: u64,
    /// Entries parked on the orphan list by departing handles
    pub orphaned: u64,
}

impl Stats {
    /// Retired but not yet reclaimed.
    #[inline]
    pub fn pending(&self) -> u64 {
        self.retired.saturating_sub(self.reclaimed)
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) retired: AtomicU64,
    pub(crate) reclaimed: AtomicU64,
    pub(crate) scans: AtomicU64,
    pub(crate) orphaned: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Registry of hazard slots plus the shared reclamation state.
///
/// The slot table has a fixed size chosen at construction. Claiming a slot
/// when all of them are owned is a hard error: see
/// [`try_acquire`](Domain::try_acquire).
pub struct Domain {
    slots: Box<[CachePadded<HazardSlot>]>,
    orphans: Orphans,
    config: Config,
    counters: Counters,
}

impl Domain {
    /// A domain with the default [`Config`].
    pub fn new() -> Self {
        Self::build(Config::default())
    }

    /// A domain sized by `config`.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: Config) -> Self {
        let slots = (0..config.max_threads())
            .map(|_| CachePadded::new(HazardSlot::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            orphans: Orphans::new(),
            config,
            counters: Counters::default(),
        }
    }

    /// The process-wide domain, created with the default config on first use.
    ///
    /// It is never dropped, so entries still hazardous when the last handle
    /// goes away stay parked until some later scan.
    pub fn global() -> &'static Domain {
        static GLOBAL: OnceBox<Domain> = OnceBox::new();
        GLOBAL.get_or_init(|| Box::new(Domain::new()))
    }

    /// Claim a free slot for the calling thread.
    ///
    /// The returned handle owns the slot until it is dropped. Handles are
    /// not `Send`, so a slot is only ever published into by one thread.
    ///
    /// # Errors
    ///
    /// [`Error::CapacityExhausted`] when every slot is owned. The domain does
    /// not grow; callers should treat this as a sizing bug.
    pub fn try_acquire(&self) -> Result<Handle<'_>> {
        let token = slot::thread_token();
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.try_claim(token) {
                tracing::debug!(index, token, "hazard slot claimed");
                return Ok(Handle::new(self, index));
            }
        }

        let capacity = self.capacity();
        tracing::error!(capacity, token, "hazard slots exhausted");
        Err(Error::CapacityExhausted { capacity })
    }

    /// Claim a free slot for the calling thread.
    ///
    /// # Panics
    ///
    /// When every slot is owned ("too many threads"). This is the documented
    /// capacity limit of the domain; use [`try_acquire`](Domain::try_acquire)
    /// to get it as an error instead.
    pub fn acquire(&self) -> Handle<'_> {
        match self.try_acquire() {
            Ok(handle) => handle,
            Err(err) => panic!("kalkan: {err}"),
        }
    }

    /// Whether any slot currently publishes exactly `ptr`.
    pub fn is_hazard<T>(&self, ptr: *const T) -> bool {
        if ptr.is_null() {
            return false;
        }
        fence(Ordering::SeqCst);
        self.slots
            .iter()
            .any(|slot| slot.load() as usize == ptr as usize)
    }

    /// Snapshot every published hazard.
    ///
    /// The `SeqCst` fence pairs with the one in [`Handle::publish`]: either
    /// the snapshot sees a publication, or the publishing thread's
    /// re-validation sees the unlink that preceded this call.
    pub fn hazards(&self) -> Hazards {
        fence(Ordering::SeqCst);
        let ptrs = self
            .slots
            .iter()
            .map(|slot| slot.load() as usize)
            .filter(|&ptr| ptr != 0)
            .collect();
        Hazards::from_unsorted(ptrs)
    }

    /// Number of slots, i.e. the maximum number of live handles.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently owned by a handle.
    pub fn active_handles(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.owner() != NO_OWNER)
            .count()
    }

    /// Sizing this domain was built with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reclamation counters.
    pub fn stats(&self) -> Stats {
        Stats {
            retired: self.counters.retired.load(Ordering::Relaxed),
            reclaimed: self.counters.reclaimed.load(Ordering::Relaxed),
            scans: self.counters.scans.load(Ordering::Relaxed),
            orphaned: self.counters.orphaned.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub(crate) fn slot(&self, index: usize) -> &HazardSlot {
        &self.slots[index]
    }

    #[inline]
    pub(crate) fn orphans(&self) -> &Orphans {
        &self.orphans
    }

    #[inline]
    pub(crate) fn counters(&self) -> &Counters {
        &self.counters
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("capacity", &self.capacity())
            .field("active_handles", &self.active_handles())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// Dropping the domain drops `orphans`, which frees every parked entry.
// Handles borrow the domain, so none can be alive at that point and every
// handle has already flushed its list to the orphans on drop.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_from_config() {
        let domain = Domain::with_config(Config::new().with_max_threads(3)).unwrap();
        assert_eq!(domain.capacity(), 3);
        assert_eq!(domain.active_handles(), 0);
        assert!(domain.hazards().is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let err = Domain::with_config(Config::new().with_max_threads(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_global_is_singleton() {
        let a = Domain::global() as *const Domain;
        let b = std::thread::spawn(|| Domain::global() as *const Domain as usize)
            .join()
            .unwrap();
        assert_eq!(a as usize, b);
    }

    #[test]
    fn test_null_is_never_hazard() {
        let domain = Domain::new();
        let _handle = domain.acquire();
        assert!(!domain.is_hazard(core::ptr::null::<u8>()));
    }
}
