//! Hazard slots and thread tokens.
//!
//! A domain owns a fixed table of [`HazardSlot`]s. A slot is claimed by
//! CAS-ing its owner word from `0` to the claiming thread's token, and gives
//! that thread one published hazard pointer. Scans read every slot.

use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// Owner word of an unclaimed slot.
pub(crate) const NO_OWNER: u64 = 0;

/// One hazard pointer and the token of the thread owning it.
///
/// Kept on its own cache line by the domain (`CachePadded`), since the
/// owner publishes into it on every pop while every scan reads it.
pub(crate) struct HazardSlot {
    owner: AtomicU64,
    hazard: AtomicPtr<()>,
}

impl HazardSlot {
    pub(crate) const fn new() -> Self {
        Self {
            owner: AtomicU64::new(NO_OWNER),
            hazard: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Try to take ownership for `token`. Fails if the slot is owned.
    #[inline]
    pub(crate) fn try_claim(&self, token: u64) -> bool {
        debug_assert_ne!(token, NO_OWNER);
        // Cheap test before the CAS, most slots are owned under load.
        if self.owner.load(Ordering::Relaxed) != NO_OWNER {
            return false;
        }
        self.owner
            .compare_exchange(NO_OWNER, token, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Clear the hazard and give the slot back.
    ///
    /// The hazard store comes first: once the owner word reads free,
    /// a new owner may publish immediately.
    #[inline]
    pub(crate) fn release(&self) {
        self.hazard.store(ptr::null_mut(), Ordering::Release);
        self.owner.store(NO_OWNER, Ordering::Release);
    }

    #[inline]
    pub(crate) fn owner(&self) -> u64 {
        self.owner.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn publish(&self, ptr: *mut ()) {
        self.hazard.store(ptr, Ordering::Release);
    }

    /// Current hazard, as seen by a scan.
    #[inline]
    pub(crate) fn load(&self) -> *mut () {
        self.hazard.load(Ordering::Acquire)
    }
}

/// Next token to hand out. Starts at 1, 0 means "no owner".
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

std::thread_local! {
    static TOKEN: u64 = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Process-unique, non-zero identity of the calling thread.
///
/// Tokens are never recycled, a `u64` does not run out.
#[inline]
pub(crate) fn thread_token() -> u64 {
    TOKEN.with(|token| *token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_and_release() {
        let slot = HazardSlot::new();
        let me = thread_token();

        assert!(slot.try_claim(me));
        assert_eq!(slot.owner(), me);
        assert!(!slot.try_claim(me), "owned slot must not be claimed twice");

        slot.publish(0x1000 as *mut ());
        assert_eq!(slot.load(), 0x1000 as *mut ());

        slot.release();
        assert_eq!(slot.owner(), NO_OWNER);
        assert!(slot.load().is_null());
        assert!(slot.try_claim(me));
    }

    #[test]
    fn test_tokens_unique_per_thread() {
        let here = thread_token();
        assert_eq!(here, thread_token());
        assert_ne!(here, NO_OWNER);

        let there = std::thread::spawn(thread_token).join().unwrap();
        assert_ne!(here, there);
    }
}
