//! Retired entries and the domain-wide orphan list.
//!
//! A [`Retired`] is a pointer that has been unlinked from its structure but
//! may still be read through a hazard pointer. It carries a type-erased
//! deleter so a single list can hold nodes of any type.
//!
//! Entries normally live in the retirement list of the handle that retired
//! them. When a handle goes away with entries still hazardous, they are
//! parked as one batch on the domain's [`Orphans`] list and adopted by the
//! next scan on any thread.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// Type-erased deleter, called exactly once per retired pointer.
pub type Deleter = unsafe fn(*mut ());

/// Deleter for pointers obtained from `Box::into_raw`.
pub(crate) unsafe fn drop_boxed<T>(ptr: *mut ()) {
    // SAFETY: caller of `retire::<T>` promised a `Box<T>` allocation
    unsafe { drop(Box::from_raw(ptr.cast::<T>())) }
}

/// A retired pointer and the function that frees it.
pub(crate) struct Retired {
    ptr: *mut (),
    deleter: Deleter,
}

impl Retired {
    #[inline]
    pub(crate) fn new(ptr: *mut (), deleter: Deleter) -> Self {
        Self { ptr, deleter }
    }

    #[inline]
    pub(crate) fn ptr(&self) -> *mut () {
        self.ptr
    }

    /// Run the deleter.
    ///
    /// # Safety
    ///
    /// No hazard may reference the pointer, and no thread may be able to
    /// reach it from the live structure.
    #[inline]
    pub(crate) unsafe fn reclaim(self) {
        unsafe { (self.deleter)(self.ptr) }
    }
}

// SAFETY: a retired pointer is unreachable from the structure and only
// handed from thread to thread through the orphan list.
unsafe impl Send for Retired {}

/// A batch of entries parked by a departing handle.
struct OrphanBatch {
    entries: Vec<Retired>,
    next: *mut OrphanBatch,
}

/// Lock-free list of orphan batches.
///
/// Push is a CAS loop on the head, like a stack push. Adoption detaches the
/// whole list with one swap, so a batch is owned by exactly one adopter.
///
/// `len` is raised before a batch is linked and lowered after it is
/// detached, so it never reads below the number of parked entries.
pub(crate) struct Orphans {
    head: AtomicPtr<OrphanBatch>,
    len: AtomicUsize,
}

impl Orphans {
    pub(crate) const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            len: AtomicUsize::new(0),
        }
    }

    /// Park `entries` for a future scan. Empty batches are dropped.
    pub(crate) fn push(&self, entries: Vec<Retired>) {
        if entries.is_empty() {
            return;
        }
        self.len.fetch_add(entries.len(), Ordering::Relaxed);
        let batch = Box::into_raw(Box::new(OrphanBatch {
            entries,
            next: ptr::null_mut(),
        }));

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: batch is ours until the CAS publishes it
            unsafe { (*batch).next = head };
            match self
                .head
                .compare_exchange_weak(head, batch, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    /// Detach every parked batch and append its entries to `out`.
    ///
    /// Returns the number of entries adopted.
    pub(crate) fn adopt_into(&self, out: &mut Vec<Retired>) -> usize {
        if self.head.load(Ordering::Relaxed).is_null() {
            return 0;
        }
        let mut curr = self.head.swap(ptr::null_mut(), Ordering::Acquire);
        let mut adopted = 0;
        while !curr.is_null() {
            // SAFETY: the swap made the detached chain exclusively ours
            let batch = unsafe { Box::from_raw(curr) };
            curr = batch.next;
            adopted += batch.entries.len();
            out.extend(batch.entries);
        }
        self.len.fetch_sub(adopted, Ordering::Relaxed);
        adopted
    }

    /// Entries parked right now, possibly counting a batch still being
    /// linked.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

impl Drop for Orphans {
    fn drop(&mut self) {
        let mut entries = Vec::new();
        self.adopt_into(&mut entries);
        for entry in entries {
            // SAFETY: `&mut self` means the owning domain is being dropped,
            // so no handle and therefore no hazard exists anymore.
            unsafe { entry.reclaim() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    // One counter per test, tests run in parallel.
    static FREED: [AtomicUsize; 2] = [AtomicUsize::new(0), AtomicUsize::new(0)];

    unsafe fn count_and_free<const N: usize>(ptr: *mut ()) {
        FREED[N].fetch_add(1, Ordering::SeqCst);
        unsafe { drop_boxed::<u64>(ptr) };
    }

    fn entry<const N: usize>(v: u64) -> Retired {
        Retired::new(Box::into_raw(Box::new(v)).cast(), count_and_free::<N>)
    }

    #[test]
    fn test_push_and_adopt() {
        let orphans = Orphans::new();
        assert_eq!(orphans.len(), 0);

        orphans.push(vec![entry::<0>(1), entry::<0>(2)]);
        orphans.push(Vec::new());
        orphans.push(vec![entry::<0>(3)]);
        assert_eq!(orphans.len(), 3);

        let mut out = Vec::new();
        assert_eq!(orphans.adopt_into(&mut out), 3);
        assert_eq!(orphans.len(), 0);
        assert_eq!(orphans.adopt_into(&mut out), 0);

        for e in out {
            unsafe { e.reclaim() };
        }
        assert_eq!(FREED[0].load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_drop_frees_parked() {
        let orphans = Orphans::new();
        orphans.push(vec![entry::<1>(7), entry::<1>(8)]);

        drop(orphans);
        assert_eq!(FREED[1].load(Ordering::SeqCst), 2);
    }
}
