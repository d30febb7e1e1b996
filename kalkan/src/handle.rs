//! Per-thread handle: one hazard slot plus a private retirement list.
//!
//! Protocol for readers:
//! - `protect` (or `publish` + re-validate) before dereferencing a shared node
//! - `clear` once done with it
//!
//! Protocol for writers:
//! - unlink the node with a CAS, then `retire` it instead of freeing it
//! - the list is scanned inline once it reaches the domain's threshold

use crate::domain::{Counters, Domain};
use crate::reclaim;
use crate::retired::{Deleter, Retired, drop_boxed};
use crate::slot::HazardSlot;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::marker::PhantomData as marker;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering, fence};

/// Owner of one hazard slot of a [`Domain`].
///
/// Obtained from [`Domain::acquire`]. Dropping the handle releases the slot
/// and parks its retirement list on the domain, scanning first only if the
/// parked total would reach the scan threshold. Not `Send`: a hazard slot
/// belongs to the thread that claimed it.
///
/// Leaking a handle (`mem::forget`) leaks its slot and everything in its
/// retirement list.
pub struct Handle<'d> {
    domain: &'d Domain,
    index: usize,
    retired: RefCell<Vec<Retired>>,
    marker: marker<*mut ()>,
}

impl<'d> Handle<'d> {
    pub(crate) fn new(domain: &'d Domain, index: usize) -> Self {
        Self {
            domain,
            index,
            retired: RefCell::new(Vec::new()),
            marker,
        }
    }

    #[inline]
    fn slot(&self) -> &'d HazardSlot {
        self.domain.slot(self.index)
    }

    /// The domain this handle belongs to.
    #[inline]
    pub fn domain(&self) -> &'d Domain {
        self.domain
    }

    /// Index of the owned slot in the domain's table.
    #[inline]
    pub fn slot_index(&self) -> usize {
        self.index
    }

    /// Announce that this thread may dereference `ptr`.
    ///
    /// Release store followed by a `SeqCst` fence, so a subsequent load of
    /// the source pointer is ordered after the publication. A publication
    /// only protects `ptr` if the caller re-reads the source afterwards and
    /// still finds `ptr` there; [`protect`](Handle::protect) does both.
    #[inline]
    pub fn publish<T>(&self, ptr: *mut T) {
        self.slot().publish(ptr.cast());
        fence(Ordering::SeqCst);
    }

    /// Stop protecting anything.
    #[inline]
    pub fn clear(&self) {
        self.slot().publish(ptr::null_mut());
    }

    /// Pointer currently published by this handle, null if none.
    #[inline]
    pub fn protected(&self) -> *mut () {
        self.slot().load()
    }

    /// Load `src` and protect the result.
    ///
    /// Loops load → publish → re-load until two loads agree, so the returned
    /// pointer was still reachable from `src` after it was published. A null
    /// result clears the slot. The returned node cannot be freed until the
    /// slot is cleared or overwritten.
    pub fn protect<T>(&self, src: &AtomicPtr<T>) -> *mut T {
        let mut ptr = src.load(Ordering::Acquire);
        loop {
            if ptr.is_null() {
                self.clear();
                return ptr;
            }
            self.publish(ptr);
            let current = src.load(Ordering::Acquire);
            if current == ptr {
                return ptr;
            }
            ptr = current;
        }
    }

    /// Retire a `Box`-allocated pointer.
    ///
    /// # Safety
    ///
    /// - `ptr` must come from `Box::<T>::into_raw`.
    /// - `ptr` must already be unreachable from the shared structure.
    /// - `ptr` must not be retired more than once.
    /// - Dropping the `T` must be sound on any thread at any later point
    ///   while the domain lives.
    #[inline]
    pub unsafe fn retire<T>(&self, ptr: *mut T) {
        unsafe { self.retire_with(ptr.cast(), drop_boxed::<T>) }
    }

    /// Retire a pointer freed by a custom deleter.
    ///
    /// # Safety
    ///
    /// Same as [`retire`](Handle::retire), with `deleter` taking the place of
    /// `Box::from_raw`. It is called exactly once, on an arbitrary thread.
    pub unsafe fn retire_with(&self, ptr: *mut (), deleter: Deleter) {
        let len = {
            let mut list = self.retired.borrow_mut();
            debug_assert!(
                !list.iter().any(|entry| entry.ptr() == ptr),
                "kalkan: {ptr:p} retired twice"
            );
            list.push(Retired::new(ptr, deleter));
            list.len()
        };
        Counters::add(&self.domain.counters().retired, 1);

        if len >= self.domain.config().scan_threshold() {
            self.scan();
        }
    }

    /// Free every retired entry that no slot currently protects.
    ///
    /// Adopts the domain's orphan list first. Returns the number of entries
    /// freed; the rest stay in this handle's list for the next scan.
    pub fn scan(&self) -> usize {
        let _span = tracing::trace_span!("kalkan::scan", slot = self.index).entered();

        // Deleters may retire into this handle again, so do not hold the
        // borrow across them.
        let mut list = core::mem::take(&mut *self.retired.borrow_mut());
        let adopted = self.domain.orphans().adopt_into(&mut list);
        if adopted > 0 {
            tracing::debug!(slot = self.index, adopted, "adopted orphans");
        }
        let total = list.len();

        let hazards = self.domain.hazards();
        // SAFETY: entries are only retired after being unlinked, and the
        // snapshot was taken behind a SeqCst fence after the adoption.
        let freed = unsafe { reclaim::scan(&mut list, &hazards) };
        self.retired.borrow_mut().append(&mut list);

        let counters = self.domain.counters();
        Counters::add(&counters.scans, 1);
        Counters::add(&counters.reclaimed, freed);
        tracing::trace!(total, adopted, freed, kept = total - freed, "scan finished");
        freed
    }

    /// Entries retired through this handle and not yet freed.
    pub fn pending(&self) -> usize {
        self.retired.borrow().len()
    }
}

impl Drop for Handle<'_> {
    fn drop(&mut self) {
        self.clear();

        // Below the threshold the entries are parked unscanned; whoever
        // brings the parked total to the threshold scans it.
        let pending = self.retired.get_mut().len() + self.domain.orphans().len();
        if pending >= self.domain.config().scan_threshold() {
            self.scan();
        }

        let left = core::mem::take(self.retired.get_mut());
        if !left.is_empty() {
            tracing::debug!(slot = self.index, count = left.len(), "parking orphans");
            Counters::add(&self.domain.counters().orphaned, left.len());
            self.domain.orphans().push(left);
        }

        self.slot().release();
        tracing::debug!(slot = self.index, "hazard slot released");
    }
}

impl fmt::Debug for Handle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("slot", &self.index)
            .field("protected", &self.protected())
            .field("pending", &self.pending())
            .finish()
    }
}
