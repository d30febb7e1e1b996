//! Reclamation scan.
//!
//! - `Hazards`: sorted snapshot of every published hazard pointer
//! - `scan`: partition a retirement list into hazardous (kept) and safe
//!   (freed) entries against one snapshot
//!
//! The snapshot is a point-in-time check, not a proof of eternal absence.
//! Entries that are hazardous now stay in the list and are checked again
//! on the next scan.

use crate::retired::Retired;
use alloc::vec::Vec;

/// Sorted, deduplicated snapshot of published hazard pointers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hazards {
    ptrs: Vec<usize>,
}

impl Hazards {
    pub(crate) fn from_unsorted(mut ptrs: Vec<usize>) -> Self {
        ptrs.sort_unstable();
        ptrs.dedup();
        Self { ptrs }
    }

    /// Whether `ptr` was published when the snapshot was taken.
    #[inline]
    pub fn contains<T>(&self, ptr: *const T) -> bool {
        self.ptrs.binary_search(&(ptr as usize)).is_ok()
    }

    /// Number of distinct non-null hazards.
    #[inline]
    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    /// True when no thread was protecting anything.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }
}

/// Free every entry of `list` not present in `hazards`.
///
/// Survivors keep their relative order. Returns the number of entries freed.
///
/// # Safety
///
/// Every entry must be unreachable from its structure, and `hazards` must
/// have been taken after all of them were unlinked (with a `SeqCst` fence
/// between the unlink and the snapshot).
pub(crate) unsafe fn scan(list: &mut Vec<Retired>, hazards: &Hazards) -> usize {
    let before = list.len();
    let mut kept = Vec::with_capacity(hazards.len().min(before));

    for entry in list.drain(..) {
        if hazards.contains(entry.ptr()) {
            kept.push(entry);
        } else {
            // SAFETY: unlinked and unpublished at snapshot time; a thread
            // can only publish a pointer it re-validated against the live
            // structure, which no longer contains this one.
            unsafe { entry.reclaim() };
        }
    }

    let freed = before - kept.len();
    *list = kept;
    freed
}
