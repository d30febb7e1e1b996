//! Kalkan: hazard-pointer memory reclamation for lock-free data structures.
//!
//! A reader publishes the address of a node it is about to dereference into
//! its own hazard slot. A writer that unlinks a node retires it instead of
//! freeing it; retired nodes are freed by a scan once no slot publishes
//! their address.
//!
//! # Key Features
//!
//! - **Bounded Garbage**: at most `scan_threshold + capacity` entries per handle
//! - **Explicit Handles**: one hazard slot per [`Handle`], no hidden globals
//! - **Batched Scans**: amortized constant reclamation cost per retire
//! - **Orphan Adoption**: entries left by departing handles are freed by others
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicPtr, Ordering};
//! use kalkan::Domain;
//!
//! let domain = Domain::new();
//! let shared = AtomicPtr::new(Box::into_raw(Box::new(42u64)));
//!
//! let handle = domain.acquire();
//!
//! // Published and re-validated: cannot be freed until cleared
//! let ptr = handle.protect(&shared);
//! assert_eq!(unsafe { *ptr }, 42);
//! handle.clear();
//!
//! // Unlink, then defer the free to a scan
//! let old = shared.swap(std::ptr::null_mut(), Ordering::AcqRel);
//! unsafe { handle.retire(old) };
//!
//! // Scans run on their own at the threshold; force one here
//! assert_eq!(handle.scan(), 1);
//! assert_eq!(domain.stats().pending(), 0);
//! ```

#![warn(missing_docs)]

extern crate alloc;

mod config;
mod domain;
mod error;
mod handle;
mod reclaim;
mod retired;
mod slot;

pub use config::{Config, DEFAULT_MAX_THREADS, DEFAULT_SCAN_FACTOR};
pub use domain::{Domain, Stats};
pub use error::{Error, Result};
pub use handle::Handle;
pub use reclaim::Hazards;
pub use retired::Deleter;

/// Claim a slot of the process-wide domain for the calling thread.
///
/// Shorthand for `Domain::global().acquire()`.
///
/// # Panics
///
/// When every slot of the global domain is owned.
#[inline]
pub fn acquire() -> Handle<'static> {
    Domain::global().acquire()
}

// Re-export for convenience
pub use core::sync::atomic::Ordering;
