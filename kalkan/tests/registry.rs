//! Slot registry tests: claiming, capacity, publication.

use kalkan::{Config, Domain, Error};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn small_domain(max_threads: usize) -> Domain {
    Domain::with_config(Config::new().with_max_threads(max_threads)).unwrap()
}

#[test]
fn test_acquire_release_reuses_slot() {
    let domain = small_domain(2);

    let first = domain.acquire();
    let index = first.slot_index();
    assert_eq!(domain.active_handles(), 1);
    drop(first);
    assert_eq!(domain.active_handles(), 0);

    let again = domain.acquire();
    assert_eq!(again.slot_index(), index);
}

#[test]
fn test_capacity_exhausted_is_an_error() {
    let domain = small_domain(2);
    let _a = domain.acquire();
    let _b = domain.acquire();

    match domain.try_acquire() {
        Err(Error::CapacityExhausted { capacity }) => assert_eq!(capacity, 2),
        other => panic!("expected capacity error, got {other:?}"),
    }
}

#[test]
#[should_panic(expected = "too many threads")]
fn test_acquire_panics_when_full() {
    let domain = small_domain(1);
    let _a = domain.acquire();
    let _b = domain.acquire();
}

#[test]
fn test_capacity_error_message() {
    let err = Error::CapacityExhausted { capacity: 4 };
    assert_eq!(
        err.to_string(),
        "too many threads: all 4 hazard slots are in use"
    );
}

#[test]
fn test_publish_and_clear() {
    let domain = small_domain(4);
    let handle = domain.acquire();
    let value = Box::into_raw(Box::new(7u32));

    assert!(!domain.is_hazard(value));
    handle.publish(value);
    assert!(domain.is_hazard(value));
    assert_eq!(handle.protected(), value.cast());
    assert!(domain.hazards().contains(value));

    handle.clear();
    assert!(!domain.is_hazard(value));
    assert!(handle.protected().is_null());

    unsafe { drop(Box::from_raw(value)) };
}

#[test]
fn test_protect_returns_current_value() {
    let domain = Domain::new();
    let handle = domain.acquire();

    let empty: AtomicPtr<u32> = AtomicPtr::new(std::ptr::null_mut());
    assert!(handle.protect(&empty).is_null());
    assert!(handle.protected().is_null());

    let raw = Box::into_raw(Box::new(11u32));
    let src = AtomicPtr::new(raw);
    let got = handle.protect(&src);
    assert_eq!(got, raw);
    assert!(domain.is_hazard(raw));
    assert_eq!(unsafe { *got }, 11);

    handle.clear();
    unsafe { drop(Box::from_raw(raw)) };
}

#[test]
fn test_handle_drop_clears_hazard() {
    let domain = Domain::new();
    let raw = Box::into_raw(Box::new(1u8));
    {
        let handle = domain.acquire();
        handle.publish(raw);
        assert!(domain.is_hazard(raw));
    }
    assert!(!domain.is_hazard(raw));
    unsafe { drop(Box::from_raw(raw)) };
}

#[test]
fn test_multiple_handles_per_thread() {
    let domain = small_domain(3);
    let a = domain.acquire();
    let b = domain.acquire();
    assert_ne!(a.slot_index(), b.slot_index());
    assert_eq!(domain.active_handles(), 2);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_claims_never_share_a_slot() {
    const THREADS: usize = 8;
    let domain = Arc::new(small_domain(THREADS));
    let barrier = Arc::new(Barrier::new(THREADS));
    let claimed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let domain = domain.clone();
            let barrier = barrier.clone();
            let claimed = claimed.clone();
            thread::spawn(move || {
                barrier.wait();
                let handle = domain.acquire();
                // Each index is a distinct bit
                claimed.fetch_or(1 << handle.slot_index(), Ordering::SeqCst);
                barrier.wait();
                drop(handle);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(claimed.load(Ordering::SeqCst), (1 << THREADS) - 1);
    assert_eq!(domain.active_handles(), 0);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_slots_recycled_across_thread_generations() {
    let domain = Arc::new(small_domain(2));

    for _ in 0..20 {
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let domain = domain.clone();
                thread::spawn(move || {
                    let handle = domain.try_acquire().expect("slot available");
                    handle.slot_index()
                })
            })
            .collect();
        for w in workers {
            assert!(w.join().unwrap() < 2);
        }
    }
    assert_eq!(domain.active_handles(), 0);
}
