//! Treiber stack with hazard-pointer reclamation.
//!
//! Node lifecycle: `new → linked → retired → freed`.
//! - push links a fresh node with a CAS on `head`, no hazard needed
//! - pop protects the head, CASes it out, moves the value out and retires
//!   the node into the calling handle's list
//! - the node is freed by a scan once no hazard slot publishes it

use core::fmt;
use core::mem::ManuallyDrop;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use crossbeam_utils::{Backoff, CachePadded};
use kalkan::{Config, Domain, Handle};

/// A node in the stack.
///
/// `value` is moved out by the popping thread, so the retired node must be
/// freed without dropping it again. `next` is written only before the node
/// is published.
struct Node<T> {
    value: ManuallyDrop<T>,
    next: *mut Node<T>,
}

impl<T> Node<T> {
    fn new(value: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: ManuallyDrop::new(value),
            next: ptr::null_mut(),
        }))
    }
}

/// Lock-free LIFO stack.
///
/// Push and pop never block: contention is resolved by retrying the head
/// CAS. Popped nodes are reclaimed through the stack's own [`Domain`], so
/// dropping the stack frees every node it ever allocated.
///
/// Popping needs a hazard slot. [`Stack::pop`] claims one for the duration
/// of the call; threads popping in a loop should hold a [`StackHandle`].
pub struct Stack<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    domain: Domain,
}

// SAFETY: values are moved between threads by push/pop, nodes are only
// freed through the domain once unreachable.
unsafe impl<T: Send> Send for Stack<T> {}
unsafe impl<T: Send> Sync for Stack<T> {}

impl<T> Stack<T> {
    /// Creates an empty stack with a default-sized domain.
    pub fn new() -> Self {
        Self::with_domain(Domain::new())
    }

    /// Creates an empty stack whose domain is sized by `config`.
    pub fn with_config(config: Config) -> kalkan::Result<Self> {
        Ok(Self::with_domain(Domain::with_config(config)?))
    }

    fn with_domain(domain: Domain) -> Self {
        Self {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            domain,
        }
    }

    /// Pushes a value on top of the stack.
    pub fn push(&self, value: T) {
        let node = Node::new(value);
        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);

        loop {
            // SAFETY: node is not shared until the CAS below succeeds
            unsafe { (*node).next = head };

            // Release: the node's contents happen-before any pop that sees it.
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => {
                    head = current;
                    backoff.spin();
                }
            }
        }
    }

    /// Pops the top value, claiming a hazard slot for the call.
    ///
    /// Returns `None` if the stack was empty when its head was read.
    ///
    /// # Panics
    ///
    /// When every hazard slot of the stack's domain is owned; see
    /// [`try_pop`](Stack::try_pop).
    pub fn pop(&self) -> Option<T> {
        self.handle().pop()
    }

    /// Like [`pop`](Stack::pop), but reports capacity exhaustion.
    pub fn try_pop(&self) -> kalkan::Result<Option<T>> {
        Ok(self.try_handle()?.pop())
    }

    /// Whether the stack looked empty at the moment of the load.
    ///
    /// Advisory only: the answer may be stale by the time it is returned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Binds a hazard slot of this stack's domain to the calling thread.
    ///
    /// # Panics
    ///
    /// When every slot is owned ("too many threads").
    pub fn handle(&self) -> StackHandle<'_, T> {
        StackHandle {
            stack: self,
            hazard: self.domain.acquire(),
        }
    }

    /// Like [`handle`](Stack::handle), but reports capacity exhaustion.
    pub fn try_handle(&self) -> kalkan::Result<StackHandle<'_, T>> {
        Ok(StackHandle {
            stack: self,
            hazard: self.domain.try_acquire()?,
        })
    }

    /// The domain reclaiming this stack's nodes.
    #[inline]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("is_empty", &self.is_empty())
            .field("domain", &self.domain)
            .finish()
    }
}

impl<T> Drop for Stack<T> {
    fn drop(&mut self) {
        // `&mut self`: no handle exists, so nothing can be protected.
        let mut curr = *self.head.get_mut();
        let mut drained = 0usize;
        while !curr.is_null() {
            // SAFETY: linked nodes are owned by the stack and still hold
            // their value.
            let mut node = unsafe { Box::from_raw(curr) };
            curr = node.next;
            unsafe { ManuallyDrop::drop(&mut node.value) };
            drained += 1;
        }
        tracing::trace!(drained, "stack dropped");
        // `domain` is dropped next and frees the orphaned retired nodes.
    }
}

/// A thread's hazard slot bound to a [`Stack`].
///
/// Cheaper than the stack's own `pop` when popping repeatedly, since the
/// slot is claimed once. Not `Send`.
pub struct StackHandle<'s, T> {
    stack: &'s Stack<T>,
    hazard: Handle<'s>,
}

impl<T> StackHandle<'_, T> {
    /// Pushes a value on top of the stack.
    #[inline]
    pub fn push(&self, value: T) {
        self.stack.push(value);
    }

    /// Pops the top value, or `None` if the stack was empty.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            // Publish before dereferencing; `protect` re-reads the head
            // until it matches the published pointer.
            let head = self.hazard.protect(&self.stack.head);
            if head.is_null() {
                return None;
            }

            // SAFETY: head is protected, so it has not been freed.
            let next = unsafe { (*head).next };

            // Acquire on success pairs with the Release of the push that
            // linked `head`, making its value visible.
            match self.stack.head.compare_exchange(
                head,
                next,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    // SAFETY: the CAS made us the only thread unlinking
                    // `head`; its value is read exactly once. Other readers
                    // may still look at `next`, so no `&mut` to the node.
                    let value = unsafe { ptr::read(ptr::addr_of!((*head).value)) };
                    let value = ManuallyDrop::into_inner(value);
                    self.hazard.clear();
                    // SAFETY: unlinked above, allocated by `Node::new`, and
                    // freeing a `Node` never drops its value again.
                    unsafe { self.hazard.retire(head) };
                    return Some(value);
                }
                Err(_) => {
                    self.hazard.clear();
                    backoff.spin();
                }
            }
        }
    }

    /// Whether the stack looked empty at the moment of the load.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// The underlying hazard handle.
    #[inline]
    pub fn hazard(&self) -> &Handle<'_> {
        &self.hazard
    }
}

impl<T> fmt::Debug for StackHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackHandle")
            .field("hazard", &self.hazard)
            .finish_non_exhaustive()
    }
}
