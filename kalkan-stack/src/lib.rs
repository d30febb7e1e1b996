//! Lock-free Treiber stack reclaimed with kalkan hazard pointers.
//!
//! ## Features
//!
//! - `Stack`: unbounded MPMC LIFO, CAS-linked, never blocks.
//! - `StackHandle`: a thread's hazard slot bound to a stack, for pop loops.
//! - Popped nodes are retired and freed by the stack's own hazard domain;
//!   dropping the stack frees every node it allocated.
//!
//! ## Usage
//!
//! ```rust
//! use kalkan_stack::Stack;
//!
//! let stack = Stack::new();
//! stack.push(1);
//! stack.push(2);
//!
//! let handle = stack.handle();
//! assert_eq!(handle.pop(), Some(2));
//! assert_eq!(handle.pop(), Some(1));
//! assert_eq!(handle.pop(), None);
//! ```

pub mod stack;

pub use stack::{Stack, StackHandle};
