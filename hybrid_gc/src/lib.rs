//! Hybrid Garbage Collector
//!
//! Reference counting with a mark-and-sweep backstop for cycles.
//!
//! # Architecture
//!
//! Every managed allocation is a *block* recorded in an address-ordered
//! registry. Blocks are referenced through [`Gc`] handles, each holding one
//! unit of its target's count.
//!
//! - **Eager release**: dropping or reassigning the last handle to a block
//!   frees it immediately.
//!
//! - **Classification**: a handle is a *root* when it lives outside any
//!   managed block and a *child edge* when it is stored inside one. Values
//!   report their inline handles through [`Trace`] when moved into a block,
//!   which demotes those handles to edges of that block.
//!
//! - **Cycle collection**: [`Heap::collect`] marks every block reachable
//!   from a root through edge sets and releases everything else, whatever
//!   its count.
//!
//! # Usage
//!
//! ```
//! use hybrid_gc::{Gc, GcCell, GcConfig, Heap, Trace, Tracer};
//!
//! struct Person {
//!     name: String,
//!     friend: GcCell<Person>,
//! }
//!
//! unsafe impl Trace for Person {
//!     fn trace(&self, tracer: &mut dyn Tracer) {
//!         self.friend.trace(tracer);
//!     }
//! }
//!
//! let heap = Heap::init(GcConfig::default()).unwrap();
//!
//! let alice = Gc::new(Person { name: "alice".into(), friend: GcCell::null() });
//! let bob = Gc::new(Person { name: "bob".into(), friend: alice.clone().into() });
//! alice.friend.set(&bob);
//! assert_eq!(alice.friend.get().name, "bob");
//!
//! drop((alice, bob));
//! assert_eq!(heap.collect().blocks_freed, 2);
//! ```
//!
//! # Threading
//!
//! The collector context is per thread. Handles are neither `Send` nor
//! `Sync`, and a thread has at most one live [`Heap`].
//!
//! # Safety
//!
//! The collector requires that:
//! - `Trace` impls report only handles stored inline in `self`
//! - References obtained through a handle are not used after that handle
//!   (or the handle holding its target) is reassigned with the unsafe
//!   [`Gc::set`], [`Gc::set_null`] or [`Gc::take`]
//!
//! Fields that change after allocation belong in a [`GcCell`] or a
//! [`GcVec`]. Neither lends out a reference to a stored handle, so their
//! mutators are safe.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod collector;
pub mod config;
pub mod heap;
pub mod roots;
pub mod trace;

mod alloc;
mod cell;
mod container;
mod error;
mod stats;

// Re-exports for convenient access
pub use alloc::Gc;
pub use cell::GcCell;
pub use collector::CollectResult;
pub use config::{ConfigError, GcConfig};
pub use container::GcVec;
pub use error::{GcError, GcResult, LeakWarning, TeardownReport};
pub use heap::{BlockInfo, BlockKind, BlockRef, Heap};
pub use roots::{HandleId, HandleRole};
pub use stats::{format_bytes, GcStats, ReleaseReason};
pub use trace::{Trace, Tracer};
