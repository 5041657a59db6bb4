//! Heap memory management.
//!
//! The heap is a per-thread context made of three parts:
//! - Block registry: every live allocation, ordered by address
//! - Handle table: role and target of every live [`Gc`] handle
//! - Root set: the handles that live outside managed blocks
//!
//! [`Heap`] is the host-facing facade over that context. It is created
//! explicitly with [`Heap::init`] and torn down explicitly with
//! [`Heap::shutdown`] (or on drop), at which point leaks are reported.

mod block;
mod context;
pub(crate) mod managed;
mod registry;

pub use block::{AddrRange, BlockEntry, BlockInfo, BlockKind, BlockRef};
pub use registry::BlockRegistry;

pub(crate) use context::with_state;

use crate::alloc::Gc;
use crate::collector::CollectResult;
use crate::config::GcConfig;
use crate::error::{GcError, GcResult, LeakWarning, TeardownReport};
use crate::stats::{GcStats, GcTimer, ReleaseReason};
use crate::trace::Trace;
use context::HeapState;
use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;
use tracing::{debug, info, warn};

/// Host-facing handle on the current thread's collector context.
///
/// Only one heap can be live per thread. Handles created on the thread
/// register with it automatically; handles that outlive it become inert.
///
/// # Example
///
/// ```
/// use hybrid_gc::{GcCell, GcConfig, Heap, Trace, Tracer};
///
/// struct Node {
///     next: GcCell<Node>,
/// }
///
/// unsafe impl Trace for Node {
///     fn trace(&self, tracer: &mut dyn Tracer) {
///         self.next.trace(tracer);
///     }
/// }
///
/// let heap = Heap::init(GcConfig::default()).unwrap();
/// {
///     let a = heap.alloc(Node { next: GcCell::null() }).unwrap();
///     let b = heap.alloc(Node { next: GcCell::new(a.clone()) }).unwrap();
///     a.next.set(&b); // a <-> b cycle
/// }
/// assert_eq!(heap.block_count(), 2);
///
/// let result = heap.collect();
/// assert_eq!(result.blocks_freed, 2);
/// assert!(heap.shutdown().is_clean());
/// ```
pub struct Heap {
    /// Cleared once teardown has run.
    active: bool,
    _not_send: PhantomData<*const ()>,
}

impl Heap {
    /// Install a new collector context on this thread.
    pub fn init(config: GcConfig) -> GcResult<Self> {
        config.validate()?;
        context::install(HeapState::new(config))?;
        debug!("heap initialized");
        Ok(Self {
            active: true,
            _not_send: PhantomData,
        })
    }

    /// Install a context with the default configuration.
    pub fn with_defaults() -> GcResult<Self> {
        Self::init(GcConfig::default())
    }

    /// Check if a heap is live on this thread.
    pub fn is_initialized() -> bool {
        context::is_installed()
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Move `value` into a new managed block and return a root handle to it.
    ///
    /// Handles stored in `value` (as reported by its [`Trace`] impl) become
    /// child edges of the new block.
    pub fn alloc<T: Trace + 'static>(&self, value: T) -> GcResult<Gc<T>> {
        managed::alloc_object(value, BlockKind::Object)
    }

    /// Raw allocation hook.
    ///
    /// Returns uninitialized storage registered as a [`BlockKind::Raw`]
    /// block. Raw blocks are owned by the host: the collector never sweeps
    /// them and they stay registered until passed to [`Heap::free`].
    pub fn allocate(&self, layout: Layout) -> GcResult<NonNull<u8>> {
        let (ptr, _) = with_state(|state| {
            managed::allocate_block(state, layout, None, BlockKind::Raw, "raw")
        })
        .ok_or(GcError::NoHeap)??;
        Ok(ptr)
    }

    /// Release hook.
    ///
    /// Unregisters the block starting at `ptr`, runs the destructor of the
    /// value stored there (if it is a managed object) and frees the storage.
    /// Addresses that are not the start of a live block, including ones
    /// already freed, are rejected with [`GcError::ForeignRelease`].
    ///
    /// # Safety
    ///
    /// No reference into the block may be used after this call. Handles
    /// still targeting it become null-like: dereferencing them fails.
    pub unsafe fn free(&self, ptr: NonNull<u8>) -> GcResult<()> {
        let address = ptr.as_ptr() as usize;
        let entry = with_state(|state| managed::release_block(state, address))
            .ok_or(GcError::NoHeap)?
            .map_err(|err| {
                warn!(%err, "rejected release");
                err
            })?;
        managed::destroy(entry, ReleaseReason::Explicit);
        Ok(())
    }

    /// Array allocation is not supported; a block tracks exactly one object.
    pub fn allocate_array(&self, layout: Layout, count: usize) -> GcResult<NonNull<u8>> {
        warn!(size = layout.size(), count, "array allocation rejected");
        Err(GcError::ArrayUnsupported)
    }

    /// Array release is not supported.
    ///
    /// # Safety
    ///
    /// Always fails without touching `ptr`; unsafe only to mirror
    /// [`Heap::free`].
    pub unsafe fn free_array(&self, ptr: NonNull<u8>) -> GcResult<()> {
        warn!(address = ptr.as_ptr() as usize, "array release rejected");
        Err(GcError::ArrayUnsupported)
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Run a full mark-and-sweep pass.
    ///
    /// Every block not reachable from a root is released, whatever its
    /// reference count. Always runs to completion.
    pub fn collect(&self) -> CollectResult {
        let timer = GcTimer::start("collect");

        let Some((mut result, condemned)) = with_state(HeapState::begin_collection) else {
            return CollectResult::default();
        };

        result.blocks_freed = condemned.len();
        for entry in condemned {
            result.bytes_freed += entry.size();
            managed::destroy(entry, ReleaseReason::Swept);
        }

        let elapsed = timer.stop();
        with_state(|state| {
            state.stats.record_collection(elapsed);
            result.live_blocks = state.registry.len();
            result.live_bytes = state.registry.total_bytes();

            if state.config.trace {
                info!(?result, ?elapsed, "collection finished");
            } else {
                debug!(?result, ?elapsed, "collection finished");
            }

            if state.config.verify_heap {
                if let Err(err) = state.registry.verify() {
                    panic!("heap verification failed after collection: {err}");
                }
            }
        });

        result
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Find the block containing `address`.
    pub fn find(&self, address: *const u8) -> Option<BlockInfo> {
        with_state(|state| {
            let block = state.registry.find(address as usize)?;
            state.registry.get(block).map(BlockEntry::info)
        })
        .flatten()
    }

    /// Number of live blocks.
    pub fn block_count(&self) -> usize {
        with_state(|state| state.registry.len()).unwrap_or(0)
    }

    /// Number of live root handles.
    pub fn root_count(&self) -> usize {
        with_state(|state| state.roots.len()).unwrap_or(0)
    }

    /// Number of live handles, roots and child edges together.
    pub fn handle_count(&self) -> usize {
        with_state(|state| state.handles.len()).unwrap_or(0)
    }

    /// Bytes held by live blocks.
    pub fn live_bytes(&self) -> usize {
        with_state(|state| state.registry.total_bytes()).unwrap_or(0)
    }

    /// Snapshot of the collector statistics.
    pub fn stats(&self) -> GcStats {
        with_state(|state| state.stats.clone()).unwrap_or_default()
    }

    /// The active configuration.
    pub fn config(&self) -> GcConfig {
        with_state(|state| state.config.clone()).unwrap_or_default()
    }

    /// Check registry invariants.
    pub fn verify(&self) -> GcResult<()> {
        with_state(|state| state.registry.verify()).ok_or(GcError::NoHeap)?
    }

    /// Report blocks and roots that are still live.
    ///
    /// Purely observational; returns `None` when the heap is empty.
    pub fn check_quiescent(&self) -> Option<LeakWarning> {
        with_state(|state| state.leak_warning()).flatten()
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Tear down the context and report what was still live.
    ///
    /// Blocks still live afterwards are leaked rather than freed, so any
    /// surviving handle keeps pointing at valid memory; those handles become
    /// inert and fail to dereference.
    pub fn shutdown(mut self) -> TeardownReport {
        self.teardown()
    }

    fn teardown(&mut self) -> TeardownReport {
        self.active = false;

        let config = self.config();
        let final_freed = if config.collect_on_shutdown {
            self.collect().blocks_freed
        } else {
            0
        };

        let leaks = self.check_quiescent();
        if let Some(leak) = leaks {
            if config.warn_on_leaks {
                warn!(%leak, "heap torn down while not quiescent");
            }
        }

        if let Some(state) = context::uninstall() {
            debug!(stats = %state.stats.summary(), "heap shut down");
        }

        TeardownReport { final_freed, leaks }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        if self.active {
            self.teardown();
        }
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("blocks", &self.block_count())
            .field("roots", &self.root_count())
            .field("live_bytes", &self.live_bytes())
            .finish()
    }
}
