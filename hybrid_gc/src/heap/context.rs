//! Per-thread collector context.
//!
//! The registry, handle table and root set form one context installed in a
//! thread-local slot by [`Heap::init`](super::Heap::init) and removed at
//! teardown. Every handle operation reaches it through [`with_state`].
//!
//! The context is only ever borrowed for the duration of bookkeeping. Blocks
//! whose storage must be destroyed are handed back to the caller as
//! [`BlockEntry`] values and destroyed after the borrow ends, so destructors
//! and `Trace` impls can reenter the context freely.

use super::block::{BlockEntry, BlockRef};
use super::registry::BlockRegistry;
use crate::collector::{CollectResult, MarkSweepCollector};
use crate::config::GcConfig;
use crate::error::{GcError, GcResult, LeakWarning};
use crate::roots::{HandleId, HandleRole, HandleTable, RootSet};
use crate::stats::GcStats;
use std::cell::{Cell, RefCell};
use tracing::trace;

thread_local! {
    static CONTEXT: RefCell<Option<HeapState>> = const { RefCell::new(None) };
    static NEXT_STAMP: Cell<u64> = const { Cell::new(1) };
}

/// Next value of the thread's stamp counter. Never returns 0.
pub(crate) fn next_stamp() -> u64 {
    NEXT_STAMP.with(|next| {
        let stamp = next.get();
        next.set(stamp + 1);
        stamp
    })
}

/// Run `f` against the installed context.
///
/// Returns `None` if no heap is installed (or the thread is exiting).
pub(crate) fn with_state<R>(f: impl FnOnce(&mut HeapState) -> R) -> Option<R> {
    CONTEXT
        .try_with(|cell| cell.borrow_mut().as_mut().map(f))
        .ok()
        .flatten()
}

pub(crate) fn install(state: HeapState) -> GcResult<()> {
    CONTEXT.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_some() {
            return Err(GcError::AlreadyInitialized);
        }
        *slot = Some(state);
        Ok(())
    })
}

pub(crate) fn uninstall() -> Option<HeapState> {
    CONTEXT.try_with(|cell| cell.borrow_mut().take()).ok().flatten()
}

pub(crate) fn is_installed() -> bool {
    CONTEXT
        .try_with(|cell| cell.borrow().is_some())
        .unwrap_or(false)
}

/// Everything the collector tracks for one heap.
pub(crate) struct HeapState {
    pub(crate) config: GcConfig,
    pub(crate) registry: BlockRegistry,
    pub(crate) handles: HandleTable,
    pub(crate) roots: RootSet,
    pub(crate) collector: MarkSweepCollector,
    pub(crate) stats: GcStats,
}

impl HeapState {
    pub(crate) fn new(config: GcConfig) -> Self {
        Self {
            registry: BlockRegistry::new(),
            handles: HandleTable::with_capacity(config.initial_handle_capacity),
            roots: RootSet::new(),
            collector: MarkSweepCollector::with_capacity(config.worklist_capacity),
            stats: GcStats::new(),
            config,
        }
    }

    // =========================================================================
    // Reference counts
    // =========================================================================

    /// Add one unit to a block's count. Returns false if the block is gone.
    pub(crate) fn retain(&mut self, block: BlockRef) -> bool {
        match self.registry.get_mut(block) {
            Some(entry) => {
                entry.count += 1;
                true
            }
            None => false,
        }
    }

    /// Remove one unit from a block's count.
    ///
    /// At zero the block is unregistered and returned for destruction.
    /// Releasing a block that is no longer registered is a no-op.
    pub(crate) fn release(&mut self, block: BlockRef) -> Option<BlockEntry> {
        let entry = self.registry.get_mut(block)?;
        entry.count = entry.count.saturating_sub(1);
        if entry.count > 0 {
            return None;
        }
        trace!(start = block.start(), "count reached zero, releasing block");
        self.registry.unregister(block)
    }

    /// Check if a block is still registered.
    #[inline]
    pub(crate) fn is_live(&self, block: BlockRef) -> bool {
        self.registry.contains(block)
    }

    // =========================================================================
    // Handles
    // =========================================================================

    /// Register a handle, taking one unit of its target's count.
    pub(crate) fn register_handle(
        &mut self,
        role: HandleRole,
        target: Option<BlockRef>,
    ) -> HandleId {
        let target = target.filter(|block| self.retain(*block));
        let id = self.handles.insert(next_stamp(), role, target);
        self.attach(id, role);
        id
    }

    /// Unregister a handle, releasing its target.
    pub(crate) fn drop_handle(&mut self, id: HandleId) -> Option<BlockEntry> {
        let slot = self.handles.remove(id)?;
        self.detach(id, slot.role);
        slot.target.and_then(|block| self.release(block))
    }

    /// Point a handle at a new target, keeping its role.
    ///
    /// The new target is retained before the old one is released so that
    /// assigning a handle to itself never frees the target.
    pub(crate) fn retarget(
        &mut self,
        id: HandleId,
        target: Option<BlockRef>,
    ) -> Option<BlockEntry> {
        if !self.handles.contains(id) {
            return None;
        }
        let target = target.filter(|block| self.retain(*block));
        let previous = self.handles.set_target(id, target)??;
        self.release(previous)
    }

    /// Move a handle's target into a fresh root handle, leaving it null.
    ///
    /// The count is transferred, not adjusted.
    pub(crate) fn split_off(&mut self, id: HandleId) -> Option<HandleId> {
        let target = self.handles.take_target(id)?;
        let root = self
            .handles
            .insert(next_stamp(), HandleRole::Root, Some(target));
        self.attach(root, HandleRole::Root);
        Some(root)
    }

    /// Change a handle's classification.
    pub(crate) fn reclassify(&mut self, id: HandleId, role: HandleRole) -> bool {
        let Some(previous) = self.handles.role(id) else {
            return false;
        };
        if previous == role {
            return true;
        }
        self.detach(id, previous);
        self.handles.set_role(id, role);
        self.attach(id, role);
        trace!(?id, from = ?previous, to = ?role, "handle reclassified");
        true
    }

    /// Live target of a handle.
    pub(crate) fn target_of(&self, id: HandleId) -> Option<BlockRef> {
        self.handles
            .target(id)
            .filter(|block| self.registry.contains(*block))
    }

    fn attach(&mut self, id: HandleId, role: HandleRole) {
        match role {
            HandleRole::Root => {
                self.roots.insert(id);
            }
            HandleRole::Child(owner) => {
                if let Some(entry) = self.registry.get_mut(owner) {
                    entry.edges.insert(id);
                }
            }
        }
    }

    fn detach(&mut self, id: HandleId, role: HandleRole) {
        match role {
            HandleRole::Root => {
                self.roots.remove(id);
            }
            HandleRole::Child(owner) => {
                // The owner may already be unregistered while it is being
                // destroyed; its edge set went with it.
                if let Some(entry) = self.registry.get_mut(owner) {
                    entry.edges.remove(&id);
                }
            }
        }
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Mark, then condemn every unreached block.
    ///
    /// Condemned blocks are unregistered and their outgoing edges severed
    /// before any of them is destroyed, so destroying one never cascades
    /// into a second release of another. The caller destroys the returned
    /// entries outside the borrow.
    pub(crate) fn begin_collection(&mut self) -> (CollectResult, Vec<BlockEntry>) {
        let mark = self
            .collector
            .mark(&self.registry, &self.handles, &self.roots);
        let unreached = self.collector.unreached(&self.registry);

        let mut condemned: Vec<BlockEntry> = unreached
            .into_iter()
            .filter_map(|block| self.registry.unregister(block))
            .collect();

        let mut index = 0;
        while index < condemned.len() {
            let edges: Vec<HandleId> = condemned[index].edges().collect();
            for edge in edges {
                if let Some(target) = self.handles.take_target(edge) {
                    if let Some(entry) = self.release(target) {
                        condemned.push(entry);
                    }
                }
            }
            index += 1;
        }

        let result = CollectResult {
            roots_scanned: mark.roots_scanned,
            blocks_marked: mark.blocks_marked,
            ..Default::default()
        };
        (result, condemned)
    }

    /// Non-empty registry or root set, if any.
    pub(crate) fn leak_warning(&self) -> Option<LeakWarning> {
        let leak = LeakWarning {
            blocks: self.registry.len(),
            bytes: self.registry.total_bytes(),
            roots: self.roots.len(),
        };
        (!leak.is_empty()).then_some(leak)
    }
}
