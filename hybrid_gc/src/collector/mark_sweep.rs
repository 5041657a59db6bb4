//! Mark-and-sweep cycle collection.
//!
//! Reference counting frees acyclic garbage eagerly; this pass is the
//! backstop for cycles, whose members always hold counts on each other.
//!
//! 1. Mark phase: seed the worklist with the target of every root handle,
//!    then walk the edge sets breadth-first.
//! 2. Sweep phase: every registered block that was not marked is condemned,
//!    whatever its reference count.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  MARK PHASE                                                             │
//! │                                                                         │
//! │  ┌─────┐     ┌─────┐     ┌─────┐          ┌─────┐     ┌─────┐           │
//! │  │ Root│────▶│  A  │────▶│  B  │          │  C  │◀───▶│  D  │           │
//! │  └─────┘     │mark │     │mark │          │     │     │     │           │
//! │              └─────┘     └─────┘          └─────┘     └─────┘           │
//! │                                             count 1     count 1         │
//! │                                             never marked → swept        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The collector only reads the registry and the handle table; it never
//! dereferences object memory, so it cannot observe a freed object.

use crate::heap::{BlockKind, BlockRef, BlockRegistry};
use crate::roots::{HandleTable, RootSet};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Outcome of the mark phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MarkResult {
    /// Root handles examined.
    pub roots_scanned: usize,
    /// Blocks found reachable.
    pub blocks_marked: usize,
    /// Child edges followed.
    pub edges_traced: usize,
}

/// Mark-and-sweep collector state.
///
/// Holds the transient snapshot of one pass: the worklist and the set of
/// reachable blocks. Both are cleared at the start of every pass.
pub struct MarkSweepCollector {
    /// Blocks discovered but whose edges have not been followed yet.
    worklist: VecDeque<BlockRef>,
    /// Blocks proven reachable in the current pass.
    marked: FxHashSet<BlockRef>,
}

impl MarkSweepCollector {
    /// Create a new collector.
    #[inline]
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create with a preallocated worklist.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            worklist: VecDeque::with_capacity(capacity),
            marked: FxHashSet::default(),
        }
    }

    /// Compute the set of blocks reachable from the roots.
    pub fn mark(
        &mut self,
        registry: &BlockRegistry,
        handles: &HandleTable,
        roots: &RootSet,
    ) -> MarkResult {
        let mut result = MarkResult::default();

        self.worklist.clear();
        self.marked.clear();

        // Seed from roots
        for root in roots.iter() {
            result.roots_scanned += 1;
            if let Some(target) = handles.target(root) {
                self.mark_gray(registry, target);
            }
        }

        // Breadth-first over edge sets
        while let Some(block) = self.worklist.pop_front() {
            result.blocks_marked += 1;

            let Some(entry) = registry.get(block) else {
                continue;
            };
            for edge in entry.edges() {
                result.edges_traced += 1;
                if let Some(target) = handles.target(edge) {
                    self.mark_gray(registry, target);
                }
            }
        }

        result
    }

    /// Blocks the last mark phase did not reach.
    ///
    /// Raw blocks are owned by the host and never condemned.
    pub fn unreached(&self, registry: &BlockRegistry) -> Vec<BlockRef> {
        registry
            .entries()
            .filter(|entry| entry.kind() != BlockKind::Raw)
            .map(|entry| entry.block_ref())
            .filter(|block| !self.marked.contains(block))
            .collect()
    }

    /// Mark a block and queue it for scanning.
    ///
    /// Returns true if the block was newly marked.
    #[inline]
    fn mark_gray(&mut self, registry: &BlockRegistry, block: BlockRef) -> bool {
        if !registry.contains(block) || self.marked.contains(&block) {
            return false;
        }
        self.marked.insert(block);
        self.worklist.push_back(block);
        true
    }

    /// Check if a block was marked by the last pass.
    #[inline]
    pub fn is_marked(&self, block: BlockRef) -> bool {
        self.marked.contains(&block)
    }

    /// Get number of marked blocks (for debugging/stats).
    #[inline]
    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }
}

impl Default for MarkSweepCollector {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
