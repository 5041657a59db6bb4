//! Garbage collection passes.

mod mark_sweep;

pub use mark_sweep::{MarkResult, MarkSweepCollector};

/// Result of a full collection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectResult {
    /// Root handles examined.
    pub roots_scanned: usize,
    /// Blocks found reachable.
    pub blocks_marked: usize,
    /// Blocks released by the sweep.
    pub blocks_freed: usize,
    /// Bytes released by the sweep.
    pub bytes_freed: usize,
    /// Blocks still registered afterwards.
    pub live_blocks: usize,
    /// Bytes still registered afterwards.
    pub live_bytes: usize,
}
