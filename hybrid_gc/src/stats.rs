//! GC statistics and metrics.
//!
//! Tracks allocation volume, both reclamation paths and collection pauses.
//! The collector is single-threaded, so counters are plain integers and
//! [`GcStats`] is handed out as a snapshot.

use std::time::{Duration, Instant};

/// Why a block was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// Its reference count dropped to zero.
    Eager,
    /// A mark-and-sweep pass found it unreachable.
    Swept,
    /// The host freed it explicitly through the raw hook.
    Explicit,
}

/// Statistics about garbage collection activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    // =========================================================================
    // Allocation Statistics
    // =========================================================================
    /// Total bytes allocated since start.
    pub bytes_allocated: u64,
    /// Total blocks allocated since start.
    pub blocks_allocated: u64,
    /// Bytes held by live blocks.
    pub live_bytes: u64,
    /// Number of live blocks.
    pub live_blocks: u64,
    /// Highest value `live_bytes` has reached.
    pub peak_live_bytes: u64,

    // =========================================================================
    // Reclamation Statistics
    // =========================================================================
    /// Blocks released because their count reached zero.
    pub eager_releases: u64,
    /// Bytes released because their count reached zero.
    pub eager_bytes: u64,
    /// Blocks released by the sweep phase.
    pub swept_blocks: u64,
    /// Bytes released by the sweep phase.
    pub swept_bytes: u64,
    /// Blocks released through the explicit free hook.
    pub explicit_frees: u64,

    // =========================================================================
    // Collection Statistics
    // =========================================================================
    /// Number of mark-and-sweep passes.
    pub collections: u64,
    /// Total time spent in collection (nanoseconds).
    pub gc_time_ns: u64,
}

impl GcStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            bytes_allocated: 0,
            blocks_allocated: 0,
            live_bytes: 0,
            live_blocks: 0,
            peak_live_bytes: 0,
            eager_releases: 0,
            eager_bytes: 0,
            swept_blocks: 0,
            swept_bytes: 0,
            explicit_frees: 0,
            collections: 0,
            gc_time_ns: 0,
        }
    }

    /// Record an allocation.
    #[inline]
    pub fn record_allocation(&mut self, size: usize) {
        self.bytes_allocated += size as u64;
        self.blocks_allocated += 1;
        self.live_bytes += size as u64;
        self.live_blocks += 1;
        self.peak_live_bytes = self.peak_live_bytes.max(self.live_bytes);
    }

    /// Record a released block.
    #[inline]
    pub fn record_release(&mut self, size: usize, reason: ReleaseReason) {
        self.live_bytes = self.live_bytes.saturating_sub(size as u64);
        self.live_blocks = self.live_blocks.saturating_sub(1);
        match reason {
            ReleaseReason::Eager => {
                self.eager_releases += 1;
                self.eager_bytes += size as u64;
            }
            ReleaseReason::Swept => {
                self.swept_blocks += 1;
                self.swept_bytes += size as u64;
            }
            ReleaseReason::Explicit => self.explicit_frees += 1,
        }
    }

    /// Record a collection pass.
    pub fn record_collection(&mut self, duration: Duration) {
        self.collections += 1;
        self.gc_time_ns += duration.as_nanos() as u64;
    }

    /// Get total GC time.
    pub fn total_gc_time(&self) -> Duration {
        Duration::from_nanos(self.gc_time_ns)
    }

    /// Get average pause time per collection.
    pub fn avg_pause(&self) -> Duration {
        if self.collections == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.gc_time_ns / self.collections)
    }

    /// Total blocks reclaimed by either path.
    pub fn total_released(&self) -> u64 {
        self.eager_releases + self.swept_blocks + self.explicit_frees
    }

    /// Reset cumulative counters, keeping the live figures.
    pub fn reset(&mut self) {
        *self = Self {
            live_bytes: self.live_bytes,
            live_blocks: self.live_blocks,
            peak_live_bytes: self.live_bytes,
            ..Self::new()
        };
    }

    /// Render a multi-line summary of these statistics.
    pub fn summary(&self) -> String {
        format!(
            "allocations: {} blocks, {}\n\
             live: {} blocks, {} (peak {})\n\
             released: {} eager ({}), {} swept ({}), {} explicit\n\
             collections: {}, {:?} total, {:?} avg",
            self.blocks_allocated,
            format_bytes(self.bytes_allocated),
            self.live_blocks,
            format_bytes(self.live_bytes),
            format_bytes(self.peak_live_bytes),
            self.eager_releases,
            format_bytes(self.eager_bytes),
            self.swept_blocks,
            format_bytes(self.swept_bytes),
            self.explicit_frees,
            self.collections,
            self.total_gc_time(),
            self.avg_pause(),
        )
    }
}

/// Format bytes in human-readable form.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Timer for measuring GC phases.
pub struct GcTimer {
    start: Instant,
    label: &'static str,
}

impl GcTimer {
    /// Start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            start: Instant::now(),
            label,
        }
    }

    /// Stop the timer and return the elapsed duration.
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        tracing::trace!(phase = self.label, ?elapsed, "gc phase finished");
        elapsed
    }
}
