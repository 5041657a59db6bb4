//! GC configuration parameters.
//!
//! The collector has no scheduling policy of its own, so the knobs here
//! only cover capacities, teardown behaviour and diagnostics.

use thiserror::Error;

/// Configuration for the garbage collector.
///
/// # Example
///
/// ```
/// use hybrid_gc::GcConfig;
///
/// // Verify the registry after every pass and log summaries at info level
/// let config = GcConfig {
///     verify_heap: true,
///     trace: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    // =========================================================================
    // Capacities
    // =========================================================================
    /// Number of handle slots reserved up front.
    ///
    /// The slot table grows on demand; this only avoids early reallocation.
    ///
    /// Default: 1024
    pub initial_handle_capacity: usize,

    /// Initial capacity of the mark worklist.
    ///
    /// Default: 256
    pub worklist_capacity: usize,

    /// Largest single allocation accepted, in bytes.
    ///
    /// Requests above this fail with `OutOfMemory` without touching the
    /// global allocator.
    ///
    /// Default: `isize::MAX`
    pub max_alloc_size: usize,

    // =========================================================================
    // Teardown
    // =========================================================================
    /// Run a final mark-and-sweep pass when the heap is torn down.
    ///
    /// Default: true
    pub collect_on_shutdown: bool,

    /// Log a warning if blocks or roots are still live at teardown.
    ///
    /// Default: true
    pub warn_on_leaks: bool,

    // =========================================================================
    // Debugging
    // =========================================================================
    /// Log collection summaries at `info` level instead of `debug`.
    ///
    /// Default: false
    pub trace: bool,

    /// Verify registry invariants after each collection.
    ///
    /// Expensive but useful for debugging GC bugs.
    ///
    /// Default: false (enabled in debug builds)
    pub verify_heap: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            initial_handle_capacity: 1024,
            worklist_capacity: 256,
            max_alloc_size: isize::MAX as usize,

            collect_on_shutdown: true,
            warn_on_leaks: true,

            trace: false,
            verify_heap: cfg!(debug_assertions),
        }
    }
}

impl GcConfig {
    /// Configuration for hunting collector bugs: verification and verbose logs.
    pub fn debug() -> Self {
        Self {
            trace: true,
            verify_heap: true,
            ..Default::default()
        }
    }

    /// Configuration that stays silent at teardown.
    ///
    /// Useful for hosts that deliberately leak their object graph at exit.
    pub fn quiet() -> Self {
        Self {
            collect_on_shutdown: false,
            warn_on_leaks: false,
            verify_heap: false,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_alloc_size == 0 {
            return Err(ConfigError::ZeroMaxAllocSize);
        }
        if self.max_alloc_size > isize::MAX as usize {
            return Err(ConfigError::MaxAllocTooLarge);
        }
        if self.initial_handle_capacity > u32::MAX as usize {
            return Err(ConfigError::HandleCapacityTooLarge);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_alloc_size` must be at least one byte.
    #[error("maximum allocation size must be non-zero")]
    ZeroMaxAllocSize,
    /// `max_alloc_size` exceeds what a `Layout` can describe.
    #[error("maximum allocation size must not exceed isize::MAX")]
    MaxAllocTooLarge,
    /// Handle slots are indexed by `u32`.
    #[error("initial handle capacity must fit in a u32 index")]
    HandleCapacityTooLarge,
}
