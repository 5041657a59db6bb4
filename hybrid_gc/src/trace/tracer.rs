//! Tracer interface for reporting handles.

use crate::roots::HandleId;

/// Visitor that receives every handle stored inline in a value.
///
/// The heap passes a tracer to [`Trace::trace`](crate::Trace::trace) right
/// after a value is moved into its block; every handle reported is
/// reclassified as a child edge of that block.
///
/// # Example
///
/// ```
/// use hybrid_gc::roots::HandleId;
/// use hybrid_gc::Tracer;
///
/// struct Recorder(Vec<HandleId>);
///
/// impl Tracer for Recorder {
///     fn trace_handle(&mut self, handle: HandleId) {
///         self.0.push(handle);
///     }
/// }
/// ```
pub trait Tracer {
    /// Report one handle.
    fn trace_handle(&mut self, handle: HandleId);
}

/// A null tracer that does nothing (for testing).
pub struct NullTracer;

impl Tracer for NullTracer {
    #[inline]
    fn trace_handle(&mut self, _handle: HandleId) {}
}

/// A counting tracer for debugging and statistics.
#[derive(Debug, Default)]
pub struct CountingTracer {
    /// Number of handles reported.
    pub handle_count: usize,
    /// Number of reported handles that were detached from any heap.
    pub detached_count: usize,
}

impl CountingTracer {
    /// Create a new counting tracer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tracer for CountingTracer {
    fn trace_handle(&mut self, handle: HandleId) {
        self.handle_count += 1;
        if handle.is_detached() {
            self.detached_count += 1;
        }
    }
}

/// Tracer that records the handles it is given, skipping detached ones.
#[derive(Debug, Default)]
pub struct CollectingTracer {
    handles: Vec<HandleId>,
}

impl CollectingTracer {
    /// Create an empty tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles recorded so far.
    pub fn handles(&self) -> &[HandleId] {
        &self.handles
    }

    /// Consume the tracer, returning the recorded handles.
    pub fn into_handles(self) -> Vec<HandleId> {
        self.handles
    }
}

impl Tracer for CollectingTracer {
    fn trace_handle(&mut self, handle: HandleId) {
        if !handle.is_detached() {
            self.handles.push(handle);
        }
    }
}
