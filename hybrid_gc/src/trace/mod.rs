//! The managed-object capability.
//!
//! The `Trace` trait is the interface between user objects and the
//! collector. A type implements it to report every [`Gc`](crate::Gc) handle
//! it stores inline, which is how those handles learn that they are edges of
//! the object's block rather than roots.

pub mod tracer;

pub use tracer::{CollectingTracer, CountingTracer, NullTracer, Tracer};

use std::cell::Cell;
use std::collections::VecDeque;

/// Trait for types that can live in a managed block.
///
/// # Safety
///
/// Implementations must report only handles stored inside `self`. Reporting
/// a handle that lives elsewhere demotes it from root to child edge, letting
/// the collector reclaim an object that handle still points at while
/// references obtained through it may be outstanding.
///
/// Failing to report a handle is safe but leaks: the handle stays a root and
/// keeps its target (and anything that target reaches) alive.
///
/// There is no impl for `RefCell`: a handle behind one could be moved out
/// while still classified as a child edge. Store mutable handles in a
/// [`GcCell`](crate::GcCell) or a [`GcVec`](crate::GcVec) instead.
///
/// # Example
///
/// ```
/// use hybrid_gc::{Gc, Trace, Tracer};
///
/// struct Node {
///     value: i64,
///     next: Gc<Node>,
/// }
///
/// unsafe impl Trace for Node {
///     fn trace(&self, tracer: &mut dyn Tracer) {
///         self.next.trace(tracer);
///     }
/// }
/// ```
pub unsafe trait Trace {
    /// Report all handles held by this value.
    fn trace(&self, tracer: &mut dyn Tracer);
}

// =============================================================================
// Trace implementations for primitives
// =============================================================================

macro_rules! trace_leaf {
    ($($ty:ty),* $(,)?) => {
        $(
            /// Safety: holds no handles.
            unsafe impl Trace for $ty {
                #[inline]
                fn trace(&self, _tracer: &mut dyn Tracer) {}
            }
        )*
    };
}

trace_leaf!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
    &'static str,
);

/// Safety: `Copy` types cannot own handles.
unsafe impl<T: Copy> Trace for Cell<T> {
    #[inline]
    fn trace(&self, _tracer: &mut dyn Tracer) {}
}

// =============================================================================
// Trace implementations for containers
// =============================================================================

unsafe impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

unsafe impl<T: Trace> Trace for VecDeque<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

unsafe impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Some(inner) = self {
            inner.trace(tracer);
        }
    }
}

unsafe impl<T: Trace> Trace for Box<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        (**self).trace(tracer);
    }
}

unsafe impl<T: Trace, const N: usize> Trace for [T; N] {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

macro_rules! trace_tuple {
    ($($name:ident),+) => {
        unsafe impl<$($name: Trace),+> Trace for ($($name,)+) {
            #[allow(non_snake_case)]
            fn trace(&self, tracer: &mut dyn Tracer) {
                let ($($name,)+) = self;
                $($name.trace(tracer);)+
            }
        }
    };
}

trace_tuple!(A);
trace_tuple!(A, B);
trace_tuple!(A, B, C);
trace_tuple!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_trace() {
        let mut tracer = CountingTracer::new();

        // Primitives report nothing
        true.trace(&mut tracer);
        42i64.trace(&mut tracer);
        3.5f64.trace(&mut tracer);
        "hello".to_string().trace(&mut tracer);
        Cell::new(7u32).trace(&mut tracer);

        assert_eq!(tracer.handle_count, 0);
    }

    #[test]
    fn test_container_trace_recurses() {
        struct Reporter;
        unsafe impl Trace for Reporter {
            fn trace(&self, tracer: &mut dyn Tracer) {
                tracer.trace_handle(crate::roots::HandleId::DETACHED);
            }
        }

        let mut tracer = CountingTracer::new();
        vec![Reporter, Reporter, Reporter].trace(&mut tracer);
        Some(Reporter).trace(&mut tracer);
        None::<Reporter>.trace(&mut tracer);
        Box::new(Reporter).trace(&mut tracer);
        [Reporter, Reporter].trace(&mut tracer);
        (Reporter, 1u8, Reporter).trace(&mut tracer);

        assert_eq!(tracer.handle_count, 9);
        assert_eq!(tracer.detached_count, 9);
    }

    #[test]
    fn test_collecting_tracer_skips_detached() {
        let mut tracer = CollectingTracer::new();
        tracer.trace_handle(crate::roots::HandleId::DETACHED);
        assert!(tracer.handles().is_empty());
    }
}
