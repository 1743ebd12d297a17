//! Id generation for traces and spans.

use crate::trace_context::{SpanId, TraceId};
use rand::Rng;
use std::fmt;

/// Interface for generating trace and span ids.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `SpanId`.
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`] implementation.
///
/// Generates trace and span ids from the thread-local cryptographically
/// secure random number generator. Ids are foundational, so there is no
/// failure path: the OS entropy source being unavailable aborts the
/// process inside `rand` itself.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from(rand::thread_rng().gen::<u128>())
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from(rand::thread_rng().gen::<u64>())
    }
}

#[cfg(any(test, feature = "testing"))]
mod increment {
    use super::IdGenerator;
    use crate::trace_context::{SpanId, TraceId};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// [`IdGenerator`] implementation that increments a counter for each new
    /// id. This helps produce predictable ids for testing.
    #[derive(Clone, Debug)]
    pub struct IncrementIdGenerator(Arc<AtomicU64>);

    impl IncrementIdGenerator {
        /// Create a new [`IncrementIdGenerator`] starting at 1.
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Default for IncrementIdGenerator {
        fn default() -> Self {
            Self(Arc::new(AtomicU64::new(1)))
        }
    }

    impl IdGenerator for IncrementIdGenerator {
        fn new_trace_id(&self) -> TraceId {
            TraceId::from(self.0.fetch_add(1, Ordering::SeqCst) as u128)
        }

        fn new_span_id(&self) -> SpanId {
            SpanId::from(self.0.fetch_add(1, Ordering::SeqCst))
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub use increment::IncrementIdGenerator;
