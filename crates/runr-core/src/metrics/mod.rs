//! Metrics collection abstraction.
//!
//! Backends (prometheus, statsd, ...) implement [`MetricsBackend`] and are
//! handed to the components that record events.
mod backend;
pub use backend::{ExitOutcome, JobSource, MetricsBackend, MetricsHandle};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
