//! Logging facilities for listsync.
//!
//! listsync uses the `tracing` crate for instrumentation. Nothing is printed
//! unless the embedding application installs a subscriber:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("listsync=debug,listsync_core=info")
//!     .init();
//! ```
//!
//! Every event is emitted with one of the targets in [`targets`], so a
//! subsystem can be turned up without drowning in the others.

/// Span names used throughout listsync.
pub mod span_names {
    /// One diff-and-apply cycle of an update queue.
    pub const CYCLE: &str = "listsync::cycle";
    /// Timing span for expensive operations.
    pub const PERF: &str = "listsync::perf";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Serial background worker.
    pub const WORKER: &str = "listsync_core::worker";
    /// Apply context and its consumer loop.
    pub const APPLY: &str = "listsync_core::apply";
    /// Dispatcher lifecycle.
    pub const DISPATCHER: &str = "listsync_core::dispatcher";
    /// Signal/slot fan-out.
    pub const SIGNAL: &str = "listsync_core::signal";
    /// Update queue and diff pipeline.
    pub const QUEUE: &str = "listsync::queue";
    /// Source and displayed collections.
    pub const STORE: &str = "listsync::store";
    /// Selection tracking.
    pub const SELECTION: &str = "listsync::selection";
}

/// A guard that keeps a tracing span entered until it is dropped.
///
/// Wrap an expensive operation in a `PerfSpan` to get its duration from any
/// subscriber that records span timings.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create and enter a new performance span.
    pub fn new(operation: &'static str) -> Self {
        let span = tracing::info_span!(target: span_names::PERF, span_names::PERF, operation);
        Self {
            _span: span.entered(),
        }
    }

    /// Create and enter a performance span carrying the sizes of its inputs.
    pub fn with_sizes(operation: &'static str, old_len: usize, new_len: usize) -> Self {
        let span = tracing::info_span!(
            target: span_names::PERF,
            span_names::PERF,
            operation,
            old_len,
            new_len
        );
        Self {
            _span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_span() {
        // Entering and dropping must be harmless without a subscriber.
        let _span = PerfSpan::new("test_operation");
        let _sized = PerfSpan::with_sizes("diff", 3, 4);
    }

    #[test]
    fn test_targets_are_namespaced() {
        for target in [targets::WORKER, targets::APPLY, targets::DISPATCHER, targets::SIGNAL] {
            assert!(target.starts_with("listsync_core::"));
        }
        for target in [targets::QUEUE, targets::STORE, targets::SELECTION] {
            assert!(target.starts_with("listsync::"));
        }
    }
}
