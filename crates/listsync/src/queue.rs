//! The single-flight diff pipeline.
//!
//! [`UpdateQueue::publish`] appends a displayed candidate to a FIFO queue.
//! At most one processing cycle is active at a time:
//!
//! 1. The head candidate is dequeued.
//! 2. On the background worker it is diffed against the displayed list as
//!    last applied.
//! 3. On the apply context the candidate becomes the displayed list, the
//!    operations go to the [`NotificationSink`], and the next cycle starts if
//!    more candidates arrived meanwhile.
//!
//! Enqueueing and claiming the "running" flag happen under one lock, so a
//! publish either starts a cycle or is guaranteed to be drained by the one
//! already running. Candidates are applied in publish order, none skipped.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use listsync_core::logging::span_names;
use listsync_core::{Dispatcher, PerfSpan};
use parking_lot::{Condvar, Mutex};

use crate::diff::{DiffEngine, DiffResult};
use crate::notify::NotificationSink;
use crate::store::DisplayedList;

struct QueueState<T> {
    pending: VecDeque<Arc<Vec<T>>>,
    /// A cycle is in flight or about to start.
    running: bool,
    /// Cycles completed since creation.
    applied: u64,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    idle: Condvar,
    dispatcher: Dispatcher,
    engine: DiffEngine<T>,
    displayed: DisplayedList<T>,
    sink: Arc<dyn NotificationSink>,
}

/// FIFO of displayed candidates, drained by one diff-and-apply cycle at a
/// time.
pub struct UpdateQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for UpdateQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> UpdateQueue<T> {
    /// Create a queue feeding `displayed` and `sink`.
    pub fn new(
        dispatcher: Dispatcher,
        engine: DiffEngine<T>,
        displayed: DisplayedList<T>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    running: false,
                    applied: 0,
                }),
                idle: Condvar::new(),
                dispatcher,
                engine,
                displayed,
                sink,
            }),
        }
    }

    /// Append `candidate`, starting a cycle if none is running.
    pub fn publish(&self, candidate: Arc<Vec<T>>) {
        let kick_off = {
            let mut state = self.inner.state.lock();
            state.pending.push_back(candidate);
            !std::mem::replace(&mut state.running, true)
        };
        tracing::trace!(target: "listsync::queue", kick_off, "candidate published");

        if kick_off {
            QueueInner::begin_cycle(&self.inner);
        }
    }

    /// Candidates waiting behind the cycle in flight.
    pub fn pending_updates(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Returns `true` when no cycle is running and nothing is queued.
    pub fn is_idle(&self) -> bool {
        !self.inner.state.lock().running
    }

    /// Number of cycles applied so far.
    pub fn applied_cycles(&self) -> u64 {
        self.inner.state.lock().applied
    }

    /// Block until the queue is idle or `timeout` elapses. Returns `true` if
    /// the queue became idle.
    ///
    /// Calling this on an owner-pumped apply thread blocks the very thread
    /// that must apply the results, so it can only time out there.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.running {
            if self.inner.idle.wait_until(&mut state, deadline).timed_out() {
                return !state.running;
            }
        }
        true
    }
}

impl<T: Clone + Send + Sync + 'static> QueueInner<T> {
    /// Dequeue the head candidate and diff it on the worker, or go idle.
    fn begin_cycle(this: &Arc<Self>) {
        let candidate = {
            let mut state = this.state.lock();
            match state.pending.pop_front() {
                Some(candidate) => candidate,
                None => {
                    state.running = false;
                    this.idle.notify_all();
                    tracing::debug!(target: "listsync::queue", applied = state.applied, "queue drained");
                    return;
                }
            }
        };

        // No cycle is in flight, so this is the list as last applied.
        let old = this.displayed.snapshot();
        let cycle = tracing::debug_span!(
            target: "listsync::queue",
            parent: None,
            span_names::CYCLE,
            old_len = old.len(),
            new_len = candidate.len()
        );
        let diff_span = cycle.clone();
        let job = this.clone();
        let ticket = CycleTicket {
            queue: Some(this.clone()),
        };

        let scheduled = this.dispatcher.run_in_background(
            move || {
                let _entered = diff_span.enter();
                let computed = panic::catch_unwind(AssertUnwindSafe(|| {
                    let _span = PerfSpan::with_sizes("diff", old.len(), candidate.len());
                    job.engine.calculate(&old, &candidate)
                }));
                match computed {
                    Ok(diff) => {
                        tracing::debug!(target: "listsync::queue", ops = diff.len(), "diff computed");
                        Some((candidate, diff))
                    }
                    Err(_) => {
                        tracing::error!(
                            target: "listsync::queue",
                            "equality policy panicked, skipping candidate"
                        );
                        None
                    }
                }
            },
            move |computed: Option<(Arc<Vec<T>>, DiffResult)>| {
                let Some(queue) = ticket.redeem() else {
                    return;
                };
                let _entered = cycle.enter();
                match computed {
                    Some((candidate, diff)) => queue.finish_cycle(candidate, diff),
                    None => Self::begin_cycle(&queue),
                }
            },
        );

        if let Err(error) = scheduled {
            tracing::warn!(target: "listsync::queue", %error, "cannot schedule diff");
        }
    }

    /// Swap in the new list, notify, and move on to the next candidate.
    fn finish_cycle(self: Arc<Self>, candidate: Arc<Vec<T>>, diff: DiffResult) {
        self.displayed.replace(candidate);
        let notified = panic::catch_unwind(AssertUnwindSafe(|| {
            for op in diff.ops() {
                tracing::trace!(target: "listsync::queue", ?op, "applying");
                op.dispatch(self.sink.as_ref());
            }
        }));
        if notified.is_err() {
            tracing::error!(
                target: "listsync::queue",
                "notification sink panicked, views may be out of step"
            );
        }
        self.state.lock().applied += 1;

        Self::begin_cycle(&self);
    }
}

impl<T> QueueInner<T> {
    /// Drop everything queued after a cycle's result was lost.
    fn abandon(&self) {
        let mut state = self.state.lock();
        tracing::warn!(
            target: "listsync::queue",
            dropped = state.pending.len() + 1,
            "update pipeline stopped, dropping queued candidates"
        );
        state.pending.clear();
        state.running = false;
        self.idle.notify_all();
    }
}

/// Travels with a cycle's apply callback. If the callback is dropped without
/// running, the queue is returned to idle.
struct CycleTicket<T> {
    queue: Option<Arc<QueueInner<T>>>,
}

impl<T> CycleTicket<T> {
    fn redeem(mut self) -> Option<Arc<QueueInner<T>>> {
        self.queue.take()
    }
}

impl<T> Drop for CycleTicket<T> {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.abandon();
        }
    }
}

impl<T> std::fmt::Debug for UpdateQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("UpdateQueue")
            .field("pending", &state.pending.len())
            .field("running", &state.running)
            .field("applied", &state.applied)
            .finish()
    }
}

static_assertions::assert_impl_all!(UpdateQueue<String>: Send, Sync, Clone);
