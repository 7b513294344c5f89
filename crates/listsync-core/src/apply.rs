//! The apply context: a single-threaded consumer of posted work.
//!
//! Exactly one thread at a time consumes an apply context. That thread is the
//! only one allowed to mutate displayed state and call into the rendering
//! surface, so everything that must be serialized with rendering is posted
//! here.
//!
//! The context is split in two halves:
//!
//! - [`ApplyContext`] is a cheap, cloneable handle that any thread can use to
//!   [`post`](ApplyContext::post) work or [`invoke`](ApplyContext::invoke) it
//!   (inline when already on the consumer thread, posted otherwise).
//! - [`ApplyLoop`] is the consumer. Whoever owns it pumps it, either from an
//!   existing UI loop via [`process_pending`](ApplyLoop::process_pending) or
//!   on a dedicated thread via [`run`](ApplyLoop::run).
//!
//! # Example
//!
//! ```
//! use listsync_core::apply::ApplyLoop;
//!
//! let (context, apply_loop) = ApplyLoop::new();
//! apply_loop.bind_current_thread();
//!
//! let handle = context.clone();
//! std::thread::spawn(move || {
//!     handle.post(|| println!("runs on the consumer thread")).ok();
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(apply_loop.process_pending(), 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use parking_lot::RwLock;

use crate::error::{DispatchError, Result};

type ApplyJob = Box<dyn FnOnce() + Send + 'static>;

enum ApplyMessage {
    Run(ApplyJob),
    Stop,
}

/// State shared between the handles and the consumer.
struct ApplyShared {
    /// Thread currently consuming the loop, if any has bound yet.
    consumer: RwLock<Option<ThreadId>>,
    /// Set once the context stops accepting work.
    closed: AtomicBool,
    /// Jobs posted but not yet executed.
    pending: AtomicUsize,
}

/// Handle for handing work to the apply context.
///
/// Cloning is cheap; all clones feed the same consumer.
#[derive(Clone)]
pub struct ApplyContext {
    sender: Sender<ApplyMessage>,
    shared: Arc<ApplyShared>,
}

impl ApplyContext {
    /// Queue `job` for execution on the consumer thread.
    ///
    /// Jobs run in the order they were posted. Fails with
    /// [`DispatchError::ApplyClosed`] once the consumer is gone.
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(DispatchError::ApplyClosed);
        }

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.sender
            .send(ApplyMessage::Run(Box::new(job)))
            .map_err(|_| {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                DispatchError::ApplyClosed
            })
    }

    /// Run `job` on the apply context.
    ///
    /// Runs inline when the caller already is the consumer thread and posts
    /// otherwise.
    pub fn invoke<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_current() {
            job();
            Ok(())
        } else {
            self.post(job)
        }
    }

    /// Returns `true` if the calling thread is the consumer thread.
    #[inline]
    pub fn is_current(&self) -> bool {
        *self.shared.consumer.read() == Some(thread::current().id())
    }

    /// Number of jobs posted but not yet executed.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Returns `true` once the context stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop accepting work and ask a running [`ApplyLoop::run`] to return
    /// after draining what is already queued.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(target: "listsync_core::apply", "apply context closed");
        let _ = self.sender.send(ApplyMessage::Stop);
    }
}

impl std::fmt::Debug for ApplyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyContext")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The single consumer of an [`ApplyContext`].
///
/// The thread that pumps the loop becomes the consumer thread; from then on
/// [`ApplyContext::is_current`] is `true` on that thread only.
pub struct ApplyLoop {
    receiver: Receiver<ApplyMessage>,
    shared: Arc<ApplyShared>,
}

impl ApplyLoop {
    /// Create a new apply context and its consumer.
    ///
    /// No thread is bound yet. Call [`bind_current_thread`](Self::bind_current_thread)
    /// or pump the loop to bind one.
    pub fn new() -> (ApplyContext, ApplyLoop) {
        let (sender, receiver) = unbounded();
        let shared = Arc::new(ApplyShared {
            consumer: RwLock::new(None),
            closed: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
        });

        (
            ApplyContext {
                sender,
                shared: shared.clone(),
            },
            ApplyLoop { receiver, shared },
        )
    }

    /// Make the calling thread the consumer thread.
    pub fn bind_current_thread(&self) {
        let current = thread::current().id();
        let mut consumer = self.shared.consumer.write();
        if *consumer != Some(current) {
            tracing::trace!(target: "listsync_core::apply", ?current, "binding apply consumer");
            *consumer = Some(current);
        }
    }

    /// Execute every job that is already queued, including jobs posted by
    /// those jobs. Returns the number of jobs executed.
    pub fn process_pending(&self) -> usize {
        self.bind_current_thread();
        let mut executed = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(ApplyMessage::Run(job)) => {
                    self.execute(job);
                    executed += 1;
                }
                Ok(ApplyMessage::Stop) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        executed
    }

    /// Wait up to `timeout` for a job, then execute everything queued.
    ///
    /// Returns the number of jobs executed, zero if the timeout elapsed.
    pub fn process_timeout(&self, timeout: Duration) -> usize {
        self.bind_current_thread();
        match self.receiver.recv_timeout(timeout) {
            Ok(ApplyMessage::Run(job)) => {
                self.execute(job);
                1 + self.process_pending()
            }
            Ok(ApplyMessage::Stop) => self.process_pending(),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Consume jobs on the calling thread until the context is closed.
    ///
    /// Jobs queued before [`ApplyContext::close`] still run.
    pub fn run(&self) {
        self.bind_current_thread();
        tracing::debug!(target: "listsync_core::apply", "apply loop running");
        while let Ok(message) = self.receiver.recv() {
            match message {
                ApplyMessage::Run(job) => self.execute(job),
                ApplyMessage::Stop => {
                    self.process_pending();
                    break;
                }
            }
        }
        tracing::debug!(target: "listsync_core::apply", "apply loop stopped");
    }

    /// Number of jobs waiting to be executed.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    fn execute(&self, job: ApplyJob) {
        job();
        self.shared.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for ApplyLoop {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

static_assertions::assert_impl_all!(ApplyContext: Send, Sync, Clone);
static_assertions::assert_impl_all!(ApplyLoop: Send);
