//! The dispatcher: one serial background worker plus one apply context.
//!
//! A [`Dispatcher`] is the only source of concurrency in listsync. It is
//! created explicitly by whichever component owns the adapters, handed to them
//! at construction, and shut down by that owner. Nothing is global: two
//! dispatchers never share threads.
//!
//! Two embeddings are supported:
//!
//! - **Owner-pumped**: [`Dispatcher::new`] returns the [`ApplyLoop`] to the
//!   caller, whose thread (typically a UI thread) pumps it between frames.
//! - **Headless**: [`Dispatcher::spawn`] starts a dedicated apply thread that
//!   runs the loop until [`Dispatcher::shutdown`].
//!
//! # Example
//!
//! ```no_run
//! use listsync_core::dispatcher::{Dispatcher, DispatcherConfig};
//! use std::time::Duration;
//!
//! let (dispatcher, apply_loop) = Dispatcher::new(DispatcherConfig::default()).unwrap();
//!
//! dispatcher
//!     .run_in_background(|| 6 * 7, |answer| println!("answer: {answer}"))
//!     .unwrap();
//!
//! // Somewhere in the UI loop:
//! apply_loop.process_timeout(Duration::from_millis(16));
//!
//! dispatcher.shutdown();
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::apply::{ApplyContext, ApplyLoop};
use crate::error::{DispatchError, Result};
use crate::worker::{Worker, WorkerConfig};

/// Configuration for creating a Dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Configuration of the serial background worker.
    pub worker: WorkerConfig,
    /// Thread name used by [`Dispatcher::spawn`] for the apply thread.
    pub apply_thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::with_name("listsync-diff"),
            apply_thread_name: "listsync-apply".to_string(),
        }
    }
}

/// Builder for creating Dispatchers with custom configuration.
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the background worker thread name.
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.config.worker.name = name.into();
        self
    }

    /// Set the background worker's task queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.worker.queue_capacity = capacity.max(1);
        self
    }

    /// Set the stack size of the background worker thread.
    pub fn worker_stack_size(mut self, size: usize) -> Self {
        self.config.worker.stack_size = Some(size);
        self
    }

    /// Set the name of the spawned apply thread.
    pub fn apply_thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.apply_thread_name = name.into();
        self
    }

    /// Build a dispatcher whose apply loop is pumped by the caller.
    pub fn build(self) -> Result<(Dispatcher, ApplyLoop)> {
        Dispatcher::new(self.config)
    }

    /// Build a dispatcher with its own apply thread.
    pub fn spawn(self) -> Result<Dispatcher> {
        Dispatcher::spawn(self.config)
    }
}

struct DispatcherInner {
    worker: Worker,
    apply: ApplyContext,
    apply_thread: Mutex<Option<JoinHandle<()>>>,
}

/// Provides the two execution contexts: a serial background worker and a
/// single-threaded apply context.
///
/// Cloning yields another handle to the same contexts.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Returns a builder for custom configuration.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Create a dispatcher whose apply loop is pumped by the caller.
    ///
    /// The calling thread becomes the apply thread.
    pub fn new(config: DispatcherConfig) -> Result<(Self, ApplyLoop)> {
        let (apply, apply_loop) = ApplyLoop::new();
        apply_loop.bind_current_thread();
        let worker = Worker::with_config(config.worker, apply.clone())?;

        let dispatcher = Self {
            inner: Arc::new(DispatcherInner {
                worker,
                apply,
                apply_thread: Mutex::new(None),
            }),
        };
        Ok((dispatcher, apply_loop))
    }

    /// Create a dispatcher that runs its apply loop on a dedicated thread.
    pub fn spawn(config: DispatcherConfig) -> Result<Self> {
        let (apply, apply_loop) = ApplyLoop::new();
        let worker = Worker::with_config(config.worker, apply.clone())?;

        let name = config.apply_thread_name;
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || apply_loop.run())
            .map_err(|e| {
                worker.stop();
                DispatchError::spawn_failed(name.clone(), &e)
            })?;

        tracing::debug!(target: "listsync_core::dispatcher", apply_thread = %name, "dispatcher spawned");

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                worker,
                apply,
                apply_thread: Mutex::new(Some(handle)),
            }),
        })
    }

    /// The serial background worker.
    pub fn background(&self) -> &Worker {
        &self.inner.worker
    }

    /// The apply context.
    pub fn apply_context(&self) -> &ApplyContext {
        &self.inner.apply
    }

    /// Returns `true` if the caller is on the apply context.
    pub fn is_apply_context(&self) -> bool {
        self.inner.apply.is_current()
    }

    /// Run `task` on the background worker and hand its result to
    /// `on_apply` on the apply context.
    pub fn run_in_background<T, F, C>(&self, task: F, on_apply: C) -> Result<()>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        self.inner.worker.send_with_callback(task, on_apply)
    }

    /// Run `job` on the apply context: inline when already there, posted
    /// otherwise.
    pub fn run_on_apply<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.apply.invoke(job)
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        !self.inner.worker.is_running()
    }

    /// Stop both contexts.
    ///
    /// The worker finishes its queued tasks first, so their results are
    /// still posted to the apply context. A spawned apply thread then drains
    /// its queue and exits. An owner-pumped loop keeps whatever is queued;
    /// the owner may pump it one last time.
    pub fn shutdown(&self) {
        tracing::debug!(target: "listsync_core::dispatcher", "dispatcher shutting down");
        self.inner.worker.stop_and_join();

        let handle = self.inner.apply_thread.lock().take();
        match handle {
            Some(handle) if handle.thread().id() == thread::current().id() => {
                // Shutting down from a job: the loop exits after this job returns.
                self.inner.apply.close();
            }
            Some(handle) => {
                self.inner.apply.close();
                if handle.join().is_err() {
                    tracing::error!(target: "listsync_core::dispatcher", "apply thread panicked");
                }
            }
            None => self.inner.apply.close(),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("worker", &self.inner.worker)
            .field("apply", &self.inner.apply)
            .finish()
    }
}

static_assertions::assert_impl_all!(Dispatcher: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    #[test]
    fn test_owner_pumped_round_trip() {
        let (dispatcher, apply_loop) = Dispatcher::new(DispatcherConfig::default()).unwrap();
        assert!(dispatcher.is_apply_context());

        let result = Arc::new(Mutex::new(None));
        let result_clone = result.clone();
        let background_thread = Arc::new(Mutex::new(None));
        let background_clone = background_thread.clone();
        dispatcher
            .run_in_background(
                move || {
                    *background_clone.lock() = Some(thread::current().id());
                    21 * 2
                },
                move |value| *result_clone.lock() = Some(value),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while result.lock().is_none() && Instant::now() < deadline {
            apply_loop.process_timeout(Duration::from_millis(20));
        }

        assert_eq!(*result.lock(), Some(42));
        assert_ne!(*background_thread.lock(), Some(thread::current().id()));
        dispatcher.shutdown();
        assert!(dispatcher.is_shut_down());
    }

    #[test]
    fn test_spawned_apply_thread() {
        let dispatcher = Dispatcher::builder()
            .worker_name("test-diff")
            .apply_thread_name("test-apply")
            .spawn()
            .unwrap();
        assert!(!dispatcher.is_apply_context());

        let apply_name = Arc::new(Mutex::new(None));
        let apply_name_clone = apply_name.clone();
        dispatcher
            .run_in_background(
                || (),
                move |()| {
                    *apply_name_clone.lock() = thread::current().name().map(str::to_string);
                },
            )
            .unwrap();

        dispatcher.shutdown();
        assert_eq!(apply_name.lock().as_deref(), Some("test-apply"));
    }

    #[test]
    fn test_run_on_apply_inline() {
        let (dispatcher, _apply_loop) = Dispatcher::new(DispatcherConfig::default()).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();

        dispatcher
            .run_on_apply(move || ran_clone.store(true, Ordering::SeqCst))
            .unwrap();

        assert!(ran.load(Ordering::SeqCst));
        dispatcher.shutdown();
    }

    #[test]
    fn test_work_rejected_after_shutdown() {
        let (dispatcher, _apply_loop) = Dispatcher::new(DispatcherConfig::default()).unwrap();
        dispatcher.shutdown();

        assert_eq!(
            dispatcher.run_in_background(|| 1, |_| {}),
            Err(DispatchError::WorkerStopped)
        );
        assert_eq!(
            dispatcher.apply_context().post(|| {}),
            Err(DispatchError::ApplyClosed)
        );
    }
}
