//! Serial background worker.
//!
//! A [`Worker`] owns one dedicated thread with its own task queue. Tasks run
//! strictly one after another in submission order, never concurrently with
//! each other. This is the background half of the dispatcher: every diff
//! computation runs here.
//!
//! Results travel back through the apply context:
//! [`send_with_callback`](Worker::send_with_callback) runs the task on the
//! worker thread and posts the callback, with the task's result, to the
//! [`ApplyContext`] the worker was created with.
//!
//! # Example
//!
//! ```no_run
//! use listsync_core::apply::ApplyLoop;
//! use listsync_core::worker::{Worker, WorkerConfig};
//!
//! let (context, apply_loop) = ApplyLoop::new();
//! let worker = Worker::with_config(WorkerConfig::with_name("diff"), context).unwrap();
//!
//! worker
//!     .send_with_callback(
//!         || (1..=10).sum::<u32>(),
//!         |total| println!("sum is {total}"),
//!     )
//!     .unwrap();
//!
//! apply_loop.process_timeout(std::time::Duration::from_secs(1));
//! worker.stop_and_join();
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::{Condvar, Mutex};

use crate::apply::ApplyContext;
use crate::error::{DispatchError, Result};

/// Default capacity for the worker's task queue.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// How often an idle worker re-checks whether it was stopped.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for creating a Worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for the worker thread.
    pub name: String,
    /// Stack size for the worker thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
    /// Capacity of the task queue. Senders block while it is full.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "listsync-worker".to_string(),
            stack_size: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Create a new configuration with the given thread name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Builder for creating Workers with custom configuration.
#[derive(Debug, Default)]
pub struct WorkerBuilder {
    config: WorkerConfig,
}

impl WorkerBuilder {
    /// Create a new WorkerBuilder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the stack size for the worker thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Set the task queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    /// Build and start the worker.
    pub fn build(self, apply: ApplyContext) -> Result<Worker> {
        Worker::with_config(self.config, apply)
    }
}

/// Internal state shared between the Worker handle and worker thread.
struct WorkerState {
    /// Whether the worker accepts new tasks.
    running: AtomicBool,
    /// Whether the worker thread has exited.
    finished: AtomicBool,
    /// Count of tasks queued or executing.
    pending_tasks: AtomicUsize,
    /// Condvar for waiting on shutdown.
    shutdown_condvar: Condvar,
    /// Mutex for the condvar.
    shutdown_mutex: Mutex<()>,
}

impl WorkerState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            pending_tasks: AtomicUsize::new(0),
            shutdown_condvar: Condvar::new(),
            shutdown_mutex: Mutex::new(()),
        }
    }

    fn signal_shutdown(&self) {
        let _guard = self.shutdown_mutex.lock();
        self.finished.store(true, Ordering::Release);
        self.shutdown_condvar.notify_all();
    }
}

type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

/// A dedicated background thread with its own FIFO task queue.
///
/// `Worker` is `Send + Sync`; any number of threads may submit tasks
/// concurrently, and they are executed one at a time in the order they were
/// accepted.
pub struct Worker {
    task_sender: Sender<BoxedTask>,
    handle: Mutex<Option<JoinHandle<()>>>,
    state: Arc<WorkerState>,
    apply: ApplyContext,
    name: String,
}

impl Worker {
    /// Create a worker with default configuration.
    pub fn new(apply: ApplyContext) -> Result<Self> {
        Self::with_config(WorkerConfig::default(), apply)
    }

    /// Create a worker with custom configuration.
    ///
    /// The worker thread starts immediately.
    pub fn with_config(config: WorkerConfig, apply: ApplyContext) -> Result<Self> {
        let (sender, receiver) = bounded(config.queue_capacity.max(1));
        let state = Arc::new(WorkerState::new());

        let thread_state = state.clone();
        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = builder
            .spawn(move || {
                worker_loop(receiver, &thread_state);
                thread_state.running.store(false, Ordering::Release);
                thread_state.signal_shutdown();
            })
            .map_err(|e| DispatchError::spawn_failed(config.name.clone(), &e))?;

        tracing::debug!(target: "listsync_core::worker", name = %config.name, "worker started");

        Ok(Self {
            task_sender: sender,
            handle: Mutex::new(Some(handle)),
            state,
            apply,
            name: config.name,
        })
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the worker still accepts tasks.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Get the number of tasks queued or executing.
    pub fn pending_tasks(&self) -> usize {
        self.state.pending_tasks.load(Ordering::Acquire)
    }

    /// The apply context results are delivered to.
    pub fn apply_context(&self) -> &ApplyContext {
        &self.apply
    }

    /// Run `task` on the worker thread, discarding its result.
    ///
    /// Blocks while the task queue is full.
    pub fn execute<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_running() {
            return Err(DispatchError::WorkerStopped);
        }

        self.state.pending_tasks.fetch_add(1, Ordering::AcqRel);
        self.task_sender.send(Box::new(task)).map_err(|_| {
            self.state.pending_tasks.fetch_sub(1, Ordering::AcqRel);
            DispatchError::WorkerStopped
        })
    }

    /// Run `task` on the worker thread and deliver its result to `callback`
    /// on the apply context.
    ///
    /// If the apply context has closed by the time the task finishes, the
    /// result is dropped and a warning is logged.
    pub fn send_with_callback<T, F, C>(&self, task: F, callback: C) -> Result<()>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        let apply = self.apply.clone();
        self.execute(move || {
            let result = task();
            if let Err(err) = apply.post(move || callback(result)) {
                tracing::warn!(
                    target: "listsync_core::worker",
                    %err,
                    "dropping worker result, apply context unavailable"
                );
            }
        })
    }

    /// Request the worker to stop after processing remaining tasks.
    ///
    /// Non-blocking. Tasks submitted after this call are rejected with
    /// [`DispatchError::WorkerStopped`]. Use `join()` to wait for the thread.
    pub fn stop(&self) {
        if self.state.running.swap(false, Ordering::AcqRel) {
            tracing::debug!(target: "listsync_core::worker", name = %self.name, "worker stopping");
        }
    }

    /// Wait for the worker thread to finish.
    ///
    /// Returns `true` if the worker was joined successfully, `false` if
    /// already joined, if the thread panicked, or if called from the worker
    /// thread itself.
    pub fn join(&self) -> bool {
        let mut handle = self.handle.lock();
        let Some(h) = handle.take() else {
            return false;
        };
        if h.thread().id() == thread::current().id() {
            *handle = Some(h);
            return false;
        }
        h.join().is_ok()
    }

    /// Stop the worker and wait for it to finish.
    pub fn stop_and_join(&self) -> bool {
        self.stop();
        self.join()
    }

    /// Wait for the worker thread to exit with a timeout.
    ///
    /// Returns `true` if it exited within the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut guard = self.state.shutdown_mutex.lock();
        while !self.state.finished.load(Ordering::Acquire) {
            if self
                .state
                .shutdown_condvar
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                return self.state.finished.load(Ordering::Acquire);
            }
        }
        true
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Don't block in drop - just request shutdown
        self.stop();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

/// The main worker loop that processes tasks.
///
/// Exits once the worker has been stopped and the queue is drained, or when
/// every sender is gone.
fn worker_loop(receiver: Receiver<BoxedTask>, state: &WorkerState) {
    loop {
        match receiver.recv_timeout(IDLE_POLL_INTERVAL) {
            Ok(task) => {
                run_task(task);
                state.pending_tasks.fetch_sub(1, Ordering::AcqRel);
            }
            Err(RecvTimeoutError::Timeout) => {
                if !state.running.load(Ordering::Acquire)
                    && state.pending_tasks.load(Ordering::Acquire) == 0
                {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!(target: "listsync_core::worker", "worker loop exited");
}

fn run_task(task: BoxedTask) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::error!(target: "listsync_core::worker", "background task panicked");
    }
}

static_assertions::assert_impl_all!(Worker: Send, Sync);
