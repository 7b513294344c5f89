//! Execution contexts for listsync.
//!
//! This crate provides the concurrency plumbing the list adapters run on:
//!
//! - **Worker**: a single serial background thread for diff computation
//! - **Apply context**: a single-threaded consumer that owns displayed state
//! - **Dispatcher**: an explicitly constructed pair of the two
//! - **Signal/Slot System**: type-safe change notification fan-out
//!
//! # Dispatcher Example
//!
//! ```no_run
//! use listsync_core::{Dispatcher, DispatcherConfig};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (dispatcher, apply_loop) = Dispatcher::new(DispatcherConfig::default())?;
//!
//!     dispatcher.run_in_background(
//!         || (1..=10).sum::<u32>(),
//!         |sum| println!("sum computed off-thread: {sum}"),
//!     )?;
//!
//!     while apply_loop.process_timeout(Duration::from_millis(16)) == 0 {}
//!     dispatcher.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Signal Example
//!
//! ```
//! use listsync_core::Signal;
//!
//! let removed = Signal::<(usize, usize)>::new();
//! removed.connect(|&(position, count)| println!("removed {count} at {position}"));
//! removed.emit((2, 1));
//! ```

pub mod apply;
pub mod dispatcher;
mod error;
pub mod logging;
pub mod signal;
pub mod worker;

pub use apply::{ApplyContext, ApplyLoop};
pub use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::{DispatchError, Result};
pub use logging::PerfSpan;
pub use signal::{ConnectionGuard, ConnectionId, Signal};
pub use worker::{Worker, WorkerBuilder, WorkerConfig};
