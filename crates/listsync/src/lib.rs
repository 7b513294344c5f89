//! Displayed-list synchronization for item views.
//!
//! listsync keeps a displayed list in step with a sorted, filterable source
//! collection. Every change is diffed on a single background worker and
//! applied on a single apply context, which turns it into incremental
//! insert/remove/move/change notifications instead of full redraws. A
//! bounded selection is tracked over whatever is currently displayed.
//!
//! - [`DiffListAdapter`]: the façade a view binds to
//! - [`policy`]: caller-supplied ordering, filter and diff equality
//! - [`diff`]: the diff engine and its [`EditOp`]s
//! - [`notify`]: the [`NotificationSink`] receiving applied changes
//! - [`queue`]: the single-flight update pipeline
//! - [`selection`]: the bounded [`SelectionTracker`]
//! - [`store`]: source and displayed collections
//!
//! Execution contexts come from [`listsync_core`]; the owner of the adapters
//! creates one [`Dispatcher`](listsync_core::Dispatcher) and shuts it down.
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//!
//! use listsync::DiffListAdapter;
//! use listsync::policy::ByKey;
//! use listsync_core::{Dispatcher, DispatcherConfig};
//!
//! // The current thread becomes the apply context and pumps it.
//! let (dispatcher, apply_loop) = Dispatcher::new(DispatcherConfig::default()).unwrap();
//! let adapter = DiffListAdapter::builder(dispatcher.clone())
//!     .ordering(|a: &u32, b: &u32| a.cmp(b))
//!     .filter(|n: &u32, query: &str| n.to_string().contains(query))
//!     .equality(ByKey::new(|n: &u32| *n))
//!     .build();
//!
//! adapter.set_items([30u32, 10, 20]);
//! adapter.filter(Some("1"));
//!
//! let deadline = Instant::now() + Duration::from_secs(5);
//! while !adapter.is_idle() && Instant::now() < deadline {
//!     apply_loop.process_timeout(Duration::from_millis(10));
//! }
//!
//! assert_eq!(*adapter.items(), vec![10]);
//! dispatcher.shutdown();
//! ```

pub mod adapter;
pub mod diff;
mod error;
pub mod notify;
pub mod policy;
pub mod queue;
pub mod selection;
pub mod store;

pub use adapter::{AdapterBuilder, AdapterConfig, DiffListAdapter};
pub use diff::{DiffEngine, DiffResult, EditOp};
pub use error::{Error, Result};
pub use notify::{NotificationSink, NullSink, SignalSink};
pub use policy::{ByKey, DiffEquality, EqualityFns, FilterPredicate, OrderingPolicy};
pub use queue::UpdateQueue;
pub use selection::{SelectionTracker, ToggleOutcome};
pub use store::{DisplayedList, ItemStore};
