//! The list adapter façade.
//!
//! [`DiffListAdapter`] composes the store, the selection tracker and the
//! update pipeline around one [`Dispatcher`]. It is the type an embedding
//! view binds to.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use listsync::{DiffListAdapter, SignalSink};
//! use listsync::policy::ByKey;
//! use listsync_core::{Dispatcher, DispatcherConfig};
//!
//! let dispatcher = Dispatcher::spawn(DispatcherConfig::default()).unwrap();
//! let sink = Arc::new(SignalSink::new());
//! sink.rows_inserted.connect(|&(position, count)| {
//!     println!("{count} rows inserted at {position}");
//! });
//!
//! let adapter = DiffListAdapter::builder(dispatcher.clone())
//!     .ordering(|a: &String, b: &String| a.cmp(b))
//!     .filter(|item: &String, query: &str| item.contains(query))
//!     .equality(ByKey::new(|item: &String| item.clone()))
//!     .max_selections(3)
//!     .sink(sink.clone())
//!     .build();
//!
//! adapter.set_items(["pear", "apple", "fig"].map(String::from));
//! adapter.wait_until_idle(Duration::from_secs(1));
//! assert_eq!(adapter.count(), 3);
//!
//! dispatcher.shutdown();
//! ```

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use listsync_core::Dispatcher;
use parking_lot::Mutex;

use crate::diff::DiffEngine;
use crate::error::Result;
use crate::notify::{NotificationSink, NullSink};
use crate::policy::{
    DiffEquality, FilterPredicate, MatchNone, NeverEqual, OrderingPolicy, SharedEquality,
    SharedFilter, SharedOrdering, Unordered,
};
use crate::queue::UpdateQueue;
use crate::selection::{SelectionTracker, ToggleOutcome};
use crate::store::{DisplayedList, ItemStore};

/// Configuration for creating a DiffListAdapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Upper bound on the number of selected items.
    pub max_selections: usize,
    /// Whether the diff reports moves instead of remove/insert pairs.
    pub detect_moves: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_selections: usize::MAX,
            detect_moves: true,
        }
    }
}

/// Builder for creating DiffListAdapters.
///
/// Every policy defaults to the inert one: [`Unordered`], [`MatchNone`],
/// [`NeverEqual`] and a [`NullSink`].
pub struct AdapterBuilder<T> {
    dispatcher: Dispatcher,
    config: AdapterConfig,
    ordering: SharedOrdering<T>,
    filter: SharedFilter<T>,
    equality: SharedEquality<T>,
    sink: Arc<dyn NotificationSink>,
}

impl<T> AdapterBuilder<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Create a builder for an adapter running on `dispatcher`.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            config: AdapterConfig::default(),
            ordering: Arc::new(Unordered),
            filter: Arc::new(MatchNone),
            equality: Arc::new(NeverEqual),
            sink: Arc::new(NullSink),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the selection bound.
    pub fn max_selections(mut self, max: usize) -> Self {
        self.config.max_selections = max;
        self
    }

    /// Enable or disable move detection.
    pub fn detect_moves(mut self, enabled: bool) -> Self {
        self.config.detect_moves = enabled;
        self
    }

    /// Set the ordering policy for the source collection.
    pub fn ordering<O>(mut self, ordering: O) -> Self
    where
        O: OrderingPolicy<T> + 'static,
    {
        self.ordering = Arc::new(ordering);
        self
    }

    /// Set the filter predicate.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: FilterPredicate<T> + 'static,
    {
        self.filter = Arc::new(filter);
        self
    }

    /// Set the equality pair used for diffing.
    pub fn equality<E>(mut self, equality: E) -> Self
    where
        E: DiffEquality<T> + 'static,
    {
        self.equality = Arc::new(equality);
        self
    }

    /// Set the notification sink.
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the adapter. It starts out empty.
    pub fn build(self) -> DiffListAdapter<T> {
        let store = ItemStore::new(self.ordering, self.filter);
        let displayed = store.displayed().clone();
        let engine = DiffEngine::new(self.equality).detect_moves(self.config.detect_moves);
        let queue = UpdateQueue::new(
            self.dispatcher.clone(),
            engine,
            displayed.clone(),
            self.sink.clone(),
        );

        tracing::debug!(
            target: "listsync::queue",
            max_selections = self.config.max_selections,
            detect_moves = self.config.detect_moves,
            "adapter created"
        );

        DiffListAdapter {
            inner: Arc::new(AdapterInner {
                store: Mutex::new(store),
                selection: Mutex::new(SelectionTracker::new(self.config.max_selections)),
                queue,
                displayed,
                sink: self.sink,
                dispatcher: self.dispatcher,
                config: self.config,
            }),
        }
    }
}

struct AdapterInner<T> {
    /// Held while publishing so candidates enter the queue in store order.
    store: Mutex<ItemStore<T>>,
    /// Mutated on the apply context only.
    selection: Mutex<SelectionTracker<T>>,
    queue: UpdateQueue<T>,
    displayed: DisplayedList<T>,
    sink: Arc<dyn NotificationSink>,
    dispatcher: Dispatcher,
    config: AdapterConfig,
}

impl<T> AdapterInner<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn notify_positions(&self, positions: &[usize]) {
        for &position in positions {
            self.sink.item_changed(position);
        }
    }

    fn apply_selection(&self, selection: HashSet<T>) -> Result<()> {
        let displayed = self.displayed.snapshot();
        let positions = self
            .selection
            .lock()
            .set_selected_items(selection, &displayed)?;
        self.notify_positions(&positions);
        Ok(())
    }

    fn apply_toggle(&self, position: usize) -> Result<ToggleOutcome> {
        let displayed = self.displayed.snapshot();
        let (outcome, positions) = self.selection.lock().toggle_at(position, &displayed)?;
        self.notify_positions(&positions);
        Ok(outcome)
    }

    fn apply_clear(&self) {
        let displayed = self.displayed.snapshot();
        let positions = self.selection.lock().clear(&displayed);
        self.notify_positions(&positions);
    }
}

/// Keeps a displayed list in sync with a sorted, filterable source and
/// tracks a bounded selection over it.
///
/// Cloning yields another handle to the same adapter. Every method may be
/// called from any thread. Displayed-list and selection mutations run on the
/// dispatcher's apply context; when called elsewhere they are posted there
/// and take effect once the apply context runs them.
pub struct DiffListAdapter<T> {
    inner: Arc<AdapterInner<T>>,
}

impl<T> Clone for DiffListAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> DiffListAdapter<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Returns a builder for an adapter running on `dispatcher`.
    pub fn builder(dispatcher: Dispatcher) -> AdapterBuilder<T> {
        AdapterBuilder::new(dispatcher)
    }

    /// Replace the source collection.
    ///
    /// Accepts plain items or `Option`s; `None` entries are dropped. Clears
    /// any active filter and publishes the sorted source for display.
    ///
    /// An absent collection empties the source. Flatten it into an empty
    /// iterator:
    ///
    /// ```
    /// use listsync::DiffListAdapter;
    /// use listsync_core::{Dispatcher, DispatcherConfig};
    ///
    /// let (dispatcher, _apply_loop) = Dispatcher::new(DispatcherConfig::default()).unwrap();
    /// let adapter: DiffListAdapter<u32> = DiffListAdapter::builder(dispatcher.clone()).build();
    ///
    /// adapter.set_items([2u32, 1]);
    /// let loaded: Option<Vec<u32>> = None;
    /// adapter.set_items(loaded.into_iter().flatten());
    /// assert!(adapter.source_items().is_empty());
    /// dispatcher.shutdown();
    /// ```
    pub fn set_items<I, V>(&self, items: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Option<T>>,
    {
        let mut store = self.inner.store.lock();
        let candidate = store.set_items(items);
        self.inner.queue.publish(candidate);
    }

    /// Filter the displayed list by `query`.
    ///
    /// `None` or an empty query shows the whole source again.
    pub fn filter(&self, query: Option<&str>) {
        let mut store = self.inner.store.lock();
        let candidate = store.filter(query);
        self.inner.queue.publish(candidate);
    }

    /// The item at `position` in the applied displayed list.
    pub fn item_at(&self, position: usize) -> Result<T> {
        self.inner.displayed.item_at(position)
    }

    /// Number of items in the applied displayed list.
    pub fn count(&self) -> usize {
        self.inner.displayed.len()
    }

    /// Snapshot of the applied displayed list.
    pub fn items(&self) -> Arc<Vec<T>> {
        self.inner.displayed.snapshot()
    }

    /// Snapshot of the sorted source collection.
    pub fn source_items(&self) -> Arc<Vec<T>> {
        self.inner.store.lock().source()
    }

    /// The active filter query, if any.
    pub fn current_query(&self) -> Option<String> {
        self.inner.store.lock().query().map(str::to_string)
    }

    /// Snapshot of the selected items.
    pub fn selected_items(&self) -> HashSet<T> {
        self.inner.selection.lock().selected_items()
    }

    /// Returns `true` if `item` is selected.
    pub fn is_selected(&self, item: &T) -> bool {
        self.inner.selection.lock().is_selected(item)
    }

    /// The configured selection bound.
    pub fn max_selections(&self) -> usize {
        self.inner.config.max_selections
    }

    /// Replace the selection.
    ///
    /// Fails with [`Error::InvalidSelection`](crate::Error::InvalidSelection)
    /// when `selection` holds more than `max_selections` distinct items; the
    /// selection is then left unchanged. Otherwise every displayed position
    /// whose selection state changes receives `item_changed`.
    pub fn set_selected_items<I>(&self, selection: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        let selection: HashSet<T> = selection.into_iter().collect();
        self.inner.selection.lock().check_capacity(selection.len())?;

        if self.inner.dispatcher.is_apply_context() {
            return self.inner.apply_selection(selection);
        }
        let inner = self.inner.clone();
        self.inner.dispatcher.apply_context().post(move || {
            if let Err(e) = inner.apply_selection(selection) {
                tracing::warn!(target: "listsync::selection", %e, "selection update failed");
            }
        })?;
        Ok(())
    }

    /// Toggle the selection state of the item displayed at `position`.
    ///
    /// On the apply context this runs immediately and returns
    /// `Some(outcome)`. Anywhere else it is posted, resolved against the
    /// displayed list at that time, and returns `None`.
    pub fn toggle(&self, position: usize) -> Result<Option<ToggleOutcome>> {
        if self.inner.dispatcher.is_apply_context() {
            return self.inner.apply_toggle(position).map(Some);
        }
        let inner = self.inner.clone();
        self.inner.dispatcher.apply_context().post(move || {
            if let Err(e) = inner.apply_toggle(position) {
                tracing::warn!(target: "listsync::selection", %e, position, "toggle failed");
            }
        })?;
        Ok(None)
    }

    /// Deselect everything.
    pub fn clear_selection(&self) -> Result<()> {
        let inner = self.inner.clone();
        self.inner
            .dispatcher
            .run_on_apply(move || inner.apply_clear())?;
        Ok(())
    }

    /// Candidates waiting behind the diff in flight.
    pub fn pending_updates(&self) -> usize {
        self.inner.queue.pending_updates()
    }

    /// Returns `true` when every published candidate has been applied.
    pub fn is_idle(&self) -> bool {
        self.inner.queue.is_idle()
    }

    /// Block until every published candidate has been applied or `timeout`
    /// elapses. Returns `true` if the adapter became idle.
    ///
    /// Must not be called on an owner-pumped apply thread, which would have
    /// to run the very jobs being waited for.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.inner.queue.wait_until_idle(timeout)
    }

    /// The dispatcher this adapter runs on.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}

impl<T> std::fmt::Debug for DiffListAdapter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffListAdapter")
            .field("displayed", &self.inner.displayed)
            .field("queue", &self.inner.queue)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(DiffListAdapter<String>: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::policy::ByKey;
    use listsync_core::{ApplyLoop, DispatcherConfig};
    use std::time::Instant;

    #[derive(Default)]
    struct ChangedPositions(Mutex<Vec<usize>>);

    impl NotificationSink for ChangedPositions {
        fn range_inserted(&self, _position: usize, _count: usize) {}
        fn range_removed(&self, _position: usize, _count: usize) {}
        fn range_moved(&self, _from: usize, _to: usize, _count: usize) {}
        fn range_changed(&self, _position: usize, _count: usize) {}
        fn item_changed(&self, position: usize) {
            self.0.lock().push(position);
        }
    }

    fn setup(max: usize) -> (DiffListAdapter<&'static str>, ApplyLoop, Arc<ChangedPositions>) {
        let (dispatcher, apply_loop) = Dispatcher::new(DispatcherConfig::default()).unwrap();
        let sink = Arc::new(ChangedPositions::default());
        let adapter = DiffListAdapter::builder(dispatcher)
            .ordering(|a: &&'static str, b: &&'static str| a.cmp(b))
            .equality(ByKey::new(|s: &&'static str| *s))
            .max_selections(max)
            .sink(sink.clone())
            .build();
        (adapter, apply_loop, sink)
    }

    fn settle(adapter: &DiffListAdapter<&'static str>, apply_loop: &ApplyLoop) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !adapter.is_idle() && Instant::now() < deadline {
            apply_loop.process_timeout(Duration::from_millis(10));
        }
        apply_loop.process_pending();
        assert!(adapter.is_idle());
    }

    #[test]
    fn test_set_items_then_read() {
        let (adapter, apply_loop, _sink) = setup(1);
        adapter.set_items(vec![Some("c"), None, Some("a"), Some("b")]);
        settle(&adapter, &apply_loop);

        assert_eq!(adapter.count(), 3);
        assert_eq!(*adapter.items(), vec!["a", "b", "c"]);
        assert_eq!(adapter.item_at(2), Ok("c"));
        assert_eq!(
            adapter.item_at(3),
            Err(Error::OutOfRange {
                position: 3,
                count: 3
            })
        );
        adapter.dispatcher().shutdown();
    }

    #[test]
    fn test_toggle_inline_on_apply_context() {
        let (adapter, apply_loop, sink) = setup(1);
        adapter.set_items(["a", "b"]);
        settle(&adapter, &apply_loop);

        assert_eq!(adapter.toggle(0), Ok(Some(ToggleOutcome::Selected)));
        assert_eq!(adapter.toggle(1), Ok(Some(ToggleOutcome::AtCapacity)));
        assert_eq!(adapter.toggle(0), Ok(Some(ToggleOutcome::Deselected)));
        assert_eq!(*sink.0.lock(), vec![0, 0]);
        assert!(matches!(adapter.toggle(5), Err(Error::OutOfRange { .. })));
        adapter.dispatcher().shutdown();
    }

    #[test]
    fn test_oversized_selection_rejected_synchronously() {
        let (adapter, _apply_loop, sink) = setup(1);
        assert_eq!(
            adapter.set_selected_items(["a", "b"]),
            Err(Error::InvalidSelection {
                requested: 2,
                max: 1
            })
        );
        assert!(adapter.selected_items().is_empty());
        assert!(sink.0.lock().is_empty());
        adapter.dispatcher().shutdown();
    }

    #[test]
    fn test_clear_selection() {
        let (adapter, apply_loop, sink) = setup(2);
        adapter.set_items(["a", "b", "c"]);
        settle(&adapter, &apply_loop);

        adapter.set_selected_items(["a", "c"]).unwrap();
        sink.0.lock().clear();
        adapter.clear_selection().unwrap();

        assert!(adapter.selected_items().is_empty());
        assert_eq!(*sink.0.lock(), vec![0, 2]);
        adapter.dispatcher().shutdown();
    }

    #[test]
    fn test_posted_after_shutdown_fails() {
        let (adapter, apply_loop, _sink) = setup(1);
        adapter.dispatcher().shutdown();
        drop(apply_loop);

        let other = adapter.clone();
        let result = std::thread::spawn(move || other.toggle(0)).join().unwrap();
        assert!(matches!(result, Err(Error::Dispatch(_))));
    }
}
