//! Source and displayed collections.
//!
//! [`ItemStore`] owns the sorted source collection and the active filter
//! query. It never touches the displayed list itself: every mutation returns
//! the next displayed candidate, which the caller publishes to the update
//! pipeline. [`DisplayedList`] is the list as last applied by that pipeline,
//! readable from any thread.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::policy::{SharedFilter, SharedOrdering};

/// Shared view of the currently applied displayed list.
///
/// Readers get cheap snapshots; only the update pipeline replaces the list,
/// and it does so on the apply context.
pub struct DisplayedList<T> {
    inner: Arc<RwLock<Arc<Vec<T>>>>,
}

impl<T> Clone for DisplayedList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for DisplayedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DisplayedList<T> {
    /// Create an empty displayed list.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(Vec::new()))),
        }
    }

    /// The list as currently applied.
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.inner.read().clone()
    }

    /// Number of displayed items.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if nothing is displayed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The item at `position`, or [`Error::OutOfRange`].
    pub fn item_at(&self, position: usize) -> Result<T>
    where
        T: Clone,
    {
        let list = self.inner.read();
        list.get(position).cloned().ok_or(Error::OutOfRange {
            position,
            count: list.len(),
        })
    }

    /// Swap in a new list, returning the previous one.
    pub(crate) fn replace(&self, list: Arc<Vec<T>>) -> Arc<Vec<T>> {
        std::mem::replace(&mut *self.inner.write(), list)
    }
}

impl<T> std::fmt::Debug for DisplayedList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayedList")
            .field("len", &self.len())
            .finish()
    }
}

/// Owner of the sorted source collection and the filter query.
pub struct ItemStore<T> {
    source: Arc<Vec<T>>,
    query: Option<String>,
    ordering: SharedOrdering<T>,
    filter: SharedFilter<T>,
    displayed: DisplayedList<T>,
}

impl<T: Clone> ItemStore<T> {
    /// Create an empty store.
    pub fn new(ordering: SharedOrdering<T>, filter: SharedFilter<T>) -> Self {
        Self {
            source: Arc::new(Vec::new()),
            query: None,
            ordering,
            filter,
            displayed: DisplayedList::new(),
        }
    }

    /// Handle on the displayed list this store feeds.
    pub fn displayed(&self) -> &DisplayedList<T> {
        &self.displayed
    }

    /// Replace the source collection.
    ///
    /// `None` entries are dropped and the rest is sorted (stably) by the
    /// ordering policy. Any active filter is cleared. Returns the source as
    /// the next displayed candidate.
    pub fn set_items<I, V>(&mut self, candidates: I) -> Arc<Vec<T>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Option<T>>,
    {
        let mut items: Vec<T> = candidates.into_iter().filter_map(Into::into).collect();
        let ordering = &self.ordering;
        items.sort_by(|a, b| ordering.compare(a, b));

        tracing::debug!(target: "listsync::store", count = items.len(), "source replaced");
        self.source = Arc::new(items);
        self.query = None;
        self.source.clone()
    }

    /// Compute the displayed candidate for `query`.
    ///
    /// An absent or empty query yields the whole source. Otherwise the
    /// result is the subsequence of the source matching the filter
    /// predicate. The source itself is never modified.
    pub fn filter(&mut self, query: Option<&str>) -> Arc<Vec<T>> {
        match query.filter(|q| !q.is_empty()) {
            None => {
                self.query = None;
                self.source.clone()
            }
            Some(query) => {
                let matched: Vec<T> = self
                    .source
                    .iter()
                    .filter(|item| self.filter.matches(item, query))
                    .cloned()
                    .collect();
                tracing::debug!(
                    target: "listsync::store",
                    query,
                    matched = matched.len(),
                    total = self.source.len(),
                    "filter applied"
                );
                self.query = Some(query.to_string());
                Arc::new(matched)
            }
        }
    }

    /// The sorted source collection.
    pub fn source(&self) -> Arc<Vec<T>> {
        self.source.clone()
    }

    /// The active filter query, if any.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The item at `position` in the applied displayed list.
    pub fn item_at(&self, position: usize) -> Result<T> {
        self.displayed.item_at(position)
    }

    /// Number of items in the applied displayed list.
    pub fn count(&self) -> usize {
        self.displayed.len()
    }
}

impl<T> std::fmt::Debug for ItemStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemStore")
            .field("source_len", &self.source.len())
            .field("query", &self.query)
            .field("displayed", &self.displayed)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(DisplayedList<String>: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{MatchNone, Unordered};

    fn sorted_store() -> ItemStore<String> {
        ItemStore::new(
            Arc::new(|a: &String, b: &String| a.cmp(b)),
            Arc::new(|item: &String, query: &str| item.to_lowercase().contains(query)),
        )
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_set_items_sorts_and_drops_absent() {
        let mut store = sorted_store();
        let candidate = store.set_items(vec![
            Some("C".to_string()),
            None,
            Some("A".to_string()),
            Some("B".to_string()),
        ]);

        assert_eq!(*candidate, strings(&["A", "B", "C"]));
        assert_eq!(*store.source(), strings(&["A", "B", "C"]));
    }

    #[test]
    fn test_set_items_accepts_plain_items() {
        let mut store = sorted_store();
        let candidate = store.set_items(strings(&["b", "a"]));
        assert_eq!(*candidate, strings(&["a", "b"]));

        let empty = store.set_items(Vec::<Option<String>>::new());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_unordered_keeps_given_order() {
        let mut store: ItemStore<i32> = ItemStore::new(Arc::new(Unordered), Arc::new(MatchNone));
        let candidate = store.set_items(vec![3, 1, 2]);
        assert_eq!(*candidate, vec![3, 1, 2]);
    }

    #[test]
    fn test_filter() {
        let mut store = sorted_store();
        store.set_items(strings(&["A", "B", "C"]));

        let filtered = store.filter(Some("b"));
        assert_eq!(*filtered, strings(&["B"]));
        assert_eq!(store.query(), Some("b"));
        assert_eq!(store.source().len(), 3);

        let restored = store.filter(None);
        assert_eq!(*restored, strings(&["A", "B", "C"]));
        assert_eq!(store.query(), None);

        let empty_query = store.filter(Some(""));
        assert_eq!(empty_query.len(), 3);
    }

    #[test]
    fn test_set_items_clears_query() {
        let mut store = sorted_store();
        store.set_items(strings(&["A", "B"]));
        store.filter(Some("a"));
        assert!(store.query().is_some());

        store.set_items(strings(&["C"]));
        assert_eq!(store.query(), None);
    }

    #[test]
    fn test_default_filter_matches_nothing() {
        let mut store: ItemStore<i32> = ItemStore::new(Arc::new(Unordered), Arc::new(MatchNone));
        store.set_items(vec![1, 2, 3]);
        assert!(store.filter(Some("1")).is_empty());
    }

    #[test]
    fn test_item_at_reads_displayed_list() {
        let store = sorted_store();
        assert_eq!(
            store.item_at(0),
            Err(Error::OutOfRange {
                position: 0,
                count: 0
            })
        );

        store
            .displayed()
            .replace(Arc::new(strings(&["X", "Y"])));
        assert_eq!(store.count(), 2);
        assert_eq!(store.item_at(1), Ok("Y".to_string()));
        assert_eq!(
            store.item_at(2),
            Err(Error::OutOfRange {
                position: 2,
                count: 2
            })
        );
    }
}
