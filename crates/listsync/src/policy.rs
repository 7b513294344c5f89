//! Caller-supplied item policies.
//!
//! The adapter never assumes how items compare. Three policies are supplied
//! at construction:
//!
//! - [`OrderingPolicy`] sorts the source collection.
//! - [`FilterPredicate`] decides which items match a filter query.
//! - [`DiffEquality`] tells the diff engine whether two items are the same
//!   logical entity and whether that entity's content changed.
//!
//! Closures implement the first two directly. The defaults are deliberately
//! inert: [`Unordered`] keeps the given order, [`MatchNone`] filters
//! everything out and [`NeverEqual`] never matches, so every update becomes a
//! full remove-and-insert until the caller supplies something meaningful.
//!
//! Policies must be deterministic. An ordering must be a total order and the
//! equality pair must be consistent across calls; the adapter does not guard
//! against collaborators that break this.

use std::cmp::Ordering;
use std::hash::{BuildHasher, Hash, RandomState};
use std::sync::Arc;

/// Comparator used to sort the source collection.
pub trait OrderingPolicy<T>: Send + Sync {
    /// Compare two items.
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

impl<T, F> OrderingPolicy<T> for F
where
    F: Fn(&T, &T) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

/// Predicate used to filter the source collection.
pub trait FilterPredicate<T>: Send + Sync {
    /// Returns `true` if `item` matches the non-empty `query`.
    fn matches(&self, item: &T, query: &str) -> bool;
}

impl<T, F> FilterPredicate<T> for F
where
    F: Fn(&T, &str) -> bool + Send + Sync,
{
    fn matches(&self, item: &T, query: &str) -> bool {
        self(item, query)
    }
}

/// Equality pair used by the diff engine.
pub trait DiffEquality<T>: Send + Sync {
    /// Returns `true` if `a` and `b` are the same logical entity.
    fn same_identity(&self, a: &T, b: &T) -> bool;

    /// Returns `true` if `a` and `b`, already known to share an identity,
    /// have unchanged content.
    fn same_content(&self, a: &T, b: &T) -> bool;

    /// Hash of the identity of `item`, if the policy can compute one.
    ///
    /// Items that share an identity must hash alike. With hashes available
    /// the diff engine skips items whose identity only occurs on one side
    /// and pairs moved items through hash buckets.
    fn identity_hash(&self, _item: &T) -> Option<u64> {
        None
    }

    /// Returns `true` if no two items ever share an identity.
    fn never_same(&self) -> bool {
        false
    }
}

/// Shared ordering policy.
pub type SharedOrdering<T> = Arc<dyn OrderingPolicy<T>>;

/// Shared filter predicate.
pub type SharedFilter<T> = Arc<dyn FilterPredicate<T>>;

/// Shared equality pair.
pub type SharedEquality<T> = Arc<dyn DiffEquality<T>>;

/// Ordering that treats every pair as equal, keeping the given order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unordered;

impl<T> OrderingPolicy<T> for Unordered {
    fn compare(&self, _a: &T, _b: &T) -> Ordering {
        Ordering::Equal
    }
}

/// Filter predicate that matches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchNone;

impl<T> FilterPredicate<T> for MatchNone {
    fn matches(&self, _item: &T, _query: &str) -> bool {
        false
    }
}

/// Equality pair under which no two items are ever the same entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEqual;

impl<T> DiffEquality<T> for NeverEqual {
    fn same_identity(&self, _a: &T, _b: &T) -> bool {
        false
    }

    fn same_content(&self, _a: &T, _b: &T) -> bool {
        false
    }

    fn never_same(&self) -> bool {
        true
    }
}

/// Identity by an extracted key, content by `PartialEq`.
///
/// The key also provides [`DiffEquality::identity_hash`], so large diffs
/// between mostly unrelated lists stay cheap.
///
/// ```
/// use listsync::policy::{ByKey, DiffEquality};
///
/// #[derive(PartialEq)]
/// struct Contact { id: u32, name: String }
///
/// let equality = ByKey::new(|c: &Contact| c.id);
/// let old = Contact { id: 1, name: "Ada".into() };
/// let new = Contact { id: 1, name: "Ada L.".into() };
/// assert!(equality.same_identity(&old, &new));
/// assert!(!equality.same_content(&old, &new));
/// ```
pub struct ByKey<F> {
    key: F,
    hasher: RandomState,
}

impl<F> ByKey<F> {
    /// Create an equality pair keyed by `key`.
    pub fn new(key: F) -> Self {
        Self {
            key,
            hasher: RandomState::new(),
        }
    }
}

impl<T, K, F> DiffEquality<T> for ByKey<F>
where
    T: PartialEq,
    K: PartialEq + Hash,
    F: Fn(&T) -> K + Send + Sync,
{
    fn same_identity(&self, a: &T, b: &T) -> bool {
        (self.key)(a) == (self.key)(b)
    }

    fn same_content(&self, a: &T, b: &T) -> bool {
        a == b
    }

    fn identity_hash(&self, item: &T) -> Option<u64> {
        Some(self.hasher.hash_one((self.key)(item)))
    }
}

/// Equality pair built from two closures.
pub struct EqualityFns<I, C> {
    identity: I,
    content: C,
}

impl<I, C> EqualityFns<I, C> {
    /// Create an equality pair from an identity test and a content test.
    pub fn new(identity: I, content: C) -> Self {
        Self { identity, content }
    }
}

impl<T, I, C> DiffEquality<T> for EqualityFns<I, C>
where
    I: Fn(&T, &T) -> bool + Send + Sync,
    C: Fn(&T, &T) -> bool + Send + Sync,
{
    fn same_identity(&self, a: &T, b: &T) -> bool {
        (self.identity)(a, b)
    }

    fn same_content(&self, a: &T, b: &T) -> bool {
        (self.content)(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_inert() {
        assert_eq!(Unordered.compare(&1, &2), Ordering::Equal);
        assert!(!FilterPredicate::<i32>::matches(&MatchNone, &1, "1"));
        assert!(!NeverEqual.same_identity(&1, &1));
        assert!(!NeverEqual.same_content(&1, &1));
        assert!(DiffEquality::<i32>::never_same(&NeverEqual));
    }

    #[test]
    fn test_key_hash_follows_identity() {
        let equality = ByKey::new(|item: &(u32, char)| item.0);
        let a = equality.identity_hash(&(7, 'a'));
        assert!(a.is_some());
        assert_eq!(a, equality.identity_hash(&(7, 'b')));
        assert!(!DiffEquality::<(u32, char)>::never_same(&equality));

        let closures = EqualityFns::new(|a: &u32, b: &u32| a == b, |_: &u32, _: &u32| true);
        assert_eq!(closures.identity_hash(&7), None);
    }

    #[test]
    fn test_closures_as_policies() {
        let ordering: SharedOrdering<i32> = Arc::new(|a: &i32, b: &i32| b.cmp(a));
        assert_eq!(ordering.compare(&1, &2), Ordering::Greater);

        let filter: SharedFilter<String> =
            Arc::new(|item: &String, query: &str| item.contains(query));
        assert!(filter.matches(&"banana".to_string(), "nan"));
        assert!(!filter.matches(&"apple".to_string(), "nan"));
    }

    #[test]
    fn test_equality_fns() {
        let equality = EqualityFns::new(
            |a: &(u32, char), b: &(u32, char)| a.0 == b.0,
            |a: &(u32, char), b: &(u32, char)| a.1 == b.1,
        );
        let first: (u32, char) = (1, 'a');
        assert!(equality.same_identity(&first, &(1, 'b')));
        assert!(!equality.same_content(&first, &(1, 'b')));
        assert!(!equality.same_identity(&first, &(2, 'a')));
    }
}
