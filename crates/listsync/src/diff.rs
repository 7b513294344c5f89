//! Structural diff between two versions of the displayed list.
//!
//! [`DiffEngine::calculate`] turns an old and a new sequence into an ordered
//! list of [`EditOp`]s. Applied one after another to the old sequence, the
//! operations yield the new one.
//!
//! The engine only sees items through a [`DiffEquality`] pair:
//!
//! 1. Items are matched by identity along a longest common subsequence
//!    (linear-space Myers), after trimming the common prefix and suffix.
//!    When the policy provides identity hashes, items whose identity only
//!    occurs on one side are left out of the search; lists with no shared
//!    identity are not searched at all.
//! 2. With move detection on, an unmatched new item is paired with the first
//!    unmatched old item of the same identity.
//! 3. Operations are emitted as removals (back to front), then insertions
//!    and moves (front to back), then in-place content changes at their
//!    final positions. Consecutive positions of the same kind are coalesced
//!    into one range.

use std::collections::{HashMap, HashSet};
use std::iter;
use std::sync::Arc;

use crate::notify::NotificationSink;
use crate::policy::{DiffEquality, SharedEquality};

/// One primitive edit of the displayed list.
///
/// Positions refer to the list as left by the preceding operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditOp {
    /// `count` new items inserted at `position`.
    Inserted { position: usize, count: usize },
    /// `count` items removed from `position`.
    Removed { position: usize, count: usize },
    /// The block `[from, from + count)` taken out and reinserted so that it
    /// starts at `to`.
    Moved { from: usize, to: usize, count: usize },
    /// `count` items at `position` kept their identity but changed content.
    Changed { position: usize, count: usize },
}

impl EditOp {
    /// Forward this operation to `sink`.
    pub fn dispatch<S: NotificationSink + ?Sized>(&self, sink: &S) {
        match *self {
            EditOp::Inserted { position, count } => sink.range_inserted(position, count),
            EditOp::Removed { position, count } => sink.range_removed(position, count),
            EditOp::Moved { from, to, count } => sink.range_moved(from, to, count),
            EditOp::Changed { position, count } => sink.range_changed(position, count),
        }
    }
}

/// The ordered operations transforming one sequence into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    ops: Vec<EditOp>,
}

impl DiffResult {
    /// The operations, in application order.
    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    /// Consume the result, returning the operations.
    pub fn into_ops(self) -> Vec<EditOp> {
        self.ops
    }

    /// Returns `true` if the two sequences were structurally identical.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Forward every operation, in order, to `sink`.
    pub fn dispatch<S: NotificationSink + ?Sized>(&self, sink: &S) {
        for op in &self.ops {
            op.dispatch(sink);
        }
    }

    /// Apply the operations to `old` and return the resulting list.
    ///
    /// Items that survive untouched are taken from `old`; inserted and
    /// changed items are taken from `new` at their final position. For the
    /// result of `calculate(old, new)` this reproduces `new`.
    ///
    /// # Panics
    ///
    /// Panics if an operation addresses a position outside the list, which
    /// only happens when the result was computed for a different `old`.
    pub fn replay<T: Clone>(&self, old: &[T], new: &[T]) -> Vec<T> {
        let mut slots: Vec<Slot> = (0..old.len()).map(Slot::Old).collect();
        for op in &self.ops {
            match *op {
                EditOp::Inserted { position, count } => {
                    slots.splice(position..position, iter::repeat_n(Slot::Fresh, count));
                }
                EditOp::Removed { position, count } => {
                    slots.drain(position..position + count);
                }
                EditOp::Moved { from, to, count } => {
                    let block: Vec<Slot> = slots.drain(from..from + count).collect();
                    slots.splice(to..to, block);
                }
                EditOp::Changed { position, count } => {
                    for slot in &mut slots[position..position + count] {
                        *slot = Slot::Fresh;
                    }
                }
            }
        }

        slots
            .iter()
            .enumerate()
            .filter_map(|(position, slot)| match *slot {
                Slot::Old(index) => old.get(index).cloned(),
                Slot::Fresh => new.get(position).cloned(),
            })
            .collect()
    }
}

/// Where an item of the working list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Old(usize),
    Fresh,
}

/// Computes [`DiffResult`]s using a caller-supplied equality pair.
pub struct DiffEngine<T> {
    equality: SharedEquality<T>,
    detect_moves: bool,
}

impl<T> Clone for DiffEngine<T> {
    fn clone(&self) -> Self {
        Self {
            equality: self.equality.clone(),
            detect_moves: self.detect_moves,
        }
    }
}

impl<T> DiffEngine<T> {
    /// Create an engine with move detection enabled.
    pub fn new(equality: SharedEquality<T>) -> Self {
        Self {
            equality,
            detect_moves: true,
        }
    }

    /// Create an engine from any equality pair.
    pub fn with_equality<E>(equality: E) -> Self
    where
        E: DiffEquality<T> + 'static,
    {
        Self::new(Arc::new(equality))
    }

    /// Enable or disable move detection.
    ///
    /// Without it, an item that changed position is reported as a removal
    /// and an insertion.
    pub fn detect_moves(mut self, enabled: bool) -> Self {
        self.detect_moves = enabled;
        self
    }

    /// Returns `true` if move detection is enabled.
    pub fn detects_moves(&self) -> bool {
        self.detect_moves
    }

    /// Compute the operations transforming `old` into `new`.
    pub fn calculate(&self, old: &[T], new: &[T]) -> DiffResult {
        let same = |a: &T, b: &T| self.equality.same_identity(a, b);
        let (n, m) = (old.len(), new.len());

        let mut old_to_new: Vec<Option<usize>> = vec![None; n];
        let mut new_to_old: Vec<Option<usize>> = vec![None; m];

        let mut prefix = 0;
        while prefix < n && prefix < m && same(&old[prefix], &new[prefix]) {
            old_to_new[prefix] = Some(prefix);
            new_to_old[prefix] = Some(prefix);
            prefix += 1;
        }
        let mut suffix = 0;
        while suffix < n - prefix
            && suffix < m - prefix
            && same(&old[n - 1 - suffix], &new[m - 1 - suffix])
        {
            old_to_new[n - 1 - suffix] = Some(m - 1 - suffix);
            new_to_old[m - 1 - suffix] = Some(n - 1 - suffix);
            suffix += 1;
        }

        let old_mid = prefix..n - suffix;
        let new_mid = prefix..m - suffix;
        if !old_mid.is_empty() && !new_mid.is_empty() && !self.equality.never_same() {
            let hashes = self.identity_hashes(&old[old_mid.clone()], &new[new_mid.clone()]);
            let (old_keep, new_keep) = match &hashes {
                Some(hashes) => hashes.shared(prefix),
                None => (old_mid.clone().collect(), new_mid.clone().collect()),
            };
            for (x, y) in common_subsequence(&old_keep, &new_keep, |&i, &j| same(&old[i], &new[j])) {
                old_to_new[old_keep[x]] = Some(new_keep[y]);
                new_to_old[new_keep[y]] = Some(old_keep[x]);
            }

            if self.detect_moves {
                let unmatched: Vec<usize> = old_mid.filter(|&i| old_to_new[i].is_none()).collect();
                let mut candidates = Candidates::new(unmatched, hashes.as_ref(), prefix);
                for j in new_mid {
                    if new_to_old[j].is_some() {
                        continue;
                    }
                    if let Some(i) = candidates.take(j - prefix, |i| same(&old[i], &new[j])) {
                        old_to_new[i] = Some(j);
                        new_to_old[j] = Some(i);
                    }
                }
            }
        }

        let mut ops = Vec::new();
        let mut current: Vec<Slot> = (0..n).map(Slot::Old).collect();

        let mut i = n;
        while i > 0 {
            if old_to_new[i - 1].is_some() {
                i -= 1;
                continue;
            }
            let end = i;
            while i > 0 && old_to_new[i - 1].is_none() {
                i -= 1;
            }
            current.drain(i..end);
            ops.push(EditOp::Removed {
                position: i,
                count: end - i,
            });
        }

        let mut j = 0;
        while j < m {
            let Some(o) = new_to_old[j] else {
                let start = j;
                while j < m && new_to_old[j].is_none() {
                    j += 1;
                }
                current.splice(start..start, iter::repeat_n(Slot::Fresh, j - start));
                ops.push(EditOp::Inserted {
                    position: start,
                    count: j - start,
                });
                continue;
            };

            // Everything before `j` is in place, so the item sits at or after it.
            let Some(from) = current[j..]
                .iter()
                .position(|slot| *slot == Slot::Old(o))
                .map(|offset| offset + j)
            else {
                debug_assert!(false, "matched item missing from working list");
                j += 1;
                continue;
            };
            if from == j {
                j += 1;
                continue;
            }

            let mut count = 1;
            while j + count < m && from + count < current.len() {
                match new_to_old[j + count] {
                    Some(next) if current[from + count] == Slot::Old(next) => count += 1,
                    _ => break,
                }
            }
            let block: Vec<Slot> = current.drain(from..from + count).collect();
            current.splice(j..j, block);
            ops.push(EditOp::Moved { from, to: j, count });
            j += count;
        }

        let changed = |j: usize| {
            new_to_old[j].is_some_and(|o| !self.equality.same_content(&old[o], &new[j]))
        };
        let mut j = 0;
        while j < m {
            if !changed(j) {
                j += 1;
                continue;
            }
            let start = j;
            while j < m && changed(j) {
                j += 1;
            }
            ops.push(EditOp::Changed {
                position: start,
                count: j - start,
            });
        }

        DiffResult { ops }
    }

    fn identity_hashes(&self, old: &[T], new: &[T]) -> Option<IdentityHashes> {
        let hash = |items: &[T]| -> Option<Vec<u64>> {
            items
                .iter()
                .map(|item| self.equality.identity_hash(item))
                .collect()
        };
        Some(IdentityHashes {
            old: hash(old)?,
            new: hash(new)?,
        })
    }
}

impl<T> std::fmt::Debug for DiffEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffEngine")
            .field("detect_moves", &self.detect_moves)
            .finish_non_exhaustive()
    }
}

/// Identity hashes of the untrimmed middle of both lists.
struct IdentityHashes {
    old: Vec<u64>,
    new: Vec<u64>,
}

impl IdentityHashes {
    /// Absolute indices of the items whose identity hash occurs on the other
    /// side. Nothing else can be part of a common subsequence.
    fn shared(&self, offset: usize) -> (Vec<usize>, Vec<usize>) {
        let in_old: HashSet<u64> = self.old.iter().copied().collect();
        let in_new: HashSet<u64> = self.new.iter().copied().collect();
        let keep = |hashes: &[u64], other: &HashSet<u64>| -> Vec<usize> {
            hashes
                .iter()
                .enumerate()
                .filter(|&(_, hash)| other.contains(hash))
                .map(|(index, _)| index + offset)
                .collect()
        };
        (keep(&self.old, &in_new), keep(&self.new, &in_old))
    }
}

/// Unmatched old items that a new item may be paired with as a move.
///
/// Candidates are handed out in ascending old position per identity.
enum Candidates {
    Scan(Vec<usize>),
    Buckets {
        buckets: HashMap<u64, Vec<usize>>,
        new_hashes: Vec<u64>,
    },
}

impl Candidates {
    fn new(unmatched: Vec<usize>, hashes: Option<&IdentityHashes>, offset: usize) -> Self {
        let Some(hashes) = hashes else {
            return Candidates::Scan(unmatched);
        };
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
        for i in unmatched {
            buckets.entry(hashes.old[i - offset]).or_default().push(i);
        }
        Candidates::Buckets {
            buckets,
            new_hashes: hashes.new.clone(),
        }
    }

    /// Remove and return the first candidate accepted by `same`. `slot` is
    /// the new item's index into the middle range.
    fn take(&mut self, slot: usize, same: impl Fn(usize) -> bool) -> Option<usize> {
        let pool = match self {
            Candidates::Scan(pool) => pool,
            Candidates::Buckets {
                buckets,
                new_hashes,
            } => buckets.get_mut(&new_hashes[slot])?,
        };
        let k = pool.iter().position(|&i| same(i))?;
        Some(pool.remove(k))
    }
}

/// Index pairs `(i, j)` of a longest common subsequence of `a` and `b`,
/// ascending in both.
///
/// Linear-space Myers: each range is trimmed of its common prefix and
/// suffix, then split at the middle of an optimal edit path and both halves
/// are searched again. Memory stays proportional to `a.len() + b.len()`.
fn common_subsequence<T>(a: &[T], b: &[T], same: impl Fn(&T, &T) -> bool) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut pending = vec![(0..a.len(), 0..b.len())];

    while let Some((mut xs, mut ys)) = pending.pop() {
        while !xs.is_empty() && !ys.is_empty() && same(&a[xs.start], &b[ys.start]) {
            pairs.push((xs.start, ys.start));
            xs.start += 1;
            ys.start += 1;
        }
        while !xs.is_empty() && !ys.is_empty() && same(&a[xs.end - 1], &b[ys.end - 1]) {
            pairs.push((xs.end - 1, ys.end - 1));
            xs.end -= 1;
            ys.end -= 1;
        }
        if xs.is_empty() || ys.is_empty() {
            continue;
        }

        let Some((x, y)) = middle_split(&a[xs.clone()], &b[ys.clone()], &same) else {
            continue;
        };
        // A split on a corner would not shrink the problem.
        if (x == 0 && y == 0) || (x == xs.len() && y == ys.len()) {
            continue;
        }
        pending.push((xs.start + x..xs.end, ys.start + y..ys.end));
        pending.push((xs.start..xs.start + x, ys.start..ys.start + y));
    }

    pairs.sort_unstable();
    pairs
}

/// A point on an optimal edit path from `(0, 0)` to `(a.len(), b.len())`
/// about halfway through its edits.
///
/// Runs the forward and reverse searches towards each other until their
/// furthest-reaching paths overlap. Both `a` and `b` must be non-empty and
/// differ in their first and last items.
fn middle_split<T>(a: &[T], b: &[T], same: &impl Fn(&T, &T) -> bool) -> Option<(usize, usize)> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max_d = (n + m + 1) / 2;
    let offset = max_d;
    let len = 2 * max_d + 2;
    let delta = n - m;
    let odd = delta % 2 != 0;

    // forward[k] is the furthest x reached on diagonal k; reverse[k] the
    // furthest distance travelled back from the end on reverse diagonal k.
    let mut forward = vec![-1isize; len as usize];
    let mut reverse = vec![-1isize; len as usize];
    forward[(offset + 1) as usize] = 0;
    reverse[(offset + 1) as usize] = 0;

    // Diagonals that ran off the grid are skipped from then on.
    let (mut f_start, mut f_end, mut r_start, mut r_end) = (0, 0, 0, 0);

    for d in 0..max_d {
        let mut k = -d + f_start;
        while k <= d - f_end {
            let at = (offset + k) as usize;
            let mut x = if k == -d || (k != d && forward[at - 1] < forward[at + 1]) {
                forward[at + 1]
            } else {
                forward[at - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && same(&a[x as usize], &b[y as usize]) {
                x += 1;
                y += 1;
            }
            forward[at] = x;
            if x > n {
                f_end += 2;
            } else if y > m {
                f_start += 2;
            } else if odd {
                let r_at = offset + delta - k;
                if (0..len).contains(&r_at) && reverse[r_at as usize] != -1 {
                    let x_back = n - reverse[r_at as usize];
                    if x >= x_back {
                        return Some((x as usize, y as usize));
                    }
                }
            }
            k += 2;
        }

        let mut k = -d + r_start;
        while k <= d - r_end {
            let at = (offset + k) as usize;
            let mut x = if k == -d || (k != d && reverse[at - 1] < reverse[at + 1]) {
                reverse[at + 1]
            } else {
                reverse[at - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && same(&a[(n - x - 1) as usize], &b[(m - y - 1) as usize]) {
                x += 1;
                y += 1;
            }
            reverse[at] = x;
            if x > n {
                r_end += 2;
            } else if y > m {
                r_start += 2;
            } else if !odd {
                let f_at = offset + delta - k;
                if (0..len).contains(&f_at) && forward[f_at as usize] != -1 {
                    let x_front = forward[f_at as usize];
                    let y_front = offset + x_front - f_at;
                    if x_front >= n - x {
                        return Some((x_front as usize, y_front as usize));
                    }
                }
            }
            k += 2;
        }
    }
    None
}
