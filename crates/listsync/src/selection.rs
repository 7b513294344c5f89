//! Bounded selection over the displayed list.
//!
//! [`SelectionTracker`] holds the selected items and works out which
//! displayed positions must be redrawn when the selection changes. Items stay
//! selected while they are filtered out; they just produce no notification
//! until they are displayed again.
//!
//! The tracker is plain state. The adapter keeps it behind a lock and only
//! mutates it on the apply context, against the displayed list as currently
//! applied.

use std::collections::HashSet;
use std::hash::Hash;

use crate::error::{Error, Result};

/// What a [`SelectionTracker::toggle`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The item was added to the selection.
    Selected,
    /// The item was removed from the selection.
    Deselected,
    /// The selection is full; nothing changed.
    AtCapacity,
}

impl ToggleOutcome {
    /// Returns `true` if the selection changed.
    pub fn changed(self) -> bool {
        !matches!(self, ToggleOutcome::AtCapacity)
    }
}

/// The set of selected items, bounded by `max_selections`.
#[derive(Debug, Clone)]
pub struct SelectionTracker<T> {
    selected: HashSet<T>,
    max_selections: usize,
}

impl<T: Eq + Hash + Clone> SelectionTracker<T> {
    /// Create an empty selection holding at most `max_selections` items.
    pub fn new(max_selections: usize) -> Self {
        Self {
            selected: HashSet::new(),
            max_selections,
        }
    }

    /// The configured maximum.
    pub fn max_selections(&self) -> usize {
        self.max_selections
    }

    /// Snapshot of the selected items.
    pub fn selected_items(&self) -> HashSet<T> {
        self.selected.clone()
    }

    /// Returns `true` if `item` is selected.
    pub fn is_selected(&self, item: &T) -> bool {
        self.selected.contains(item)
    }

    /// Number of selected items.
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Returns `true` if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Check that a selection of `requested` items fits.
    pub fn check_capacity(&self, requested: usize) -> Result<()> {
        if requested > self.max_selections {
            return Err(Error::InvalidSelection {
                requested,
                max: self.max_selections,
            });
        }
        Ok(())
    }

    /// Replace the selection.
    ///
    /// Returns, in ascending order, every position of `displayed` holding an
    /// item whose selection state changed. Fails with
    /// [`Error::InvalidSelection`] if `selection` is too large, leaving the
    /// current selection untouched.
    pub fn set_selected_items(
        &mut self,
        selection: HashSet<T>,
        displayed: &[T],
    ) -> Result<Vec<usize>> {
        self.check_capacity(selection.len())?;

        let changed: HashSet<&T> = self.selected.symmetric_difference(&selection).collect();
        let positions = positions_of(displayed, |item| changed.contains(item));
        tracing::debug!(
            target: "listsync::selection",
            selected = selection.len(),
            changed = changed.len(),
            notified = positions.len(),
            "selection replaced"
        );

        drop(changed);
        self.selected = selection;
        Ok(positions)
    }

    /// Toggle the item displayed at `position`.
    ///
    /// A selected item is deselected. An unselected item is selected unless
    /// the selection is full, in which case nothing changes.
    pub fn toggle(&mut self, position: usize, displayed: &[T]) -> Result<ToggleOutcome> {
        let item = displayed.get(position).ok_or(Error::OutOfRange {
            position,
            count: displayed.len(),
        })?;

        let outcome = if self.selected.remove(item) {
            ToggleOutcome::Deselected
        } else if self.selected.len() < self.max_selections {
            self.selected.insert(item.clone());
            ToggleOutcome::Selected
        } else {
            ToggleOutcome::AtCapacity
        };

        tracing::trace!(target: "listsync::selection", position, ?outcome, "toggled");
        Ok(outcome)
    }

    /// Toggle like [`toggle`](Self::toggle) and also return, in ascending
    /// order, every position of `displayed` holding the toggled item when the
    /// selection changed.
    pub fn toggle_at(
        &mut self,
        position: usize,
        displayed: &[T],
    ) -> Result<(ToggleOutcome, Vec<usize>)> {
        let outcome = self.toggle(position, displayed)?;
        if !outcome.changed() {
            return Ok((outcome, Vec::new()));
        }
        let item = &displayed[position];
        Ok((outcome, positions_of(displayed, |other| other == item)))
    }

    /// Deselect everything, returning the displayed positions to redraw.
    pub fn clear(&mut self, displayed: &[T]) -> Vec<usize> {
        let positions = positions_of(displayed, |item| self.selected.contains(item));
        self.selected.clear();
        positions
    }
}

fn positions_of<T>(displayed: &[T], mut wanted: impl FnMut(&T) -> bool) -> Vec<usize> {
    displayed
        .iter()
        .enumerate()
        .filter(|(_, item)| wanted(item))
        .map(|(position, _)| position)
        .collect()
}
