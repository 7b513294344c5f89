//! Notification sink for displayed-list changes.
//!
//! The adapter reports every change to the displayed list through a
//! [`NotificationSink`]. Calls always arrive on the apply context, in the
//! order the changes were applied, so a rendering surface can mirror them
//! without locking.
//!
//! Range notifications come from the diff pipeline and describe the list
//! step by step: each position refers to the list as left by the previous
//! call. [`NotificationSink::item_changed`] is independent of the pipeline
//! and reports selection changes.

use listsync_core::Signal;

/// Receiver of displayed-list change notifications.
pub trait NotificationSink: Send + Sync {
    /// `count` items were inserted starting at `position`.
    fn range_inserted(&self, position: usize, count: usize);

    /// `count` items starting at `position` were removed.
    fn range_removed(&self, position: usize, count: usize);

    /// The `count` items starting at `from` were taken out and reinserted so
    /// that the block now starts at `to`.
    fn range_moved(&self, from: usize, to: usize, count: usize);

    /// `count` items starting at `position` changed content in place.
    fn range_changed(&self, position: usize, count: usize);

    /// The item at `position` must be redrawn, for example because its
    /// selection state changed.
    fn item_changed(&self, position: usize);
}

/// A sink that exposes each notification as a [`Signal`].
///
/// Connect slots to the signals of interest:
///
/// ```
/// use listsync::notify::{NotificationSink, SignalSink};
///
/// let sink = SignalSink::new();
/// sink.rows_removed.connect(|&(position, count)| {
///     println!("{count} rows removed at {position}");
/// });
/// sink.range_removed(0, 2);
/// ```
#[derive(Debug, Default)]
pub struct SignalSink {
    /// Args: (position, count)
    pub rows_inserted: Signal<(usize, usize)>,
    /// Args: (position, count)
    pub rows_removed: Signal<(usize, usize)>,
    /// Args: (from, to, count)
    pub rows_moved: Signal<(usize, usize, usize)>,
    /// Args: (position, count)
    pub rows_changed: Signal<(usize, usize)>,
    /// Args: position
    pub item_changed: Signal<usize>,
}

impl SignalSink {
    /// Create a sink with no connected slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block or unblock every signal of this sink.
    pub fn set_blocked(&self, blocked: bool) {
        self.rows_inserted.set_blocked(blocked);
        self.rows_removed.set_blocked(blocked);
        self.rows_moved.set_blocked(blocked);
        self.rows_changed.set_blocked(blocked);
        self.item_changed.set_blocked(blocked);
    }
}

impl NotificationSink for SignalSink {
    fn range_inserted(&self, position: usize, count: usize) {
        self.rows_inserted.emit((position, count));
    }

    fn range_removed(&self, position: usize, count: usize) {
        self.rows_removed.emit((position, count));
    }

    fn range_moved(&self, from: usize, to: usize, count: usize) {
        self.rows_moved.emit((from, to, count));
    }

    fn range_changed(&self, position: usize, count: usize) {
        self.rows_changed.emit((position, count));
    }

    fn item_changed(&self, position: usize) {
        self.item_changed.emit(position);
    }
}

/// A sink that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn range_inserted(&self, _position: usize, _count: usize) {}
    fn range_removed(&self, _position: usize, _count: usize) {}
    fn range_moved(&self, _from: usize, _to: usize, _count: usize) {}
    fn range_changed(&self, _position: usize, _count: usize) {}
    fn item_changed(&self, _position: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_signal_sink_forwards() {
        let sink = SignalSink::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        sink.rows_inserted
            .connect(move |&(p, c)| l.lock().push(format!("insert {p} {c}")));
        let l = log.clone();
        sink.rows_moved
            .connect(move |&(f, t, c)| l.lock().push(format!("move {f} {t} {c}")));
        let l = log.clone();
        sink.item_changed
            .connect(move |&p| l.lock().push(format!("item {p}")));

        sink.range_inserted(0, 2);
        sink.range_moved(3, 1, 1);
        sink.item_changed(4);

        assert_eq!(*log.lock(), vec!["insert 0 2", "move 3 1 1", "item 4"]);
    }

    #[test]
    fn test_signal_sink_blocked() {
        let sink = SignalSink::new();
        let count = Arc::new(Mutex::new(0));

        let c = count.clone();
        sink.rows_removed.connect(move |_| *c.lock() += 1);

        sink.set_blocked(true);
        sink.range_removed(0, 1);
        sink.set_blocked(false);
        sink.range_removed(0, 1);

        assert_eq!(*count.lock(), 1);
    }
}
