//! Integration tests for selection tracking through the adapter.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use listsync::policy::ByKey;
use listsync::{DiffListAdapter, Error, SignalSink, ToggleOutcome};
use listsync_core::{ApplyLoop, Dispatcher, DispatcherConfig};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Fixture {
    dispatcher: Dispatcher,
    apply_loop: ApplyLoop,
    adapter: DiffListAdapter<String>,
    changed: Arc<Mutex<Vec<usize>>>,
}

impl Fixture {
    fn new(max_selections: usize, items: &[&str]) -> Self {
        init_tracing();
        let (dispatcher, apply_loop) = Dispatcher::new(DispatcherConfig::default()).unwrap();
        let sink = Arc::new(SignalSink::new());
        let changed = Arc::new(Mutex::new(Vec::new()));
        let c = changed.clone();
        sink.item_changed.connect(move |&position| c.lock().push(position));

        let adapter = DiffListAdapter::builder(dispatcher.clone())
            .ordering(|a: &String, b: &String| a.cmp(b))
            .filter(|item: &String, query: &str| item.contains(query))
            .equality(ByKey::new(|item: &String| item.clone()))
            .max_selections(max_selections)
            .sink(sink)
            .build();

        let fixture = Self {
            dispatcher,
            apply_loop,
            adapter,
            changed,
        };
        fixture.adapter.set_items(strings(items));
        fixture.settle();
        fixture
    }

    fn settle(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.adapter.is_idle() && Instant::now() < deadline {
            self.apply_loop.process_timeout(Duration::from_millis(10));
        }
        assert!(self.adapter.is_idle(), "pipeline did not drain");
    }

    fn take_changed(&self) -> Vec<usize> {
        std::mem::take(&mut *self.changed.lock())
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_toggle_with_single_slot() {
    let f = Fixture::new(1, &["A", "B"]);

    assert_eq!(f.adapter.toggle(0), Ok(Some(ToggleOutcome::Selected)));
    assert_eq!(f.adapter.selected_items(), set(&["A"]));

    assert_eq!(f.adapter.toggle(1), Ok(Some(ToggleOutcome::AtCapacity)));
    assert_eq!(f.adapter.selected_items(), set(&["A"]));

    assert_eq!(f.adapter.toggle(0), Ok(Some(ToggleOutcome::Deselected)));
    assert!(f.adapter.selected_items().is_empty());

    assert_eq!(f.take_changed(), vec![0, 0]);
}

#[test]
fn test_toggle_notifies_every_occurrence() {
    let f = Fixture::new(2, &["B", "A", "A"]);
    assert_eq!(*f.adapter.items(), strings(&["A", "A", "B"]));

    assert_eq!(f.adapter.toggle(1), Ok(Some(ToggleOutcome::Selected)));
    assert_eq!(f.take_changed(), vec![0, 1]);

    assert_eq!(f.adapter.toggle(0), Ok(Some(ToggleOutcome::Deselected)));
    assert_eq!(f.take_changed(), vec![0, 1]);
}

#[test]
fn test_replacing_selection_notifies_symmetric_difference() {
    let f = Fixture::new(1, &["W", "X", "Y"]);

    f.adapter.set_selected_items(strings(&["X"])).unwrap();
    assert_eq!(f.take_changed(), vec![1]);

    f.adapter.set_selected_items(strings(&["Y"])).unwrap();
    let mut changed = f.take_changed();
    changed.sort_unstable();
    assert_eq!(changed, vec![1, 2]);
    assert!(!f.adapter.is_selected(&"X".to_string()));
    assert!(f.adapter.is_selected(&"Y".to_string()));
}

#[test]
fn test_same_selection_twice_is_silent() {
    let f = Fixture::new(2, &["A", "B", "C"]);

    f.adapter.set_selected_items(strings(&["A", "C"])).unwrap();
    assert_eq!(f.take_changed(), vec![0, 2]);

    f.adapter.set_selected_items(strings(&["C", "A"])).unwrap();
    assert!(f.take_changed().is_empty());
}

#[test]
fn test_oversized_selection_leaves_state_unchanged() {
    let f = Fixture::new(2, &["A", "B", "C"]);
    f.adapter.set_selected_items(strings(&["B"])).unwrap();
    f.take_changed();

    let result = f.adapter.set_selected_items(strings(&["A", "B", "C"]));
    assert_eq!(
        result,
        Err(Error::InvalidSelection {
            requested: 3,
            max: 2
        })
    );
    assert_eq!(f.adapter.selected_items(), set(&["B"]));
    assert!(f.take_changed().is_empty());
}

#[test]
fn test_duplicates_count_once() {
    let f = Fixture::new(1, &["A", "B"]);
    assert!(f.adapter.set_selected_items(strings(&["A", "A"])).is_ok());
    assert_eq!(f.adapter.selected_items(), set(&["A"]));
}

#[test]
fn test_toggle_never_exceeds_capacity() {
    let f = Fixture::new(3, &["a", "b", "c", "d", "e", "f", "g"]);

    let mut state: u32 = 7;
    for _ in 0..200 {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let position = (state >> 16) as usize % 7;
        f.adapter.toggle(position).unwrap();
        assert!(f.adapter.selected_items().len() <= 3);
    }
}

#[test]
fn test_hidden_selection_is_kept_and_silent() {
    let f = Fixture::new(2, &["apple", "banana", "cherry"]);
    f.adapter.set_selected_items(strings(&["banana"])).unwrap();
    f.take_changed();

    f.adapter.filter(Some("an"));
    f.settle();
    assert_eq!(*f.adapter.items(), strings(&["banana"]));

    f.adapter.filter(Some("ch"));
    f.settle();
    assert!(f.adapter.is_selected(&"banana".to_string()));

    // banana is not displayed: deselecting it produces no notification.
    f.adapter.set_selected_items(Vec::new()).unwrap();
    assert!(f.take_changed().is_empty());
    assert!(f.adapter.selected_items().is_empty());
}

#[test]
fn test_notifications_follow_the_moving_list() {
    let f = Fixture::new(1, &["b", "c"]);
    f.adapter.set_selected_items(strings(&["c"])).unwrap();
    assert_eq!(f.take_changed(), vec![1]);

    f.adapter.set_items(strings(&["a", "aa", "b", "c"]));
    f.settle();

    f.adapter.clear_selection().unwrap();
    assert_eq!(f.take_changed(), vec![3]);
}

#[test]
fn test_toggle_from_other_thread_is_posted() {
    let f = Fixture::new(1, &["A", "B"]);

    let adapter = f.adapter.clone();
    let outcome = thread::spawn(move || adapter.toggle(1)).join().unwrap();
    assert_eq!(outcome, Ok(None));
    assert!(f.adapter.selected_items().is_empty());

    f.apply_loop.process_pending();
    assert_eq!(f.adapter.selected_items(), set(&["B"]));
    assert_eq!(f.take_changed(), vec![1]);
}

#[test]
fn test_selection_from_many_threads_with_spawned_apply() {
    init_tracing();
    let dispatcher = Dispatcher::spawn(DispatcherConfig::default()).unwrap();
    let adapter: DiffListAdapter<u32> = DiffListAdapter::builder(dispatcher.clone())
        .ordering(|a: &u32, b: &u32| a.cmp(b))
        .equality(ByKey::new(|n: &u32| *n))
        .max_selections(2)
        .build();

    adapter.set_items(0..10u32);
    assert!(adapter.wait_until_idle(Duration::from_secs(5)));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let adapter = adapter.clone();
            thread::spawn(move || {
                for i in 0..50usize {
                    adapter.toggle((t * 3 + i) % 10).unwrap();
                    assert!(adapter.selected_items().len() <= 2);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    dispatcher.shutdown();
    assert!(adapter.selected_items().len() <= 2);
    assert!(matches!(adapter.toggle(0), Err(Error::Dispatch(_))));
}
