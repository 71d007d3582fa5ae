//! Unit tests for the mutation watcher.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rstest::{fixture, rstest};

use quilt_host::dom::Document;

use super::*;

struct Harness {
    document: Rc<RefCell<Document>>,
    watcher: MutationWatcher,
}

impl Harness {
    fn counting_callback(&self) -> (CallbackId, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0_u32));
        let sink = Rc::clone(&count);
        let id = self.watcher.add_callback(move || sink.set(sink.get() + 1));
        (id, count)
    }

    fn mutate(&self) {
        append_div(&self.document);
    }
}

fn append_div(document: &RefCell<Document>) {
    let mut document = document.borrow_mut();
    let body = document.body();
    let div = document.create_element("div");
    document.append_child(body, div);
}

#[fixture]
fn harness() -> Harness {
    let document = Rc::new(RefCell::new(Document::new()));
    let watcher = MutationWatcher::new(Rc::clone(&document));
    Harness { document, watcher }
}

#[rstest]
fn flush_without_mutation_is_a_no_op(harness: Harness) {
    let (_, count) = harness.counting_callback();
    assert!(!harness.watcher.flush());
    assert_eq!(count.get(), 0);
}

#[rstest]
fn one_flush_covers_a_burst_of_mutations(harness: Harness) {
    let (_, count) = harness.counting_callback();
    harness.mutate();
    harness.mutate();
    harness.mutate();
    assert!(harness.watcher.flush());
    assert_eq!(count.get(), 1);
    assert!(!harness.watcher.flush());
    assert_eq!(count.get(), 1);
}

#[rstest]
fn mutations_before_first_callback_are_not_replayed(harness: Harness) {
    harness.mutate();
    let (_, count) = harness.counting_callback();
    assert!(!harness.watcher.flush());
    assert_eq!(count.get(), 0);
    harness.mutate();
    assert!(harness.watcher.flush());
    assert_eq!(count.get(), 1);
}

#[rstest]
fn attribute_changes_do_not_count_as_mutations(harness: Harness) {
    let (_, count) = harness.counting_callback();
    {
        let mut document = harness.document.borrow_mut();
        let body = document.body();
        document.set_attribute(body, "data-mode", "editor");
    }
    assert!(!harness.watcher.flush());
    assert_eq!(count.get(), 0);
}

#[rstest]
fn removed_callback_stops_running(harness: Harness) {
    let (id, count) = harness.counting_callback();
    harness.mutate();
    harness.watcher.flush();
    assert!(harness.watcher.remove_callback(id));
    assert!(!harness.watcher.remove_callback(id));
    harness.mutate();
    harness.watcher.flush();
    assert_eq!(count.get(), 1);
    assert!(harness.watcher.is_empty());
}

#[rstest]
fn callback_may_remove_itself_during_dispatch(harness: Harness) {
    let Harness { document, watcher } = harness;
    let watcher = Rc::new(watcher);
    let slot: Rc<Cell<Option<CallbackId>>> = Rc::new(Cell::new(None));
    let count = Rc::new(Cell::new(0_u32));
    let inner_watcher = Rc::clone(&watcher);
    let inner_slot = Rc::clone(&slot);
    let sink = Rc::clone(&count);
    let id = watcher.add_callback(move || {
        sink.set(sink.get() + 1);
        if let Some(id) = inner_slot.take() {
            inner_watcher.remove_callback(id);
        }
    });
    slot.set(Some(id));
    append_div(&document);
    watcher.flush();
    append_div(&document);
    watcher.flush();
    assert_eq!(count.get(), 1);
}

#[rstest]
fn mutation_from_a_callback_is_seen_by_the_next_flush(harness: Harness) {
    let Harness { document, watcher } = harness;
    let watcher = Rc::new(watcher);
    let inner_document = Rc::clone(&document);
    let fired = Rc::new(Cell::new(0_u32));
    let sink = Rc::clone(&fired);
    watcher.add_callback(move || {
        if sink.get() == 0 {
            append_div(&inner_document);
        }
        sink.set(sink.get() + 1);
    });
    append_div(&document);
    assert!(watcher.flush());
    // The callback's own mutation lands in the following flush.
    assert!(watcher.flush());
    assert_eq!(fired.get(), 2);
    assert!(!watcher.flush());
}
