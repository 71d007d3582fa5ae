//! Batched observation of document mutations.
//!
//! Addons waiting for interface elements do not poll; they register
//! callbacks here and the watcher replays them whenever the document's
//! structure generation has advanced since the last flush. One flush covers
//! any number of mutations, so a burst of DOM work costs each waiter a
//! single re-check.
//!
//! Observation is lazy: the watcher records a baseline generation when the
//! first callback registers, so mutations that happened before anyone was
//! waiting never trigger a flush.

#[cfg(test)]
mod tests;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use quilt_host::dom::Document;

/// Identifier of a registered mutation callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type MutationCallback = Rc<RefCell<dyn FnMut()>>;

/// Dispatches registered callbacks when the shared document has mutated.
///
/// Callbacks may register or remove callbacks (including themselves) while
/// being dispatched; changes take effect from the next flush.
pub struct MutationWatcher {
    document: Rc<RefCell<Document>>,
    last_seen: Cell<u64>,
    next_id: Cell<u64>,
    callbacks: RefCell<Vec<(CallbackId, MutationCallback)>>,
}

impl MutationWatcher {
    /// Creates a watcher over `document`.
    #[must_use]
    pub fn new(document: Rc<RefCell<Document>>) -> Self {
        Self {
            document,
            last_seen: Cell::new(0),
            next_id: Cell::new(0),
            callbacks: RefCell::new(Vec::new()),
        }
    }

    /// Returns the document this watcher observes.
    #[must_use]
    pub fn document(&self) -> Rc<RefCell<Document>> {
        Rc::clone(&self.document)
    }

    /// Registers a callback to run on future document mutations.
    ///
    /// Registering the first callback snapshots the current generation, so
    /// earlier mutations are not replayed.
    pub fn add_callback(&self, callback: impl FnMut() + 'static) -> CallbackId {
        let mut callbacks = self.callbacks.borrow_mut();
        if callbacks.is_empty() {
            self.last_seen.set(self.document.borrow().generation());
        }
        let id = CallbackId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        callbacks.push((id, Rc::new(RefCell::new(callback))));
        id
    }

    /// Removes a callback. Returns `false` if it was already removed.
    pub fn remove_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.borrow_mut();
        let before = callbacks.len();
        callbacks.retain(|(callback_id, _)| *callback_id != id);
        callbacks.len() != before
    }

    /// Returns the number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Returns `true` when no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    /// Dispatches every callback if the document has mutated since the last
    /// flush. Returns whether callbacks ran.
    ///
    /// The callback list is snapshotted before dispatch, so a callback that
    /// removes itself still finishes its current run and mutations performed
    /// by callbacks are picked up by the next flush rather than looping
    /// inside this one.
    pub fn flush(&self) -> bool {
        let generation = self.document.borrow().generation();
        if generation == self.last_seen.get() {
            return false;
        }
        self.last_seen.set(generation);
        let snapshot: Vec<MutationCallback> = self
            .callbacks
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        if snapshot.is_empty() {
            return false;
        }
        for callback in snapshot {
            (callback.borrow_mut())();
        }
        true
    }
}
