//! Editor session state and external-event gates.
//!
//! Addons can be restricted to the full editor (`editor_only` manifests) and
//! element waits can be gated on host state. Rather than exposing the host's
//! whole state store, the session surface is a current [`EditorMode`] plus a
//! typed mode-change subscription, and [`WaitGate`] is the one-shot signal a
//! wait condition can hang on.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Identifier of a registered session observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionObserverId(u64);

/// Presentation mode of the host editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EditorMode {
    /// The full editing surface.
    #[default]
    Editor,
    /// Player-only project page.
    Player,
    /// Fullscreen stage.
    Fullscreen,
    /// Embedded player.
    Embed,
}

impl EditorMode {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Editor => "editor",
            Self::Player => "player",
            Self::Fullscreen => "fullscreen",
            Self::Embed => "embed",
        }
    }
}

impl std::fmt::Display for EditorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type ModeHandler = Rc<RefCell<dyn FnMut(EditorMode)>>;

/// Current editor mode with change subscriptions.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use quilt_host::session::{EditorMode, EditorSession};
///
/// let session = EditorSession::new(EditorMode::Player);
/// let entered = Rc::new(Cell::new(false));
/// let flag = Rc::clone(&entered);
/// session.on_mode_change(move |mode| {
///     if mode == EditorMode::Editor {
///         flag.set(true);
///     }
/// });
///
/// session.set_mode(EditorMode::Editor);
/// assert!(entered.get());
/// ```
#[derive(Default)]
pub struct EditorSession {
    mode: Cell<EditorMode>,
    next_id: Cell<u64>,
    observers: RefCell<Vec<(SessionObserverId, ModeHandler)>>,
}

impl EditorSession {
    /// Creates a session in the given mode.
    #[must_use]
    pub fn new(mode: EditorMode) -> Self {
        let session = Self::default();
        session.mode.set(mode);
        session
    }

    /// Returns the current mode.
    #[must_use]
    pub fn mode(&self) -> EditorMode {
        self.mode.get()
    }

    /// Returns `true` when the full editor is active.
    #[must_use]
    pub fn is_editor(&self) -> bool {
        self.mode.get() == EditorMode::Editor
    }

    /// Switches the mode, notifying observers if it changed.
    pub fn set_mode(&self, mode: EditorMode) {
        if self.mode.get() == mode {
            return;
        }
        self.mode.set(mode);
        // Snapshot so observers may register or unregister during dispatch.
        let observers: Vec<ModeHandler> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for observer in observers {
            (observer.borrow_mut())(mode);
        }
    }

    /// Registers a mode-change observer.
    pub fn on_mode_change(&self, handler: impl FnMut(EditorMode) + 'static) -> SessionObserverId {
        let id = SessionObserverId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.observers
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(handler))));
        id
    }

    /// Removes a previously registered observer. Returns `false` if it was
    /// already removed.
    pub fn remove_observer(&self, id: SessionObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }
}

/// One-shot gate for externally triggered wait conditions.
///
/// A wait that depends on a host event starts with a closed gate; whatever
/// observes the event opens it, and the wait condition passes from then on.
#[derive(Debug, Default)]
pub struct WaitGate {
    open: Cell<bool>,
}

impl WaitGate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an already open gate.
    #[must_use]
    pub fn opened() -> Self {
        let gate = Self::new();
        gate.open();
        gate
    }

    /// Opens the gate. Opening twice is harmless.
    pub fn open(&self) {
        self.open.set(true);
    }

    /// Returns `true` once the gate has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.get()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[test]
    fn set_mode_notifies_on_change_only() {
        let session = EditorSession::new(EditorMode::Player);
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        session.on_mode_change(move |mode| sink.borrow_mut().push(mode));

        session.set_mode(EditorMode::Player);
        session.set_mode(EditorMode::Editor);
        session.set_mode(EditorMode::Editor);
        assert_eq!(seen.borrow().as_slice(), [EditorMode::Editor]);
    }

    #[test]
    fn removed_observer_stops_receiving() {
        let session = EditorSession::new(EditorMode::Player);
        let count = Rc::new(std::cell::Cell::new(0));
        let counter = Rc::clone(&count);
        let id = session.on_mode_change(move |_| counter.set(counter.get() + 1));

        session.set_mode(EditorMode::Editor);
        assert!(session.remove_observer(id));
        assert!(!session.remove_observer(id));
        session.set_mode(EditorMode::Fullscreen);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn wait_gate_opens_once() {
        let gate = WaitGate::new();
        assert!(!gate.is_open());
        gate.open();
        gate.open();
        assert!(gate.is_open());
        assert!(WaitGate::opened().is_open());
    }
}
