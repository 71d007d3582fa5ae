//! The API surface handed to running userscripts.
//!
//! Userscripts never touch the host directly; everything flows through
//! [`AddonApi`], which scopes each capability to the owning addon: element
//! waits are deduplicated per addon, settings reads are namespaced, message
//! lookups are namespaced, and lifecycle notifications describe this addon
//! only.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use quilt_host::dom::{Document, ElementId, Selector};
use quilt_host::session::WaitGate;

use crate::error::AddonError;
use crate::manifest::{AddonManifest, SettingValue};
use crate::runner::messages::Translator;
use crate::runner::HostContext;
use crate::settings::SettingsStore;
use crate::watcher::CallbackId;

/// Class hiding an element while its addon is dynamically disabled.
pub(crate) fn disabled_class(addon_id: &str) -> String {
    format!("addons-display-none-{addon_id}")
}

type Condition = Rc<dyn Fn() -> bool>;

/// Options for [`Tab::wait_for_element`].
#[derive(Default, Clone)]
pub struct WaitOptions {
    mark_as_seen: bool,
    condition: Option<Condition>,
    gate: Option<Rc<WaitGate>>,
}

impl WaitOptions {
    /// Creates options that match the first element satisfying the
    /// selector, every time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips elements this addon has already been handed, so repeated waits
    /// walk through matches instead of returning the first forever.
    #[must_use]
    pub fn mark_as_seen(mut self) -> Self {
        self.mark_as_seen = true;
        self
    }

    /// Defers matching until `condition` returns `true`. Re-checked on
    /// every mutation flush.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Fn() -> bool + 'static) -> Self {
        self.condition = Some(Rc::new(condition));
        self
    }

    /// Defers matching until the gate opens.
    #[must_use]
    pub fn with_gate(mut self, gate: Rc<WaitGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn ready(&self) -> bool {
        if let Some(gate) = &self.gate
            && !gate.is_open()
        {
            return false;
        }
        if let Some(condition) = &self.condition
            && !condition()
        {
            return false;
        }
        true
    }
}

/// Document-facing addon capabilities.
#[derive(Clone)]
pub struct Tab {
    ctx: HostContext,
    addon_id: String,
    seen: Rc<RefCell<HashSet<ElementId>>>,
}

impl Tab {
    pub(crate) fn new(ctx: HostContext, addon_id: impl Into<String>) -> Self {
        Self {
            ctx,
            addon_id: addon_id.into(),
            seen: Rc::new(RefCell::new(HashSet::new())),
        }
    }

    /// Returns the shared document.
    #[must_use]
    pub fn document(&self) -> Rc<RefCell<Document>> {
        Rc::clone(&self.ctx.document)
    }

    fn find_candidate(&self, selector: &Selector, options: &WaitOptions) -> Option<ElementId> {
        if !options.ready() {
            return None;
        }
        let document = self.ctx.document.borrow();
        document
            .query_selector_all(selector)
            .into_iter()
            .find(|element| !options.mark_as_seen || !self.seen.borrow().contains(element))
    }

    /// Calls `callback` with the first element matching `selector`, now if
    /// one exists, otherwise after the mutation that produces one.
    ///
    /// The pending wait unregisters itself once satisfied.
    pub fn wait_for_element(
        &self,
        selector: Selector,
        options: WaitOptions,
        callback: impl FnOnce(ElementId) + 'static,
    ) {
        if let Some(element) = self.find_candidate(&selector, &options) {
            if options.mark_as_seen {
                self.seen.borrow_mut().insert(element);
            }
            callback(element);
            return;
        }
        let pending: Rc<Cell<Option<Box<dyn FnOnce(ElementId)>>>> =
            Rc::new(Cell::new(Some(Box::new(callback))));
        let registration: Rc<Cell<Option<CallbackId>>> = Rc::new(Cell::new(None));
        let tab = self.clone();
        let watcher = Rc::downgrade(&self.ctx.watcher);
        let inner_registration = Rc::clone(&registration);
        let id = self.ctx.watcher.add_callback(move || {
            let Some(element) = tab.find_candidate(&selector, &options) else {
                return;
            };
            if options.mark_as_seen {
                tab.seen.borrow_mut().insert(element);
            }
            if let Some(callback) = pending.take() {
                callback(element);
            }
            if let Some(id) = inner_registration.take()
                && let Some(watcher) = watcher.upgrade()
            {
                watcher.remove_callback(id);
            }
        });
        registration.set(Some(id));
    }

    /// Inserts `element` into a named shared space at the position implied
    /// by `order`. Returns `false` when the space cannot take it yet.
    pub fn append_to_shared_space(&self, space: &str, element: ElementId, order: i64) -> bool {
        let mut document = self.ctx.document.borrow_mut();
        self.ctx.spaces.insert(&mut document, space, element, order)
    }

    /// Marks an element to be hidden whenever this addon is dynamically
    /// disabled.
    pub fn display_none_while_disabled(&self, element: ElementId) {
        self.ctx
            .document
            .borrow_mut()
            .add_class(element, &disabled_class(&self.addon_id));
    }
}

/// Namespaced settings reads plus change notification.
pub struct SettingsApi {
    store: Rc<SettingsStore>,
    addon_id: String,
    handlers: RefCell<Vec<Rc<RefCell<dyn FnMut()>>>>,
}

impl SettingsApi {
    pub(crate) fn new(store: Rc<SettingsStore>, addon_id: impl Into<String>) -> Self {
        Self {
            store,
            addon_id: addon_id.into(),
            handlers: RefCell::new(Vec::new()),
        }
    }

    /// Returns the effective value of one of this addon's settings.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::UnknownSetting`] for an undeclared id.
    pub fn get(&self, setting_id: &str) -> Result<SettingValue, AddonError> {
        self.store.get_addon_setting(&self.addon_id, setting_id)
    }

    /// Registers a handler that runs after any of this addon's settings
    /// change.
    pub fn on_change(&self, handler: impl FnMut() + 'static) {
        self.handlers
            .borrow_mut()
            .push(Rc::new(RefCell::new(handler)));
    }

    pub(crate) fn notify(&self) {
        let handlers: Vec<_> = self.handlers.borrow().iter().map(Rc::clone).collect();
        for handler in handlers {
            (handler.borrow_mut())();
        }
    }
}

/// Lifecycle notification delivered to an addon about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The addon was dynamically disabled; its styles are gone and marked
    /// elements are hidden.
    Disabled,
    /// The addon was dynamically re-enabled after a disable.
    Reenabled,
}

/// The addon's view of its own lifecycle.
pub struct SelfApi {
    addon_id: String,
    disabled: Cell<bool>,
    handlers: RefCell<Vec<Rc<RefCell<dyn FnMut(LifecycleEvent)>>>>,
}

impl SelfApi {
    pub(crate) fn new(addon_id: impl Into<String>) -> Self {
        Self {
            addon_id: addon_id.into(),
            disabled: Cell::new(false),
            handlers: RefCell::new(Vec::new()),
        }
    }

    /// Returns this addon's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.addon_id
    }

    /// Returns whether the addon is currently dynamically disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.get()
    }

    /// Registers a handler for disable and re-enable notifications.
    pub fn on_lifecycle(&self, handler: impl FnMut(LifecycleEvent) + 'static) {
        self.handlers
            .borrow_mut()
            .push(Rc::new(RefCell::new(handler)));
    }

    pub(crate) fn notify(&self, event: LifecycleEvent) {
        self.disabled.set(event == LifecycleEvent::Disabled);
        let handlers: Vec<_> = self.handlers.borrow().iter().map(Rc::clone).collect();
        for handler in handlers {
            (handler.borrow_mut())(event);
        }
    }
}

/// Everything a userscript can reach.
pub struct AddonApi {
    tab: Tab,
    settings: SettingsApi,
    addon: SelfApi,
    translator: Translator,
}

impl AddonApi {
    pub(crate) fn new(
        ctx: HostContext,
        store: Rc<SettingsStore>,
        manifest: &AddonManifest,
    ) -> Rc<Self> {
        let translator = Translator::new(Rc::clone(&ctx.messages), manifest.id());
        Rc::new(Self {
            tab: Tab::new(ctx, manifest.id()),
            settings: SettingsApi::new(store, manifest.id()),
            addon: SelfApi::new(manifest.id()),
            translator,
        })
    }

    /// Document-facing capabilities.
    #[must_use]
    pub fn tab(&self) -> &Tab {
        &self.tab
    }

    /// This addon's settings.
    #[must_use]
    pub fn settings(&self) -> &SettingsApi {
        &self.settings
    }

    /// This addon's own lifecycle.
    #[must_use]
    pub fn addon(&self) -> &SelfApi {
        &self.addon
    }

    /// Looks up a translated message in this addon's namespace.
    #[must_use]
    pub fn msg(&self, key: &str, vars: &[(&str, &str)]) -> String {
        self.translator.msg(key, vars)
    }

    /// Looks up a translated message, escaped for markup.
    #[must_use]
    pub fn safe_msg(&self, key: &str, vars: &[(&str, &str)]) -> String {
        self.translator.safe_msg(key, vars)
    }
}
