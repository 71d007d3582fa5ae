//! Settings synchronisation between contexts.
//!
//! The settings page and the running interface live in separate contexts,
//! each with its own [`SettingsStore`]. This channel keeps them converged:
//! local mutations are broadcast (debounced, so a drag across a slider
//! becomes one message) as a full store snapshot tagged with the build id,
//! and incoming snapshots are applied through the store's reconciliation
//! path. A separate reload message lets the settings page restart a peer
//! whose pending changes cannot apply dynamically.


use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use quilt_host::bus::MessageBus;
use quilt_host::scheduler::{Scheduler, TimerId};

use crate::settings::{SettingsStore, StoreEvent, StoreSnapshot};

/// Tracing target for channel operations.
const SYNC_TARGET: &str = "quilt_addons::sync";

/// Quiet period before a mutated store is broadcast.
pub const SYNC_DEBOUNCE_MS: u64 = 100;

/// Wire format of the settings channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelMessage {
    /// A peer's store changed; `store` is its full snapshot.
    #[serde(rename_all = "camelCase")]
    SettingsChanged {
        /// Build id of the sending context.
        version: String,
        /// The sender's complete store.
        store: StoreSnapshot,
    },
    /// The receiving context should reload to apply pending changes.
    Reload,
}

type ReloadHandler = Rc<RefCell<dyn FnMut()>>;

/// Binds a [`SettingsStore`] to a message bus.
pub struct SettingsChannel {
    store: Rc<SettingsStore>,
    bus: Rc<dyn MessageBus>,
    scheduler: Rc<Scheduler>,
    pending_timer: Cell<Option<TimerId>>,
    reload_pending: Cell<bool>,
    reload_handlers: RefCell<Vec<ReloadHandler>>,
}

impl SettingsChannel {
    /// Creates a channel. Call [`SettingsChannel::attach`] to start it.
    #[must_use]
    pub fn new(
        store: Rc<SettingsStore>,
        bus: Rc<dyn MessageBus>,
        scheduler: Rc<Scheduler>,
    ) -> Rc<Self> {
        Rc::new(Self {
            store,
            bus,
            scheduler,
            pending_timer: Cell::new(None),
            reload_pending: Cell::new(false),
            reload_handlers: RefCell::new(Vec::new()),
        })
    }

    /// Wires the channel both ways: store mutations schedule a broadcast,
    /// incoming messages reconcile the store or request a reload. Call once.
    pub fn attach(self: &Rc<Self>) {
        let channel: Weak<Self> = Rc::downgrade(self);
        self.bus.on_message(Box::new(move |raw| {
            let Some(channel) = channel.upgrade() else {
                return;
            };
            channel.handle_message(raw);
        }));

        let channel: Weak<Self> = Rc::downgrade(self);
        self.store.on_change(move |event| {
            let Some(channel) = channel.upgrade() else {
                return;
            };
            channel.handle_store_event(event);
        });
    }

    /// Returns whether a change needing a reload has happened since the
    /// last [`SettingsChannel::request_reload`].
    #[must_use]
    pub fn reload_pending(&self) -> bool {
        self.reload_pending.get()
    }

    /// Registers a handler for reload requests arriving from peers.
    pub fn on_reload(&self, handler: impl FnMut() + 'static) {
        self.reload_handlers
            .borrow_mut()
            .push(Rc::new(RefCell::new(handler)));
    }

    /// Asks peer contexts to reload, immediately, bypassing the debounce.
    pub fn request_reload(&self) {
        self.reload_pending.set(false);
        self.post(&ChannelMessage::Reload);
    }

    /// Broadcasts the current store now, cancelling any pending debounce.
    pub fn broadcast_now(&self) {
        if let Some(timer) = self.pending_timer.take() {
            self.scheduler.cancel(timer);
        }
        self.post(&ChannelMessage::SettingsChanged {
            version: self.store.build_id().to_owned(),
            store: self.store.snapshot(),
        });
    }

    fn handle_store_event(self: &Rc<Self>, event: &StoreEvent) {
        // Snapshots applied from a peer come back as addon changes; only
        // local setting mutations are rebroadcast.
        let StoreEvent::SettingChanged(change) = event else {
            return;
        };
        if change.reload_required {
            self.reload_pending.set(true);
        }
        self.schedule_broadcast();
    }

    fn schedule_broadcast(self: &Rc<Self>) {
        if let Some(timer) = self.pending_timer.take() {
            self.scheduler.cancel(timer);
        }
        let channel: Weak<Self> = Rc::downgrade(self);
        let timer = self.scheduler.schedule(
            SYNC_DEBOUNCE_MS,
            Box::new(move || {
                let Some(channel) = channel.upgrade() else {
                    return;
                };
                channel.pending_timer.set(None);
                channel.post(&ChannelMessage::SettingsChanged {
                    version: channel.store.build_id().to_owned(),
                    store: channel.store.snapshot(),
                });
            }),
        );
        self.pending_timer.set(Some(timer));
    }

    fn handle_message(&self, raw: &str) {
        let message: ChannelMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(target: SYNC_TARGET, error = %err, "ignoring unparseable channel message");
                return;
            }
        };
        match message {
            ChannelMessage::SettingsChanged { version, store } => {
                debug!(target: SYNC_TARGET, version = version.as_str(), "applying peer settings");
                self.store.set_store_with_version_check(&version, &store);
            }
            ChannelMessage::Reload => {
                let handlers: Vec<_> = self
                    .reload_handlers
                    .borrow()
                    .iter()
                    .map(Rc::clone)
                    .collect();
                for handler in handlers {
                    (handler.borrow_mut())();
                }
            }
        }
    }

    fn post(&self, message: &ChannelMessage) {
        match serde_json::to_string(message) {
            Ok(raw) => self.bus.post(&raw),
            Err(err) => {
                warn!(target: SYNC_TARGET, error = %err, "failed to serialise channel message");
            }
        }
    }
}
