//! One-stop assembly of the addon subsystem.
//!
//! [`AddonHost`] wires the pieces the way a real embedding does: a settings
//! store over the host's storage (or a share link), a registry over the
//! shared document, and a sync channel over the host's message bus. The
//! embedder supplies the capability implementations, calls
//! [`AddonHost::start`] once the interface exists, and drives
//! [`AddonHost::tick`] from its event loop.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use quilt_host::bus::MessageBus;
use quilt_host::dom::Document;
use quilt_host::scheduler::Scheduler;
use quilt_host::session::{EditorMode, EditorSession};
use quilt_host::storage::KeyValueStorage;

use crate::manifest::ManifestSet;
use crate::registry::AddonRegistry;
use crate::runner::{HostContext, MessageCatalog, ResourceLoader, StylesheetHost};
use crate::settings::SettingsStore;
use crate::spaces::SharedSpaces;
use crate::sync::SettingsChannel;
use crate::watcher::MutationWatcher;

/// Tracing target for host assembly.
const HOST_TARGET: &str = "quilt_addons::host";

/// Static configuration of one addon host.
pub struct HostConfig {
    /// Build identifier used for cross-context version checks.
    pub build_id: String,
    /// Mode the session starts in.
    pub mode: EditorMode,
    /// A share link's addon list, when the session was opened from one.
    /// Switches the store to remote mode instead of reading storage.
    pub share_link_addons: Option<String>,
}

/// The assembled addon subsystem of one context.
pub struct AddonHost {
    ctx: HostContext,
    store: Rc<SettingsStore>,
    registry: Rc<AddonRegistry>,
    channel: Rc<SettingsChannel>,
    scheduler: Rc<Scheduler>,
}

impl AddonHost {
    /// Builds and wires the subsystem. No addon runs until
    /// [`AddonHost::start`].
    #[must_use]
    pub fn new(
        manifests: Rc<ManifestSet>,
        storage: Rc<dyn KeyValueStorage>,
        loader: Rc<dyn ResourceLoader>,
        messages: Rc<MessageCatalog>,
        bus: Rc<dyn MessageBus>,
        config: &HostConfig,
    ) -> Rc<Self> {
        let document = Rc::new(RefCell::new(Document::new()));
        let scheduler = Rc::new(Scheduler::new());
        let ctx = HostContext {
            document: Rc::clone(&document),
            watcher: Rc::new(MutationWatcher::new(Rc::clone(&document))),
            styles: Rc::new(StylesheetHost::new(Rc::clone(&document))),
            spaces: Rc::new(SharedSpaces::new()),
            session: Rc::new(EditorSession::new(config.mode)),
            loader,
            messages,
        };

        let store = Rc::new(SettingsStore::new(
            Rc::clone(&manifests),
            storage,
            config.build_id.as_str(),
        ));
        match &config.share_link_addons {
            Some(parameter) => store.parse_url_parameter(parameter),
            None => store.read_storage(),
        }

        let registry = AddonRegistry::new(manifests, Rc::clone(&store), ctx.clone());
        registry.attach();
        let channel = SettingsChannel::new(Rc::clone(&store), bus, Rc::clone(&scheduler));
        channel.attach();

        Rc::new(Self {
            ctx,
            store,
            registry,
            channel,
            scheduler,
        })
    }

    /// Starts every enabled addon and returns how many started.
    pub fn start(&self) -> usize {
        let started = self.registry.run_enabled();
        info!(
            target: HOST_TARGET,
            started,
            remote = self.store.is_remote(),
            "addon host started"
        );
        started
    }

    /// Advances time and replays pending document mutations. Call from the
    /// embedder's event loop with the elapsed milliseconds.
    pub fn tick(&self, elapsed_ms: u64) {
        self.scheduler.advance(elapsed_ms);
        self.ctx.watcher.flush();
    }

    /// The shared host capabilities.
    #[must_use]
    pub fn ctx(&self) -> &HostContext {
        &self.ctx
    }

    /// The settings store of this context.
    #[must_use]
    pub fn store(&self) -> &Rc<SettingsStore> {
        &self.store
    }

    /// The runner registry of this context.
    #[must_use]
    pub fn registry(&self) -> &Rc<AddonRegistry> {
        &self.registry
    }

    /// The sync channel of this context.
    #[must_use]
    pub fn channel(&self) -> &Rc<SettingsChannel> {
        &self.channel
    }

    /// The virtual-time scheduler driving debounced work.
    #[must_use]
    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }
}
