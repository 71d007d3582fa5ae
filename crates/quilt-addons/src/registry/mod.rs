//! The addon registry: one runner per addon, driven by store events.
//!
//! The registry starts every enabled addon at boot, isolating failures so a
//! broken addon cannot take its neighbours down, and reacts to settings
//! store events for the rest of the session: setting edits reach the
//! owning runner, enablement flips become dynamic enable and disable calls,
//! and addons enabled for the first time get a runner on the spot.


use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::AddonError;
use crate::manifest::ManifestSet;
use crate::runner::{AddonRunner, HostContext};
use crate::settings::{SettingsStore, StoreEvent, ENABLED_KEY};

/// Tracing target for registry operations.
const REGISTRY_TARGET: &str = "quilt_addons::registry";

/// Owns the runners of the current session.
pub struct AddonRegistry {
    manifests: Rc<ManifestSet>,
    store: Rc<SettingsStore>,
    ctx: HostContext,
    runners: RefCell<HashMap<String, Rc<AddonRunner>>>,
}

impl AddonRegistry {
    /// Creates a registry. No addons run until [`AddonRegistry::run_enabled`].
    #[must_use]
    pub fn new(manifests: Rc<ManifestSet>, store: Rc<SettingsStore>, ctx: HostContext) -> Rc<Self> {
        Rc::new(Self {
            manifests,
            store,
            ctx,
            runners: RefCell::new(HashMap::new()),
        })
    }

    /// Subscribes the registry to store events. Call once at boot.
    pub fn attach(self: &Rc<Self>) {
        let registry = Rc::clone(self);
        self.store
            .on_change(move |event| registry.handle_store_event(event));
    }

    /// Returns the runner for `id`, if the addon has one this session.
    #[must_use]
    pub fn runner(&self, id: &str) -> Option<Rc<AddonRunner>> {
        self.runners.borrow().get(id).cloned()
    }

    /// Starts every enabled addon. Failures are logged per addon and do not
    /// stop the rest; the number of successfully started addons is returned.
    pub fn run_enabled(self: &Rc<Self>) -> usize {
        let ids: Vec<String> = self.manifests.ids().map(str::to_owned).collect();
        let mut started = 0;
        for id in ids {
            if !self.store.get_addon_enabled(&id).unwrap_or(false) {
                continue;
            }
            match self.run_addon(&id) {
                Ok(()) => started += 1,
                Err(err) => {
                    warn!(target: REGISTRY_TARGET, addon = id.as_str(), error = %err, "addon failed to start");
                }
            }
        }
        started
    }

    /// Creates (or reuses) the runner for `id` and runs it.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::UnknownAddon`] for an unregistered id, or the
    /// runner's own error.
    pub fn run_addon(self: &Rc<Self>, id: &str) -> Result<(), AddonError> {
        let runner = match self.runner(id) {
            Some(runner) => runner,
            None => {
                let manifest = self
                    .manifests
                    .get(id)
                    .cloned()
                    .ok_or_else(|| AddonError::UnknownAddon { id: id.to_owned() })?;
                let runner =
                    AddonRunner::new(manifest, Rc::clone(&self.store), self.ctx.clone());
                self.runners
                    .borrow_mut()
                    .insert(id.to_owned(), Rc::clone(&runner));
                runner
            }
        };
        runner.run()
    }

    fn handle_store_event(self: &Rc<Self>, event: &StoreEvent) {
        match event {
            StoreEvent::SettingChanged(change) => {
                if change.setting_id == ENABLED_KEY {
                    self.handle_enablement(&change.addon_id, change.reload_required);
                } else if let Some(runner) = self.runner(&change.addon_id)
                    && let Err(err) = runner.settings_changed()
                {
                    warn!(
                        target: REGISTRY_TARGET,
                        addon = change.addon_id.as_str(),
                        error = %err,
                        "settings update failed"
                    );
                }
            }
            StoreEvent::AddonChanged(change) => {
                // Settings always propagate first, so CSS variables and
                // change handlers carry current values into any enablement
                // transition below.
                if let Some(runner) = self.runner(&change.addon_id)
                    && let Err(err) = runner.settings_changed()
                {
                    warn!(
                        target: REGISTRY_TARGET,
                        addon = change.addon_id.as_str(),
                        error = %err,
                        "settings update failed"
                    );
                }
                if change.dynamic_enable {
                    self.dynamic_enable(&change.addon_id);
                } else if change.dynamic_disable
                    && let Some(runner) = self.runner(&change.addon_id)
                {
                    runner.dynamic_disable();
                }
            }
        }
    }

    fn handle_enablement(self: &Rc<Self>, id: &str, reload_required: bool) {
        if reload_required {
            // The change takes effect on reload; nothing to do live.
            debug!(target: REGISTRY_TARGET, addon = id, "change deferred to reload");
            return;
        }
        let enabled = self.store.get_addon_enabled(id).unwrap_or(false);
        if enabled {
            self.dynamic_enable(id);
        } else if let Some(runner) = self.runner(id) {
            runner.dynamic_disable();
        }
    }

    fn dynamic_enable(self: &Rc<Self>, id: &str) {
        let result = match self.runner(id) {
            Some(runner) => runner.dynamic_enable(),
            None => self.run_addon(id),
        };
        if let Err(err) = result {
            warn!(target: REGISTRY_TARGET, addon = id, error = %err, "dynamic enable failed");
        }
    }
}
