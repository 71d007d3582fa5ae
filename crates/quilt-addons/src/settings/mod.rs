//! The settings store: the single source of truth for addon enablement and
//! configuration.
//!
//! The store maps every known addon id to a settings object holding that
//! addon's stored overrides (setting ids plus the reserved `enabled` key).
//! Absent keys mean "use the manifest default", so a fresh store is a map of
//! empty objects. Mutations validate strictly before touching state, persist
//! through the injected [`KeyValueStorage`], and notify observers through a
//! typed change interface.
//!
//! Two event shapes flow out of the store. Local mutations emit
//! [`SettingChange`], carrying the per-setting reload contract: enabling is
//! always dynamically supported, disabling only when the manifest declares
//! `dynamicDisable`, and setting edits follow the descriptor's `dynamic`
//! flag. Whole-store reconciliation from a peer context
//! ([`SettingsStore::set_store`]) emits [`AddonChange`] per addon whose
//! serialized settings object differs, which is the signal the registry
//! turns into dynamic enable/disable calls.
//!
//! The store is single-threaded; methods take `&self` with interior
//! mutability so runners, the registry, and the sync channel can share one
//! instance behind an `Rc`.

mod migrations;

#[cfg(test)]
mod tests;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use quilt_host::storage::KeyValueStorage;

use crate::error::AddonError;
use crate::manifest::{AddonManifest, ManifestSet, SettingDescriptor, SettingValue};

/// Tracing target for settings store operations.
const SETTINGS_TARGET: &str = "quilt_addons::settings";

/// Storage key of the persisted settings record.
pub const SETTINGS_STORAGE_KEY: &str = "tw:addons";

/// Reserved settings-object key carrying the enabled override.
pub const ENABLED_KEY: &str = "enabled";

/// One addon's stored overrides: setting ids (plus [`ENABLED_KEY`]) to
/// values. Absent keys fall back to manifest defaults.
pub type AddonSettings = BTreeMap<String, SettingValue>;

/// Snapshot of the whole store, as exchanged between contexts.
pub type StoreSnapshot = BTreeMap<String, AddonSettings>;

/// UI theme recorded in exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    /// Light UI theme.
    Light,
    /// Dark UI theme.
    Dark,
}

/// Payload of a local setting mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingChange {
    /// Addon whose setting changed.
    pub addon_id: String,
    /// Setting id, or [`ENABLED_KEY`] for enablement changes.
    pub setting_id: String,
    /// Whether the change needs a reload to take full effect.
    pub reload_required: bool,
    /// The new effective value.
    pub value: SettingValue,
}

/// Payload of a per-addon reconciliation from a peer context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonChange {
    /// Addon whose settings object was replaced.
    pub addon_id: String,
    /// The addon transitioned disabled to enabled (always dynamically
    /// supported).
    pub dynamic_enable: bool,
    /// The addon transitioned enabled to disabled and its manifest supports
    /// dynamic disable.
    pub dynamic_disable: bool,
}

/// A change notification from the settings store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A single setting or enablement flag changed locally.
    SettingChanged(SettingChange),
    /// An addon's whole settings object was replaced by [`SettingsStore::set_store`].
    AddonChanged(AddonChange),
}

/// Identifier of a registered change observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type ChangeHandler = Rc<RefCell<dyn FnMut(&StoreEvent)>>;

/// Exported settings payload: the full effective state of every addon,
/// tagged with a core marker for forward and backward tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSettings {
    /// Format marker and theme.
    pub core: ExportedCore,
    /// Effective state per addon.
    pub addons: BTreeMap<String, ExportedAddon>,
}

/// Core block of an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedCore {
    /// Whether the exporting UI used the light theme.
    pub light_theme: bool,
    /// Format marker derived from the exporting build.
    pub version: String,
}

/// One addon's block in an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedAddon {
    /// Effective enabled state.
    pub enabled: bool,
    /// Effective value of every declared setting.
    pub settings: BTreeMap<String, SettingValue>,
}

/// Durable mapping from addon id to stored settings, with validated
/// mutation, migration, and change notification.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use quilt_addons::manifest::{AddonManifest, ManifestSet};
/// use quilt_addons::settings::SettingsStore;
/// use quilt_host::storage::MemoryStorage;
///
/// let mut manifests = ManifestSet::new();
/// manifests
///     .register(AddonManifest::new("pause").with_enabled_by_default(true))
///     .expect("register");
///
/// let store = SettingsStore::new(
///     Rc::new(manifests),
///     Rc::new(MemoryStorage::new()),
///     "build-1",
/// );
/// store.read_storage();
/// assert!(store.get_addon_enabled("pause").expect("known addon"));
/// ```
pub struct SettingsStore {
    manifests: Rc<ManifestSet>,
    storage: Rc<dyn KeyValueStorage>,
    build_id: String,
    store: RefCell<StoreSnapshot>,
    remote: Cell<bool>,
    next_observer: Cell<u64>,
    observers: RefCell<Vec<(ObserverId, ChangeHandler)>>,
    dispatching: Cell<bool>,
    pending_events: RefCell<VecDeque<StoreEvent>>,
}

impl SettingsStore {
    /// Creates a store with an empty entry for every known addon.
    #[must_use]
    pub fn new(
        manifests: Rc<ManifestSet>,
        storage: Rc<dyn KeyValueStorage>,
        build_id: impl Into<String>,
    ) -> Self {
        let store = manifests
            .ids()
            .map(|id| (id.to_owned(), AddonSettings::new()))
            .collect();
        Self {
            manifests,
            storage,
            build_id: build_id.into(),
            store: RefCell::new(store),
            remote: Cell::new(false),
            next_observer: Cell::new(0),
            observers: RefCell::new(Vec::new()),
            dispatching: Cell::new(false),
            pending_events: RefCell::new(VecDeque::new()),
        }
    }

    /// Returns the build identifier used for cross-context version checks.
    #[must_use]
    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// Returns `true` when the store was populated from a share link and
    /// no longer persists.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.remote.get()
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// Registers a change observer. Observers run in registration order
    /// after each mutation completes.
    pub fn on_change(&self, handler: impl FnMut(&StoreEvent) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer.get());
        self.next_observer.set(id.0 + 1);
        self.observers
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(handler))));
        id
    }

    /// Removes a change observer. Returns `false` if it was already removed.
    pub fn off_change(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Dispatches an event to all observers. Events emitted from inside a
    /// handler are queued and delivered in order once the current dispatch
    /// unwinds, preserving first-in-first-out ordering without re-entrant
    /// handler invocation.
    fn emit(&self, event: StoreEvent) {
        self.pending_events.borrow_mut().push_back(event);
        if self.dispatching.get() {
            return;
        }
        self.dispatching.set(true);
        loop {
            let next = self.pending_events.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            let handlers: Vec<ChangeHandler> = self
                .observers
                .borrow()
                .iter()
                .map(|(_, handler)| Rc::clone(handler))
                .collect();
            for handler in handlers {
                (handler.borrow_mut())(&event);
            }
        }
        self.dispatching.set(false);
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    fn manifest(&self, id: &str) -> Result<Rc<AddonManifest>, AddonError> {
        self.manifests
            .get(id)
            .cloned()
            .ok_or_else(|| AddonError::UnknownAddon { id: id.to_owned() })
    }

    fn stored_value(&self, addon_id: &str, key: &str) -> Option<SettingValue> {
        self.store
            .borrow()
            .get(addon_id)
            .and_then(|settings| settings.get(key))
            .cloned()
    }

    fn effective_enabled(&self, manifest: &AddonManifest) -> bool {
        if manifest.unsupported() {
            return false;
        }
        self.stored_value(manifest.id(), ENABLED_KEY)
            .and_then(|value| value.as_bool())
            .unwrap_or_else(|| manifest.enabled_by_default())
    }

    fn effective_setting(&self, manifest: &AddonManifest, setting: &SettingDescriptor) -> SettingValue {
        self.stored_value(manifest.id(), setting.id())
            .unwrap_or_else(|| setting.default_value().clone())
    }

    /// Returns the effective enabled state of an addon.
    ///
    /// Unsupported addons always read as disabled.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::UnknownAddon`] for an unregistered id.
    pub fn get_addon_enabled(&self, id: &str) -> Result<bool, AddonError> {
        let manifest = self.manifest(id)?;
        Ok(self.effective_enabled(&manifest))
    }

    /// Returns the effective value of a setting.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::UnknownAddon`] or [`AddonError::UnknownSetting`].
    pub fn get_addon_setting(&self, id: &str, setting_id: &str) -> Result<SettingValue, AddonError> {
        let manifest = self.manifest(id)?;
        let setting = manifest
            .setting(setting_id)
            .ok_or_else(|| AddonError::UnknownSetting {
                addon_id: id.to_owned(),
                setting_id: setting_id.to_owned(),
            })?;
        Ok(self.effective_setting(&manifest, setting))
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Sets or resets the enabled override.
    ///
    /// `None` resets to the manifest default. If the effective state
    /// changes, a [`SettingChange`] for [`ENABLED_KEY`] is emitted;
    /// `reload_required` is `false` when enabling (always dynamically
    /// supported) or when disabling an addon that declares dynamic disable.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::UnknownAddon`] for an unregistered id.
    pub fn set_addon_enabled(&self, id: &str, enabled: Option<bool>) -> Result<(), AddonError> {
        let manifest = self.manifest(id)?;
        let old_value = self.effective_enabled(&manifest);
        let new_value = enabled.unwrap_or_else(|| manifest.enabled_by_default());
        {
            let mut store = self.store.borrow_mut();
            let settings = store.entry(id.to_owned()).or_default();
            match enabled {
                Some(value) => {
                    settings.insert(String::from(ENABLED_KEY), SettingValue::Boolean(value));
                }
                None => {
                    settings.remove(ENABLED_KEY);
                }
            }
        }
        self.save();
        if new_value != old_value {
            // Dynamic enable is always supported; dynamic disable needs
            // addon support.
            let supports_dynamic = if new_value {
                true
            } else {
                manifest.dynamic_disable()
            };
            self.emit(StoreEvent::SettingChanged(SettingChange {
                addon_id: id.to_owned(),
                setting_id: String::from(ENABLED_KEY),
                reload_required: !supports_dynamic,
                value: SettingValue::Boolean(new_value),
            }));
        }
        Ok(())
    }

    /// Sets or resets one setting.
    ///
    /// `None` resets to the descriptor default. Values are validated against
    /// the descriptor before any state changes. If the effective value
    /// changes, a [`SettingChange`] is emitted with `reload_required`
    /// reflecting the descriptor's `dynamic` flag.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::UnknownAddon`], [`AddonError::UnknownSetting`],
    /// or [`AddonError::InvalidSettingValue`]; in every case the store is
    /// left untouched.
    pub fn set_addon_setting(
        &self,
        id: &str,
        setting_id: &str,
        value: Option<SettingValue>,
    ) -> Result<(), AddonError> {
        let manifest = self.manifest(id)?;
        let setting = manifest
            .setting(setting_id)
            .ok_or_else(|| AddonError::UnknownSetting {
                addon_id: id.to_owned(),
                setting_id: setting_id.to_owned(),
            })?;
        let old_value = self.effective_setting(&manifest, setting);
        let new_value = match value {
            Some(value) => {
                setting
                    .kind()
                    .check(&value)
                    .map_err(|message| AddonError::InvalidSettingValue {
                        addon_id: id.to_owned(),
                        setting_id: setting_id.to_owned(),
                        message,
                    })?;
                let mut store = self.store.borrow_mut();
                let settings = store.entry(id.to_owned()).or_default();
                settings.insert(setting_id.to_owned(), value.clone());
                value
            }
            None => {
                let mut store = self.store.borrow_mut();
                let settings = store.entry(id.to_owned()).or_default();
                settings.remove(setting_id);
                setting.default_value().clone()
            }
        };
        self.save();
        if new_value != old_value {
            self.emit(StoreEvent::SettingChanged(SettingChange {
                addon_id: id.to_owned(),
                setting_id: setting_id.to_owned(),
                reload_required: !setting.is_dynamic(),
                value: new_value,
            }));
        }
        Ok(())
    }

    /// Applies a preset: the preset's values merged over the addon's full
    /// default set, each applied as a normal setting write.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::UnknownAddon`] or [`AddonError::UnknownPreset`].
    pub fn apply_addon_preset(&self, id: &str, preset_id: &str) -> Result<(), AddonError> {
        let manifest = self.manifest(id)?;
        let preset = manifest
            .preset(preset_id)
            .ok_or_else(|| AddonError::UnknownPreset {
                addon_id: id.to_owned(),
                preset_id: preset_id.to_owned(),
            })?;
        let mut merged = manifest.default_settings();
        for (setting_id, value) in preset.values() {
            merged.insert(setting_id.clone(), value.clone());
        }
        for (setting_id, value) in merged {
            self.set_addon_setting(id, &setting_id, Some(value))?;
        }
        Ok(())
    }

    /// Resets all stored setting overrides for an addon, and the enabled
    /// override too when `reset_enabled` is set.
    ///
    /// Overrides that no longer map to a declared setting are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::UnknownAddon`] for an unregistered id.
    pub fn reset_addon(&self, id: &str, reset_enabled: bool) -> Result<(), AddonError> {
        self.manifest(id)?;
        let keys: Vec<String> = self
            .store
            .borrow()
            .get(id)
            .map(|settings| settings.keys().cloned().collect())
            .unwrap_or_default();
        for key in keys {
            if key == ENABLED_KEY {
                if reset_enabled {
                    self.set_addon_enabled(id, None)?;
                }
                continue;
            }
            if let Err(err) = self.set_addon_setting(id, &key, None) {
                debug!(
                    target: SETTINGS_TARGET,
                    addon = id,
                    setting = key.as_str(),
                    error = %err,
                    "skipping stale override during reset"
                );
            }
        }
        Ok(())
    }

    /// Resets every addon, then hard-overwrites the whole store with empty
    /// entries and persists, in case a per-addon reset missed anything.
    pub fn reset_all_addons(&self) {
        let ids: Vec<String> = self.manifests.ids().map(str::to_owned).collect();
        for id in ids {
            if let Err(err) = self.reset_addon(&id, true) {
                debug!(target: SETTINGS_TARGET, addon = id.as_str(), error = %err, "reset failed");
            }
        }
        {
            let mut store = self.store.borrow_mut();
            *store = self
                .manifests
                .ids()
                .map(|id| (id.to_owned(), AddonSettings::new()))
                .collect();
        }
        self.save();
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Loads the persisted record, migrating older versions and pruning
    /// unknown addon ids. Unparseable records are ignored wholesale.
    pub fn read_storage(&self) {
        let Some(raw) = self.storage.get(SETTINGS_STORAGE_KEY) else {
            return;
        };
        let Ok(Value::Object(mut record)) = serde_json::from_str::<Value>(&raw) else {
            warn!(target: SETTINGS_TARGET, "ignoring unparseable persisted settings");
            return;
        };
        migrations::migrate(&mut record);
        let mut store = self.store.borrow_mut();
        for (addon_id, value) in record {
            if addon_id == migrations::VERSION_KEY {
                continue;
            }
            let Some(entry) = store.get_mut(&addon_id) else {
                // Unknown addon ids are pruned by not copying them over.
                continue;
            };
            let Value::Object(settings) = value else {
                continue;
            };
            let mut parsed = AddonSettings::new();
            for (key, raw_value) in settings {
                match serde_json::from_value::<SettingValue>(raw_value) {
                    Ok(setting_value) => {
                        parsed.insert(key, setting_value);
                    }
                    Err(_) => {
                        debug!(
                            target: SETTINGS_TARGET,
                            addon = addon_id.as_str(),
                            key = key.as_str(),
                            "dropping non-scalar stored value"
                        );
                    }
                }
            }
            *entry = parsed;
        }
    }

    /// Persists the store. Only addons with at least one override are
    /// serialized. No-op in remote mode.
    fn save(&self) {
        if self.remote.get() {
            return;
        }
        let mut record = serde_json::Map::new();
        record.insert(
            String::from(migrations::VERSION_KEY),
            Value::from(migrations::STORE_VERSION),
        );
        for (addon_id, settings) in self.store.borrow().iter() {
            if settings.is_empty() {
                continue;
            }
            match serde_json::to_value(settings) {
                Ok(value) => {
                    record.insert(addon_id.clone(), value);
                }
                Err(err) => {
                    warn!(target: SETTINGS_TARGET, addon = addon_id.as_str(), error = %err, "failed to serialise settings");
                }
            }
        }
        let serialized = Value::Object(record).to_string();
        self.storage.set(SETTINGS_STORAGE_KEY, &serialized);
    }

    /// Populates enablement from a share-link parameter: a comma-separated
    /// list of enabled addon ids. Marks the store remote, which disables
    /// persistence for the rest of the session. Mutually exclusive with
    /// [`SettingsStore::read_storage`].
    pub fn parse_url_parameter(&self, parameter: &str) {
        self.remote.set(true);
        let enabled: Vec<&str> = parameter.split(',').collect();
        let ids: Vec<String> = self.manifests.ids().map(str::to_owned).collect();
        for id in ids {
            let value = enabled.contains(&id.as_str());
            if let Err(err) = self.set_addon_enabled(&id, Some(value)) {
                debug!(target: SETTINGS_TARGET, addon = id.as_str(), error = %err, "share-link enable failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Export / import
    // -----------------------------------------------------------------------

    /// Exports the full effective state of every known addon.
    #[must_use]
    pub fn export(&self, theme: Theme) -> ExportedSettings {
        let mut addons = BTreeMap::new();
        for manifest in self.manifests.iter() {
            let settings = manifest
                .settings()
                .iter()
                .map(|setting| {
                    (
                        setting.id().to_owned(),
                        self.effective_setting(manifest, setting),
                    )
                })
                .collect();
            addons.insert(
                manifest.id().to_owned(),
                ExportedAddon {
                    enabled: self.effective_enabled(manifest),
                    settings,
                },
            );
        }
        ExportedSettings {
            core: ExportedCore {
                light_theme: theme == Theme::Light,
                version: format!("v1.0.0-{}", self.build_id),
            },
            addons,
        }
    }

    /// Imports a previously exported payload, best-effort: each addon and
    /// setting entry is applied independently, and a failure on one entry
    /// does not abort the rest.
    pub fn import(&self, data: &ExportedSettings) {
        for (addon_id, entry) in &data.addons {
            if !self.manifests.contains(addon_id) {
                debug!(target: SETTINGS_TARGET, addon = addon_id.as_str(), "skipping unknown addon in import");
                continue;
            }
            if let Err(err) = self.set_addon_enabled(addon_id, Some(entry.enabled)) {
                warn!(target: SETTINGS_TARGET, addon = addon_id.as_str(), error = %err, "import enable failed");
            }
            for (setting_id, value) in &entry.settings {
                if let Err(err) = self.set_addon_setting(addon_id, setting_id, Some(value.clone()))
                {
                    warn!(
                        target: SETTINGS_TARGET,
                        addon = addon_id.as_str(),
                        setting = setting_id.as_str(),
                        error = %err,
                        "ignoring invalid imported setting"
                    );
                }
            }
        }
    }

    /// Parses and imports a serialized export payload.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::ImportParse`] when the payload is not a valid
    /// export document. Individually invalid entries inside a valid document
    /// are skipped, not errors.
    pub fn import_json(&self, raw: &str) -> Result<(), AddonError> {
        let data: ExportedSettings =
            serde_json::from_str(raw).map_err(|err| AddonError::ImportParse {
                message: err.to_string(),
                source: Some(err),
            })?;
        self.import(&data);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cross-context reconciliation
    // -----------------------------------------------------------------------

    /// Returns a deep copy of the raw store, as sent to peer contexts.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.borrow().clone()
    }

    /// Applies a peer snapshot only when it was produced by the same build.
    ///
    /// A mismatched version is a complete no-op: the snapshot may have been
    /// produced against an incompatible manifest set.
    pub fn set_store_with_version_check(&self, version: &str, new_store: &StoreSnapshot) {
        if version != self.build_id {
            debug!(
                target: SETTINGS_TARGET,
                theirs = version,
                ours = self.build_id.as_str(),
                "rejecting settings snapshot from a different build"
            );
            return;
        }
        self.set_store(new_store);
    }

    /// Reconciles the store against a peer snapshot.
    ///
    /// For each known addon whose serialized settings object differs from
    /// the local one, the local object is replaced wholesale (deep copy) and
    /// one [`AddonChange`] is emitted. The comparison is deliberately
    /// coarse: the whole per-addon object is serialized and compared as a
    /// string, not diffed per field.
    pub fn set_store(&self, new_store: &StoreSnapshot) {
        let ids: Vec<String> = self.store.borrow().keys().cloned().collect();
        for id in ids {
            let Some(new_settings) = new_store.get(&id) else {
                continue;
            };
            let old_settings = {
                let store = self.store.borrow();
                let Some(old_settings) = store.get(&id) else {
                    continue;
                };
                old_settings.clone()
            };
            let old_serialized = serde_json::to_string(&old_settings).unwrap_or_default();
            let new_serialized = serde_json::to_string(new_settings).unwrap_or_default();
            if old_serialized == new_serialized {
                continue;
            }
            let Ok(manifest) = self.manifest(&id) else {
                continue;
            };
            let old_enabled = stored_enabled(&old_settings);
            let new_enabled = stored_enabled(new_settings);
            // Dynamic enable is always supported; dynamic disable needs
            // addon support.
            let dynamic_enable = !old_enabled && new_enabled;
            let dynamic_disable = manifest.dynamic_disable() && old_enabled && !new_enabled;
            self.store
                .borrow_mut()
                .insert(id.clone(), new_settings.clone());
            self.emit(StoreEvent::AddonChanged(AddonChange {
                addon_id: id,
                dynamic_enable,
                dynamic_disable,
            }));
        }
    }
}

fn stored_enabled(settings: &AddonSettings) -> bool {
    settings
        .get(ENABLED_KEY)
        .and_then(SettingValue::as_bool)
        .unwrap_or(false)
}
