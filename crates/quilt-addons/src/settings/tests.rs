//! Unit tests for the settings store.

use std::cell::RefCell;
use std::rc::Rc;

use mockall::mock;
use mockall::predicate;
use rstest::{fixture, rstest};
use serde_json::json;

use quilt_host::storage::{KeyValueStorage, MemoryStorage};

use crate::manifest::{
    AddonManifest, ManifestSet, SelectOption, SettingDescriptor, SettingKind, SettingPreset,
    SettingValue,
};

use super::*;

mock! {
    Storage {}

    impl KeyValueStorage for Storage {
        fn get(&self, key: &str) -> Option<String>;
        fn set(&self, key: &str, value: &str);
        fn remove(&self, key: &str);
    }
}

fn manifests() -> Rc<ManifestSet> {
    let mut set = ManifestSet::new();
    set.register(
        AddonManifest::new("custom-colours")
            .with_enabled_by_default(true)
            .with_dynamic_disable()
            .with_settings(vec![
                SettingDescriptor::new(
                    "shadows",
                    SettingKind::Boolean,
                    SettingValue::Boolean(false),
                )
                .dynamic(),
                SettingDescriptor::new(
                    "primary",
                    SettingKind::Color,
                    SettingValue::from("#4c97ff"),
                ),
                SettingDescriptor::new(
                    "intensity",
                    SettingKind::Integer {
                        min: Some(1),
                        max: Some(20),
                    },
                    SettingValue::Integer(10),
                ),
                SettingDescriptor::new(
                    "theme",
                    SettingKind::Select {
                        potential_values: vec![
                            SelectOption::new("light", "Light"),
                            SelectOption::new("dark", "Dark"),
                        ],
                    },
                    SettingValue::from("light"),
                ),
            ])
            .with_presets(vec![SettingPreset::new(
                "midnight",
                [
                    ("primary", SettingValue::from("#111111")),
                    ("theme", SettingValue::from("dark")),
                ],
            )
            .named("Midnight")]),
    )
    .expect("register custom-colours");
    set.register(AddonManifest::new("block-count"))
        .expect("register block-count");
    set.register(AddonManifest::new("old-addon").with_unsupported())
        .expect("register old-addon");
    Rc::new(set)
}

struct Harness {
    store: Rc<SettingsStore>,
    storage: Rc<MemoryStorage>,
    events: Rc<RefCell<Vec<StoreEvent>>>,
}

impl Harness {
    fn last_setting_change(&self) -> SettingChange {
        match self.events.borrow().last().cloned() {
            Some(StoreEvent::SettingChanged(change)) => change,
            other => panic!("expected a setting change, got {other:?}"),
        }
    }

    fn raw_record(&self) -> serde_json::Value {
        let raw = self
            .storage
            .get(SETTINGS_STORAGE_KEY)
            .expect("record should be persisted");
        serde_json::from_str(&raw).expect("record should be JSON")
    }
}

#[fixture]
fn harness() -> Harness {
    let storage = Rc::new(MemoryStorage::new());
    let store = Rc::new(SettingsStore::new(
        manifests(),
        Rc::clone(&storage) as Rc<dyn KeyValueStorage>,
        "build-1",
    ));
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    store.on_change(move |event| sink.borrow_mut().push(event.clone()));
    Harness {
        store,
        storage,
        events,
    }
}

// ---------------------------------------------------------------------------
// Defaults and lookup
// ---------------------------------------------------------------------------

#[rstest]
fn fresh_store_reads_manifest_defaults(harness: Harness) {
    assert!(harness.store.get_addon_enabled("custom-colours").expect("known"));
    assert!(!harness.store.get_addon_enabled("block-count").expect("known"));
    assert_eq!(
        harness
            .store
            .get_addon_setting("custom-colours", "intensity")
            .expect("setting"),
        SettingValue::Integer(10)
    );
}

#[rstest]
fn unsupported_addon_always_reads_disabled(harness: Harness) {
    harness
        .store
        .set_addon_enabled("old-addon", Some(true))
        .expect("known addon");
    assert!(!harness.store.get_addon_enabled("old-addon").expect("known"));
}

#[rstest]
fn unknown_identifiers_are_errors(harness: Harness) {
    assert!(matches!(
        harness.store.get_addon_enabled("missing"),
        Err(AddonError::UnknownAddon { .. })
    ));
    assert!(matches!(
        harness.store.get_addon_setting("custom-colours", "missing"),
        Err(AddonError::UnknownSetting { .. })
    ));
    assert!(matches!(
        harness.store.apply_addon_preset("custom-colours", "noon"),
        Err(AddonError::UnknownPreset { .. })
    ));
}

// ---------------------------------------------------------------------------
// Enablement
// ---------------------------------------------------------------------------

#[rstest]
fn enabling_never_requires_reload(harness: Harness) {
    harness
        .store
        .set_addon_enabled("block-count", Some(true))
        .expect("enable");
    let change = harness.last_setting_change();
    assert_eq!(change.setting_id, ENABLED_KEY);
    assert!(!change.reload_required);
    assert_eq!(change.value, SettingValue::Boolean(true));
}

#[rstest]
fn disabling_requires_reload_without_dynamic_disable(harness: Harness) {
    harness
        .store
        .set_addon_enabled("block-count", Some(true))
        .expect("enable");
    harness
        .store
        .set_addon_enabled("block-count", Some(false))
        .expect("disable");
    assert!(harness.last_setting_change().reload_required);
}

#[rstest]
fn dynamic_disable_avoids_reload(harness: Harness) {
    harness
        .store
        .set_addon_enabled("custom-colours", Some(false))
        .expect("disable");
    assert!(!harness.last_setting_change().reload_required);
}

#[rstest]
fn redundant_enable_emits_nothing(harness: Harness) {
    harness
        .store
        .set_addon_enabled("custom-colours", Some(true))
        .expect("enable default-enabled addon");
    assert!(harness.events.borrow().is_empty());
}

#[rstest]
fn resetting_enabled_returns_to_default(harness: Harness) {
    harness
        .store
        .set_addon_enabled("custom-colours", Some(false))
        .expect("disable");
    harness
        .store
        .set_addon_enabled("custom-colours", None)
        .expect("reset");
    assert!(harness.store.get_addon_enabled("custom-colours").expect("known"));
    assert_eq!(
        harness.last_setting_change().value,
        SettingValue::Boolean(true)
    );
}

// ---------------------------------------------------------------------------
// Setting writes and validation
// ---------------------------------------------------------------------------

#[rstest]
fn setting_write_round_trips_and_reports_dynamic(harness: Harness) {
    harness
        .store
        .set_addon_setting("custom-colours", "shadows", Some(SettingValue::Boolean(true)))
        .expect("dynamic setting");
    assert!(!harness.last_setting_change().reload_required);

    harness
        .store
        .set_addon_setting("custom-colours", "primary", Some(SettingValue::from("#000000")))
        .expect("static setting");
    assert!(harness.last_setting_change().reload_required);
    assert_eq!(
        harness
            .store
            .get_addon_setting("custom-colours", "primary")
            .expect("setting"),
        SettingValue::from("#000000")
    );
}

#[rstest]
#[case::wrong_type(SettingValue::from("ten"))]
#[case::below_range(SettingValue::Integer(0))]
#[case::above_range(SettingValue::Integer(25))]
fn invalid_integer_is_rejected_without_side_effects(harness: Harness, #[case] value: SettingValue) {
    let result = harness
        .store
        .set_addon_setting("custom-colours", "intensity", Some(value));
    assert!(matches!(
        result,
        Err(AddonError::InvalidSettingValue { .. })
    ));
    assert_eq!(
        harness
            .store
            .get_addon_setting("custom-colours", "intensity")
            .expect("setting"),
        SettingValue::Integer(10)
    );
    assert!(harness.events.borrow().is_empty());
    assert!(harness.storage.get(SETTINGS_STORAGE_KEY).is_none());
}

#[rstest]
fn select_value_must_be_declared(harness: Harness) {
    let result = harness
        .store
        .set_addon_setting("custom-colours", "theme", Some(SettingValue::from("sepia")));
    assert!(result.is_err());
    assert_eq!(
        harness
            .store
            .get_addon_setting("custom-colours", "theme")
            .expect("setting"),
        SettingValue::from("light")
    );
}

#[rstest]
fn preset_applies_defaults_plus_overrides(harness: Harness) {
    harness
        .store
        .set_addon_setting("custom-colours", "intensity", Some(SettingValue::Integer(3)))
        .expect("override before preset");
    harness
        .store
        .apply_addon_preset("custom-colours", "midnight")
        .expect("apply preset");
    assert_eq!(
        harness
            .store
            .get_addon_setting("custom-colours", "primary")
            .expect("setting"),
        SettingValue::from("#111111")
    );
    assert_eq!(
        harness
            .store
            .get_addon_setting("custom-colours", "theme")
            .expect("setting"),
        SettingValue::from("dark")
    );
    // Settings outside the preset return to their defaults.
    assert_eq!(
        harness
            .store
            .get_addon_setting("custom-colours", "intensity")
            .expect("setting"),
        SettingValue::Integer(10)
    );
}

#[rstest]
fn reset_addon_can_keep_enablement(harness: Harness) {
    harness
        .store
        .set_addon_enabled("custom-colours", Some(false))
        .expect("disable");
    harness
        .store
        .set_addon_setting("custom-colours", "theme", Some(SettingValue::from("dark")))
        .expect("override");
    harness
        .store
        .reset_addon("custom-colours", false)
        .expect("reset settings only");
    assert!(!harness.store.get_addon_enabled("custom-colours").expect("known"));
    assert_eq!(
        harness
            .store
            .get_addon_setting("custom-colours", "theme")
            .expect("setting"),
        SettingValue::from("light")
    );
}

#[rstest]
fn reset_all_addons_clears_the_record(harness: Harness) {
    harness
        .store
        .set_addon_enabled("block-count", Some(true))
        .expect("enable");
    harness
        .store
        .set_addon_setting("custom-colours", "theme", Some(SettingValue::from("dark")))
        .expect("override");
    harness.store.reset_all_addons();
    assert!(!harness.store.get_addon_enabled("block-count").expect("known"));
    let record = harness.raw_record();
    assert_eq!(record, json!({"_": 3}));
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[rstest]
fn only_overridden_addons_are_persisted(harness: Harness) {
    harness
        .store
        .set_addon_setting("custom-colours", "theme", Some(SettingValue::from("dark")))
        .expect("override");
    let record = harness.raw_record();
    assert_eq!(
        record,
        json!({"_": 3, "custom-colours": {"theme": "dark"}})
    );
}

#[rstest]
fn settings_survive_a_reload(harness: Harness) {
    harness
        .store
        .set_addon_enabled("block-count", Some(true))
        .expect("enable");
    harness
        .store
        .set_addon_setting("custom-colours", "intensity", Some(SettingValue::Integer(5)))
        .expect("override");

    let reloaded = SettingsStore::new(manifests(), harness.storage, "build-1");
    reloaded.read_storage();
    assert!(reloaded.get_addon_enabled("block-count").expect("known"));
    assert_eq!(
        reloaded
            .get_addon_setting("custom-colours", "intensity")
            .expect("setting"),
        SettingValue::Integer(5)
    );
}

#[test]
fn corrupt_persisted_record_is_ignored() {
    let storage = Rc::new(MemoryStorage::with_entry(SETTINGS_STORAGE_KEY, "not json"));
    let store = SettingsStore::new(manifests(), storage, "build-1");
    store.read_storage();
    assert!(store.get_addon_enabled("custom-colours").expect("known"));
}

#[test]
fn unknown_addons_are_pruned_on_load() {
    let record = json!({"_": 3, "ghost": {"enabled": true}, "block-count": {"enabled": true}});
    let storage = Rc::new(MemoryStorage::with_entry(
        SETTINGS_STORAGE_KEY,
        &record.to_string(),
    ));
    let store = SettingsStore::new(manifests(), storage.clone(), "build-1");
    store.read_storage();
    assert!(store.get_addon_enabled("block-count").expect("known"));
    store
        .set_addon_setting("custom-colours", "theme", Some(SettingValue::from("dark")))
        .expect("override");
    let raw = storage.get(SETTINGS_STORAGE_KEY).expect("persisted");
    assert!(!raw.contains("ghost"));
}

#[test]
fn old_records_are_migrated_on_load() {
    let record = json!({"_": 1, "project-info": {"enabled": true}});
    let storage = Rc::new(MemoryStorage::with_entry(
        SETTINGS_STORAGE_KEY,
        &record.to_string(),
    ));
    let store = SettingsStore::new(manifests(), storage, "build-1");
    store.read_storage();
    assert!(store.get_addon_enabled("block-count").expect("known"));
}

// ---------------------------------------------------------------------------
// Remote mode
// ---------------------------------------------------------------------------

#[rstest]
fn share_link_sets_exactly_the_listed_addons(harness: Harness) {
    harness
        .store
        .parse_url_parameter("block-count,unknown-id");
    assert!(harness.store.is_remote());
    assert!(harness.store.get_addon_enabled("block-count").expect("known"));
    assert!(!harness.store.get_addon_enabled("custom-colours").expect("known"));
}

#[rstest]
fn remote_mode_never_persists(harness: Harness) {
    harness.store.parse_url_parameter("block-count");
    harness
        .store
        .set_addon_setting("custom-colours", "theme", Some(SettingValue::from("dark")))
        .expect("override");
    assert!(harness.storage.get(SETTINGS_STORAGE_KEY).is_none());
}

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

#[rstest]
fn export_captures_full_effective_state(harness: Harness) {
    harness
        .store
        .set_addon_setting("custom-colours", "theme", Some(SettingValue::from("dark")))
        .expect("override");
    let exported = harness.store.export(Theme::Light);
    assert!(exported.core.light_theme);
    assert_eq!(exported.core.version, "v1.0.0-build-1");
    let custom = exported.addons.get("custom-colours").expect("present");
    assert!(custom.enabled);
    assert_eq!(custom.settings.len(), 4);
    assert_eq!(custom.settings.get("theme"), Some(&SettingValue::from("dark")));
    // Defaults are exported explicitly, not omitted.
    assert_eq!(
        custom.settings.get("intensity"),
        Some(&SettingValue::Integer(10))
    );
}

#[rstest]
fn import_round_trips_through_json(harness: Harness) {
    harness
        .store
        .set_addon_enabled("block-count", Some(true))
        .expect("enable");
    harness
        .store
        .set_addon_setting("custom-colours", "primary", Some(SettingValue::from("#123456")))
        .expect("override");
    let serialized =
        serde_json::to_string(&harness.store.export(Theme::Dark)).expect("serialise export");

    let other = SettingsStore::new(manifests(), Rc::new(MemoryStorage::new()), "build-1");
    other.import_json(&serialized).expect("import");
    assert!(other.get_addon_enabled("block-count").expect("known"));
    assert_eq!(
        other
            .get_addon_setting("custom-colours", "primary")
            .expect("setting"),
        SettingValue::from("#123456")
    );
}

#[rstest]
fn import_skips_invalid_entries(harness: Harness) {
    let mut exported = harness.store.export(Theme::Dark);
    let custom = exported
        .addons
        .get_mut("custom-colours")
        .expect("present");
    custom
        .settings
        .insert(String::from("intensity"), SettingValue::Integer(999));
    custom
        .settings
        .insert(String::from("theme"), SettingValue::from("dark"));
    exported.addons.insert(
        String::from("ghost"),
        ExportedAddon {
            enabled: true,
            settings: BTreeMap::new(),
        },
    );
    harness.store.import(&exported);
    // The invalid intensity is dropped, the valid theme applies.
    assert_eq!(
        harness
            .store
            .get_addon_setting("custom-colours", "intensity")
            .expect("setting"),
        SettingValue::Integer(10)
    );
    assert_eq!(
        harness
            .store
            .get_addon_setting("custom-colours", "theme")
            .expect("setting"),
        SettingValue::from("dark")
    );
}

#[rstest]
fn malformed_import_payload_is_an_error(harness: Harness) {
    assert!(matches!(
        harness.store.import_json("[1, 2, 3]"),
        Err(AddonError::ImportParse { .. })
    ));
}

// ---------------------------------------------------------------------------
// Cross-context reconciliation
// ---------------------------------------------------------------------------

#[rstest]
fn peer_snapshot_from_other_build_is_rejected(harness: Harness) {
    let mut snapshot = harness.store.snapshot();
    snapshot
        .get_mut("block-count")
        .expect("present")
        .insert(String::from(ENABLED_KEY), SettingValue::Boolean(true));
    harness
        .store
        .set_store_with_version_check("build-2", &snapshot);
    assert!(!harness.store.get_addon_enabled("block-count").expect("known"));
    assert!(harness.events.borrow().is_empty());
}

#[rstest]
fn identical_snapshot_emits_nothing(harness: Harness) {
    let snapshot = harness.store.snapshot();
    harness.store.set_store(&snapshot);
    assert!(harness.events.borrow().is_empty());
}

#[rstest]
fn peer_enable_reports_dynamic_enable(harness: Harness) {
    let mut snapshot = harness.store.snapshot();
    snapshot
        .get_mut("block-count")
        .expect("present")
        .insert(String::from(ENABLED_KEY), SettingValue::Boolean(true));
    harness
        .store
        .set_store_with_version_check("build-1", &snapshot);
    assert_eq!(
        harness.events.borrow().as_slice(),
        &[StoreEvent::AddonChanged(AddonChange {
            addon_id: String::from("block-count"),
            dynamic_enable: true,
            dynamic_disable: false,
        })]
    );
    assert!(harness.store.get_addon_enabled("block-count").expect("known"));
}

#[rstest]
fn peer_disable_reports_dynamic_disable_only_when_supported(harness: Harness) {
    harness
        .store
        .set_addon_enabled("custom-colours", Some(true))
        .expect("pin enabled override");
    harness
        .store
        .set_addon_enabled("block-count", Some(true))
        .expect("enable");
    harness.events.borrow_mut().clear();

    let mut snapshot = harness.store.snapshot();
    snapshot
        .get_mut("custom-colours")
        .expect("present")
        .insert(String::from(ENABLED_KEY), SettingValue::Boolean(false));
    snapshot
        .get_mut("block-count")
        .expect("present")
        .insert(String::from(ENABLED_KEY), SettingValue::Boolean(false));
    harness.store.set_store(&snapshot);

    let events = harness.events.borrow();
    let change_for = |id: &str| {
        events
            .iter()
            .find_map(|event| match event {
                StoreEvent::AddonChanged(change) if change.addon_id == id => Some(change.clone()),
                _ => None,
            })
            .expect("change should be emitted")
    };
    assert!(change_for("custom-colours").dynamic_disable);
    assert!(!change_for("block-count").dynamic_disable);
}

#[rstest]
fn peer_snapshot_is_not_persisted(harness: Harness) {
    let mut snapshot = harness.store.snapshot();
    snapshot
        .get_mut("block-count")
        .expect("present")
        .insert(String::from(ENABLED_KEY), SettingValue::Boolean(true));
    harness.store.set_store(&snapshot);
    assert!(harness.storage.get(SETTINGS_STORAGE_KEY).is_none());
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

#[rstest]
fn removed_observer_stops_receiving_events(harness: Harness) {
    let count = Rc::new(std::cell::Cell::new(0_u32));
    let sink = Rc::clone(&count);
    let id = harness.store.on_change(move |_| sink.set(sink.get() + 1));
    harness
        .store
        .set_addon_enabled("block-count", Some(true))
        .expect("enable");
    assert!(harness.store.off_change(id));
    assert!(!harness.store.off_change(id));
    harness
        .store
        .set_addon_enabled("block-count", Some(false))
        .expect("disable");
    assert_eq!(count.get(), 1);
}

#[test]
fn mutation_inside_a_handler_queues_its_events() {
    let store = Rc::new(SettingsStore::new(
        manifests(),
        Rc::new(MemoryStorage::new()),
        "build-1",
    ));
    let order = Rc::new(RefCell::new(Vec::new()));
    let inner_store = Rc::clone(&store);
    let sink = Rc::clone(&order);
    store.on_change(move |event| {
        let StoreEvent::SettingChanged(change) = event else {
            return;
        };
        sink.borrow_mut()
            .push((change.addon_id.clone(), change.value.clone()));
        if change.addon_id == "block-count" && change.value == SettingValue::Boolean(true) {
            inner_store
                .set_addon_setting("custom-colours", "shadows", Some(SettingValue::Boolean(true)))
                .expect("nested write");
        }
    });
    store
        .set_addon_enabled("block-count", Some(true))
        .expect("enable");
    let order = order.borrow();
    assert_eq!(order.len(), 2);
    assert_eq!(order[0].0, "block-count");
    assert_eq!(order[1].0, "custom-colours");
}

// ---------------------------------------------------------------------------
// Storage interaction
// ---------------------------------------------------------------------------

#[test]
fn every_mutation_persists_through_storage() {
    let mut storage = MockStorage::new();
    storage
        .expect_set()
        .with(predicate::eq(SETTINGS_STORAGE_KEY), predicate::always())
        .times(1)
        .return_const(());
    let store = SettingsStore::new(manifests(), Rc::new(storage), "build-1");
    store
        .set_addon_enabled("block-count", Some(true))
        .expect("enable");
}
