//! Schema migrations for the persisted settings record.
//!
//! Each version step is an independent transformation over the raw persisted
//! JSON object, applied when the stored version is older than the step's
//! target (`<` comparison, so users already past a step skip it). Steps are
//! idempotent and append-only: new steps are added at the end and historical
//! ones are never rewritten.
//!
//! The record's own version marker is not rewritten here; the next save
//! writes the current [`STORE_VERSION`].

use serde_json::{Map, Value};

/// Current version of the persisted record format.
pub(crate) const STORE_VERSION: u64 = 3;

/// Reserved key carrying the record version.
pub(crate) const VERSION_KEY: &str = "_";

/// Migrates a raw persisted record in place.
///
/// Records without a version marker are left untouched, matching the
/// behaviour of loading a freshly created record.
pub(crate) fn migrate(record: &mut Map<String, Value>) {
    let Some(old_version) = record.get(VERSION_KEY).and_then(Value::as_u64) else {
        return;
    };
    if old_version == STORE_VERSION {
        return;
    }
    if old_version < 2 {
        migrate_v1_to_v2(record);
    }
    if old_version < 3 {
        migrate_v2_to_v3(record);
    }
}

fn addon_is_enabled(record: &Map<String, Value>, id: &str) -> bool {
    record
        .get(id)
        .and_then(Value::as_object)
        .and_then(|addon| addon.get("enabled"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn enabled_entry() -> Value {
    let mut entry = Map::new();
    entry.insert(String::from("enabled"), Value::Bool(true));
    Value::Object(entry)
}

/// 1 -> 2: `project-info` became `block-count`, and `interface-customization`
/// was split into `remove-backpack` and `remove-feedback`.
fn migrate_v1_to_v2(record: &mut Map<String, Value>) {
    if addon_is_enabled(record, "project-info") {
        record.insert(String::from("block-count"), enabled_entry());
    }
    if addon_is_enabled(record, "interface-customization") {
        let customization = record
            .get("interface-customization")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let truthy = |key: &str| {
            customization
                .get(key)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        if truthy("removeBackpack") {
            record.insert(String::from("remove-backpack"), enabled_entry());
        }
        if truthy("removeFeedback") {
            record.insert(String::from("remove-feedback"), enabled_entry());
        }
    }
}

/// 2 -> 3: the default of `hide-flyout`'s toggle setting changed from
/// `hover` to `cathover`; existing users keep the old default as an explicit
/// override.
fn migrate_v2_to_v3(record: &mut Map<String, Value>) {
    let enabled = addon_is_enabled(record, "hide-flyout");
    if let Some(hide_flyout) = record.get_mut("hide-flyout").and_then(Value::as_object_mut)
        && enabled
        && !hide_flyout.contains_key("toggle")
    {
        hide_flyout.insert(String::from("toggle"), Value::String(String::from("hover")));
    }
}
