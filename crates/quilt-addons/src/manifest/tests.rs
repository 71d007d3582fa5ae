//! Unit tests for manifest types and the manifest set.

use rstest::{fixture, rstest};

use super::*;

fn integer_setting(id: &str, default: i64, min: i64, max: i64) -> SettingDescriptor {
    SettingDescriptor::new(
        id,
        SettingKind::Integer {
            min: Some(min),
            max: Some(max),
        },
        SettingValue::Integer(default),
    )
}

fn select_setting(id: &str, default: &str, options: &[&str]) -> SettingDescriptor {
    SettingDescriptor::new(
        id,
        SettingKind::Select {
            potential_values: options
                .iter()
                .map(|option| SelectOption::new(*option, *option))
                .collect(),
        },
        SettingValue::from(default),
    )
}

#[fixture]
fn manifest() -> AddonManifest {
    AddonManifest::new("custom-colours")
        .with_enabled_by_default(true)
        .with_settings(vec![
            SettingDescriptor::new("shadows", SettingKind::Boolean, SettingValue::Boolean(false))
                .dynamic(),
            SettingDescriptor::new("primary", SettingKind::Color, SettingValue::from("#4c97ff")),
            integer_setting("intensity", 10, 1, 20),
            select_setting("theme", "light", &["light", "dark"]),
        ])
        .with_presets(vec![SettingPreset::new(
            "midnight",
            [
                ("primary", SettingValue::from("#111111")),
                ("theme", SettingValue::from("dark")),
            ],
        )
        .named("Midnight")])
        .with_dynamic_disable()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[rstest]
fn valid_manifest_passes(manifest: AddonManifest) {
    manifest.validate().expect("manifest should validate");
}

#[test]
fn empty_id_is_rejected() {
    let err = AddonManifest::new("   ").validate().expect_err("should fail");
    assert!(err.to_string().contains("id must not be empty"));
}

#[test]
fn default_must_match_kind() {
    let manifest = AddonManifest::new("x").with_settings(vec![SettingDescriptor::new(
        "toggle",
        SettingKind::Boolean,
        SettingValue::Integer(1),
    )]);
    let err = manifest.validate().expect_err("should fail");
    assert!(matches!(err, AddonError::Manifest { .. }));
}

#[test]
fn select_default_must_be_declared_option() {
    let manifest =
        AddonManifest::new("x").with_settings(vec![select_setting("theme", "sepia", &["light"])]);
    assert!(manifest.validate().is_err());
}

#[test]
fn select_requires_options() {
    let manifest = AddonManifest::new("x").with_settings(vec![SettingDescriptor::new(
        "theme",
        SettingKind::Select {
            potential_values: Vec::new(),
        },
        SettingValue::from("light"),
    )]);
    assert!(manifest.validate().is_err());
}

#[test]
fn inverted_integer_bounds_are_rejected() {
    let manifest = AddonManifest::new("x").with_settings(vec![integer_setting("n", 5, 10, 1)]);
    let err = manifest.validate().expect_err("should fail");
    assert!(err.to_string().contains("min"));
}

#[test]
fn duplicate_setting_ids_are_rejected() {
    let manifest = AddonManifest::new("x").with_settings(vec![
        SettingDescriptor::new("a", SettingKind::Boolean, SettingValue::Boolean(true)),
        SettingDescriptor::new("a", SettingKind::Boolean, SettingValue::Boolean(false)),
    ]);
    assert!(manifest.validate().is_err());
}

#[test]
fn preset_referencing_unknown_setting_is_rejected() {
    let manifest = AddonManifest::new("x").with_presets(vec![SettingPreset::new(
        "p",
        [("ghost", SettingValue::Boolean(true))],
    )]);
    let err = manifest.validate().expect_err("should fail");
    assert!(err.to_string().contains("undeclared setting"));
}

#[test]
fn preset_value_of_wrong_shape_is_rejected() {
    let manifest = AddonManifest::new("x")
        .with_settings(vec![integer_setting("n", 5, 1, 10)])
        .with_presets(vec![SettingPreset::new(
            "p",
            [("n", SettingValue::from("five"))],
        )]);
    assert!(manifest.validate().is_err());
}

// ---------------------------------------------------------------------------
// Value checking
// ---------------------------------------------------------------------------

#[rstest]
#[case::boolean(SettingKind::Boolean, SettingValue::Boolean(true), true)]
#[case::boolean_mismatch(SettingKind::Boolean, SettingValue::Integer(1), false)]
#[case::color(SettingKind::Color, SettingValue::from("#AbCdEf"), true)]
#[case::color_short(SettingKind::Color, SettingValue::from("#abc"), false)]
#[case::color_no_hash(SettingKind::Color, SettingValue::from("abcdef1"), false)]
#[case::color_bad_digit(SettingKind::Color, SettingValue::from("#abcdeg"), false)]
fn check_validates_shape(#[case] kind: SettingKind, #[case] value: SettingValue, #[case] ok: bool) {
    assert_eq!(kind.check(&value).is_ok(), ok);
}

#[rstest]
#[case::in_range(10, true)]
#[case::at_min(1, true)]
#[case::at_max(20, true)]
#[case::below(0, false)]
#[case::above(25, false)]
fn integer_check_enforces_bounds(#[case] value: i64, #[case] ok: bool) {
    let kind = SettingKind::Integer {
        min: Some(1),
        max: Some(20),
    };
    assert_eq!(kind.check(&SettingValue::Integer(value)).is_ok(), ok);
}

#[test]
fn unbounded_integer_accepts_extremes() {
    let kind = SettingKind::Integer {
        min: None,
        max: None,
    };
    assert!(kind.check(&SettingValue::Integer(i64::MIN)).is_ok());
    assert!(kind.check(&SettingValue::Integer(i64::MAX)).is_ok());
}

// ---------------------------------------------------------------------------
// Lookup and defaults
// ---------------------------------------------------------------------------

#[rstest]
fn setting_and_preset_lookup(manifest: AddonManifest) {
    assert_eq!(
        manifest.setting("intensity").map(SettingDescriptor::id),
        Some("intensity")
    );
    assert!(manifest.setting("missing").is_none());
    assert_eq!(manifest.preset("midnight").map(SettingPreset::id), Some("midnight"));
    assert!(manifest.preset("noon").is_none());
}

#[rstest]
fn default_settings_cover_every_descriptor(manifest: AddonManifest) {
    let defaults = manifest.default_settings();
    assert_eq!(defaults.len(), 4);
    assert_eq!(defaults.get("intensity"), Some(&SettingValue::Integer(10)));
    assert_eq!(defaults.get("theme"), Some(&SettingValue::from("light")));
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

#[rstest]
fn manifest_round_trips_through_json(manifest: AddonManifest) {
    let json = serde_json::to_string(&manifest).expect("serialise");
    assert!(json.contains("\"enabledByDefault\":true"));
    assert!(json.contains("\"dynamicDisable\":true"));
    let back: AddonManifest = serde_json::from_str(&json).expect("deserialise");
    assert_eq!(back, manifest);
}

#[test]
fn setting_value_json_is_untagged() {
    assert_eq!(
        serde_json::to_string(&SettingValue::Boolean(true)).expect("serialise"),
        "true"
    );
    assert_eq!(
        serde_json::from_str::<SettingValue>("12").expect("deserialise"),
        SettingValue::Integer(12)
    );
    assert_eq!(
        serde_json::from_str::<SettingValue>("\"dark\"").expect("deserialise"),
        SettingValue::from("dark")
    );
}

// ---------------------------------------------------------------------------
// Manifest set
// ---------------------------------------------------------------------------

#[rstest]
fn register_and_lookup(manifest: AddonManifest) {
    let mut set = ManifestSet::new();
    set.register(manifest).expect("register");
    set.register(AddonManifest::new("pause"))
        .expect("register second");
    assert_eq!(set.len(), 2);
    assert!(set.contains("custom-colours"));
    assert!(set.get("pause").is_some());
    assert!(set.get("missing").is_none());
}

#[rstest]
fn duplicate_registration_is_rejected(manifest: AddonManifest) {
    let mut set = ManifestSet::new();
    set.register(manifest.clone()).expect("first register");
    let err = set.register(manifest).expect_err("duplicate should fail");
    assert!(err.to_string().contains("already registered"));
}

#[test]
fn iteration_preserves_registration_order() {
    let mut set = ManifestSet::new();
    for id in ["c", "a", "b"] {
        set.register(AddonManifest::new(id)).expect("register");
    }
    let ids: Vec<&str> = set.ids().collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[test]
fn invalid_manifest_is_not_registered() {
    let mut set = ManifestSet::new();
    assert!(set.register(AddonManifest::new("")).is_err());
    assert!(set.is_empty());
}
