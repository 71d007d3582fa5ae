//! Unit tests for addon error types.

use std::sync::Arc;

use rstest::rstest;

use super::*;

#[rstest]
#[case::unknown_addon(
    AddonError::UnknownAddon { id: "block-count".into() },
    "block-count"
)]
#[case::unknown_setting(
    AddonError::UnknownSetting {
        addon_id: "hide-flyout".into(),
        setting_id: "toggle".into(),
    },
    "toggle"
)]
#[case::unknown_preset(
    AddonError::UnknownPreset {
        addon_id: "custom-colours".into(),
        preset_id: "midnight".into(),
    },
    "midnight"
)]
fn error_message_includes_identifier(#[case] error: AddonError, #[case] expected: &str) {
    let message = error.to_string();
    assert!(
        message.contains(expected),
        "expected '{expected}' in message: {message}"
    );
}

#[test]
fn invalid_setting_value_message_includes_detail() {
    let error = AddonError::InvalidSettingValue {
        addon_id: "custom-colours".into(),
        setting_id: "primary".into(),
        message: "expected a #rrggbb colour".into(),
    };
    let message = error.to_string();
    assert!(
        message.contains("expected a #rrggbb colour"),
        "expected detail in message: {message}"
    );
}

#[test]
fn resource_load_preserves_source() {
    let error = AddonError::ResourceLoad {
        id: "pause".into(),
        message: "userscript missing".into(),
        source: Some(Arc::new(std::io::Error::other("disk gone"))),
    };
    let source = std::error::Error::source(&error);
    assert!(source.is_some(), "expected a source error");
}

#[test]
fn import_parse_wraps_json_error() {
    let json_error = serde_json::from_str::<serde_json::Value>("not json")
        .expect_err("parse should fail");
    let error = AddonError::ImportParse {
        message: json_error.to_string(),
        source: Some(json_error),
    };
    assert!(error.to_string().contains("import payload"));
}

#[test]
fn helper_constructors_fill_fields() {
    let resource = AddonError::resource_load("pause", "missing entry");
    assert!(matches!(resource, AddonError::ResourceLoad { source: None, .. }));
    let manifest = AddonError::manifest("id must not be empty");
    assert!(manifest.to_string().contains("id must not be empty"));
}
