//! Addon manifest types describing identity, settings, and capabilities.
//!
//! An [`AddonManifest`] declares everything the runtime needs to know about
//! an addon: its id, default enablement, setting descriptors, presets, the
//! code and style resources it injects, and its capability flags (dynamic
//! disable support, editor-only restriction, environment support). Manifests
//! are immutable for the process lifetime and validated once, at
//! registration into a [`ManifestSet`].
//!
//! Activation conditions (`if` on userscripts, userstyles, and settings) are
//! closed structures evaluated on demand through one interpreter function in
//! the runner; they are never cached across setting changes.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::AddonError;

#[cfg(test)]
mod tests;

/// A setting value: the closed set of scalar types settings can take.
///
/// Booleans back `boolean` settings, integers back `integer` settings, and
/// strings back both `color` (as `#rrggbb`) and `select` (as the chosen
/// option id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// A boolean toggle.
    Boolean(bool),
    /// An integer, possibly range-restricted by its descriptor.
    Integer(i64),
    /// A string: a colour literal or a select option id.
    String(String),
}

impl SettingValue {
    /// Returns the contained boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the contained integer, if this is one.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the contained string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// One option of a `select` setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    id: String,
    name: String,
}

impl SelectOption {
    /// Creates an option with the given id and display name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Returns the option id stored as the setting value.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the human-readable option name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }
}

/// The type of a setting, with any type-specific constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettingKind {
    /// A boolean toggle.
    Boolean,
    /// An integer with optional inclusive bounds.
    Integer {
        /// Smallest accepted value.
        #[serde(default)]
        min: Option<i64>,
        /// Largest accepted value.
        #[serde(default)]
        max: Option<i64>,
    },
    /// A `#rrggbb` colour literal.
    Color,
    /// One of a declared set of options.
    Select {
        /// The declared options; stored values are option ids.
        #[serde(rename = "potentialValues")]
        potential_values: Vec<SelectOption>,
    },
}

fn is_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

impl SettingKind {
    /// Checks that `value` is acceptable for this kind.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the mismatch. Callers wrap it
    /// in [`AddonError::InvalidSettingValue`].
    pub fn check(&self, value: &SettingValue) -> Result<(), String> {
        match self {
            Self::Boolean => {
                if value.as_bool().is_none() {
                    return Err(String::from("expected a boolean"));
                }
            }
            Self::Integer { min, max } => {
                let Some(number) = value.as_integer() else {
                    return Err(String::from("expected an integer"));
                };
                if let Some(min) = min
                    && number < *min
                {
                    return Err(format!("{number} is below the minimum of {min}"));
                }
                if let Some(max) = max
                    && number > *max
                {
                    return Err(format!("{number} is above the maximum of {max}"));
                }
            }
            Self::Color => {
                let ok = value.as_str().is_some_and(is_hex_color);
                if !ok {
                    return Err(String::from("expected a #rrggbb colour"));
                }
            }
            Self::Select { potential_values } => {
                let ok = value
                    .as_str()
                    .is_some_and(|id| potential_values.iter().any(|option| option.id() == id));
                if !ok {
                    return Err(String::from("expected one of the declared option ids"));
                }
            }
        }
        Ok(())
    }
}

/// Activation condition attached to a setting, userscript, or userstyle.
///
/// The condition holds when the referenced addon (if any) is enabled and
/// every listed setting of the owning addon has the expected value. An
/// absent condition always holds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationCondition {
    /// Id of another addon that must be enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addon_enabled: Option<String>,
    /// Required values of the owning addon's settings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, SettingValue>,
}

impl ActivationCondition {
    /// Creates a condition on the owning addon's setting values.
    #[must_use]
    pub fn on_settings<I, K>(settings: I) -> Self
    where
        I: IntoIterator<Item = (K, SettingValue)>,
        K: Into<String>,
    {
        Self {
            addon_enabled: None,
            settings: settings
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        }
    }

    /// Creates a condition on another addon being enabled.
    #[must_use]
    pub fn on_addon_enabled(id: impl Into<String>) -> Self {
        Self {
            addon_enabled: Some(id.into()),
            settings: BTreeMap::new(),
        }
    }
}

/// Declarative description of one setting of an addon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingDescriptor {
    id: String,
    #[serde(flatten)]
    kind: SettingKind,
    default: SettingValue,
    #[serde(default)]
    dynamic: bool,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    condition: Option<ActivationCondition>,
}

impl SettingDescriptor {
    /// Creates a descriptor with the given id, kind, and default.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: SettingKind, default: SettingValue) -> Self {
        Self {
            id: id.into(),
            kind,
            default,
            dynamic: false,
            condition: None,
        }
    }

    /// Marks the setting as live-updatable without a reload.
    #[must_use]
    pub const fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Attaches an activation condition.
    #[must_use]
    pub fn with_condition(mut self, condition: ActivationCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Returns the setting id.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the setting kind.
    #[must_use]
    pub const fn kind(&self) -> &SettingKind {
        &self.kind
    }

    /// Returns the declared default value.
    #[must_use]
    pub const fn default_value(&self) -> &SettingValue {
        &self.default
    }

    /// Returns whether changing the setting avoids a reload.
    #[must_use]
    pub const fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Returns the activation condition, if any.
    #[must_use]
    pub const fn condition(&self) -> Option<&ActivationCondition> {
        self.condition.as_ref()
    }

    fn validate(&self) -> Result<(), AddonError> {
        if self.id.trim().is_empty() {
            return Err(AddonError::manifest("setting id must not be empty"));
        }
        self.kind.check(&self.default).map_err(|message| {
            AddonError::manifest(format!(
                "default for setting '{}' is invalid: {message}",
                self.id
            ))
        })?;
        if let SettingKind::Integer {
            min: Some(min),
            max: Some(max),
        } = self.kind
            && min > max
        {
            return Err(AddonError::manifest(format!(
                "setting '{}' declares min {min} greater than max {max}",
                self.id
            )));
        }
        if let SettingKind::Select { potential_values } = &self.kind
            && potential_values.is_empty()
        {
            return Err(AddonError::manifest(format!(
                "select setting '{}' declares no options",
                self.id
            )));
        }
        Ok(())
    }
}

/// A named bundle of setting values applied over the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingPreset {
    id: String,
    #[serde(default)]
    name: String,
    values: BTreeMap<String, SettingValue>,
}

impl SettingPreset {
    /// Creates a preset with the given id and values.
    #[must_use]
    pub fn new<I, K>(id: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, SettingValue)>,
        K: Into<String>,
    {
        Self {
            id: id.into(),
            name: String::new(),
            values: values
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        }
    }

    /// Sets the human-readable preset name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the preset id.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the declared values.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, SettingValue> {
        &self.values
    }
}

/// A userscript resource declaration: a resource reference plus an optional
/// activation condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserscriptDecl {
    url: String,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    condition: Option<ActivationCondition>,
}

impl UserscriptDecl {
    /// Creates an unconditional userscript declaration.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            condition: None,
        }
    }

    /// Attaches an activation condition.
    #[must_use]
    pub fn with_condition(mut self, condition: ActivationCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Returns the resource reference.
    #[must_use]
    pub const fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns the activation condition, if any.
    #[must_use]
    pub const fn condition(&self) -> Option<&ActivationCondition> {
        self.condition.as_ref()
    }
}

/// A userstyle resource declaration.
///
/// `precedence` orders stylesheets in the shared container: higher values
/// are inserted ahead of lower ones so they win the cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserstyleDecl {
    url: String,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    condition: Option<ActivationCondition>,
    #[serde(default)]
    precedence: i32,
}

impl UserstyleDecl {
    /// Creates an unconditional userstyle declaration with precedence 0.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            condition: None,
            precedence: 0,
        }
    }

    /// Attaches an activation condition.
    #[must_use]
    pub fn with_condition(mut self, condition: ActivationCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Sets the stylesheet precedence.
    #[must_use]
    pub const fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    /// Returns the resource reference.
    #[must_use]
    pub const fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns the activation condition, if any.
    #[must_use]
    pub const fn condition(&self) -> Option<&ActivationCondition> {
        self.condition.as_ref()
    }

    /// Returns the stylesheet precedence.
    #[must_use]
    pub const fn precedence(&self) -> i32 {
        self.precedence
    }
}

/// Declarative description of an addon.
///
/// # Example
///
/// ```
/// use quilt_addons::manifest::{AddonManifest, SettingDescriptor, SettingKind, SettingValue};
///
/// let manifest = AddonManifest::new("block-count")
///     .with_enabled_by_default(true)
///     .with_settings(vec![SettingDescriptor::new(
///         "refresh-rate",
///         SettingKind::Integer { min: Some(1), max: Some(60) },
///         SettingValue::Integer(5),
///     )]);
///
/// assert_eq!(manifest.id(), "block-count");
/// assert!(manifest.enabled_by_default());
/// assert!(manifest.setting("refresh-rate").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonManifest {
    id: String,
    #[serde(default)]
    enabled_by_default: bool,
    #[serde(default)]
    settings: Vec<SettingDescriptor>,
    #[serde(default)]
    presets: Vec<SettingPreset>,
    #[serde(default)]
    userscripts: Vec<UserscriptDecl>,
    #[serde(default)]
    userstyles: Vec<UserstyleDecl>,
    #[serde(default)]
    dynamic_disable: bool,
    #[serde(default)]
    editor_only: bool,
    #[serde(default)]
    unsupported: bool,
}

impl AddonManifest {
    /// Creates a manifest with the given id and no settings or resources.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled_by_default: false,
            settings: Vec::new(),
            presets: Vec::new(),
            userscripts: Vec::new(),
            userstyles: Vec::new(),
            dynamic_disable: false,
            editor_only: false,
            unsupported: false,
        }
    }

    /// Sets whether the addon starts enabled for users with no stored state.
    #[must_use]
    pub const fn with_enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled_by_default = enabled;
        self
    }

    /// Declares the addon's settings, in display order.
    #[must_use]
    pub fn with_settings(mut self, settings: Vec<SettingDescriptor>) -> Self {
        self.settings = settings;
        self
    }

    /// Declares the addon's presets.
    #[must_use]
    pub fn with_presets(mut self, presets: Vec<SettingPreset>) -> Self {
        self.presets = presets;
        self
    }

    /// Declares the addon's userscripts, in execution order.
    #[must_use]
    pub fn with_userscripts(mut self, userscripts: Vec<UserscriptDecl>) -> Self {
        self.userscripts = userscripts;
        self
    }

    /// Declares the addon's userstyles, in attachment order.
    #[must_use]
    pub fn with_userstyles(mut self, userstyles: Vec<UserstyleDecl>) -> Self {
        self.userstyles = userstyles;
        self
    }

    /// Declares that the addon can be disabled without a reload.
    #[must_use]
    pub const fn with_dynamic_disable(mut self) -> Self {
        self.dynamic_disable = true;
        self
    }

    /// Restricts the addon to the full editor context.
    #[must_use]
    pub const fn with_editor_only(mut self) -> Self {
        self.editor_only = true;
        self
    }

    /// Marks the addon unsupported in this environment; it reads as
    /// disabled regardless of stored state.
    #[must_use]
    pub const fn with_unsupported(mut self) -> Self {
        self.unsupported = true;
        self
    }

    /// Returns the addon id.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns whether the addon starts enabled with no stored state.
    #[must_use]
    pub const fn enabled_by_default(&self) -> bool {
        self.enabled_by_default
    }

    /// Returns the setting descriptors in declaration order.
    #[must_use]
    pub fn settings(&self) -> &[SettingDescriptor] {
        &self.settings
    }

    /// Returns the presets.
    #[must_use]
    pub fn presets(&self) -> &[SettingPreset] {
        &self.presets
    }

    /// Returns the userscript declarations in execution order.
    #[must_use]
    pub fn userscripts(&self) -> &[UserscriptDecl] {
        &self.userscripts
    }

    /// Returns the userstyle declarations in attachment order.
    #[must_use]
    pub fn userstyles(&self) -> &[UserstyleDecl] {
        &self.userstyles
    }

    /// Returns whether dynamic disable is supported.
    #[must_use]
    pub const fn dynamic_disable(&self) -> bool {
        self.dynamic_disable
    }

    /// Returns whether the addon only runs in the full editor.
    #[must_use]
    pub const fn editor_only(&self) -> bool {
        self.editor_only
    }

    /// Returns whether the addon is unsupported in this environment.
    #[must_use]
    pub const fn unsupported(&self) -> bool {
        self.unsupported
    }

    /// Looks up a setting descriptor by id.
    #[must_use]
    pub fn setting(&self, id: &str) -> Option<&SettingDescriptor> {
        self.settings.iter().find(|setting| setting.id() == id)
    }

    /// Looks up a preset by id.
    #[must_use]
    pub fn preset(&self, id: &str) -> Option<&SettingPreset> {
        self.presets.iter().find(|preset| preset.id() == id)
    }

    /// Returns every setting id mapped to its declared default.
    #[must_use]
    pub fn default_settings(&self) -> BTreeMap<String, SettingValue> {
        self.settings
            .iter()
            .map(|setting| (setting.id().to_owned(), setting.default_value().clone()))
            .collect()
    }

    /// Validates the manifest, returning an error if it is malformed.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::Manifest`] if the id is empty, a setting
    /// declaration is invalid, setting or preset ids collide, or a preset
    /// references an undeclared setting or a value of the wrong shape.
    pub fn validate(&self) -> Result<(), AddonError> {
        if self.id.trim().is_empty() {
            return Err(AddonError::manifest("addon id must not be empty"));
        }
        let mut seen_settings = Vec::new();
        for setting in &self.settings {
            setting.validate()?;
            if seen_settings.contains(&setting.id()) {
                return Err(AddonError::manifest(format!(
                    "duplicate setting id '{}' in addon '{}'",
                    setting.id(),
                    self.id
                )));
            }
            seen_settings.push(setting.id());
        }
        let mut seen_presets = Vec::new();
        for preset in &self.presets {
            if seen_presets.contains(&preset.id()) {
                return Err(AddonError::manifest(format!(
                    "duplicate preset id '{}' in addon '{}'",
                    preset.id(),
                    self.id
                )));
            }
            seen_presets.push(preset.id());
            for (setting_id, value) in preset.values() {
                let Some(setting) = self.setting(setting_id) else {
                    return Err(AddonError::manifest(format!(
                        "preset '{}' references undeclared setting '{setting_id}'",
                        preset.id()
                    )));
                };
                setting.kind().check(value).map_err(|message| {
                    AddonError::manifest(format!(
                        "preset '{}' value for '{setting_id}' is invalid: {message}",
                        preset.id()
                    ))
                })?;
            }
        }
        Ok(())
    }
}

/// The full, immutable set of addon manifests known to this process.
///
/// Registration validates each manifest and rejects duplicate ids.
/// Iteration preserves registration order, which is the order the registry
/// starts addons in.
#[derive(Debug, Clone, Default)]
pub struct ManifestSet {
    manifests: Vec<Rc<AddonManifest>>,
    index: HashMap<String, usize>,
}

impl ManifestSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a manifest after validation.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::Manifest`] if validation fails or if an addon
    /// with the same id is already registered.
    pub fn register(&mut self, manifest: AddonManifest) -> Result<(), AddonError> {
        manifest.validate()?;
        let id = manifest.id().to_owned();
        if self.index.contains_key(&id) {
            return Err(AddonError::manifest(format!(
                "addon '{id}' is already registered"
            )));
        }
        self.index.insert(id, self.manifests.len());
        self.manifests.push(Rc::new(manifest));
        Ok(())
    }

    /// Looks up a manifest by addon id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Rc<AddonManifest>> {
        self.index
            .get(id)
            .and_then(|&index| self.manifests.get(index))
    }

    /// Returns `true` when the id is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Iterates manifests in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<AddonManifest>> {
        self.manifests.iter()
    }

    /// Iterates addon ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.manifests.iter().map(|manifest| manifest.id())
    }

    /// Returns the number of registered addons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Returns `true` when no addons are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}
