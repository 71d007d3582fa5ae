//! Domain errors raised by addon operations.
//!
//! All errors use `thiserror`-derived enums with structured context so
//! callers can inspect the failure programmatically. Validation errors are
//! raised strictly before any store mutation; resource errors are isolated
//! per addon by the registry.

use std::sync::Arc;

use thiserror::Error;

/// Errors arising from addon and settings operations.
#[derive(Debug, Error)]
pub enum AddonError {
    /// The addon id is not present in the manifest set.
    #[error("unknown addon '{id}'")]
    UnknownAddon {
        /// Addon id that was looked up.
        id: String,
    },

    /// The setting id is not declared by the addon's manifest.
    #[error("unknown setting '{setting_id}' for addon '{addon_id}'")]
    UnknownSetting {
        /// Addon id.
        addon_id: String,
        /// Setting id that was looked up.
        setting_id: String,
    },

    /// The preset id is not declared by the addon's manifest.
    #[error("unknown preset '{preset_id}' for addon '{addon_id}'")]
    UnknownPreset {
        /// Addon id.
        addon_id: String,
        /// Preset id that was looked up.
        preset_id: String,
    },

    /// A setting value failed type, range, or enum validation.
    #[error("invalid value for setting '{setting_id}' of addon '{addon_id}': {message}")]
    InvalidSettingValue {
        /// Addon id.
        addon_id: String,
        /// Setting id.
        setting_id: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The addon's code or style resources could not be loaded.
    #[error("failed to load resources for addon '{id}': {message}")]
    ResourceLoad {
        /// Addon id.
        id: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// A settings import payload could not be parsed.
    #[error("failed to parse settings import payload: {message}")]
    ImportParse {
        /// Description of the parse failure.
        message: String,
        /// Optional underlying JSON error.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// An addon manifest failed validation.
    #[error("manifest error: {message}")]
    Manifest {
        /// Description of the validation failure.
        message: String,
    },
}

impl AddonError {
    /// Creates a [`AddonError::ResourceLoad`] without an underlying source.
    #[must_use]
    pub fn resource_load(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceLoad {
            id: id.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a [`AddonError::Manifest`] with the given message.
    #[must_use]
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests;
