//! Addon runtime and settings synchronisation.
//!
//! This crate runs user-facing addons against a host interface: manifests
//! declare what an addon is ([`manifest`]), the settings store decides what
//! is enabled and how it is configured ([`settings`]), runners give each
//! enabled addon its footprint in the document ([`runner`], [`registry`]),
//! and the sync channel keeps separate contexts' stores converged
//! ([`sync`]). The host capabilities themselves (document, storage, bus,
//! timers, session) come from `quilt-host` and are injected at the seams,
//! which keeps every behaviour here deterministic under test.
//!
//! [`host::AddonHost`] assembles the whole subsystem for embedders that do
//! not need to wire the pieces individually.

pub mod error;
pub mod host;
pub mod manifest;
pub mod registry;
pub mod runner;
pub mod settings;
pub mod spaces;
pub mod sync;
pub mod watcher;


pub use error::AddonError;
pub use host::{AddonHost, HostConfig};
pub use manifest::{AddonManifest, ManifestSet, SettingValue};
pub use registry::AddonRegistry;
pub use runner::{AddonApi, AddonRunner, HostContext};
pub use settings::{SettingsStore, StoreEvent};
pub use spaces::{SharedSpace, SharedSpaces};
pub use sync::{ChannelMessage, SettingsChannel};
pub use watcher::MutationWatcher;
