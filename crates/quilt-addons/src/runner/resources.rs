//! Addon resource loading.
//!
//! Manifests reference userscripts and userstyles by URL; the
//! [`ResourceLoader`] seam resolves those references to runnable code and
//! CSS text. The embedding host decides where resources come from (bundled,
//! on disk, fetched); [`StaticResourceLoader`] serves pre-registered
//! resources and backs tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::AddonError;
use crate::runner::api::AddonApi;

/// Executable addon behaviour bound to one userscript URL.
pub trait Userscript {
    /// Runs the script against the addon's API surface.
    ///
    /// # Errors
    ///
    /// Returns an [`AddonError`] when the script cannot complete its setup.
    fn run(&self, api: Rc<AddonApi>) -> Result<(), AddonError>;
}

impl<F> Userscript for F
where
    F: Fn(Rc<AddonApi>) -> Result<(), AddonError>,
{
    fn run(&self, api: Rc<AddonApi>) -> Result<(), AddonError> {
        self(api)
    }
}

/// The loaded resources of one addon, keyed by manifest URL.
#[derive(Clone, Default)]
pub struct AddonResources {
    userscripts: HashMap<String, Rc<dyn Userscript>>,
    userstyles: HashMap<String, String>,
}

impl AddonResources {
    /// Creates an empty resource set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a userscript under its manifest URL.
    #[must_use]
    pub fn with_userscript(mut self, url: impl Into<String>, script: Rc<dyn Userscript>) -> Self {
        self.userscripts.insert(url.into(), script);
        self
    }

    /// Adds a userstyle's CSS text under its manifest URL.
    #[must_use]
    pub fn with_userstyle(mut self, url: impl Into<String>, css: impl Into<String>) -> Self {
        self.userstyles.insert(url.into(), css.into());
        self
    }

    /// Returns the userscript registered under `url`.
    #[must_use]
    pub fn userscript(&self, url: &str) -> Option<Rc<dyn Userscript>> {
        self.userscripts.get(url).cloned()
    }

    /// Returns the CSS text registered under `url`.
    #[must_use]
    pub fn userstyle(&self, url: &str) -> Option<&str> {
        self.userstyles.get(url).map(String::as_str)
    }
}

/// Resolves an addon id to its resources.
pub trait ResourceLoader {
    /// Loads every resource the addon's manifest references.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::ResourceLoad`] when the addon's resources are
    /// unavailable.
    fn load(&self, addon_id: &str) -> Result<AddonResources, AddonError>;
}

/// [`ResourceLoader`] serving resources registered up front.
#[derive(Default)]
pub struct StaticResourceLoader {
    resources: RefCell<HashMap<String, AddonResources>>,
}

impl StaticResourceLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the resources for one addon, replacing any previous set.
    pub fn register(&self, addon_id: impl Into<String>, resources: AddonResources) {
        self.resources.borrow_mut().insert(addon_id.into(), resources);
    }
}

impl ResourceLoader for StaticResourceLoader {
    fn load(&self, addon_id: &str) -> Result<AddonResources, AddonError> {
        self.resources
            .borrow()
            .get(addon_id)
            .cloned()
            .ok_or_else(|| AddonError::resource_load(addon_id, "no resources registered"))
    }
}
