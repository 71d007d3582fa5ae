//! Running addons against the host interface.
//!
//! A runner owns one enabled addon's presence in the document: its injected
//! userstyles, its CSS variables, and the [`AddonApi`] its userscripts hold.
//! Runners never unload code. Dynamic disable hides the addon's footprint
//! (styles removed, marked elements hidden, scripts notified) and dynamic
//! enable restores it; anything deeper needs a reload, which the settings
//! store already signalled when the change was made.

pub mod api;
pub mod messages;
pub mod resources;
pub mod styles;


use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::warn;

use quilt_host::dom::{Document, ElementId};
use quilt_host::session::{EditorMode, EditorSession};

use crate::error::AddonError;
use crate::manifest::{ActivationCondition, AddonManifest, SettingValue};
use crate::settings::SettingsStore;
use crate::spaces::SharedSpaces;
use crate::watcher::MutationWatcher;

pub use api::{AddonApi, LifecycleEvent, SelfApi, SettingsApi, Tab, WaitOptions};
pub use messages::{escape_html, MessageCatalog, Translator};
pub use resources::{AddonResources, ResourceLoader, StaticResourceLoader, Userscript};
pub use styles::{StylesheetHost, STYLE_ADDON_ATTRIBUTE, STYLE_PRECEDENCE_ATTRIBUTE};

/// Tracing target for runner operations.
const RUNNER_TARGET: &str = "quilt_addons::runner";

/// The host capabilities runners and their APIs operate through.
#[derive(Clone)]
pub struct HostContext {
    /// The shared document.
    pub document: Rc<RefCell<Document>>,
    /// Mutation observation over the document.
    pub watcher: Rc<MutationWatcher>,
    /// Stylesheet injection.
    pub styles: Rc<StylesheetHost>,
    /// Shared interface spaces.
    pub spaces: Rc<SharedSpaces>,
    /// Editor mode and lifecycle gates.
    pub session: Rc<EditorSession>,
    /// Addon resource resolution.
    pub loader: Rc<dyn ResourceLoader>,
    /// Translated messages for the active locale.
    pub messages: Rc<MessageCatalog>,
}

struct ActiveStyle {
    url: String,
    element: ElementId,
}

/// Runs one addon and manages its document footprint.
pub struct AddonRunner {
    manifest: Rc<AddonManifest>,
    store: Rc<SettingsStore>,
    ctx: HostContext,
    api: Rc<AddonApi>,
    resources: RefCell<Option<AddonResources>>,
    active_styles: RefCell<Vec<ActiveStyle>>,
    disabled_stylesheet: Cell<Option<ElementId>>,
    ran: Cell<bool>,
    loading: Cell<bool>,
}

impl AddonRunner {
    /// Creates a runner. Nothing executes until [`AddonRunner::run`].
    #[must_use]
    pub fn new(
        manifest: Rc<AddonManifest>,
        store: Rc<SettingsStore>,
        ctx: HostContext,
    ) -> Rc<Self> {
        let api = AddonApi::new(ctx.clone(), Rc::clone(&store), &manifest);
        Rc::new(Self {
            manifest,
            store,
            ctx,
            api,
            resources: RefCell::new(None),
            active_styles: RefCell::new(Vec::new()),
            disabled_stylesheet: Cell::new(None),
            ran: Cell::new(false),
            loading: Cell::new(false),
        })
    }

    /// Returns the manifest this runner executes.
    #[must_use]
    pub fn manifest(&self) -> &AddonManifest {
        &self.manifest
    }

    /// Returns the API surface handed to this addon's userscripts.
    #[must_use]
    pub fn api(&self) -> &Rc<AddonApi> {
        &self.api
    }

    /// Returns whether the addon's scripts have executed.
    #[must_use]
    pub fn has_run(&self) -> bool {
        self.ran.get()
    }

    /// Loads resources and executes the addon.
    ///
    /// Editor-only addons outside the editor defer until the session enters
    /// editor mode; the call still succeeds. Running twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::ResourceLoad`] when resources are unavailable,
    /// or the error of a failing userscript.
    pub fn run(self: &Rc<Self>) -> Result<(), AddonError> {
        if self.manifest.editor_only() && !self.ctx.session.is_editor() {
            let runner: Weak<Self> = Rc::downgrade(self);
            self.ctx.session.on_mode_change(move |mode| {
                if mode != EditorMode::Editor {
                    return;
                }
                let Some(runner) = runner.upgrade() else {
                    return;
                };
                if runner.ran.get() {
                    return;
                }
                if let Err(err) = runner.run_now() {
                    warn!(
                        target: RUNNER_TARGET,
                        addon = runner.manifest.id(),
                        error = %err,
                        "deferred addon start failed"
                    );
                }
            });
            return Ok(());
        }
        self.run_now()
    }

    fn run_now(&self) -> Result<(), AddonError> {
        if self.ran.get() {
            return Ok(());
        }
        let resources = self.ctx.loader.load(self.manifest.id())?;
        *self.resources.borrow_mut() = Some(resources);
        self.ran.set(true);
        self.loading.set(true);
        let result = self.run_resources();
        self.loading.set(false);
        result
    }

    fn run_resources(&self) -> Result<(), AddonError> {
        self.update_css_variables();
        self.sync_userstyles()?;
        for declaration in self.manifest.userscripts() {
            if !self.meets_condition(declaration.condition()) {
                continue;
            }
            let script = self
                .resources
                .borrow()
                .as_ref()
                .and_then(|resources| resources.userscript(declaration.url()))
                .ok_or_else(|| {
                    AddonError::resource_load(
                        self.manifest.id(),
                        format!("missing userscript {}", declaration.url()),
                    )
                })?;
            script.run(Rc::clone(&self.api))?;
        }
        Ok(())
    }

    /// Restores the addon after a dynamic disable, or starts it if it never
    /// ran (an addon enabled for the first time this session).
    ///
    /// # Errors
    ///
    /// Propagates [`AddonRunner::run`] errors for a first start.
    pub fn dynamic_enable(self: &Rc<Self>) -> Result<(), AddonError> {
        if self.loading.get() {
            return Ok(());
        }
        if !self.ran.get() {
            return self.run();
        }
        if let Some(stylesheet) = self.disabled_stylesheet.take() {
            self.ctx.styles.remove(stylesheet);
        }
        self.sync_userstyles()?;
        self.api.addon().notify(LifecycleEvent::Reenabled);
        Ok(())
    }

    /// Hides the addon's footprint: userstyles come out, elements marked
    /// with [`Tab::display_none_while_disabled`] are hidden, and scripts are
    /// notified so they can stand down.
    pub fn dynamic_disable(&self) {
        if !self.ran.get() || self.loading.get() {
            return;
        }
        let mut active = self.active_styles.borrow_mut();
        for style in active.drain(..) {
            self.ctx.styles.remove(style.element);
        }
        drop(active);
        if self.disabled_stylesheet.get().is_none() {
            let css = format!(
                ".{}{{display:none !important;}}",
                api::disabled_class(self.manifest.id())
            );
            let stylesheet = self.ctx.styles.add(self.manifest.id(), &css, i32::MAX);
            self.disabled_stylesheet.set(Some(stylesheet));
        }
        self.api.addon().notify(LifecycleEvent::Disabled);
    }

    /// Reacts to a settings change: CSS variables are refreshed, userstyles
    /// with settings conditions are re-evaluated, and the addon's change
    /// handlers run.
    ///
    /// Variables and change handlers fire even while the addon is
    /// dynamically disabled, so its scripts and styles see current values
    /// the moment it comes back. Only the style reconciliation waits for
    /// [`AddonRunner::dynamic_enable`], which keeps a hidden addon's
    /// stylesheets out of the document.
    ///
    /// # Errors
    ///
    /// Returns [`AddonError::ResourceLoad`] when a newly activating
    /// userstyle's CSS is missing from the loaded resources.
    pub fn settings_changed(&self) -> Result<(), AddonError> {
        if !self.ran.get() {
            return Ok(());
        }
        self.update_css_variables();
        if !self.api.addon().is_disabled() {
            self.sync_userstyles()?;
        }
        self.api.settings().notify();
        Ok(())
    }

    /// Reconciles injected userstyles with their activation conditions.
    fn sync_userstyles(&self) -> Result<(), AddonError> {
        for declaration in self.manifest.userstyles() {
            let wanted = self.meets_condition(declaration.condition());
            let position = self
                .active_styles
                .borrow()
                .iter()
                .position(|style| style.url == declaration.url());
            match (wanted, position) {
                (true, None) => {
                    let css = self
                        .resources
                        .borrow()
                        .as_ref()
                        .and_then(|resources| resources.userstyle(declaration.url()))
                        .map(str::to_owned)
                        .ok_or_else(|| {
                            AddonError::resource_load(
                                self.manifest.id(),
                                format!("missing userstyle {}", declaration.url()),
                            )
                        })?;
                    let element =
                        self.ctx
                            .styles
                            .add(self.manifest.id(), &css, declaration.precedence());
                    self.active_styles.borrow_mut().push(ActiveStyle {
                        url: declaration.url().to_owned(),
                        element,
                    });
                }
                (false, Some(index)) => {
                    let style = self.active_styles.borrow_mut().remove(index);
                    self.ctx.styles.remove(style.element);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Publishes every setting as a CSS variable on the document root, so
    /// userstyles can follow setting values without re-injection.
    fn update_css_variables(&self) {
        let addon = kebab_to_camel(self.manifest.id());
        let mut document = self.ctx.document.borrow_mut();
        let root = document.root();
        for setting in self.manifest.settings() {
            let Ok(value) = self.store.get_addon_setting(self.manifest.id(), setting.id())
            else {
                continue;
            };
            let name = format!("--{addon}-{}", kebab_to_camel(setting.id()));
            document.set_style_property(root, &name, &css_value(&value));
        }
    }

    fn meets_condition(&self, condition: Option<&ActivationCondition>) -> bool {
        let Some(condition) = condition else {
            return true;
        };
        if let Some(peer) = &condition.addon_enabled
            && !self.store.get_addon_enabled(peer).unwrap_or(false)
        {
            return false;
        }
        condition.settings.iter().all(|(setting_id, expected)| {
            self.store
                .get_addon_setting(self.manifest.id(), setting_id)
                .is_ok_and(|value| value == *expected)
        })
    }
}

/// Converts a kebab-case identifier to the camelCase form used in CSS
/// variable names.
fn kebab_to_camel(id: &str) -> String {
    let mut result = String::with_capacity(id.len());
    let mut upper_next = false;
    for character in id.chars() {
        if character == '-' {
            upper_next = true;
        } else if upper_next {
            result.extend(character.to_uppercase());
            upper_next = false;
        } else {
            result.push(character);
        }
    }
    result
}

fn css_value(value: &SettingValue) -> String {
    match value {
        SettingValue::Boolean(value) => value.to_string(),
        SettingValue::Integer(value) => value.to_string(),
        SettingValue::String(value) => value.clone(),
    }
}
