//! Stylesheet injection with precedence ordering.
//!
//! All injected addon styles live in one container element kept as the
//! first child of `<body>`, so page styles loaded later still win ties. The
//! container holds `<style>` elements in ascending precedence; among equal
//! precedences, later additions come later and therefore override.

use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;

use quilt_host::dom::{Document, ElementId};

/// Attribute naming the addon that owns an injected stylesheet.
pub const STYLE_ADDON_ATTRIBUTE: &str = "data-addon-id";

/// Attribute carrying an injected stylesheet's precedence.
pub const STYLE_PRECEDENCE_ATTRIBUTE: &str = "data-precedence";

/// Owns the injected-style container and its ordering discipline.
pub struct StylesheetHost {
    document: Rc<RefCell<Document>>,
    container: Cell<Option<ElementId>>,
}

impl StylesheetHost {
    /// Creates a host over `document`. The container is created lazily on
    /// the first injection.
    #[must_use]
    pub fn new(document: Rc<RefCell<Document>>) -> Self {
        Self {
            document,
            container: Cell::new(None),
        }
    }

    fn container(&self) -> ElementId {
        if let Some(container) = self.container.get()
            && self.document.borrow().is_connected(container)
        {
            return container;
        }
        let mut document = self.document.borrow_mut();
        let container = document.create_element("div");
        document.set_attribute(container, "id", "addon-styles");
        let body = document.body();
        match document.first_child(body) {
            Some(first) => {
                document.insert_before(body, container, first);
            }
            None => document.append_child(body, container),
        }
        drop(document);
        self.container.set(Some(container));
        container
    }

    /// Injects a stylesheet for `addon_id`, keeping the container sorted by
    /// ascending precedence. Returns the created element.
    pub fn add(&self, addon_id: &str, css: &str, precedence: i32) -> ElementId {
        let container = self.container();
        let mut document = self.document.borrow_mut();
        let style = document.create_element("style");
        document.set_text(style, css);
        document.set_attribute(style, STYLE_ADDON_ATTRIBUTE, addon_id);
        document.set_attribute(style, STYLE_PRECEDENCE_ATTRIBUTE, &precedence.to_string());
        let reference = document.children(container).into_iter().find(|child| {
            document
                .attribute(*child, STYLE_PRECEDENCE_ATTRIBUTE)
                .and_then(|value| value.parse::<i32>().ok())
                .unwrap_or(0)
                > precedence
        });
        match reference {
            Some(reference) => {
                document.insert_before(container, style, reference);
            }
            None => document.append_child(container, style),
        }
        style
    }

    /// Removes an injected stylesheet.
    pub fn remove(&self, style: ElementId) {
        self.document.borrow_mut().remove(style);
    }

    /// Returns the injected stylesheets, in effect order.
    #[must_use]
    pub fn injected(&self) -> Vec<ElementId> {
        match self.container.get() {
            Some(container) => self.document.borrow().children(container),
            None => Vec::new(),
        }
    }
}
