//! Shared interface spaces.
//!
//! Several addons may want to add buttons to the same toolbar region. A
//! shared space names such a region and owns the insertion discipline:
//! every inserted element carries a numeric order, and insertion walks the
//! container's current children to keep orders ascending regardless of
//! which addon inserted first. Elements between the space's `from` and
//! `until` boundary markers belong to the page itself and are never
//! reordered around.


use std::cell::RefCell;
use std::collections::HashMap;

use tracing::warn;

use quilt_host::dom::{Document, ElementId};

/// Tracing target for shared-space operations.
const SPACES_TARGET: &str = "quilt_addons::spaces";

/// Attribute carrying an inserted element's order within its space.
pub const ORDER_ATTRIBUTE: &str = "data-shared-space-order";

type ElementFn = dyn Fn(&mut Document) -> Option<ElementId>;
type BoundaryFn = dyn Fn(&mut Document, ElementId) -> Vec<ElementId>;

/// One named region of the interface that addons share.
///
/// The container and boundary markers are resolved lazily on every insert,
/// because the surrounding interface may not exist yet (or may have been
/// rebuilt) when an addon asks to insert.
pub struct SharedSpace {
    element: Box<ElementFn>,
    from: Option<Box<BoundaryFn>>,
    until: Box<BoundaryFn>,
}

impl SharedSpace {
    /// Creates a space whose container is resolved by `element`.
    ///
    /// Without boundaries, the whole container is shared.
    pub fn new(element: impl Fn(&mut Document) -> Option<ElementId> + 'static) -> Self {
        Self {
            element: Box::new(element),
            from: None,
            until: Box::new(|_, _| Vec::new()),
        }
    }

    /// Sets the start boundary: children up to and including any element
    /// returned here are left alone. A configured boundary whose marker is
    /// not in the container yet makes inserts fail, so callers retry later.
    #[must_use]
    pub fn with_from(
        mut self,
        from: impl Fn(&mut Document, ElementId) -> Vec<ElementId> + 'static,
    ) -> Self {
        self.from = Some(Box::new(from));
        self
    }

    /// Sets the end boundary: shared elements always stay before any
    /// element returned here.
    #[must_use]
    pub fn with_until(
        mut self,
        until: impl Fn(&mut Document, ElementId) -> Vec<ElementId> + 'static,
    ) -> Self {
        self.until = Box::new(until);
        self
    }
}

/// Registry of shared spaces, keyed by name.
#[derive(Default)]
pub struct SharedSpaces {
    spaces: RefCell<HashMap<String, SharedSpace>>,
}

impl SharedSpaces {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a space under `name`, replacing any previous definition.
    pub fn register(&self, name: impl Into<String>, space: SharedSpace) {
        self.spaces.borrow_mut().insert(name.into(), space);
    }

    /// Returns whether a space named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.spaces.borrow().contains_key(name)
    }

    /// Inserts `element` into the named space at the position implied by
    /// `order`.
    ///
    /// Returns `false` when the space is unknown or its container cannot be
    /// resolved yet; callers retry from a mutation callback.
    pub fn insert(
        &self,
        document: &mut Document,
        name: &str,
        element: ElementId,
        order: i64,
    ) -> bool {
        let spaces = self.spaces.borrow();
        let Some(space) = spaces.get(name) else {
            warn!(target: SPACES_TARGET, space = name, "unknown shared space");
            return false;
        };
        let Some(container) = (space.element)(document) else {
            return false;
        };
        let from = space
            .from
            .as_ref()
            .map(|resolve| resolve(document, container));
        let until = (space.until)(document, container);

        // Skip everything up to the start boundary, then insert before the
        // end boundary or before the first shared element of higher order.
        // The position is decided before anything is written, so a failed
        // insert leaves the document untouched.
        let mut found_from = from.is_none();
        let mut anchor = None;
        for child in document.children(container) {
            if !found_from {
                if from
                    .as_ref()
                    .is_some_and(|markers| markers.contains(&child))
                {
                    found_from = true;
                }
                continue;
            }
            if until.contains(&child) {
                anchor = Some(child);
                break;
            }
            let child_order = document
                .attribute(child, ORDER_ATTRIBUTE)
                .and_then(|value| value.parse::<i64>().ok());
            if let Some(child_order) = child_order
                && child_order > order
            {
                anchor = Some(child);
                break;
            }
        }
        if !found_from {
            warn!(target: SPACES_TARGET, space = name, "start boundary not present yet");
            return false;
        }

        document.set_attribute(element, ORDER_ATTRIBUTE, &order.to_string());
        match anchor {
            Some(reference) => document.insert_before(container, element, reference),
            None => {
                document.append_child(container, element);
                true
            }
        }
    }
}
