//! Arena-backed document tree standing in for the host editor's DOM.
//!
//! The addon runtime only needs a narrow slice of DOM behaviour: building
//! and rearranging an element tree, reading and writing attributes and
//! inline style properties, querying by simple selectors, and observing that
//! the tree changed. [`Document`] provides exactly that.
//!
//! Elements are identified by [`ElementId`] handles into an internal arena.
//! Handles are only meaningful for the document that created them; they stay
//! valid for the document's lifetime even after the element is detached.
//!
//! Structural changes bump a generation counter (see
//! [`Document::generation`]). The addon runtime's mutation watcher compares
//! generations between event-loop turns instead of holding one observer per
//! waiter, which is how the host's single mutation subscription fans out.

mod selector;


use std::collections::BTreeMap;

pub use self::selector::{Selector, SelectorError};

/// Handle to an element in a [`Document`] arena.
///
/// Obtained from [`Document::create_element`] and the query methods. A
/// handle created by one document must not be used with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

#[derive(Debug, Default)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    style: BTreeMap<String, String>,
    text: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

/// In-process document tree with attribute, style, and query support.
///
/// A fresh document contains a `html` root with `head` and `body` children,
/// mirroring the shape addon code expects from the host page.
///
/// # Example
///
/// ```
/// use quilt_host::dom::{Document, Selector};
///
/// let mut doc = Document::new();
/// let div = doc.create_element("div");
/// doc.set_attribute(div, "class", "controls");
/// doc.append_child(doc.body(), div);
///
/// let selector = Selector::parse(".controls").expect("valid selector");
/// assert_eq!(doc.query_selector(&selector), Some(div));
/// ```
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: ElementId,
    head: ElementId,
    body: ElementId,
    generation: u64,
}

impl Document {
    /// Creates a document with `html`, `head`, and `body` elements.
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: ElementId(0),
            head: ElementId(0),
            body: ElementId(0),
            generation: 0,
        };
        let root = doc.alloc("html");
        let head = doc.alloc("head");
        let body = doc.alloc("body");
        doc.root = root;
        doc.head = head;
        doc.body = body;
        doc.attach(root, head, None);
        doc.attach(root, body, None);
        doc.generation = 0;
        doc
    }

    fn alloc(&mut self, tag: &str) -> ElementId {
        let id = ElementId(self.nodes.len());
        self.nodes.push(Node {
            tag: tag.to_owned(),
            ..Node::default()
        });
        id
    }

    #[expect(
        clippy::expect_used,
        reason = "element ids are only minted by this arena and are never removed"
    )]
    fn node(&self, id: ElementId) -> &Node {
        self.nodes.get(id.0).expect("element id from another document")
    }

    #[expect(
        clippy::expect_used,
        reason = "element ids are only minted by this arena and are never removed"
    )]
    fn node_mut(&mut self, id: ElementId) -> &mut Node {
        self.nodes
            .get_mut(id.0)
            .expect("element id from another document")
    }

    /// Returns the document root (`html`).
    #[must_use]
    pub const fn root(&self) -> ElementId {
        self.root
    }

    /// Returns the `head` element.
    #[must_use]
    pub const fn head(&self) -> ElementId {
        self.head
    }

    /// Returns the `body` element.
    #[must_use]
    pub const fn body(&self) -> ElementId {
        self.body
    }

    /// Returns the structural generation counter.
    ///
    /// The counter is bumped whenever the child list of any connected or
    /// detached element changes. Observers remember the last generation they
    /// saw and compare on each event-loop turn.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Creates a detached element with the given tag.
    ///
    /// Creating an element is not a structural change; the generation
    /// counter is untouched until the element is inserted somewhere.
    pub fn create_element(&mut self, tag: &str) -> ElementId {
        self.alloc(tag)
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    fn detach(&mut self, child: ElementId) {
        if let Some(parent) = self.node(child).parent {
            self.node_mut(parent).children.retain(|c| *c != child);
            self.node_mut(child).parent = None;
        }
    }

    fn attach(&mut self, parent: ElementId, child: ElementId, index: Option<usize>) {
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        let children = &mut self.node_mut(parent).children;
        match index {
            Some(i) if i <= children.len() => children.insert(i, child),
            _ => children.push(child),
        }
        self.generation += 1;
    }

    /// Appends `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: ElementId, child: ElementId) {
        self.attach(parent, child, None);
    }

    /// Inserts `child` as the first child of `parent`.
    pub fn prepend(&mut self, parent: ElementId, child: ElementId) {
        self.attach(parent, child, Some(0));
    }

    /// Inserts `child` into `parent` immediately before `reference`.
    ///
    /// Returns `false` without mutating anything if `reference` is not a
    /// child of `parent`.
    pub fn insert_before(
        &mut self,
        parent: ElementId,
        child: ElementId,
        reference: ElementId,
    ) -> bool {
        if !self.node(parent).children.contains(&reference) {
            return false;
        }
        // Detach first so the reference index is computed on the final
        // child list when the element moves within the same parent.
        self.detach(child);
        let Some(index) = self.node(parent).children.iter().position(|c| *c == reference) else {
            return false;
        };
        self.attach(parent, child, Some(index));
        true
    }

    /// Detaches `element` from its parent. Detached elements keep their own
    /// subtree and may be re-inserted later.
    pub fn remove(&mut self, element: ElementId) {
        if self.node(element).parent.is_some() {
            self.detach(element);
            self.generation += 1;
        }
    }

    /// Returns the parent of `element`, if attached.
    #[must_use]
    pub fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.node(element).parent
    }

    /// Returns the children of `element` in order.
    #[must_use]
    pub fn children(&self, element: ElementId) -> Vec<ElementId> {
        self.node(element).children.clone()
    }

    /// Returns the first child of `element`, if any.
    #[must_use]
    pub fn first_child(&self, element: ElementId) -> Option<ElementId> {
        self.node(element).children.first().copied()
    }

    /// Returns the last child of `element`, if any.
    #[must_use]
    pub fn last_child(&self, element: ElementId) -> Option<ElementId> {
        self.node(element).children.last().copied()
    }

    /// Returns the sibling immediately after `element`, if any.
    #[must_use]
    pub fn next_sibling(&self, element: ElementId) -> Option<ElementId> {
        let parent = self.node(element).parent?;
        let children = &self.node(parent).children;
        let index = children.iter().position(|c| *c == element)?;
        children.get(index + 1).copied()
    }

    /// Returns `true` when `element` is reachable from the document root.
    #[must_use]
    pub fn is_connected(&self, element: ElementId) -> bool {
        let mut current = element;
        loop {
            if current == self.root {
                return true;
            }
            match self.node(current).parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Attributes, style, text
    // -----------------------------------------------------------------------

    /// Returns the element's tag name.
    #[must_use]
    pub fn tag(&self, element: ElementId) -> &str {
        &self.node(element).tag
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set_attribute(&mut self, element: ElementId, name: &str, value: &str) {
        self.node_mut(element)
            .attributes
            .insert(name.to_owned(), value.to_owned());
    }

    /// Returns an attribute value, if present.
    #[must_use]
    pub fn attribute(&self, element: ElementId, name: &str) -> Option<&str> {
        self.node(element).attributes.get(name).map(String::as_str)
    }

    /// Removes an attribute if present.
    pub fn remove_attribute(&mut self, element: ElementId, name: &str) {
        self.node_mut(element).attributes.remove(name);
    }

    /// Appends a class to the element's `class` attribute.
    pub fn add_class(&mut self, element: ElementId, class: &str) {
        let attributes = &mut self.node_mut(element).attributes;
        match attributes.get_mut("class") {
            Some(existing) if !existing.is_empty() => {
                if !existing.split_whitespace().any(|c| c == class) {
                    existing.push(' ');
                    existing.push_str(class);
                }
            }
            _ => {
                attributes.insert("class".to_owned(), class.to_owned());
            }
        }
    }

    /// Returns `true` when the element's `class` attribute contains `class`.
    #[must_use]
    pub fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.attribute(element, "class")
            .is_some_and(|value| value.split_whitespace().any(|c| c == class))
    }

    /// Sets an inline style property, e.g. a CSS custom property on the
    /// document root.
    pub fn set_style_property(&mut self, element: ElementId, name: &str, value: &str) {
        self.node_mut(element)
            .style
            .insert(name.to_owned(), value.to_owned());
    }

    /// Returns an inline style property, if set.
    #[must_use]
    pub fn style_property(&self, element: ElementId, name: &str) -> Option<&str> {
        self.node(element).style.get(name).map(String::as_str)
    }

    /// Replaces the element's text content.
    pub fn set_text(&mut self, element: ElementId, text: &str) {
        text.clone_into(&mut self.node_mut(element).text);
    }

    /// Returns the element's text content.
    #[must_use]
    pub fn text(&self, element: ElementId) -> &str {
        &self.node(element).text
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Returns all connected elements matching `selector`, in document order.
    #[must_use]
    pub fn query_selector_all(&self, selector: &Selector) -> Vec<ElementId> {
        let mut results = Vec::new();
        let mut stack = vec![self.root];
        while let Some(element) = stack.pop() {
            if selector.matches(self, element) {
                results.push(element);
            }
            // Reverse so the stack pops children in document order.
            for child in self.node(element).children.iter().rev() {
                stack.push(*child);
            }
        }
        results
    }

    /// Returns the first connected element matching `selector`.
    #[must_use]
    pub fn query_selector(&self, selector: &Selector) -> Option<ElementId> {
        let mut stack = vec![self.root];
        while let Some(element) = stack.pop() {
            if selector.matches(self, element) {
                return Some(element);
            }
            for child in self.node(element).children.iter().rev() {
                stack.push(*child);
            }
        }
        None
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
