//! Minimal selector engine for [`Document`] queries.
//!
//! Addon code locates host elements with a handful of selector shapes: a tag
//! name, an id, a class, or an attribute test with exact or prefix matching
//! (the host's generated class names are matched with `[class^='...']`).
//! This module parses exactly those shapes into a typed [`Selector`] so that
//! invalid selectors fail once, at parse time, instead of on every query.

use thiserror::Error;

use super::{Document, ElementId};

/// Errors raised while parsing a selector string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    /// The selector string was empty.
    #[error("selector is empty")]
    Empty,

    /// An unexpected character was found.
    #[error("unexpected character '{found}' at byte {position}")]
    UnexpectedChar {
        /// Offending character.
        found: char,
        /// Byte offset within the selector string.
        position: usize,
    },

    /// An attribute test was not closed with `]`.
    #[error("unterminated attribute test")]
    UnterminatedAttribute,

    /// A `#id`, `.class`, or attribute name was empty.
    #[error("empty name in selector component")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeOp {
    Exact,
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeTest {
    name: String,
    op: AttributeOp,
    value: String,
}

/// A parsed simple selector.
///
/// Supports a compound of one optional tag name followed by any number of
/// `#id`, `.class`, `[attr='value']`, and `[attr^='value']` components, all
/// of which must match the same element.
///
/// # Example
///
/// ```
/// use quilt_host::dom::{Document, Selector};
///
/// let mut doc = Document::new();
/// let row = doc.create_element("div");
/// doc.set_attribute(row, "class", "stage-header_stage-size-row_x9y");
/// doc.append_child(doc.body(), row);
///
/// let selector = Selector::parse("[class^='stage-header_stage-size-row']")
///     .expect("valid selector");
/// assert_eq!(doc.query_selector(&selector), Some(row));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeTest>,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_name(chars: &[char], mut index: usize) -> (String, usize) {
    let mut name = String::new();
    while let Some(&c) = chars.get(index) {
        if !is_name_char(c) {
            break;
        }
        name.push(c);
        index += 1;
    }
    (name, index)
}

impl Selector {
    /// Parses a selector string.
    ///
    /// # Errors
    ///
    /// Returns a [`SelectorError`] when the string is empty, contains an
    /// unsupported component, or an attribute test is malformed.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }
        let chars: Vec<char> = trimmed.chars().collect();
        let mut selector = Self::default();
        let mut index = 0;

        if chars.first().copied().is_some_and(is_name_char) {
            let (tag, next) = take_name(&chars, 0);
            selector.tag = Some(tag);
            index = next;
        }

        while let Some(&component) = chars.get(index) {
            match component {
                '#' => {
                    let (name, next) = take_name(&chars, index + 1);
                    if name.is_empty() {
                        return Err(SelectorError::EmptyName);
                    }
                    selector.id = Some(name);
                    index = next;
                }
                '.' => {
                    let (name, next) = take_name(&chars, index + 1);
                    if name.is_empty() {
                        return Err(SelectorError::EmptyName);
                    }
                    selector.classes.push(name);
                    index = next;
                }
                '[' => {
                    let (test, next) = Self::parse_attribute(&chars, index + 1)?;
                    selector.attributes.push(test);
                    index = next;
                }
                other => {
                    return Err(SelectorError::UnexpectedChar {
                        found: other,
                        position: index,
                    });
                }
            }
        }

        Ok(selector)
    }

    fn parse_attribute(
        chars: &[char],
        start: usize,
    ) -> Result<(AttributeTest, usize), SelectorError> {
        let (name, mut index) = take_name(chars, start);
        if name.is_empty() {
            return Err(SelectorError::EmptyName);
        }

        let mut op = AttributeOp::Exact;
        if chars.get(index) == Some(&'^') {
            op = AttributeOp::Prefix;
            index += 1;
        }
        if chars.get(index) != Some(&'=') {
            return Err(SelectorError::UnterminatedAttribute);
        }
        index += 1;

        let quote = *chars.get(index).ok_or(SelectorError::UnterminatedAttribute)?;
        if quote != '\'' && quote != '"' {
            return Err(SelectorError::UnexpectedChar {
                found: quote,
                position: index,
            });
        }
        index += 1;

        let mut value = String::new();
        let mut closed = false;
        while let Some(&c) = chars.get(index) {
            index += 1;
            if c == quote {
                closed = true;
                break;
            }
            value.push(c);
        }
        if !closed {
            return Err(SelectorError::UnterminatedAttribute);
        }
        if chars.get(index) != Some(&']') {
            return Err(SelectorError::UnterminatedAttribute);
        }

        Ok((AttributeTest { name, op, value }, index + 1))
    }

    /// Returns `true` when `element` satisfies every component of the
    /// selector.
    #[must_use]
    pub fn matches(&self, document: &Document, element: ElementId) -> bool {
        if let Some(tag) = &self.tag
            && document.tag(element) != tag
        {
            return false;
        }
        if let Some(id) = &self.id
            && document.attribute(element, "id") != Some(id.as_str())
        {
            return false;
        }
        for class in &self.classes {
            if !document.has_class(element, class) {
                return false;
            }
        }
        for test in &self.attributes {
            let Some(value) = document.attribute(element, &test.name) else {
                return false;
            };
            let matched = match test.op {
                AttributeOp::Exact => value == test.value,
                AttributeOp::Prefix => value.starts_with(&test.value),
            };
            if !matched {
                return false;
            }
        }
        true
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
