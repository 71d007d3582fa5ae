//! Translated message lookup for addons.
//!
//! The catalog holds every translated string for the active locale, keyed by
//! `{addon-id}/{message-id}`. Each runner gets a [`Translator`] bound to its
//! addon's namespace; lookups that miss fall back to returning the
//! namespaced key so untranslated interfaces stay debuggable rather than
//! blank.

use std::collections::HashMap;
use std::rc::Rc;

/// Translated strings for the active locale.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    messages: HashMap<String, String>,
}

impl MessageCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog from `{addon-id}/{message-id}` to template pairs.
    #[must_use]
    pub fn from_messages<I, K, V>(messages: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            messages: messages
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Adds or replaces one message template.
    pub fn insert(&mut self, key: impl Into<String>, template: impl Into<String>) {
        self.messages.insert(key.into(), template.into());
    }

    /// Returns the template stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.messages.get(key).map(String::as_str)
    }
}

/// Message lookup bound to one addon's namespace.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use quilt_addons::runner::{MessageCatalog, Translator};
///
/// let catalog = MessageCatalog::from_messages([("pause/resume", "Resume {project}")]);
/// let translator = Translator::new(Rc::new(catalog), "pause");
/// assert_eq!(translator.msg("resume", &[("project", "demo")]), "Resume demo");
/// assert_eq!(translator.msg("missing", &[]), "pause/missing");
/// ```
#[derive(Clone)]
pub struct Translator {
    catalog: Rc<MessageCatalog>,
    namespace: String,
}

impl Translator {
    /// Creates a translator for the given addon namespace.
    #[must_use]
    pub fn new(catalog: Rc<MessageCatalog>, namespace: impl Into<String>) -> Self {
        Self {
            catalog,
            namespace: namespace.into(),
        }
    }

    /// Looks up a message and substitutes `{name}` placeholders.
    ///
    /// A missing message returns the namespaced key unchanged.
    #[must_use]
    pub fn msg(&self, key: &str, vars: &[(&str, &str)]) -> String {
        self.format(key, vars, false)
    }

    /// Like [`Translator::msg`], with the template escaped for use in
    /// markup before substitution. Variable values are the caller's and
    /// pass through untouched, so they may carry markup deliberately.
    #[must_use]
    pub fn safe_msg(&self, key: &str, vars: &[(&str, &str)]) -> String {
        self.format(key, vars, true)
    }

    fn format(&self, key: &str, vars: &[(&str, &str)], escape: bool) -> String {
        let namespaced = format!("{}/{key}", self.namespace);
        let Some(template) = self.catalog.get(&namespaced) else {
            return namespaced;
        };
        if escape {
            substitute(&escape_html(template), vars)
        } else {
            substitute(template, vars)
        }
    }
}

fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_owned();
    for (name, value) in vars {
        result = result.replace(&format!("{{{name}}}"), value);
    }
    result
}

/// Escapes markup-significant characters as decimal entities.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for character in input.chars() {
        match character {
            '<' | '>' | '\'' | '"' | '&' => {
                escaped.push_str("&#");
                escaped.push_str(&(character as u32).to_string());
                escaped.push(';');
            }
            other => escaped.push(other),
        }
    }
    escaped
}
