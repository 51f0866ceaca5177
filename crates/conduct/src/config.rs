//! Declarative behaviour configuration.
//!
//! A configuration is an ordered set of named, optionally scoped key/value
//! elements, typically loaded from a declarative source rather than written
//! in code. Elements a prototype recognizes compile into match criteria;
//! the rest stay available for querying by the behaviour's action.

use serde::{Deserialize, Serialize};

/// One element of a behaviour configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationElement {
    /// The position this element occupies relative to its siblings.
    #[serde(default)]
    pub ordinal: i32,
    /// The broad scope of the element, e.g. `event` or `context`.
    #[serde(default)]
    pub frame: String,
    /// The slot within the frame, e.g. `match` or `flagged`.
    #[serde(default)]
    pub slot: String,
    /// The element name; for criteria this is usually a parameter name.
    #[serde(default)]
    pub name: String,
    /// The element value.
    #[serde(default)]
    pub value: String,
}

impl ConfigurationElement {
    pub fn new(
        ordinal: i32,
        frame: impl Into<String>,
        slot: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        ConfigurationElement {
            ordinal,
            frame: frame.into(),
            slot: slot.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered set of configuration elements with query helpers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    elements: Vec<ConfigurationElement>,
}

impl Configuration {
    /// Builds a configuration, ordering elements by their ordinal
    /// (stable for equal ordinals, preserving source order).
    pub fn new(elements: impl IntoIterator<Item = ConfigurationElement>) -> Self {
        let mut elements: Vec<_> = elements.into_iter().collect();
        elements.sort_by_key(|el| el.ordinal);
        Configuration { elements }
    }

    /// Loads a configuration from a JSON array of elements.
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        let elements: Vec<ConfigurationElement> = serde_json::from_str(source)?;
        Ok(Configuration::new(elements))
    }

    /// All elements, in ordinal order.
    pub fn elements(&self) -> &[ConfigurationElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements belonging to the given frame.
    pub fn elements_in<'a>(
        &'a self,
        frame: &'a str,
    ) -> impl Iterator<Item = &'a ConfigurationElement> {
        self.elements.iter().filter(move |el| el.frame == frame)
    }

    /// Whether any element with the given coordinates exists.
    pub fn has(&self, frame: &str, slot: &str, name: &str) -> bool {
        self.elements
            .iter()
            .any(|el| el.frame == frame && el.slot == slot && el.name == name)
    }

    /// Whether an element with the given coordinates carries the given value.
    pub fn has_value(&self, frame: &str, slot: &str, name: &str, value: &str) -> bool {
        self.elements.iter().any(|el| {
            el.frame == frame && el.slot == slot && el.name == name && el.value == value
        })
    }

    /// The values of every element with the given coordinates, in order.
    pub fn values<'a>(
        &'a self,
        frame: &'a str,
        slot: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a str> {
        self.elements
            .iter()
            .filter(move |el| el.frame == frame && el.slot == slot && el.name == name)
            .map(|el| el.value.as_str())
    }

    /// The first value with the given coordinates, if any.
    pub fn value_of<'a>(&'a self, frame: &'a str, slot: &'a str, name: &'a str) -> Option<&'a str> {
        self.values(frame, slot, name).next()
    }

    /// The names of every element in a frame/slot, in order. Useful for
    /// sequence-driving configurations such as `fire` lists.
    pub fn names<'a>(&'a self, frame: &'a str, slot: &'a str) -> impl Iterator<Item = &'a str> {
        self.elements
            .iter()
            .filter(move |el| el.frame == frame && el.slot == slot)
            .map(|el| el.name.as_str())
    }
}
