//! Item search criteria.

use std::collections::BTreeMap;

use regex::Regex;

use crate::errors::{SecretsError, Result};
use crate::file::SecretsItem;

/// How one attribute is matched.
#[derive(Debug, Clone)]
pub enum AttributeMatch {
    /// The item only has to carry the key.
    Any,
    Exact(String),
    Regex(Regex),
}

impl AttributeMatch {
    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => value == expected,
            Self::Regex(pattern) => pattern.is_match(value),
        }
    }
}

/// Search by label, attributes, or both.  All criteria must hold.
#[derive(Debug, Clone, Default)]
pub struct ItemSearch {
    label: Option<String>,
    attributes: Vec<(String, AttributeMatch)>,
}

impl ItemSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subset match against an attribute map; empty values match any
    /// item carrying that key.
    pub fn from_attributes(attributes: &BTreeMap<String, String>) -> Self {
        attributes
            .iter()
            .fold(Self::new(), |search, (key, value)| search.attribute(key, value))
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Require `key`; an empty `value` accepts any value.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let matcher = if value.is_empty() {
            AttributeMatch::Any
        } else {
            AttributeMatch::Exact(value)
        };
        self.attributes.push((key.into(), matcher));
        self
    }

    /// Require `key` with a value matching `pattern`.
    pub fn attribute_regex(mut self, key: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| SecretsError::InvalidPattern(format!("{pattern}: {e}")))?;
        self.attributes.push((key.into(), AttributeMatch::Regex(regex)));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.attributes.is_empty()
    }

    pub fn matches(&self, item: &SecretsItem) -> bool {
        if let Some(label) = &self.label {
            if &item.label != label {
                return false;
            }
        }
        self.attributes.iter().all(|(key, matcher)| {
            item.attributes
                .get(key)
                .is_some_and(|value| matcher.matches(value))
        })
    }
}
