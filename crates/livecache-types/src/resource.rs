use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Address of a collection in the store, e.g. `content://files.demo/cloudfile`.
///
/// Resource identifiers are hierarchical: `content://a/files/7` is a
/// descendant of `content://a/files`. Change notifications are matched with
/// [`ResourceId::overlaps`], so a change to a single row's resource refreshes
/// queries over the whole collection and vice versa.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Parse a resource identifier, rejecting empty strings and trailing slashes.
    pub fn parse(s: impl Into<String>) -> Result<Self, TypeError> {
        let s = s.into();
        if s.is_empty() {
            return Err(TypeError::EmptyResource);
        }
        if s.ends_with('/') {
            return Err(TypeError::InvalidResource(s, "trailing '/'"));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidResource(s, "contains whitespace"));
        }
        Ok(Self(s))
    }

    /// Build a resource identifier without validation.
    ///
    /// Intended for compile-time constants; prefer [`ResourceId::parse`] for
    /// user input.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the resource for a single child, e.g. a row id.
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        Self(format!("{}/{segment}", self.0))
    }

    /// Returns `true` if `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &ResourceId) -> bool {
        match other.0.strip_prefix(&self.0) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Returns `true` if either resource contains the other.
    pub fn overlaps(&self, other: &ResourceId) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
