//! Identity keys.
//!
//! Work queue items are `namespace/name` strings. Objects in the cluster-wide
//! scope (empty namespace) are keyed by their bare name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Namespace + name identity of an object of a given kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a new key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a `namespace/name` (or bare `name`) queue key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] when the key has more than one separator
    /// or an empty name.
    pub fn parse(key: &str) -> Result<Self> {
        let mut parts = key.split('/');
        let (namespace, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => ("", name),
            (Some(namespace), Some(name), None) => (namespace, name),
            _ => return Err(Error::invalid_key(key, "unexpected key format")),
        };

        if name.is_empty() {
            return Err(Error::invalid_key(key, "name must not be empty"));
        }

        Ok(Self::new(namespace, name))
    }

    /// Render the key in its queue form.
    pub fn to_queue_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}
