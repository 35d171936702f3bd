//! Project context that terminal sessions belong to.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Project/connection context.
///
/// The key addresses every call to the execution service; the metadata
/// is free-form and only carried for the embedding application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Connection key passed to the execution service.
    pub key: String,

    /// Arbitrary metadata for app-specific needs.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ProjectContext {
    /// Create a context with just a connection key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            metadata: HashMap::new(),
        }
    }

    /// Create a context with metadata.
    #[must_use]
    pub fn with_metadata(key: impl Into<String>, metadata: HashMap<String, Value>) -> Self {
        Self {
            key: key.into(),
            metadata,
        }
    }

    /// Get a metadata value by key.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Set a metadata value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Whether no project is selected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}
