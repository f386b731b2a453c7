//! Document model: an opaque, ordered field-to-value mapping.
//!
//! Identity and schema are owned by the source/sink adapters; the engine
//! only moves documents and lets transforms mutate them in place. Field
//! order is preserved so a document round-trips byte-for-byte through
//! serialization.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PumpError, Result};

/// One page of documents returned by a single fetch.
pub type Batch = Vec<Document>;

/// An ordered mapping of field name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Look up a value by dot-separated key path.
    pub fn get_path(&self, path: &[String]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut value = self.0.get(first)?;
        for key in rest {
            value = value.as_object()?.get(key)?;
        }
        Some(value)
    }

    /// Set a value at a key path, creating intermediate objects as needed.
    ///
    /// Fails if an intermediate key exists but holds a non-object value:
    /// descending through it would silently discard caller data.
    pub fn set_path(&mut self, path: &[String], value: Value) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return Err(PumpError::transform("empty key path"));
        };
        let mut current = &mut self.0;
        for key in parents {
            let slot = current
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match slot {
                Value::Object(map) => map,
                _ => {
                    return Err(PumpError::transform(format!(
                        "cannot descend into non-object field `{}`",
                        key
                    )))
                }
            };
        }
        current.insert(last.clone(), value);
        Ok(())
    }

    /// Remove and return the value at a key path, if present.
    pub fn remove_path(&mut self, path: &[String]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut current = &mut self.0;
        for key in parents {
            current = current.get_mut(key)?.as_object_mut()?;
        }
        current.remove(last)
    }
}

impl Deref for Document {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Document {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
