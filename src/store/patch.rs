//! Field-scoped document patches
//!
//! A patch maps dot-addressed field paths to new values (or deletions).
//! Patches are applied atomically to a single document; nothing here ever
//! spans two documents.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::path::{validate_field_path, PathValidationError};

/// New value for a single field path
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Replace the value at the path, creating intermediate objects
    Set(Value),
    /// Remove the field entirely
    Delete,
}

/// A set of field updates destined for one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPatch {
    fields: BTreeMap<String, FieldValue>,
}

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, overriding any earlier update of it or its children
    pub fn set(&mut self, path: impl Into<String>, value: Value) -> &mut Self {
        self.insert(path.into(), FieldValue::Set(value))
    }

    /// Delete a field, overriding any earlier update of it or its children
    pub fn delete(&mut self, path: impl Into<String>) -> &mut Self {
        self.insert(path.into(), FieldValue::Delete)
    }

    fn insert(&mut self, path: String, value: FieldValue) -> &mut Self {
        let child_prefix = format!("{}.", path);
        self.fields.retain(|existing, _| !existing.starts_with(&child_prefix));
        self.fields.insert(path, value);
        self
    }

    /// Merge a later patch into this one; the later values win
    pub fn merge(&mut self, later: FieldPatch) {
        for (path, value) in later.fields {
            self.insert(path, value);
        }
    }

    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        self.fields.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Prefix every path (e.g. turn `hp` into `tokens.sciel.hp`)
    pub fn prefixed(self, prefix: &str) -> FieldPatch {
        let fields = self
            .fields
            .into_iter()
            .map(|(path, value)| (format!("{}.{}", prefix, path), value))
            .collect();
        FieldPatch { fields }
    }

    /// Check every path before the patch reaches a store
    pub fn validate(&self) -> Result<(), PathValidationError> {
        for path in self.fields.keys() {
            validate_field_path(path)?;
        }
        Ok(())
    }

    /// Apply the patch to a JSON document in place
    pub fn apply_to(&self, doc: &mut Value) {
        for (path, value) in &self.fields {
            match value {
                FieldValue::Set(v) => set_path(doc, path, v.clone()),
                FieldValue::Delete => delete_path(doc, path),
            }
        }
    }
}

/// Set the value at a dot path, replacing non-object intermediates
pub fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = doc;

    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Remove the value at a dot path; missing intermediates are a no-op
pub fn delete_path(doc: &mut Value, path: &str) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };

    let mut current = doc;
    if let Some(parent) = parent {
        for segment in parent.split('.') {
            match current.get_mut(segment) {
                Some(next) => current = next,
                None => return,
            }
        }
    }

    if let Value::Object(map) = current {
        map.remove(leaf);
    }
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key by key; any other overlay value replaces the base value.
/// Null overlay values are skipped so a missing or nulled remote field keeps
/// the base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}
