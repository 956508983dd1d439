//! Format-agnostic `set` semantics.
//!
//! A write either overwrites a path that fully resolves, or finds the
//! deepest existing prefix and hands the rest to the backend to insert.
//! Setting the root merges a mapping key by key and never removes keys
//! that the new mapping does not mention.

use crate::document::KeyValueDocument;
use crate::error::{ConfweldError, Result};
use crate::keypath::{join_keys, KeyPath};
use crate::value::{Map, Value};

/// Primitive edits each backend provides to the merge engine.
pub trait MergeTarget {
    /// Whether the document has any top-level content.
    fn has_content(&self) -> bool;

    /// Number of leading `keys` that resolve to an existing value.
    fn existing_depth(&self, keys: &[String]) -> Result<usize>;

    /// Create `keys[depth..]` under the existing prefix `keys[..depth]`,
    /// holding `value`.
    fn insert_absent(&mut self, keys: &[String], depth: usize, value: Value) -> Result<()>;

    /// Replace the value at a path that fully resolves.
    fn overwrite(&mut self, keys: &[String], value: Value) -> Result<()>;
}

pub fn set<D: KeyValueDocument>(
    doc: &mut D,
    path: &KeyPath,
    value: Value,
    exists_ok: bool,
) -> Result<()> {
    let keys = path.literal_keys()?;
    if keys.is_empty() {
        let Value::Object(map) = value else {
            return Err(ConfweldError::InvalidType(
                "the document root can only be set to a mapping".to_string(),
            ));
        };
        if doc.has_content() && !exists_ok {
            return Err(ConfweldError::AlreadySet("<root>".to_string()));
        }
        return reconcile(doc, &[], map);
    }

    let depth = doc.existing_depth(&keys)?;
    if depth == keys.len() {
        if !exists_ok {
            return Err(ConfweldError::AlreadySet(join_keys(&keys)));
        }
        doc.overwrite(&keys, value)
    } else {
        doc.insert_absent(&keys, depth, value)
    }
}

/// Fold `map` into the mapping at `prefix`, descending where both sides
/// hold mappings and overwriting everything else.
fn reconcile<D: KeyValueDocument>(doc: &mut D, prefix: &[String], map: Map<String, Value>) -> Result<()> {
    for (key, value) in map {
        let mut keys = prefix.to_vec();
        keys.push(key);
        let depth = doc.existing_depth(&keys)?;
        if depth < keys.len() {
            doc.insert_absent(&keys, depth, value)?;
            continue;
        }
        let descend = value.as_object().is_some_and(|m| !m.is_empty())
            && doc.get(&KeyPath::literal(keys.iter()))?.is_object();
        match value {
            Value::Object(sub) if descend => reconcile(doc, &keys, sub)?,
            other => doc.overwrite(&keys, other)?,
        }
    }
    Ok(())
}
