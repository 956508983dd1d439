use crate::error::{ConfweldError, Result};
use crate::keypath::KeyPath;
use crate::merge::{self, MergeTarget};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Toml,
    Yaml,
    Ini,
}

impl Format {
    /// Pick a backend from a file name. Returns `None` for unknown files.
    pub fn from_path(path: &Path) -> Option<Format> {
        let name = path.file_name()?.to_str()?;
        match name {
            ".flake8" | ".coveragerc" | ".pylintrc" => return Some(Format::Ini),
            _ => {}
        }
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Some(Format::Toml),
            "yaml" | "yml" => Some(Format::Yaml),
            "ini" | "cfg" => Some(Format::Ini),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::Toml => "toml",
            Format::Yaml => "yaml",
            Format::Ini => "ini",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// KeyValueDocument
// ---------------------------------------------------------------------------

/// A parsed configuration file addressed by key paths.
///
/// Backends implement reads, deletes and the [`MergeTarget`] hooks; `set`
/// and `extend_list` are shared so every format reconciles partially
/// existing paths the same way.
pub trait KeyValueDocument: MergeTarget + Sized {
    /// Per-format knobs (indentation and the like).
    type Options: Clone + Default;

    const FORMAT: Format;

    /// Fewest key segments a list operation accepts.
    const MIN_LIST_DEPTH: usize = 1;

    /// Parse `text`. Empty text yields an empty document.
    fn parse_with(text: &str, options: &Self::Options) -> Result<Self>;

    fn parse(text: &str) -> Result<Self> {
        Self::parse_with(text, &Self::Options::default())
    }

    fn render(&self) -> String;

    fn get(&self, path: &KeyPath) -> Result<Value>;

    fn delete(&mut self, path: &KeyPath) -> Result<()>;

    /// Remove every element equal to one of `values`. Absent paths and
    /// non-list values are left alone.
    fn remove_from_list(&mut self, path: &KeyPath, values: &[Value]) -> Result<()>;

    /// Append to a list that already exists at `keys`.
    fn append_items(&mut self, keys: &[String], values: Vec<Value>) -> Result<()>;

    fn contains(&self, path: &KeyPath) -> Result<bool> {
        match self.get(path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_absent() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn set(&mut self, path: &KeyPath, value: Value, exists_ok: bool) -> Result<()> {
        merge::set(self, path, value, exists_ok)
    }

    fn extend_list(&mut self, path: &KeyPath, values: Vec<Value>) -> Result<()> {
        let keys = path.literal_keys()?;
        if keys.len() < Self::MIN_LIST_DEPTH {
            return Err(ConfweldError::Structural(format!(
                "{} list operations need at least {} key(s), got '{path}'",
                Self::FORMAT,
                Self::MIN_LIST_DEPTH
            )));
        }
        if self.existing_depth(&keys)? == keys.len() {
            self.append_items(&keys, values)
        } else {
            self.set(path, Value::Array(values), false)
        }
    }
}
