use super::{parse_value, with_document, Backend, DocumentOp};
use crate::output::{print_json, print_value};
use anyhow::Context;
use clap::Args;
use confweld_core::value::Value;
use confweld_core::{DocumentManager, KeyPath};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct DocArgs {
    /// Configuration file (.toml, .yaml/.yml, .ini/.cfg)
    pub file: PathBuf,

    /// Key path, one segment per argument; `/regex/` matches keys by pattern
    pub keys: Vec<String>,
}

impl DocArgs {
    fn key_path(&self) -> anyhow::Result<KeyPath> {
        KeyPath::parse_args(&self.keys).context("invalid key path")
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

enum Edit {
    Get(KeyPath),
    Contains(KeyPath),
    Set {
        path: KeyPath,
        value: Value,
        exists_ok: bool,
        anchor: Option<String>,
    },
    Delete(KeyPath),
    Extend(KeyPath, Vec<Value>),
    Remove(KeyPath, Vec<Value>),
}

enum Outcome {
    Value(Value),
    Present(bool),
    Written,
}

impl DocumentOp for Edit {
    type Output = Outcome;

    fn apply<D: Backend>(self, doc: &mut DocumentManager<'_, D>) -> confweld_core::Result<Outcome> {
        match self {
            Edit::Get(path) => doc.get(&path).map(Outcome::Value),
            Edit::Contains(path) => doc.contains(&path).map(Outcome::Present),
            Edit::Set {
                path,
                value,
                exists_ok,
                anchor: Some(anchor),
            } => {
                doc.document()?
                    .write_anchored(&path, D::prepare(value), &anchor, exists_ok)?;
                Ok(Outcome::Written)
            }
            Edit::Set {
                path,
                value,
                exists_ok,
                anchor: None,
            } => {
                doc.set(&path, D::prepare(value), exists_ok)?;
                Ok(Outcome::Written)
            }
            Edit::Delete(path) => {
                doc.delete(&path)?;
                Ok(Outcome::Written)
            }
            Edit::Extend(path, values) => {
                let values = values.into_iter().map(D::prepare).collect();
                doc.extend_list(&path, values)?;
                Ok(Outcome::Written)
            }
            Edit::Remove(path, values) => {
                let values: Vec<Value> = values.into_iter().map(D::prepare).collect();
                doc.remove_from_list(&path, &values)?;
                Ok(Outcome::Written)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn get(root: &Path, target: DocArgs, json: bool) -> anyhow::Result<()> {
    let path = target.key_path()?;
    if let Outcome::Value(value) = with_document(root, &target.file, Edit::Get(path))? {
        if json {
            print_json(&value)?;
        } else {
            print_value(&value)?;
        }
    }
    Ok(())
}

pub fn contains(root: &Path, target: DocArgs, json: bool) -> anyhow::Result<()> {
    let path = target.key_path()?;
    if let Outcome::Present(found) = with_document(root, &target.file, Edit::Contains(path))? {
        if json {
            print_json(&serde_json::json!({ "contains": found }))?;
        } else {
            println!("{found}");
        }
    }
    Ok(())
}

pub fn set(
    root: &Path,
    target: DocArgs,
    raw: &str,
    force: bool,
    anchor: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let path = target.key_path()?;
    let edit = Edit::Set {
        path: path.clone(),
        value: parse_value(raw),
        exists_ok: force,
        anchor,
    };
    with_document(root, &target.file, edit)?;
    report(&target.file, &path, "set", json)
}

pub fn delete(root: &Path, target: DocArgs, json: bool) -> anyhow::Result<()> {
    let path = target.key_path()?;
    with_document(root, &target.file, Edit::Delete(path.clone()))?;
    report(&target.file, &path, "deleted", json)
}

pub fn extend(root: &Path, target: DocArgs, raw: &[String], json: bool) -> anyhow::Result<()> {
    let path = target.key_path()?;
    let values = raw.iter().map(|v| parse_value(v)).collect();
    with_document(root, &target.file, Edit::Extend(path.clone(), values))?;
    report(&target.file, &path, "extended", json)
}

pub fn remove(root: &Path, target: DocArgs, raw: &[String], json: bool) -> anyhow::Result<()> {
    let path = target.key_path()?;
    let values = raw.iter().map(|v| parse_value(v)).collect();
    with_document(root, &target.file, Edit::Remove(path.clone(), values))?;
    report(&target.file, &path, "removed from", json)
}

fn report(file: &Path, path: &KeyPath, action: &str, json: bool) -> anyhow::Result<()> {
    tracing::info!(file = %file.display(), key = %path, action, "document updated");
    if json {
        print_json(&serde_json::json!({
            "file": file.display().to_string(),
            "key": path.to_string(),
            "action": action,
        }))?;
    } else {
        println!("{action} {path} in {}", file.display());
    }
    Ok(())
}
