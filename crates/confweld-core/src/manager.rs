//! Scoped access to configuration files.
//!
//! Files are opened through an [`OpenDocuments`] registry that admits one
//! open scope per path. [`DocumentManager::close`] writes pending changes;
//! dropping a manager releases its path whether or not it was closed.

use crate::document::KeyValueDocument;
use crate::error::{ConfweldError, Result};
use crate::io::{atomic_write, read_optional};
use crate::keypath::KeyPath;
use crate::merge::MergeTarget;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// OpenDocuments
// ---------------------------------------------------------------------------

/// Registry of paths with a live [`DocumentManager`].
#[derive(Debug, Default)]
pub struct OpenDocuments {
    open: RefCell<BTreeSet<PathBuf>>,
}

impl OpenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.open.borrow().contains(&registry_key(path))
    }

    pub fn open<D: KeyValueDocument>(&self, path: impl AsRef<Path>) -> Result<DocumentManager<'_, D>> {
        self.open_with(path, D::Options::default())
    }

    /// Open `path` with backend options. Fails with `AlreadyInUse` while
    /// another scope holds the same file.
    pub fn open_with<D: KeyValueDocument>(
        &self,
        path: impl AsRef<Path>,
        options: D::Options,
    ) -> Result<DocumentManager<'_, D>> {
        let path = path.as_ref().to_path_buf();
        let key = registry_key(&path);
        if !self.open.borrow_mut().insert(key.clone()) {
            return Err(ConfweldError::AlreadyInUse(path));
        }
        Ok(DocumentManager {
            registry: self,
            path,
            key,
            options,
            doc: None,
            original: None,
        })
    }

    /// Run `f` inside one scope and write the result when it succeeds.
    pub fn edit<D, T, F>(&self, path: impl AsRef<Path>, options: D::Options, f: F) -> Result<T>
    where
        D: KeyValueDocument,
        F: FnOnce(&mut DocumentManager<'_, D>) -> Result<T>,
    {
        let mut manager = self.open_with::<D>(path, options)?;
        let out = f(&mut manager)?;
        manager.close()?;
        Ok(out)
    }

    fn release(&self, key: &Path) {
        self.open.borrow_mut().remove(key);
    }
}

/// Absolute path with the directory resolved, so `a/./b.toml` and
/// `a/b.toml` share one registration even before the file exists.
fn registry_key(path: &Path) -> PathBuf {
    let absolute = match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    };
    let canonical = absolute
        .parent()
        .zip(absolute.file_name())
        .and_then(|(dir, name)| dir.canonicalize().ok().map(|dir| dir.join(name)));
    canonical.unwrap_or(absolute)
}

// ---------------------------------------------------------------------------
// DocumentManager
// ---------------------------------------------------------------------------

/// One open configuration file. The file is read on first access.
pub struct DocumentManager<'r, D: KeyValueDocument> {
    registry: &'r OpenDocuments,
    path: PathBuf,
    key: PathBuf,
    options: D::Options,
    doc: Option<D>,
    /// Text read from disk; `None` when the file did not exist.
    original: Option<String>,
}

impl<D: KeyValueDocument> DocumentManager<'_, D> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The parsed document, for backend-specific operations.
    pub fn document(&mut self) -> Result<&mut D> {
        self.load()
    }

    fn load(&mut self) -> Result<&mut D> {
        let doc = match self.doc.take() {
            Some(doc) => doc,
            None => {
                let text = read_optional(&self.path)?;
                let doc = D::parse_with(text.as_deref().unwrap_or(""), &self.options)
                    .map_err(|e| e.in_file(&self.path))?;
                self.original = text;
                doc
            }
        };
        Ok(self.doc.insert(doc))
    }

    /// No file on disk and nothing written to it in this scope.
    fn absent(&self) -> bool {
        self.original.is_none() && !self.doc.as_ref().is_some_and(MergeTarget::has_content)
    }

    pub fn contains(&mut self, path: &KeyPath) -> Result<bool> {
        self.load()?.contains(path)
    }

    pub fn get(&mut self, path: &KeyPath) -> Result<Value> {
        self.load()?;
        if self.absent() {
            return Err(ConfweldError::FileNotFound(self.path.clone()));
        }
        self.load()?.get(path)
    }

    pub fn set(&mut self, path: &KeyPath, value: Value, exists_ok: bool) -> Result<()> {
        self.load()?.set(path, value, exists_ok)
    }

    pub fn delete(&mut self, path: &KeyPath) -> Result<()> {
        self.load()?;
        if self.absent() {
            return Err(ConfweldError::FileNotFound(self.path.clone()));
        }
        self.load()?.delete(path)
    }

    pub fn extend_list(&mut self, path: &KeyPath, values: Vec<Value>) -> Result<()> {
        self.load()?.extend_list(path, values)
    }

    pub fn remove_from_list(&mut self, path: &KeyPath, values: &[Value]) -> Result<()> {
        self.load()?.remove_from_list(path, values)
    }

    /// Current rendered text, pending edits included.
    pub fn text(&mut self) -> Result<String> {
        Ok(self.load()?.render())
    }

    /// Write pending changes. A document that was never read, or renders
    /// to what is on disk, writes nothing.
    pub fn commit(&mut self) -> Result<()> {
        let Some(doc) = &self.doc else {
            return Ok(());
        };
        let rendered = doc.render();
        let changed = match &self.original {
            Some(original) => *original != rendered,
            None => doc.has_content(),
        };
        if changed {
            atomic_write(&self.path, rendered.as_bytes())?;
            self.original = Some(rendered);
        }
        Ok(())
    }

    /// Commit and leave the scope.
    pub fn close(mut self) -> Result<()> {
        self.commit()
    }
}

impl<D: KeyValueDocument> fmt::Debug for DocumentManager<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentManager")
            .field("format", &D::FORMAT)
            .field("path", &self.path)
            .field("loaded", &self.doc.is_some())
            .finish()
    }
}

impl<D: KeyValueDocument> Drop for DocumentManager<'_, D> {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::YamlSettings;
    use crate::formats::{IniDocument, TomlDocument, YamlDocument};
    use serde_json::json;
    use tempfile::TempDir;

    fn key(keys: &[&str]) -> KeyPath {
        KeyPath::parse_args(keys).unwrap()
    }

    #[test]
    fn second_open_is_rejected_until_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pyproject.toml");
        let registry = OpenDocuments::new();

        let first = registry.open::<TomlDocument>(&path).unwrap();
        assert!(registry.is_open(&path));
        assert!(matches!(
            registry.open::<TomlDocument>(&path),
            Err(ConfweldError::AlreadyInUse(_))
        ));

        drop(first);
        assert!(!registry.is_open(&path));
        registry.open::<TomlDocument>(&path).unwrap();
    }

    #[test]
    fn equivalent_spellings_share_a_registration() {
        let dir = TempDir::new().unwrap();
        let registry = OpenDocuments::new();
        let _held = registry
            .open::<YamlDocument>(dir.path().join("ci.yml"))
            .unwrap();
        let err = registry
            .open::<YamlDocument>(dir.path().join(".").join("ci.yml"))
            .unwrap_err();
        assert!(matches!(err, ConfweldError::AlreadyInUse(_)));
    }

    #[test]
    fn debug_output_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("setup.cfg");
        std::fs::write(&path, "[flake8]\nmax-line-length = 100\n").unwrap();
        let registry = OpenDocuments::new();
        let mut doc = registry.open::<IniDocument>(&path).unwrap();

        let shown = format!("{doc:?}");
        assert!(shown.contains("Ini"));
        assert!(shown.contains("setup.cfg"));
        assert!(shown.contains("loaded: false"));
        doc.get(&key(&["flake8", "max-line-length"])).unwrap();
        assert!(format!("{doc:?}").contains("loaded: true"));
    }

    #[test]
    fn close_writes_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pyproject.toml");
        std::fs::write(&path, "[project]\nname = \"demo\"  # keep\n").unwrap();
        let registry = OpenDocuments::new();

        let mut doc = registry.open::<TomlDocument>(&path).unwrap();
        doc.set(&key(&["tool", "ruff", "line-length"]), json!(88), false)
            .unwrap();
        doc.close().unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("[project]\nname = \"demo\"  # keep\n"));
        assert!(written.ends_with("[tool.ruff]\nline-length = 88\n"));
        assert!(!registry.is_open(&path));
    }

    #[test]
    fn missing_file_is_not_created_without_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("setup.cfg");
        let registry = OpenDocuments::new();

        let mut doc = registry.open::<IniDocument>(&path).unwrap();
        assert!(!doc.contains(&key(&["flake8"])).unwrap());
        let err = doc.get(&key(&["flake8"])).unwrap_err();
        assert!(matches!(err, ConfweldError::FileNotFound(_)));
        let err = doc.delete(&key(&["flake8"])).unwrap_err();
        assert!(matches!(err, ConfweldError::FileNotFound(_)));
        doc.remove_from_list(&key(&["flake8", "ignore"]), &[json!("E1")])
            .unwrap();
        doc.close().unwrap();
        assert!(!path.exists());

        registry.open::<IniDocument>(&path).unwrap().close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn set_creates_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".github/workflows/ci.yml");
        let registry = OpenDocuments::new();
        let mut doc = registry.open::<YamlDocument>(&path).unwrap();
        doc.extend_list(&key(&["on", "push", "branches"]), vec![json!("main")])
            .unwrap();
        assert_eq!(doc.get(&key(&["on", "push", "branches"])).unwrap(), json!(["main"]));
        doc.close().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "on:\n  push:\n    branches:\n      - main\n"
        );
    }

    #[test]
    fn drop_without_close_discards_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tox.ini");
        std::fs::write(&path, "[tox]\nenvlist = py312\n").unwrap();
        let registry = OpenDocuments::new();
        {
            let mut doc = registry.open::<IniDocument>(&path).unwrap();
            doc.set(&key(&["tox", "envlist"]), json!("py313"), true)
                .unwrap();
        }
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[tox]\nenvlist = py312\n"
        );
        assert!(!registry.is_open(&path));
    }

    #[test]
    fn edit_commits_only_on_success() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ci.yaml");
        std::fs::write(&path, "name: ci\n").unwrap();
        let registry = OpenDocuments::new();

        let err = registry
            .edit::<YamlDocument, (), _>(&path, YamlSettings::default(), |doc| {
                doc.set(&key(&["stage"]), json!("test"), false)?;
                doc.set(&key(&["name"]), json!("other"), false)
            })
            .unwrap_err();
        assert!(matches!(err, ConfweldError::AlreadySet(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "name: ci\n");

        let text = registry
            .edit::<YamlDocument, _, _>(&path, YamlSettings::default(), |doc| {
                doc.set(&key(&["stage"]), json!("test"), false)?;
                doc.text()
            })
            .unwrap();
        assert_eq!(text, "name: ci\nstage: test\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
        assert!(!registry.is_open(&path));
    }

    #[test]
    fn decode_errors_name_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[tool\n").unwrap();
        let registry = OpenDocuments::new();
        let mut doc = registry.open::<TomlDocument>(&path).unwrap();
        let err = doc.get(&key(&["tool"])).unwrap_err();
        assert!(matches!(err, ConfweldError::Decode { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
