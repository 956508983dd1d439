pub mod config;
pub mod doc;
pub mod weld;

use anyhow::Context;
use confweld_core::config::Config;
use confweld_core::formats::{IniDocument, TomlDocument, YamlDocument};
use confweld_core::value::Value;
use confweld_core::{ConfweldError, DocumentManager, Format, KeyPath, KeyValueDocument, OpenDocuments};
use std::path::Path;
use tracing::debug;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// A document type the command layer can open.
pub trait Backend: KeyValueDocument {
    fn options(config: &Config) -> Self::Options;

    /// Adjust a value parsed from the command line to what the format stores.
    fn prepare(value: Value) -> Value {
        value
    }

    fn write_anchored(
        &mut self,
        _path: &KeyPath,
        _value: Value,
        _anchor: &str,
        _exists_ok: bool,
    ) -> confweld_core::Result<()> {
        Err(ConfweldError::Unsupported(format!(
            "anchors in {} files",
            Self::FORMAT
        )))
    }
}

impl Backend for TomlDocument {
    fn options(_config: &Config) -> Self::Options {}
}

impl Backend for YamlDocument {
    fn options(config: &Config) -> Self::Options {
        config.yaml.clone()
    }

    fn write_anchored(
        &mut self,
        path: &KeyPath,
        value: Value,
        anchor: &str,
        exists_ok: bool,
    ) -> confweld_core::Result<()> {
        self.set_anchored(path, value, anchor, exists_ok)
    }
}

impl Backend for IniDocument {
    fn options(config: &Config) -> Self::Options {
        config.ini.clone()
    }

    /// INI holds text only, so `--value 88` means the string "88".
    fn prepare(value: Value) -> Value {
        match value {
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            Value::Array(items) => Value::Array(items.into_iter().map(Self::prepare).collect()),
            Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Self::prepare(v))).collect())
            }
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Work done inside one document scope, whatever the backend.
pub trait DocumentOp {
    type Output;

    fn apply<D: Backend>(self, doc: &mut DocumentManager<'_, D>) -> confweld_core::Result<Self::Output>;
}

/// Open `file` with the backend its name implies, run `op` and write the
/// result back when it succeeds.
pub fn with_document<O: DocumentOp>(root: &Path, file: &Path, op: O) -> anyhow::Result<O::Output> {
    let config = Config::load(root).context("failed to load config")?;
    let format = Format::from_path(file)
        .with_context(|| format!("cannot tell the format of {}", file.display()))?;
    match format {
        Format::Toml => scoped::<TomlDocument, O>(file, &config, op),
        Format::Yaml => scoped::<YamlDocument, O>(file, &config, op),
        Format::Ini => scoped::<IniDocument, O>(file, &config, op),
    }
}

fn scoped<D: Backend, O: DocumentOp>(file: &Path, config: &Config, op: O) -> anyhow::Result<O::Output> {
    debug!(path = %file.display(), format = %D::FORMAT, "opening document");
    let registry = OpenDocuments::new();
    let out = registry.edit::<D, _, _>(file, D::options(config), |doc| op.apply(doc))?;
    debug!(path = %file.display(), "document scope closed");
    Ok(out)
}

/// JSON when it parses, a plain string otherwise.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
