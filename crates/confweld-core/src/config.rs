use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = ".confweld.yaml";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// YamlSettings
// ---------------------------------------------------------------------------

/// Indentation used when YAML content has to be written from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YamlSettings {
    /// Infer indentation from the file being edited.
    #[serde(default = "default_guess_indent")]
    pub guess_indent: bool,
    #[serde(default = "default_mapping_indent")]
    pub mapping_indent: usize,
    /// Column of a sequence item's content, relative to its parent key.
    #[serde(default = "default_sequence_indent")]
    pub sequence_indent: usize,
    /// Column of the `-`, relative to its parent key.
    #[serde(default = "default_sequence_offset")]
    pub sequence_offset: usize,
}

fn default_guess_indent() -> bool {
    true
}

fn default_mapping_indent() -> usize {
    2
}

fn default_sequence_indent() -> usize {
    4
}

fn default_sequence_offset() -> usize {
    2
}

impl Default for YamlSettings {
    fn default() -> Self {
        Self {
            guess_indent: default_guess_indent(),
            mapping_indent: default_mapping_indent(),
            sequence_indent: default_sequence_indent(),
            sequence_offset: default_sequence_offset(),
        }
    }
}

// ---------------------------------------------------------------------------
// IniSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IniSettings {
    /// Indent of continuation lines in multi-line option values.
    #[serde(default = "default_continuation_indent")]
    pub continuation_indent: usize,
}

fn default_continuation_indent() -> usize {
    4
}

impl Default for IniSettings {
    fn default() -> Self {
        Self {
            continuation_indent: default_continuation_indent(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub yaml: YamlSettings,
    #[serde(default)]
    pub ini: IniSettings,
}

impl Config {
    /// Load `.confweld.yaml` from `root`, falling back to defaults when the
    /// file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.yaml.mapping_indent == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "yaml.mapping_indent must be at least 1".to_string(),
            });
        }

        if self.yaml.sequence_offset >= self.yaml.sequence_indent {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "yaml.sequence_offset ({}) must be smaller than yaml.sequence_indent ({})",
                    self.yaml.sequence_offset, self.yaml.sequence_indent
                ),
            });
        }

        if self.ini.continuation_indent == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "ini.continuation_indent must be at least 1".to_string(),
            });
        } else if self.ini.continuation_indent > 8 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "ini.continuation_indent={} (>8 is unusual)",
                    self.ini.continuation_indent
                ),
            });
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(cfg.yaml.guess_indent);
        assert_eq!(cfg.yaml.sequence_indent, 4);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            config_path(dir.path()),
            "yaml:\n  guess_indent: false\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert!(!cfg.yaml.guess_indent);
        assert_eq!(cfg.yaml.mapping_indent, 2);
        assert_eq!(cfg.ini.continuation_indent, 4);
    }

    #[test]
    fn offset_must_be_inside_sequence_indent() {
        let mut cfg = Config::default();
        cfg.yaml.sequence_offset = 4;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Error);
    }
}
