use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfweldError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("failed to decode {message}{}", hint_suffix(.hint))]
    Decode {
        message: String,
        hint: Option<String>,
    },

    #[error("configuration value '{0}' is already set")]
    AlreadySet(String),

    #[error("configuration value '{0}' is missing")]
    Missing(String),

    #[error("nesting not supported: {0}")]
    Structural(String),

    #[error("invalid type: {0}")]
    InvalidType(String),

    #[error("{0} is not supported")]
    Unsupported(String),

    #[error("key pattern '{0}' cannot be used to write values")]
    PatternNotAllowed(String),

    #[error("{} is already open in another scope", .0.display())]
    AlreadyInUse(PathBuf),

    #[error("conflicting constraints: {0}")]
    ConflictingConstraints(String),

    #[error("step not found in pipeline: {0}")]
    UnknownStep(String),

    #[error("step already present in pipeline: {0}")]
    StepExists(String),

    #[error("dependency group '{0}' cannot be moved")]
    UnmovableGroup(String),

    #[error("internal consistency failure: {0}")]
    InternalConsistency(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref()
        .map(|h| format!(" (hint: {h})"))
        .unwrap_or_default()
}

impl ConfweldError {
    /// True for the failures that only say "nothing is there".
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            ConfweldError::NotFound(_) | ConfweldError::Missing(_) | ConfweldError::FileNotFound(_)
        )
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        ConfweldError::Decode {
            message: message.into(),
            hint: None,
        }
    }

    /// Prefix a decode failure with the file it came from.
    pub(crate) fn in_file(self, path: &std::path::Path) -> Self {
        match self {
            ConfweldError::Decode { message, hint } => ConfweldError::Decode {
                message: format!("{}: {message}", path.display()),
                hint,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfweldError>;
