use crate::error::{ConfweldError, Result};
use regex::Regex;
use std::fmt;

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One step of a [`KeyPath`]: an exact key or a pattern matched against
/// the whole key.
#[derive(Debug, Clone)]
pub enum Segment {
    Literal(String),
    Pattern(Regex),
}

impl Segment {
    /// Compile a pattern segment. The expression must match a key in full.
    pub fn pattern(expr: &str) -> Result<Self> {
        Ok(Segment::Pattern(Regex::new(&format!("^(?:{expr})$"))?))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Segment::Literal(s) => s == key,
            Segment::Pattern(re) => re.is_match(key),
        }
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Segment::Literal(s) => Some(s),
            Segment::Pattern(_) => None,
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Segment::Pattern(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(s) => f.write_str(s),
            Segment::Pattern(re) => {
                let src = re.as_str();
                let inner = src
                    .strip_prefix("^(?:")
                    .and_then(|s| s.strip_suffix(")$"))
                    .unwrap_or(src);
                write!(f, "/{inner}/")
            }
        }
    }
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        Segment::Literal(s.to_string())
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        Segment::Literal(s)
    }
}

// ---------------------------------------------------------------------------
// KeyPath
// ---------------------------------------------------------------------------

/// Address of a location inside a hierarchical document.
#[derive(Debug, Clone, Default)]
pub struct KeyPath {
    segments: Vec<Segment>,
}

impl KeyPath {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// The empty path, addressing the document root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn literal<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: keys
                .into_iter()
                .map(|k| Segment::Literal(k.into()))
                .collect(),
        }
    }

    /// Parse command-line notation: each argument is one segment and an
    /// argument wrapped in slashes (`/tool\..*/`) is a pattern.
    pub fn parse_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut segments = Vec::with_capacity(args.len());
        for arg in args {
            let arg = arg.as_ref();
            let seg = match arg.strip_prefix('/').and_then(|s| s.strip_suffix('/')) {
                Some(expr) if arg.len() >= 2 => Segment::pattern(expr)?,
                _ => Segment::Literal(arg.to_string()),
            };
            segments.push(seg);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn has_pattern(&self) -> bool {
        self.segments.iter().any(Segment::is_pattern)
    }

    /// The plain keys of a write path. Any pattern segment is rejected.
    pub fn literal_keys(&self) -> Result<Vec<String>> {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(k) => Ok(k.clone()),
                Segment::Pattern(_) => Err(ConfweldError::PatternNotAllowed(self.to_string())),
            })
            .collect()
    }

    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl<S: Into<Segment>> FromIterator<S> for KeyPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&[&str]> for KeyPath {
    fn from(keys: &[&str]) -> Self {
        keys.iter().copied().collect()
    }
}

impl<const N: usize> From<[&str; N]> for KeyPath {
    fn from(keys: [&str; N]) -> Self {
        keys.into_iter().collect()
    }
}

impl From<Vec<String>> for KeyPath {
    fn from(keys: Vec<String>) -> Self {
        keys.into_iter().collect()
    }
}

/// Render concrete keys the way error messages show paths.
pub(crate) fn join_keys(keys: &[String]) -> String {
    keys.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_is_full_match() {
        let seg = Segment::pattern("flake8|ruff").unwrap();
        assert!(seg.matches("ruff"));
        assert!(!seg.matches("ruff-format"));
        assert!(!seg.matches("xruff"));
    }

    #[test]
    fn parse_args_recognises_patterns() {
        let path = KeyPath::parse_args(&["tool", "/ru.*/", "select"]).unwrap();
        assert!(path.segments()[1].is_pattern());
        assert_eq!(path.to_string(), "tool./ru.*/.select");
        assert!(path.literal_keys().is_err());
    }

    #[test]
    fn single_slash_is_literal() {
        let path = KeyPath::parse_args(&["/"]).unwrap();
        assert_eq!(path.segments()[0].as_literal(), Some("/"));
    }

    #[test]
    fn literal_keys_of_plain_path() {
        let path = KeyPath::from(["tool", "ruff"]);
        assert_eq!(path.literal_keys().unwrap(), vec!["tool", "ruff"]);
        assert_eq!(path.child("lint").len(), 3);
    }
}
