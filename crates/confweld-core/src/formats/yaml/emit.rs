//! Text for new YAML content.
//!
//! Everything here produces fragments that are spliced into an existing
//! document, so the first line of a fragment never carries indentation;
//! the caller already sits at the right column.

use super::tree::plain_value;
use crate::value::{Map, Value};

/// Block layout, in columns relative to the owning key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Indentation {
    pub mapping: usize,
    /// Column of a sequence item's content.
    pub sequence: usize,
    /// Column of the `-`.
    pub offset: usize,
}

impl Indentation {
    /// Distance from a `-` to its item's content.
    pub fn gap(&self) -> usize {
        self.sequence.saturating_sub(self.offset).max(2)
    }
}

/// What ends up after a key.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fragment<'v> {
    Value(&'v Value),
    Anchored { name: &'v str, value: &'v Value },
    Alias(&'v str),
}

pub(crate) fn indent(n: usize) -> String {
    " ".repeat(n)
}

// ---------------------------------------------------------------------------
// Block context
// ---------------------------------------------------------------------------

/// `keys[0]:` nested down to `keys[last]: <fragment>`, first key at `col`.
pub(crate) fn entry(keys: &[String], fragment: &Fragment<'_>, col: usize, ind: &Indentation) -> String {
    let Some((first, rest)) = keys.split_first() else {
        return String::new();
    };
    let mut out = format!("{}:", key(first, false));
    if rest.is_empty() {
        out.push_str(&after_colon(fragment, col, ind));
    } else {
        let child = col + ind.mapping;
        out.push('\n');
        out.push_str(&indent(child));
        out.push_str(&entry(rest, fragment, child, ind));
    }
    out
}

/// The text following `key:` for a key at `col`, leading space included.
pub(crate) fn after_colon(fragment: &Fragment<'_>, col: usize, ind: &Indentation) -> String {
    match fragment {
        Fragment::Alias(name) => format!(" *{name}"),
        Fragment::Value(value) => value_after_colon(value, "", col, ind),
        Fragment::Anchored { name, value } => {
            value_after_colon(value, &format!(" &{name}"), col, ind)
        }
    }
}

fn value_after_colon(value: &Value, tag: &str, col: usize, ind: &Indentation) -> String {
    match value {
        Value::Object(map) if !map.is_empty() => {
            let child = col + ind.mapping;
            format!("{tag}\n{}{}", indent(child), mapping_body(map, child, ind))
        }
        Value::Array(items) if !items.is_empty() => {
            let dash = col + ind.offset;
            format!(
                "{tag}\n{}{}",
                indent(dash),
                sequence_body(items, dash, ind.gap(), ind)
            )
        }
        Value::String(s) if literal_candidate(s) => {
            format!("{tag} {}", literal(s, col + ind.mapping))
        }
        other => format!("{tag} {}", scalar(other)),
    }
}

fn mapping_body(map: &Map<String, Value>, col: usize, ind: &Indentation) -> String {
    map.iter()
        .map(|(k, v)| format!("{}:{}", key(k, false), value_after_colon(v, "", col, ind)))
        .collect::<Vec<_>>()
        .join(&format!("\n{}", indent(col)))
}

fn sequence_body(items: &[Value], dash: usize, gap: usize, ind: &Indentation) -> String {
    items
        .iter()
        .map(|v| seq_item(v, dash, gap, ind))
        .collect::<Vec<_>>()
        .join(&format!("\n{}", indent(dash)))
}

/// One `- item` whose dash sits at `dash` and content at `dash + gap`.
pub(crate) fn seq_item(value: &Value, dash: usize, gap: usize, ind: &Indentation) -> String {
    let gap = gap.max(2);
    let content = dash + gap;
    let lead = format!("-{}", indent(gap - 1));
    match value {
        Value::Object(map) if !map.is_empty() => {
            format!("{lead}{}", mapping_body(map, content, ind))
        }
        Value::Array(items) if !items.is_empty() => {
            format!(
                "-\n{}{}",
                indent(content),
                sequence_body(items, content, gap, ind)
            )
        }
        Value::String(s) if literal_candidate(s) => format!("{lead}{}", literal(s, content)),
        other => format!("{lead}{}", scalar(other)),
    }
}

/// Multi-line strings that read back unchanged as a `|` block.
fn literal_candidate(s: &str) -> bool {
    s.contains('\n')
        && !s.starts_with(char::is_whitespace)
        && !s.ends_with("\n\n")
        && !s.chars().any(|c| c.is_control() && c != '\n' && c != '\t')
}

fn literal(s: &str, col: usize) -> String {
    let (header, body) = match s.strip_suffix('\n') {
        Some(body) => ("|", body),
        None => ("|-", s),
    };
    let mut out = header.to_string();
    for line in body.split('\n') {
        out.push('\n');
        if !line.is_empty() {
            out.push_str(&indent(col));
            out.push_str(line);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Flow context and scalars
// ---------------------------------------------------------------------------

/// `k1: {k2: <fragment>}` for insertion into a flow mapping.
pub(crate) fn flow_entry(keys: &[String], fragment: &Fragment<'_>) -> String {
    match keys.split_first() {
        None => flow_fragment(fragment),
        Some((first, [])) => format!("{}: {}", key(first, true), flow_fragment(fragment)),
        Some((first, rest)) => format!("{}: {{{}}}", key(first, true), flow_entry(rest, fragment)),
    }
}

pub(crate) fn flow_fragment(fragment: &Fragment<'_>) -> String {
    match fragment {
        Fragment::Value(value) => flow(value),
        Fragment::Anchored { name, value } => format!("&{name} {}", flow(value)),
        Fragment::Alias(name) => format!("*{name}"),
    }
}

pub(crate) fn flow(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let body: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", key(k, true), flow(v)))
                .collect();
            format!("{{{}}}", body.join(", "))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(flow).collect();
            format!("[{}]", body.join(", "))
        }
        Value::String(s) => quote(s, true),
        other => scalar(other),
    }
}

/// A value that fits on the line after `key: `.
pub(crate) fn is_inline(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => !literal_candidate(s),
        _ => true,
    }
}

/// Scalar text in block context.
pub(crate) fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s, false),
        collection => flow(collection),
    }
}

fn key(k: &str, flow: bool) -> String {
    quote(k, flow)
}

pub(crate) fn quote(s: &str, flow: bool) -> String {
    if !needs_quotes(s, flow) {
        s.to_string()
    } else if s.chars().any(char::is_control) {
        double_quoted(s)
    } else {
        single_quoted(s)
    }
}

fn needs_quotes(s: &str, flow: bool) -> bool {
    let Some(first) = s.chars().next() else {
        return true;
    };
    if plain_value(s) != Value::String(s.to_string()) {
        return true;
    }
    if "#&*!|>'\"%@`,[]{}".contains(first) {
        return true;
    }
    if matches!(first, '-' | '?' | ':') && s[1..].chars().next().map_or(true, |c| c == ' ') {
        return true;
    }
    if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
        return true;
    }
    if s.contains(": ") || s.contains(" #") || s.ends_with(':') || s.chars().any(char::is_control) {
        return true;
    }
    flow && s.contains(|c| ",[]{}".contains(c))
}

pub(crate) fn single_quoted(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub(crate) fn double_quoted(s: &str) -> String {
    let mut out = String::from('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

pub(crate) fn line_start(src: &str, pos: usize) -> usize {
    src[..pos].rfind('\n').map_or(0, |i| i + 1)
}

pub(crate) fn line_end(src: &str, pos: usize) -> usize {
    src[pos..].find('\n').map_or(src.len(), |i| pos + i)
}

/// Just past the newline ending the line that holds `pos`.
pub(crate) fn past_line(src: &str, pos: usize) -> usize {
    (line_end(src, pos) + 1).min(src.len())
}

pub(crate) fn column(src: &str, pos: usize) -> usize {
    src[line_start(src, pos)..pos].chars().count()
}
