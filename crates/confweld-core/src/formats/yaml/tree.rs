//! Span-annotated YAML tree.
//!
//! Built from `yaml_rust2`'s marked event stream. Every node records the
//! byte range of its text in the source so edits can splice the original
//! text instead of re-serialising the whole document.

use crate::error::ConfweldError;
use crate::value::{Map, Value};
use std::collections::HashMap;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

const INDENT_HINT: &str =
    "a key may be indented deeper than its siblings, or a value is missing its indentation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    /// Byte offset of the node's own text (after any anchor or tag).
    pub start: usize,
    pub end: usize,
    pub anchor: Option<String>,
    /// Resolved semantic value, aliases expanded.
    pub value: Value,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Scalar { text: String, style: ScalarStyle, empty: bool },
    Alias,
    Mapping { flow: bool, entries: Vec<Entry> },
    Sequence { flow: bool, items: Vec<Node> },
}

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub key: Node,
    pub value: Node,
}

impl Entry {
    pub fn key_text(&self) -> String {
        match &self.key.kind {
            NodeKind::Scalar { text, .. } => text.clone(),
            _ => self.key.value.to_string(),
        }
    }
}

impl Node {
    pub fn entries(&self) -> Option<&[Entry]> {
        match &self.kind {
            NodeKind::Mapping { entries, .. } => Some(entries),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Sequence { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn is_flow(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Mapping { flow: true, .. } | NodeKind::Sequence { flow: true, .. }
        )
    }

    /// An empty value (`key:`) or an explicit null.
    pub fn is_null(&self) -> bool {
        matches!(self.kind, NodeKind::Scalar { .. }) && self.value.is_null()
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries()?.iter().find(|e| e.key_text() == key)
    }

    /// Anchor names in document order.
    pub fn collect_anchors<'a>(&'a self, out: &mut Vec<(&'a str, &'a Value)>) {
        if let Some(name) = &self.anchor {
            out.push((name, &self.value));
        }
        match &self.kind {
            NodeKind::Mapping { entries, .. } => {
                for e in entries {
                    e.key.collect_anchors(out);
                    e.value.collect_anchors(out);
                }
            }
            NodeKind::Sequence { items, .. } => {
                for item in items {
                    item.collect_anchors(out);
                }
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse the first document of `src`. `Ok(None)` for empty or
/// comment-only input.
pub(crate) fn parse(src: &str) -> Result<Option<Node>, ConfweldError> {
    let mut builder = Builder::new(src);
    let mut parser = Parser::new_from_str(src);
    if let Err(e) = parser.load(&mut builder, false) {
        let message = e.to_string();
        let hint = message
            .contains("mapping values are not allowed")
            .then(|| INDENT_HINT.to_string());
        return Err(ConfweldError::Decode { message, hint });
    }
    Ok(builder.root)
}

enum Frame {
    Mapping {
        start: usize,
        flow: bool,
        anchor: Option<(usize, String)>,
        entries: Vec<Entry>,
        pending_key: Option<Node>,
    },
    Sequence {
        start: usize,
        flow: bool,
        anchor: Option<(usize, String)>,
        items: Vec<Node>,
    },
}

struct Builder<'s> {
    src: &'s str,
    /// Byte offset of every char index, plus one past the end.
    offsets: Vec<usize>,
    stack: Vec<Frame>,
    root: Option<Node>,
    anchors: HashMap<usize, Value>,
    last_end: usize,
}

impl<'s> Builder<'s> {
    fn new(src: &'s str) -> Self {
        let mut offsets: Vec<usize> = src.char_indices().map(|(i, _)| i).collect();
        offsets.push(src.len());
        Self {
            src,
            offsets,
            stack: Vec::new(),
            root: None,
            anchors: HashMap::new(),
            last_end: 0,
        }
    }

    fn byte(&self, mark: &Marker) -> usize {
        self.offsets
            .get(mark.index())
            .copied()
            .unwrap_or(self.src.len())
    }

    /// The `&name` written between the previous node and `start`.
    fn anchor_name(&self, start: usize) -> Option<String> {
        let from = self.last_end.min(start);
        let gap: String = self.src[from..start]
            .lines()
            .map(strip_comment)
            .collect::<Vec<_>>()
            .join("\n");
        let at = gap.rfind('&')?;
        let name: String = gap[at + 1..]
            .chars()
            .take_while(|c| !c.is_whitespace() && !",[]{}".contains(*c))
            .collect();
        (!name.is_empty()).then_some(name)
    }

    fn named_anchor(&self, id: usize, start: usize) -> Option<(usize, String)> {
        if id == 0 {
            return None;
        }
        self.anchor_name(start).map(|name| (id, name))
    }

    fn scalar(&mut self, text: String, style: TScalarStyle, anchor_id: usize, mark: &Marker) {
        let mut start = self.byte(mark);
        let style = match style {
            TScalarStyle::SingleQuoted => ScalarStyle::SingleQuoted,
            TScalarStyle::DoubleQuoted => ScalarStyle::DoubleQuoted,
            TScalarStyle::Literal => ScalarStyle::Literal,
            TScalarStyle::Folded => ScalarStyle::Folded,
            _ => ScalarStyle::Plain,
        };
        // Omitted values arrive as empty plain scalars marked at the next token.
        let empty = style == ScalarStyle::Plain
            && (text.is_empty() || (text == "~" && !self.src[start..].starts_with('~')));
        let end = if empty {
            start = self.empty_position();
            properties_end(self.src, start)
        } else {
            match style {
                ScalarStyle::SingleQuoted => quoted_end(self.src, start, '\''),
                ScalarStyle::DoubleQuoted => quoted_end(self.src, start, '"'),
                ScalarStyle::Literal | ScalarStyle::Folded => {
                    start = block_header(self.src, self.last_end.min(start), start);
                    block_scalar_end(self.src, start)
                }
                ScalarStyle::Plain => plain_end(self.src, start, &text),
            }
        };
        let anchor = self.named_anchor(anchor_id, if empty { end } else { start });
        let value = match style {
            ScalarStyle::Plain if empty => Value::Null,
            ScalarStyle::Plain => plain_value(&text),
            _ => Value::String(text.clone()),
        };
        self.finish(
            Node {
                start,
                end,
                anchor: None,
                value,
                kind: NodeKind::Scalar { text, style, empty },
            },
            anchor,
        );
    }

    /// Where an omitted value sits: just after the `:` of the pending key,
    /// or after the `-` of an empty sequence item.
    fn empty_position(&self) -> usize {
        let (from, marker) = match self.stack.last() {
            Some(Frame::Mapping {
                pending_key: Some(key),
                ..
            }) => (key.end, ':'),
            Some(Frame::Sequence { .. }) => (self.last_end, '-'),
            _ => return self.last_end,
        };
        let rest = &self.src[from..];
        let skipped = rest.len() - rest.trim_start().len();
        if rest[skipped..].starts_with(marker) {
            from + skipped + 1
        } else {
            from
        }
    }

    fn alias(&mut self, id: usize, mark: &Marker) {
        let start = self.byte(mark);
        let name_len = self.src[start..]
            .chars()
            .skip(1)
            .take_while(|c| !c.is_whitespace() && !",[]{}".contains(*c))
            .map(char::len_utf8)
            .sum::<usize>();
        let value = self.anchors.get(&id).cloned().unwrap_or(Value::Null);
        self.finish(
            Node {
                start,
                end: start + 1 + name_len,
                anchor: None,
                value,
                kind: NodeKind::Alias,
            },
            None,
        );
    }

    fn start_collection(&mut self, anchor_id: usize, mark: &Marker, mapping: bool) {
        let mut start = self.byte(mark);
        // A sequence written flush with its key (`key:\n- a`) is marked at
        // its first item's content rather than at the dash.
        let indentless = match self.stack.last() {
            Some(Frame::Mapping {
                pending_key: Some(_),
                ..
            }) if !mapping => dash_before(self.src, start),
            _ => None,
        };
        if let Some(dash) = indentless {
            start = dash;
        }
        let open = if mapping { '{' } else { '[' };
        let flow = indentless.is_none() && self.src[start..].starts_with(open);
        let anchor = self.named_anchor(anchor_id, start);
        self.last_end = if flow { start + 1 } else { start };
        self.stack.push(if mapping {
            Frame::Mapping {
                start,
                flow,
                anchor,
                entries: Vec::new(),
                pending_key: None,
            }
        } else {
            Frame::Sequence {
                start,
                flow,
                anchor,
                items: Vec::new(),
            }
        });
    }

    fn end_collection(&mut self, mark: &Marker) {
        let close = self.byte(mark);
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let (node, anchor) = match frame {
            Frame::Mapping {
                start,
                flow,
                anchor,
                entries,
                ..
            } => {
                let end = if flow {
                    close + 1
                } else {
                    entries.last().map_or(start, |e| e.value.end.max(e.key.end))
                };
                let map: Map<String, Value> = entries
                    .iter()
                    .map(|e| (e.key_text(), e.value.value.clone()))
                    .collect();
                (
                    Node {
                        start,
                        end,
                        anchor: None,
                        value: Value::Object(map),
                        kind: NodeKind::Mapping { flow, entries },
                    },
                    anchor,
                )
            }
            Frame::Sequence {
                start,
                flow,
                anchor,
                items,
            } => {
                let end = if flow {
                    close + 1
                } else {
                    items.last().map_or(start, |i| i.end)
                };
                let values = items.iter().map(|i| i.value.clone()).collect();
                (
                    Node {
                        start,
                        end,
                        anchor: None,
                        value: Value::Array(values),
                        kind: NodeKind::Sequence { flow, items },
                    },
                    anchor,
                )
            }
        };
        self.finish(node, anchor);
    }

    fn finish(&mut self, mut node: Node, anchor: Option<(usize, String)>) {
        if let Some((id, name)) = anchor {
            self.anchors.insert(id, node.value.clone());
            node.anchor = Some(name);
        }
        self.last_end = node.end;
        match self.stack.last_mut() {
            Some(Frame::Mapping {
                entries,
                pending_key,
                ..
            }) => match pending_key.take() {
                Some(key) => entries.push(Entry { key, value: node }),
                None => *pending_key = Some(node),
            },
            Some(Frame::Sequence { items, .. }) => items.push(node),
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
        }
    }
}

impl MarkedEventReceiver for Builder<'_> {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        match ev {
            Event::Scalar(text, style, anchor_id, ..) => self.scalar(text, style, anchor_id, &mark),
            Event::Alias(id) => self.alias(id, &mark),
            Event::MappingStart(anchor_id, ..) => self.start_collection(anchor_id, &mark, true),
            Event::SequenceStart(anchor_id, ..) => self.start_collection(anchor_id, &mark, false),
            Event::MappingEnd | Event::SequenceEnd => self.end_collection(&mark),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Source spans
// ---------------------------------------------------------------------------

fn strip_comment(line: &str) -> &str {
    let mut prev_space = true;
    for (i, c) in line.char_indices() {
        if c == '#' && prev_space {
            return &line[..i];
        }
        prev_space = c.is_whitespace();
    }
    line
}

fn quoted_end(src: &str, start: usize, quote: char) -> usize {
    let mut chars = src[start..].char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' if quote == '"' => {
                chars.next();
            }
            c if c == quote => {
                if quote == '\'' && chars.peek().is_some_and(|&(_, n)| n == '\'') {
                    chars.next();
                    continue;
                }
                return start + i + 1;
            }
            _ => {}
        }
    }
    src.len()
}

/// The `|` or `>` introducing a block scalar whose content is marked at
/// `mark`. Only properties, whitespace and comments sit between `from` and
/// the header; a header with no content lines is marked directly.
fn block_header(src: &str, from: usize, mark: usize) -> usize {
    let mut comment = false;
    let mut prev_space = true;
    for (i, c) in src[from..mark].char_indices() {
        match c {
            '\n' => comment = false,
            '#' if prev_space => comment = true,
            '|' | '>' if !comment => return from + i,
            _ => {}
        }
        prev_space = c.is_whitespace();
    }
    mark
}

/// Past any `&anchor` or `!tag` written after an omitted value's colon.
fn properties_end(src: &str, start: usize) -> usize {
    let mut end = start;
    loop {
        let rest = &src[end..];
        let blanks = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        let word = &rest[blanks..];
        if !word.starts_with(['&', '!']) {
            return end;
        }
        end += blanks + word.find(char::is_whitespace).unwrap_or(word.len());
    }
}

/// The `-` ahead of `pos` on its line, with only blanks in between.
fn dash_before(src: &str, pos: usize) -> Option<usize> {
    let before = src[..pos].trim_end_matches([' ', '\t']);
    let dash = before.strip_suffix('-')?.len();
    let lead = &src[line_start(src, dash)..dash];
    lead.chars().all(|c| c == ' ' || c == '-').then_some(dash)
}

fn line_start(src: &str, pos: usize) -> usize {
    src[..pos].rfind('\n').map_or(0, |i| i + 1)
}

/// Literal and folded scalars run until the first non-blank line indented
/// less than their first content line.
fn block_scalar_end(src: &str, start: usize) -> usize {
    let header_end = src[start..].find('\n').map_or(src.len(), |i| start + i);
    let mut end = header_end;
    let mut indent: Option<usize> = None;
    let mut pos = header_end;
    while pos < src.len() {
        let line_start = pos + 1;
        let line_end = src[line_start..]
            .find('\n')
            .map_or(src.len(), |i| line_start + i);
        let line = &src[line_start.min(src.len())..line_end];
        if line.trim().is_empty() {
            pos = line_end;
            continue;
        }
        let this = line.len() - line.trim_start_matches(' ').len();
        match indent {
            None if this == 0 => break,
            None => indent = Some(this),
            Some(min) if this < min => break,
            Some(_) => {}
        }
        end = line_end;
        pos = line_end;
    }
    end
}

/// Plain scalars fold line breaks into spaces, so a multi-line one is
/// found word by word.
fn plain_end(src: &str, start: usize, text: &str) -> usize {
    if src[start..].starts_with(text) {
        return start + text.len();
    }
    let mut cursor = start;
    for word in text.split_whitespace() {
        match src[cursor..].find(word) {
            Some(i) => cursor += i + word.len(),
            None => break,
        }
    }
    cursor
}

/// Core-schema typing of an unquoted scalar.
pub(crate) fn plain_value(text: &str) -> Value {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return Value::Null,
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        _ => {}
    }
    let radix = [("0x", 16), ("0o", 8), ("0b", 2)]
        .into_iter()
        .find_map(|(prefix, radix)| text.strip_prefix(prefix).map(|digits| (digits, radix)));
    if let Some((digits, radix)) = radix {
        if let Ok(n) = i64::from_str_radix(digits, radix) {
            return Value::from(n);
        }
        return Value::String(text.to_string());
    }
    if let Ok(n) = text.strip_prefix('+').unwrap_or(text).parse::<i64>() {
        return Value::from(n);
    }
    let numeric = text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if numeric {
        if let Some(n) = text.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}
