//! YAML documents edited in place.
//!
//! The source text is the document. Every edit splices new text into it
//! and reparses, so comments, quoting, block scalars, number styles and
//! anchors outside the edited span stay exactly as written.

mod emit;
mod tree;

use crate::config::YamlSettings;
use crate::document::{Format, KeyValueDocument};
use crate::error::{ConfweldError, Result};
use crate::keypath::{join_keys, KeyPath, Segment};
use crate::merge::MergeTarget;
use crate::value::{Map, Value};
use emit::{column, line_end, line_start, past_line, Fragment, Indentation};
use std::ops::Range;
use tree::{Entry, Node, NodeKind, ScalarStyle};

type Splice = (Range<usize>, String);

#[derive(Debug, Clone)]
pub struct YamlDocument {
    text: String,
    root: Option<Node>,
    indent: Indentation,
}

impl YamlDocument {
    /// Anchor names in document order.
    pub fn anchors(&self) -> Vec<String> {
        let mut found = Vec::new();
        if let Some(root) = &self.root {
            root.collect_anchors(&mut found);
        }
        found.into_iter().map(|(name, _)| name.to_string()).collect()
    }

    /// Write `value` at `path` under the anchor `anchor`.
    ///
    /// When the anchor already names an equal value the path receives an
    /// alias (`*anchor`) instead of a second copy.
    pub fn set_anchored(
        &mut self,
        path: &KeyPath,
        value: Value,
        anchor: &str,
        exists_ok: bool,
    ) -> Result<()> {
        let keys = path.literal_keys()?;
        if keys.is_empty() {
            return Err(ConfweldError::InvalidType(
                "an anchor needs a key to attach to".to_string(),
            ));
        }
        let depth = self.existing_depth(&keys)?;
        let exists = depth == keys.len();
        if exists && !exists_ok {
            return Err(ConfweldError::AlreadySet(join_keys(&keys)));
        }
        let holds_anchor = self
            .node_at(&keys)
            .and_then(|n| n.anchor.as_deref())
            .is_some_and(|name| name == anchor);
        if exists && holds_anchor {
            return self.overwrite(&keys, value);
        }

        let fragment = match self.anchored_value(anchor) {
            Some(existing) if *existing == value => Fragment::Alias(anchor),
            Some(_) => return Err(ConfweldError::AlreadySet(format!("&{anchor}"))),
            None => Fragment::Anchored {
                name: anchor,
                value: &value,
            },
        };
        if exists {
            self.replace_fragment(&keys, &fragment)
        } else {
            self.insert_fragment(&keys, depth, &fragment)
        }
    }

    fn anchored_value(&self, name: &str) -> Option<&Value> {
        let root = self.root.as_ref()?;
        let mut found = Vec::new();
        root.collect_anchors(&mut found);
        found.into_iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// The mapping holding the last key, and that key's entry.
    fn locate(&self, keys: &[String]) -> Option<(&Node, &Entry)> {
        let (last, parents) = keys.split_last()?;
        let mut node = self.root.as_ref()?;
        for key in parents {
            node = &node.entry(key)?.value;
        }
        Some((node, node.entry(last)?))
    }

    fn node_at(&self, keys: &[String]) -> Option<&Node> {
        if keys.is_empty() {
            return self.root.as_ref();
        }
        self.locate(keys).map(|(_, entry)| &entry.value)
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    fn splice(&mut self, mut edits: Vec<Splice>) -> Result<()> {
        edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
        let mut text = self.text.clone();
        for (range, replacement) in edits {
            text.replace_range(range, &replacement);
        }
        let root = tree::parse(&text).map_err(|e| {
            ConfweldError::InternalConsistency(format!("edit produced unparsable YAML: {e}"))
        })?;
        self.text = text;
        self.root = root;
        Ok(())
    }

    fn insert_fragment(
        &mut self,
        keys: &[String],
        depth: usize,
        fragment: &Fragment<'_>,
    ) -> Result<()> {
        let (parent_keys, rest) = keys.split_at(depth);
        let edit = match self.node_at(parent_keys) {
            Some(parent) => self.insertion(parent, parent_keys, rest, fragment)?,
            None if parent_keys.is_empty() => {
                let end = self.text.len();
                let mut text = String::new();
                if end > 0 && !self.text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&emit::entry(rest, fragment, 0, &self.indent));
                text.push('\n');
                (end..end, text)
            }
            None => return Err(ConfweldError::Missing(join_keys(parent_keys))),
        };
        self.splice(vec![edit])
    }

    fn insertion(
        &self,
        parent: &Node,
        parent_keys: &[String],
        rest: &[String],
        fragment: &Fragment<'_>,
    ) -> Result<Splice> {
        match &parent.kind {
            NodeKind::Mapping {
                flow: false,
                entries,
            } => {
                let col = entries
                    .first()
                    .map_or(0, |e| column(&self.text, e.key.start));
                let at = line_end(&self.text, parent.end);
                let text = format!(
                    "\n{}{}",
                    emit::indent(col),
                    emit::entry(rest, fragment, col, &self.indent)
                );
                Ok((at..at, text))
            }
            NodeKind::Mapping {
                flow: true,
                entries,
            } => match entries.last() {
                Some(last) => {
                    let at = last.value.end.max(last.key.end);
                    Ok((at..at, format!(", {}", emit::flow_entry(rest, fragment))))
                }
                None => Ok(self.fill(parent, parent_keys, rest, fragment)),
            },
            _ if parent.is_null() => Ok(self.fill(parent, parent_keys, rest, fragment)),
            _ => Err(ConfweldError::InvalidType(format!(
                "'{}' is not a mapping",
                display_keys(parent_keys)
            ))),
        }
    }

    /// Replace an empty value (`key:`, `~`, `{}`) with a fresh mapping.
    fn fill(
        &self,
        parent: &Node,
        parent_keys: &[String],
        rest: &[String],
        fragment: &Fragment<'_>,
    ) -> Splice {
        let range = parent.start..parent.end;
        let Some((container, entry)) = self.locate(parent_keys) else {
            let col = column(&self.text, parent.start);
            return (range, emit::entry(rest, fragment, col, &self.indent));
        };
        if container.is_flow() {
            return (range, format!("{{{}}}", emit::flow_entry(rest, fragment)));
        }
        let col = column(&self.text, entry.key.start) + self.indent.mapping;
        let anchor = parent
            .anchor
            .as_ref()
            .map(|name| format!(" &{name}"))
            .unwrap_or_default();
        let text = format!(
            "{anchor}\n{}{}",
            emit::indent(col),
            emit::entry(rest, fragment, col, &self.indent)
        );
        (colon_end(&self.text, entry)..parent.end, text)
    }

    fn replace_fragment(&mut self, keys: &[String], fragment: &Fragment<'_>) -> Result<()> {
        let edit = {
            let (container, entry) = self
                .locate(keys)
                .ok_or_else(|| ConfweldError::Missing(join_keys(keys)))?;
            let old = &entry.value;
            if container.is_flow() {
                (old.start..old.end, emit::flow_fragment(fragment))
            } else {
                match (fragment, &old.kind) {
                    (
                        Fragment::Value(value),
                        NodeKind::Scalar {
                            style,
                            empty: false,
                            ..
                        },
                    ) if emit::is_inline(value) => (old.start..old.end, styled_scalar(value, *style)),
                    _ => {
                        let anchored;
                        let fragment = match (fragment, &old.anchor) {
                            (Fragment::Value(value), Some(name)) => {
                                anchored = Fragment::Anchored {
                                    name: name.as_str(),
                                    value: *value,
                                };
                                &anchored
                            }
                            _ => fragment,
                        };
                        let col = column(&self.text, entry.key.start);
                        (
                            colon_end(&self.text, entry)..old.end,
                            emit::after_colon(fragment, col, &self.indent),
                        )
                    }
                }
            }
        };
        self.splice(vec![edit])
    }

    fn clear(&mut self) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let range = line_start(&self.text, root.start)..past_line(&self.text, root.end);
        self.splice(vec![(range, String::new())])
    }

    /// Remove the entry at `keys`, then any mapping it leaves empty.
    fn delete_entry(&mut self, keys: &[String]) -> Result<()> {
        let missing = || ConfweldError::Missing(join_keys(keys));
        let range = {
            let (container, entry) = self.locate(keys).ok_or_else(missing)?;
            let entries = container.entries().ok_or_else(missing)?;
            if entries.len() == 1 {
                return match keys.split_last() {
                    Some((_, parents)) if !parents.is_empty() => self.delete_entry(parents),
                    _ => self.clear(),
                };
            }
            let idx = entries
                .iter()
                .position(|e| e.key.start == entry.key.start)
                .ok_or_else(missing)?;
            let next = entries.get(idx + 1);
            if container.is_flow() {
                match next {
                    Some(next) => entry.key.start..next.key.start,
                    None => entries[idx - 1].value.end..entry.value.end,
                }
            } else {
                let start = line_start(&self.text, entry.key.start);
                let own_line = self.text[start..entry.key.start].trim().is_empty();
                match next {
                    // `- first: 1` shares its line with the item dash.
                    Some(next) if !own_line => entry.key.start..next.key.start,
                    _ => start..past_line(&self.text, entry.value.end.max(entry.key.end)),
                }
            }
        };
        self.splice(vec![(range, String::new())])
    }
}

fn display_keys(keys: &[String]) -> String {
    if keys.is_empty() {
        "<root>".to_string()
    } else {
        join_keys(keys)
    }
}

/// Just past the `:` that follows an entry's key.
fn colon_end(src: &str, entry: &Entry) -> usize {
    src[entry.key.end..]
        .find(':')
        .map_or(entry.value.start, |i| entry.key.end + i + 1)
}

/// Keep the quote style of the scalar being replaced.
fn styled_scalar(value: &Value, style: ScalarStyle) -> String {
    match (value, style) {
        (Value::String(s), ScalarStyle::DoubleQuoted) => emit::double_quoted(s),
        (Value::String(s), ScalarStyle::SingleQuoted) if !s.chars().any(char::is_control) => {
            emit::single_quoted(s)
        }
        _ => emit::scalar(value),
    }
}

fn resolve<'v>(value: &'v Value, segments: &[Segment]) -> Option<&'v Value> {
    let Some((seg, rest)) = segments.split_first() else {
        return Some(value);
    };
    let map = value.as_object()?;
    match seg {
        Segment::Literal(key) => resolve(map.get(key)?, rest),
        Segment::Pattern(_) => map
            .iter()
            .filter(|(key, _)| seg.matches(key))
            .find_map(|(_, v)| resolve(v, rest)),
    }
}

/// Every concrete key path in `node` matching `segments`.
fn expand(node: &Node, segments: &[Segment], prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
    let Some((seg, rest)) = segments.split_first() else {
        out.push(prefix.clone());
        return;
    };
    for entry in node.entries().into_iter().flatten() {
        let key = entry.key_text();
        if seg.matches(&key) {
            prefix.push(key);
            expand(&entry.value, rest, prefix, out);
            prefix.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// Indentation
// ---------------------------------------------------------------------------

fn indentation(src: &str, root: Option<&Node>, settings: &YamlSettings) -> Indentation {
    let mut ind = Indentation {
        mapping: settings.mapping_indent,
        sequence: settings.sequence_indent,
        offset: settings.sequence_offset,
    };
    let Some(root) = root.filter(|_| settings.guess_indent) else {
        return ind;
    };
    let mut mapping = None;
    let mut sequence = None;
    survey(src, root, &mut mapping, &mut sequence);
    if let Some(m) = mapping {
        ind.mapping = m;
    }
    if let Some((offset, seq)) = sequence {
        ind.offset = offset;
        ind.sequence = seq;
    }
    ind
}

/// First nested block mapping and first block sequence under a key, as
/// columns relative to that key.
fn survey(
    src: &str,
    node: &Node,
    mapping: &mut Option<usize>,
    sequence: &mut Option<(usize, usize)>,
) {
    if mapping.is_some() && sequence.is_some() {
        return;
    }
    match &node.kind {
        NodeKind::Mapping {
            flow: false,
            entries,
        } => {
            for e in entries {
                let key_col = column(src, e.key.start);
                match &e.value.kind {
                    NodeKind::Mapping {
                        flow: false,
                        entries: inner,
                    } if mapping.is_none() => {
                        let col = inner.first().map(|f| column(src, f.key.start));
                        if let Some(col) = col.filter(|c| *c > key_col) {
                            *mapping = Some(col - key_col);
                        }
                    }
                    NodeKind::Sequence { flow: false, items } if sequence.is_none() => {
                        let dash = column(src, e.value.start);
                        let same_line = |n: &Node| {
                            line_start(src, n.start) == line_start(src, e.value.start)
                        };
                        if let Some(first) = items.first().filter(|f| same_line(*f)) {
                            let content = column(src, first.start);
                            if dash >= key_col && content > dash {
                                *sequence = Some((dash - key_col, content - key_col));
                            }
                        }
                    }
                    _ => {}
                }
                survey(src, &e.value, mapping, sequence);
            }
        }
        NodeKind::Sequence { flow: false, items } => {
            for item in items {
                survey(src, item, mapping, sequence);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Merge hooks
// ---------------------------------------------------------------------------

impl MergeTarget for YamlDocument {
    fn has_content(&self) -> bool {
        match &self.root {
            None => false,
            Some(root) => !(root.is_null() || root.entries().is_some_and(<[Entry]>::is_empty)),
        }
    }

    fn existing_depth(&self, keys: &[String]) -> Result<usize> {
        let Some(mut node) = self.root.as_ref() else {
            return Ok(0);
        };
        for (i, key) in keys.iter().enumerate() {
            match node.entry(key) {
                Some(entry) => node = &entry.value,
                None => return Ok(i),
            }
        }
        Ok(keys.len())
    }

    fn insert_absent(&mut self, keys: &[String], depth: usize, value: Value) -> Result<()> {
        self.insert_fragment(keys, depth, &Fragment::Value(&value))
    }

    fn overwrite(&mut self, keys: &[String], value: Value) -> Result<()> {
        let current = self
            .node_at(keys)
            .ok_or_else(|| ConfweldError::Missing(join_keys(keys)))?;
        if current.value == value {
            return Ok(());
        }
        self.replace_fragment(keys, &Fragment::Value(&value))
    }
}

// ---------------------------------------------------------------------------
// KeyValueDocument
// ---------------------------------------------------------------------------

impl KeyValueDocument for YamlDocument {
    type Options = YamlSettings;

    const FORMAT: Format = Format::Yaml;

    fn parse_with(text: &str, settings: &YamlSettings) -> Result<Self> {
        let root = tree::parse(text)?;
        let indent = indentation(text, root.as_ref(), settings);
        Ok(Self {
            text: text.to_string(),
            root,
            indent,
        })
    }

    fn render(&self) -> String {
        self.text.clone()
    }

    fn get(&self, path: &KeyPath) -> Result<Value> {
        let not_found = || ConfweldError::NotFound(path.to_string());
        let root = match &self.root {
            Some(root) if !root.value.is_null() => &root.value,
            _ if path.is_empty() => return Ok(Value::Object(Map::new())),
            _ => return Err(not_found()),
        };
        resolve(root, path.segments()).cloned().ok_or_else(not_found)
    }

    fn delete(&mut self, path: &KeyPath) -> Result<()> {
        if path.is_empty() {
            return self.clear();
        }
        let mut targets = Vec::new();
        if let Some(root) = &self.root {
            expand(root, path.segments(), &mut Vec::new(), &mut targets);
        }
        if targets.is_empty() {
            return Err(ConfweldError::Missing(path.to_string()));
        }
        for keys in targets {
            if self.locate(&keys).is_some() {
                self.delete_entry(&keys)?;
            }
        }
        Ok(())
    }

    fn remove_from_list(&mut self, path: &KeyPath, values: &[Value]) -> Result<()> {
        let keys = path.literal_keys()?;
        let edits = {
            let Some(node) = self.node_at(&keys) else {
                return Ok(());
            };
            let Some(items) = node.items() else {
                return Ok(());
            };
            let (doomed, kept): (Vec<&Node>, Vec<&Node>) =
                items.iter().partition(|item| values.contains(&item.value));
            if doomed.is_empty() {
                return Ok(());
            }
            if node.is_flow() {
                let body: Vec<&str> = kept.iter().map(|i| &self.text[i.start..i.end]).collect();
                vec![(node.start..node.end, format!("[{}]", body.join(", ")))]
            } else if kept.is_empty() {
                match self.locate(&keys) {
                    Some((_, entry)) => vec![(colon_end(&self.text, entry)..node.end, " []".to_string())],
                    None => vec![(node.start..node.end, "[]".to_string())],
                }
            } else {
                doomed
                    .iter()
                    .map(|item| {
                        let start = line_start(&self.text, item.start);
                        (start..past_line(&self.text, item.end), String::new())
                    })
                    .collect()
            }
        };
        self.splice(edits)
    }

    fn append_items(&mut self, keys: &[String], values: Vec<Value>) -> Result<()> {
        let edit = {
            let node = self
                .node_at(keys)
                .ok_or_else(|| ConfweldError::NotFound(join_keys(keys)))?;
            match &node.kind {
                NodeKind::Sequence { flow: false, items } => {
                    let dash = column(&self.text, node.start);
                    let gap = items
                        .first()
                        .filter(|f| line_start(&self.text, f.start) == line_start(&self.text, node.start))
                        .map_or(self.indent.gap(), |f| column(&self.text, f.start) - dash);
                    let text: String = values
                        .iter()
                        .map(|v| {
                            format!(
                                "\n{}{}",
                                emit::indent(dash),
                                emit::seq_item(v, dash, gap, &self.indent)
                            )
                        })
                        .collect();
                    let at = line_end(&self.text, node.end);
                    (at..at, text)
                }
                NodeKind::Sequence { flow: true, items } => {
                    let joined: Vec<String> = values.iter().map(emit::flow).collect();
                    let joined = joined.join(", ");
                    match items.last() {
                        Some(last) => (last.end..last.end, format!(", {joined}")),
                        None => (node.start + 1..node.end - 1, joined),
                    }
                }
                _ if node.is_null() => return self.overwrite(keys, Value::Array(values)),
                _ => {
                    return Err(ConfweldError::InvalidType(format!(
                        "'{}' is not a list",
                        display_keys(keys)
                    )))
                }
            }
        };
        self.splice(vec![edit])
    }
}
