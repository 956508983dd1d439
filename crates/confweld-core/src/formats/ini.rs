//! `ConfigParser`-style INI files (`setup.cfg`, `tox.ini`, `.flake8`).
//!
//! The file is kept as lines. Options that are never touched render from
//! their original text, so comments, spacing and delimiters survive.

use crate::config::IniSettings;
use crate::document::{Format, KeyValueDocument};
use crate::error::{ConfweldError, Result};
use crate::keypath::{join_keys, KeyPath, Segment};
use crate::merge::MergeTarget;
use crate::value::{type_name, Map, Value};

const MAX_DEPTH: usize = 2;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum OptionValue {
    Single(String),
    Multi(Vec<String>),
}

impl OptionValue {
    fn to_json(&self) -> Value {
        match self {
            OptionValue::Single(s) => Value::String(s.clone()),
            OptionValue::Multi(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        }
    }

    fn items(&self) -> Vec<String> {
        match self {
            OptionValue::Single(s) if s.is_empty() => Vec::new(),
            OptionValue::Single(s) => vec![s.clone()],
            OptionValue::Multi(items) => items.clone(),
        }
    }

    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s.contains('\n') => Ok(OptionValue::Multi(
                s.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect(),
            )),
            Value::String(s) => Ok(OptionValue::Single(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(ConfweldError::InvalidType(format!(
                        "INI list items must be strings, got {}",
                        type_name(other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(OptionValue::Multi),
            other => Err(ConfweldError::InvalidType(format!(
                "INI values must be strings or lists of strings, got {}",
                type_name(other)
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct IniOption {
    key: String,
    /// Text between the key and the value on the first line, e.g. ` = `.
    separator: String,
    value: OptionValue,
    /// Original lines while the option is unmodified.
    raw: Option<Vec<String>>,
}

impl IniOption {
    fn new(key: &str, value: OptionValue) -> Self {
        Self {
            key: key.to_string(),
            separator: " = ".to_string(),
            value,
            raw: None,
        }
    }

    fn replace(&mut self, value: OptionValue) {
        if self.value != value {
            self.value = value;
            self.raw = None;
        }
    }

    fn render(&self, indent: &str, out: &mut Vec<String>) {
        if let Some(raw) = &self.raw {
            out.extend(raw.iter().cloned());
            return;
        }
        match &self.value {
            OptionValue::Single(v) if v.is_empty() => {
                out.push(format!("{}{}", self.key, self.separator.trim_end()))
            }
            OptionValue::Single(v) => out.push(format!("{}{}{v}", self.key, self.separator)),
            OptionValue::Multi(items) => {
                out.push(format!("{}{}", self.key, self.separator.trim_end()));
                out.extend(items.iter().map(|item| format!("{indent}{item}")));
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Line {
    Raw(String),
    Option(IniOption),
}

impl Line {
    fn is_blank(&self) -> bool {
        matches!(self, Line::Raw(s) if s.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
struct Section {
    name: String,
    header: String,
    lines: Vec<Line>,
}

impl Section {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            header: format!("[{name}]"),
            lines: Vec::new(),
        }
    }

    fn options(&self) -> impl Iterator<Item = &IniOption> {
        self.lines.iter().filter_map(|line| match line {
            Line::Option(opt) => Some(opt),
            Line::Raw(_) => None,
        })
    }

    fn option(&self, key: &str) -> Option<&IniOption> {
        self.options().find(|opt| opt.key == key)
    }

    fn option_mut(&mut self, key: &str) -> Option<&mut IniOption> {
        self.lines.iter_mut().find_map(|line| match line {
            Line::Option(opt) if opt.key == key => Some(opt),
            _ => None,
        })
    }

    fn has_options(&self) -> bool {
        self.options().next().is_some()
    }

    fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .options()
            .map(|opt| (opt.key.clone(), opt.value.to_json()))
            .collect();
        Value::Object(map)
    }

    /// Add after the last option, ahead of trailing blanks and comments.
    fn push_option(&mut self, option: IniOption) {
        let at = self
            .lines
            .iter()
            .rposition(|line| matches!(line, Line::Option(_)))
            .map_or(0, |i| i + 1);
        self.lines.insert(at, Line::Option(option));
    }

    fn remove_option(&mut self, key: &str) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|line| !matches!(line, Line::Option(opt) if opt.key == key));
        self.lines.len() != before
    }
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with('#') || trimmed.starts_with(';')
}

/// `[name]`, optionally followed by a comment.
fn section_name(trimmed: &str) -> Option<&str> {
    let body = trimmed.strip_prefix('[')?;
    body.match_indices(']')
        .map(|(i, _)| i)
        .find(|&i| {
            let tail = body[i + 1..].trim();
            tail.is_empty() || is_comment(tail)
        })
        .map(|i| body[..i].trim())
}

/// Whether the next non-blank line is a continuation line.
fn continues_value(rest: &[&str]) -> bool {
    rest.iter()
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| l.starts_with(char::is_whitespace) && !is_comment(l.trim()))
}

// ---------------------------------------------------------------------------
// IniDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct IniDocument {
    preamble: Vec<String>,
    sections: Vec<Section>,
    indent: String,
    trailing_newline: bool,
}

impl IniDocument {
    fn check_depth(len: usize, path: &dyn std::fmt::Display) -> Result<()> {
        if len > MAX_DEPTH {
            return Err(ConfweldError::Structural(format!(
                "INI files only have sections and options, got '{path}'"
            )));
        }
        Ok(())
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    fn matching_sections<'a>(&'a self, seg: &'a Segment) -> impl Iterator<Item = &'a Section> {
        self.sections.iter().filter(move |s| seg.matches(&s.name))
    }

    /// Append a section, separated from earlier content by one blank line.
    fn push_section(&mut self, section: Section) {
        let has_content = !self.sections.is_empty()
            || self.preamble.iter().any(|l| !l.trim().is_empty());
        if has_content {
            self.trim_trailing_blanks();
            match self.sections.last_mut() {
                Some(last) => last.lines.push(Line::Raw(String::new())),
                None => self.preamble.push(String::new()),
            }
        }
        self.sections.push(section);
    }

    fn trim_trailing_blanks(&mut self) {
        match self.sections.last_mut() {
            Some(last) => {
                while last.lines.last().is_some_and(Line::is_blank) {
                    last.lines.pop();
                }
            }
            None => {
                while self.preamble.last().is_some_and(|l| l.trim().is_empty()) {
                    self.preamble.pop();
                }
            }
        }
    }

    fn remove_sections_where(&mut self, doomed: impl Fn(&Section) -> bool) -> usize {
        let before = self.sections.len();
        let was_last = self.sections.last().is_some_and(&doomed);
        self.sections.retain(|s| !doomed(s));
        if was_last {
            self.trim_trailing_blanks();
        }
        before - self.sections.len()
    }

    fn parse_lines(text: &str, settings: &IniSettings) -> Result<Self> {
        let mut doc = IniDocument {
            indent: " ".repeat(settings.continuation_indent),
            trailing_newline: text.is_empty() || text.ends_with('\n'),
            ..Default::default()
        };
        let mut guessed_indent = false;
        let mut open_option = false;
        let lines: Vec<&str> = text.lines().collect();

        for (lineno, &line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            let indented = line.starts_with(char::is_whitespace);

            // Blank lines inside a multi-line value belong to it when the
            // value carries on below them.
            if open_option && trimmed.is_empty() && continues_value(&lines[lineno + 1..]) {
                if let Some(Line::Option(opt)) =
                    doc.sections.last_mut().and_then(|s| s.lines.last_mut())
                {
                    if let Some(raw) = opt.raw.as_mut() {
                        raw.push(line.to_string());
                    }
                    continue;
                }
            }

            if open_option && indented && !trimmed.is_empty() && !is_comment(trimmed) {
                if let Some(Line::Option(opt)) =
                    doc.sections.last_mut().and_then(|s| s.lines.last_mut())
                {
                    if !guessed_indent {
                        doc.indent = line[..line.len() - line.trim_start().len()].to_string();
                        guessed_indent = true;
                    }
                    let mut items = opt.value.items();
                    items.push(trimmed.to_string());
                    opt.value = OptionValue::Multi(items);
                    if let Some(raw) = opt.raw.as_mut() {
                        raw.push(line.to_string());
                    }
                    continue;
                }
            }
            open_option = false;

            if let Some(name) = section_name(trimmed).filter(|_| !indented) {
                doc.sections.push(Section {
                    name: name.to_string(),
                    header: line.to_string(),
                    lines: Vec::new(),
                });
                continue;
            }

            let Some(section) = doc.sections.last_mut() else {
                if !trimmed.is_empty() && !is_comment(trimmed) {
                    return Err(ConfweldError::decode(format!(
                        "line {}: content before the first section header",
                        lineno + 1
                    )));
                }
                doc.preamble.push(line.to_string());
                continue;
            };

            if trimmed.is_empty() || is_comment(trimmed) || indented {
                section.lines.push(Line::Raw(line.to_string()));
                continue;
            }

            let Some(split) = line.find(|c| c == '=' || c == ':') else {
                return Err(ConfweldError::decode(format!(
                    "line {}: expected 'key = value', got '{trimmed}'",
                    lineno + 1
                )));
            };
            let key = line[..split].trim_end();
            let rest = &line[split + 1..];
            let value = rest.trim();
            let separator = if value.is_empty() {
                format!("{} ", &line[key.len()..=split])
            } else {
                line[key.len()..line.len() - rest.trim_start().len()].to_string()
            };
            section.lines.push(Line::Option(IniOption {
                key: key.to_string(),
                separator,
                value: OptionValue::Single(value.to_string()),
                raw: Some(vec![line.to_string()]),
            }));
            open_option = true;
        }
        Ok(doc)
    }

    fn insert_option(&mut self, section: &str, key: &str, value: &Value) -> Result<()> {
        let value = OptionValue::from_json(value)?;
        match self.section_mut(section) {
            Some(s) => s.push_option(IniOption::new(key, value)),
            None => {
                let mut fresh = Section::new(section);
                fresh.push_option(IniOption::new(key, value));
                self.push_section(fresh);
            }
        }
        Ok(())
    }

    fn section_options(value: &Value) -> Result<Vec<IniOption>> {
        let Value::Object(map) = value else {
            return Err(ConfweldError::InvalidType(format!(
                "an INI section must be a mapping of options, got {}",
                type_name(value)
            )));
        };
        map.iter()
            .map(|(k, v)| Ok(IniOption::new(k, OptionValue::from_json(v)?)))
            .collect()
    }

    fn list_keys(path: &KeyPath) -> Result<(String, String)> {
        let keys = path.literal_keys()?;
        Self::check_depth(keys.len(), path)?;
        match <[String; 2]>::try_from(keys) {
            Ok([section, option]) => Ok((section, option)),
            Err(_) => Err(ConfweldError::Structural(format!(
                "INI list operations need a section and an option, got '{path}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge hooks
// ---------------------------------------------------------------------------

impl MergeTarget for IniDocument {
    fn has_content(&self) -> bool {
        !self.sections.is_empty()
    }

    fn existing_depth(&self, keys: &[String]) -> Result<usize> {
        Self::check_depth(keys.len(), &join_keys(keys))?;
        let Some(first) = keys.first() else {
            return Ok(0);
        };
        let Some(section) = self.section(first) else {
            return Ok(0);
        };
        match keys.get(1) {
            Some(option) if section.option(option).is_some() => Ok(2),
            Some(_) => Ok(1),
            None => Ok(1),
        }
    }

    fn insert_absent(&mut self, keys: &[String], _depth: usize, value: Value) -> Result<()> {
        Self::check_depth(keys.len(), &join_keys(keys))?;
        match keys {
            [section] => {
                let mut fresh = Section::new(section);
                for option in Self::section_options(&value)? {
                    fresh.push_option(option);
                }
                self.push_section(fresh);
                Ok(())
            }
            [section, option] => self.insert_option(section, option, &value),
            _ => Err(ConfweldError::Structural("empty INI key path".to_string())),
        }
    }

    fn overwrite(&mut self, keys: &[String], value: Value) -> Result<()> {
        let missing = || ConfweldError::Missing(join_keys(keys));
        match keys {
            [section] => {
                let options = Self::section_options(&value)?;
                let target = self.section_mut(section).ok_or_else(missing)?;
                if target.to_json() == value {
                    return Ok(());
                }
                target.lines.retain(|line| !matches!(line, Line::Option(_)));
                for option in options {
                    target.push_option(option);
                }
                Ok(())
            }
            [section, option] => {
                let parsed = OptionValue::from_json(&value)?;
                self.section_mut(section)
                    .and_then(|s| s.option_mut(option))
                    .ok_or_else(missing)?
                    .replace(parsed);
                Ok(())
            }
            _ => Err(ConfweldError::Structural(format!(
                "INI files only have sections and options, got '{}'",
                join_keys(keys)
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// KeyValueDocument
// ---------------------------------------------------------------------------

impl KeyValueDocument for IniDocument {
    type Options = IniSettings;

    const FORMAT: Format = Format::Ini;
    const MIN_LIST_DEPTH: usize = 2;

    fn parse_with(text: &str, options: &IniSettings) -> Result<Self> {
        Self::parse_lines(text, options)
    }

    fn render(&self) -> String {
        let mut out: Vec<String> = self.preamble.clone();
        for section in &self.sections {
            out.push(section.header.clone());
            for line in &section.lines {
                match line {
                    Line::Raw(raw) => out.push(raw.clone()),
                    Line::Option(opt) => opt.render(&self.indent, &mut out),
                }
            }
        }
        let mut text = out.join("\n");
        if !text.is_empty() && self.trailing_newline {
            text.push('\n');
        }
        text
    }

    fn get(&self, path: &KeyPath) -> Result<Value> {
        Self::check_depth(path.len(), path)?;
        let not_found = || ConfweldError::NotFound(path.to_string());
        match path.segments() {
            [] => Ok(Value::Object(
                self.sections
                    .iter()
                    .map(|s| (s.name.clone(), s.to_json()))
                    .collect(),
            )),
            [section] => self
                .matching_sections(section)
                .next()
                .map(Section::to_json)
                .ok_or_else(not_found),
            [section, option] => self
                .matching_sections(section)
                .find_map(|s| s.options().find(|opt| option.matches(&opt.key)))
                .map(|opt| opt.value.to_json())
                .ok_or_else(not_found),
            _ => Err(not_found()),
        }
    }

    fn delete(&mut self, path: &KeyPath) -> Result<()> {
        Self::check_depth(path.len(), path)?;
        let missing = || ConfweldError::Missing(path.to_string());
        match path.segments() {
            [] => {
                self.preamble.clear();
                self.sections.clear();
                Ok(())
            }
            [section] => {
                if self.remove_sections_where(|s| section.matches(&s.name)) == 0 {
                    return Err(missing());
                }
                Ok(())
            }
            [section, option] => {
                let mut removed = 0;
                for s in self.sections.iter_mut().filter(|s| section.matches(&s.name)) {
                    let keys: Vec<String> = s
                        .options()
                        .filter(|opt| option.matches(&opt.key))
                        .map(|opt| opt.key.clone())
                        .collect();
                    for key in keys {
                        s.remove_option(&key);
                        removed += 1;
                    }
                }
                if removed == 0 {
                    return Err(missing());
                }
                self.remove_sections_where(|s| section.matches(&s.name) && !s.has_options());
                Ok(())
            }
            _ => Err(missing()),
        }
    }

    fn remove_from_list(&mut self, path: &KeyPath, values: &[Value]) -> Result<()> {
        let (section, option) = Self::list_keys(path)?;
        let Some(opt) = self
            .section_mut(&section)
            .and_then(|s| s.option_mut(&option))
        else {
            return Ok(());
        };
        let items = opt.value.items();
        let kept: Vec<String> = items
            .iter()
            .filter(|item| !values.contains(&Value::String((*item).clone())))
            .cloned()
            .collect();
        if kept.len() == items.len() {
            return Ok(());
        }
        match kept.len() {
            0 => {
                if let Some(s) = self.section_mut(&section) {
                    s.remove_option(&option);
                }
                self.remove_sections_where(|s| s.name == section && !s.has_options());
            }
            1 => opt.replace(OptionValue::Single(kept[0].clone())),
            _ => opt.replace(OptionValue::Multi(kept)),
        }
        Ok(())
    }

    fn append_items(&mut self, keys: &[String], values: Vec<Value>) -> Result<()> {
        let [section, option] = keys else {
            return Err(ConfweldError::Structural(format!(
                "INI list operations need a section and an option, got '{}'",
                join_keys(keys)
            )));
        };
        let extra = OptionValue::from_json(&Value::Array(values))?.items();
        let opt = self
            .section_mut(section)
            .and_then(|s| s.option_mut(option))
            .ok_or_else(|| ConfweldError::NotFound(join_keys(keys)))?;
        let mut items = opt.value.items();
        items.extend(extra);
        opt.replace(OptionValue::Multi(items));
        Ok(())
    }
}
