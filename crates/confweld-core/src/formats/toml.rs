//! TOML documents backed by `toml_edit`, which keeps comments, whitespace
//! and table order intact across edits.

use crate::document::{Format, KeyValueDocument};
use crate::error::{ConfweldError, Result};
use crate::keypath::{join_keys, KeyPath};
use crate::merge::MergeTarget;
use crate::value::{Map, Value};
use toml_edit::{Array, DocumentMut, InlineTable, Item, Table, TableLike};

/// Paths longer than this are written as dotted keys inside an existing
/// (or freshly created two-level) table instead of as nested tables.
const DOTTED_KEY_DEPTH: usize = 3;

/// Depth of the table that receives dotted keys when little of the path
/// exists yet (`[tool.<name>]`).
const DOTTED_CONTAINER_DEPTH: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct TomlDocument {
    doc: DocumentMut,
}

impl TomlDocument {
    fn keys(path: &KeyPath) -> Result<Vec<String>> {
        if path.has_pattern() {
            return Err(ConfweldError::Unsupported(format!(
                "regex key '{path}' in TOML documents"
            )));
        }
        path.literal_keys()
    }

    fn item(&self, keys: &[String]) -> Option<&Item> {
        let (last, parents) = keys.split_last()?;
        let mut table: &dyn TableLike = self.doc.as_table();
        for key in parents {
            table = table.get(key)?.as_table_like()?;
        }
        table.get(last).filter(|item| !item.is_none())
    }

    fn item_mut(&mut self, keys: &[String]) -> Option<&mut Item> {
        let (last, parents) = keys.split_last()?;
        let mut table: &mut dyn TableLike = self.doc.as_table_mut();
        for key in parents {
            table = table.get_mut(key)?.as_table_like_mut()?;
        }
        table.get_mut(last).filter(|item| !item.is_none())
    }

    fn is_empty_table(&self, keys: &[String]) -> bool {
        self.item(keys)
            .and_then(Item::as_table_like)
            .is_some_and(|t| t.is_empty())
    }
}

/// Walk to the table at `keys`, creating implicit tables from `keys[existing..]`.
fn table_path_mut<'a>(
    root: &'a mut Table,
    keys: &[String],
    existing: usize,
) -> Result<&'a mut dyn TableLike> {
    let mut table: &mut dyn TableLike = root;
    for (i, key) in keys.iter().enumerate() {
        if i >= existing && table.get(key).map_or(true, Item::is_none) {
            let mut fresh = Table::new();
            fresh.set_implicit(true);
            table.insert(key, Item::Table(fresh));
        }
        table = table
            .get_mut(key)
            .and_then(Item::as_table_like_mut)
            .ok_or_else(|| not_a_table(&keys[..=i]))?;
    }
    Ok(table)
}

fn not_a_table(keys: &[String]) -> ConfweldError {
    ConfweldError::InvalidType(format!("'{}' is not a table", join_keys(keys)))
}

/// Insert `value` under `keys` as `keys[0].keys[1]... = value`.
fn insert_dotted(container: &mut dyn TableLike, keys: &[String], value: toml_edit::Value) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };
    let mut item = Item::Value(value);
    let mut key = last;
    for parent in parents.iter().rev() {
        let mut table = Table::new();
        table.set_dotted(true);
        table.insert(key, item);
        item = Item::Table(table);
        key = parent;
    }
    container.insert(key, item);
}

// ---------------------------------------------------------------------------
// Value conversion
// ---------------------------------------------------------------------------

fn item_to_json(item: &Item) -> Value {
    match item {
        Item::None => Value::Null,
        Item::Value(v) => value_to_json(v),
        Item::Table(t) => table_to_json(t),
        Item::ArrayOfTables(a) => Value::Array(a.iter().map(|t| table_to_json(t)).collect()),
    }
}

fn table_to_json(table: &dyn TableLike) -> Value {
    let map: Map<String, Value> = table
        .iter()
        .filter(|(_, item)| !item.is_none())
        .map(|(k, item)| (k.to_string(), item_to_json(item)))
        .collect();
    Value::Object(map)
}

fn value_to_json(value: &toml_edit::Value) -> Value {
    use toml_edit::Value as V;
    match value {
        V::String(s) => Value::String(s.value().clone()),
        V::Integer(i) => Value::from(*i.value()),
        V::Float(f) => Value::from(*f.value()),
        V::Boolean(b) => Value::Bool(*b.value()),
        V::Datetime(d) => Value::String(d.value().to_string()),
        V::Array(a) => Value::Array(a.iter().map(value_to_json).collect()),
        V::InlineTable(t) => Value::Object(
            t.iter()
                .map(|(k, v)| (k.to_string(), value_to_json(v)))
                .collect(),
        ),
    }
}

fn json_to_value(value: &Value) -> Result<toml_edit::Value> {
    Ok(match value {
        Value::Null => {
            return Err(ConfweldError::InvalidType(
                "TOML has no null value".to_string(),
            ))
        }
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.into(),
            (None, Some(f)) if !n.is_u64() => f.into(),
            _ => {
                return Err(ConfweldError::InvalidType(format!(
                    "{n} does not fit a TOML integer"
                )))
            }
        },
        Value::String(s) => s.as_str().into(),
        Value::Array(items) => {
            let mut array = Array::new();
            for item in items {
                array.push(json_to_value(item)?);
            }
            toml_edit::Value::Array(array)
        }
        Value::Object(map) => {
            let mut table = InlineTable::new();
            for (k, v) in map {
                table.insert(k.as_str(), json_to_value(v)?);
            }
            toml_edit::Value::InlineTable(table)
        }
    })
}

/// Mappings become standard tables, everything else an inline value.
fn json_to_item(value: &Value) -> Result<Item> {
    match value {
        Value::Object(map) => {
            let mut table = Table::new();
            for (k, v) in map {
                table.insert(k, json_to_item(v)?);
            }
            Ok(Item::Table(table))
        }
        other => Ok(Item::Value(json_to_value(other)?)),
    }
}

// ---------------------------------------------------------------------------
// Merge hooks
// ---------------------------------------------------------------------------

impl MergeTarget for TomlDocument {
    fn has_content(&self) -> bool {
        !self.doc.as_table().is_empty()
    }

    fn existing_depth(&self, keys: &[String]) -> Result<usize> {
        let mut table: &dyn TableLike = self.doc.as_table();
        for (i, key) in keys.iter().enumerate() {
            let Some(item) = table.get(key).filter(|item| !item.is_none()) else {
                return Ok(i);
            };
            match item.as_table_like() {
                Some(t) => table = t,
                None => return Ok(i + 1),
            }
        }
        Ok(keys.len())
    }

    fn insert_absent(&mut self, keys: &[String], depth: usize, value: Value) -> Result<()> {
        let root = self.doc.as_table_mut();
        if keys.len() > DOTTED_KEY_DEPTH {
            let split = depth.max(DOTTED_CONTAINER_DEPTH);
            let container = table_path_mut(root, &keys[..split], depth)?;
            insert_dotted(container, &keys[split..], json_to_value(&value)?);
            return Ok(());
        }

        let parent = table_path_mut(root, &keys[..depth], depth)?;
        let mut item = json_to_item(&value)?;
        let mut key = &keys[keys.len() - 1];
        for outer in keys[depth..keys.len() - 1].iter().rev() {
            let mut table = Table::new();
            table.set_implicit(true);
            table.insert(key, item);
            item = Item::Table(table);
            key = outer;
        }
        parent.insert(key, item);
        Ok(())
    }

    fn overwrite(&mut self, keys: &[String], value: Value) -> Result<()> {
        let missing = || ConfweldError::Missing(join_keys(keys));
        let current = self.item(keys).ok_or_else(missing)?;
        if item_to_json(current) == value {
            return Ok(());
        }
        let slot = self.item_mut(keys).ok_or_else(missing)?;
        match (slot, &value) {
            (Item::Table(table), Value::Object(map)) => {
                table.clear();
                for (k, v) in map {
                    table.insert(k, json_to_item(v)?);
                }
            }
            (Item::Value(old), _) => {
                let mut fresh = json_to_value(&value)?;
                *fresh.decor_mut() = old.decor().clone();
                *old = fresh;
            }
            (slot, _) => *slot = json_to_item(&value)?,
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KeyValueDocument
// ---------------------------------------------------------------------------

impl KeyValueDocument for TomlDocument {
    type Options = ();

    const FORMAT: Format = Format::Toml;

    fn parse_with(text: &str, _options: &()) -> Result<Self> {
        let doc = text
            .parse::<DocumentMut>()
            .map_err(|e| ConfweldError::decode(e.to_string()))?;
        Ok(Self { doc })
    }

    fn render(&self) -> String {
        self.doc.to_string()
    }

    fn get(&self, path: &KeyPath) -> Result<Value> {
        let keys = Self::keys(path)?;
        if keys.is_empty() {
            return Ok(table_to_json(self.doc.as_table()));
        }
        self.item(&keys)
            .map(item_to_json)
            .ok_or_else(|| ConfweldError::NotFound(path.to_string()))
    }

    fn delete(&mut self, path: &KeyPath) -> Result<()> {
        let keys = Self::keys(path)?;
        let Some((last, parents)) = keys.split_last() else {
            self.doc.as_table_mut().clear();
            return Ok(());
        };
        let missing = || ConfweldError::Missing(path.to_string());
        let parent: &mut dyn TableLike = if parents.is_empty() {
            self.doc.as_table_mut()
        } else {
            self.item_mut(parents)
                .and_then(Item::as_table_like_mut)
                .ok_or_else(missing)?
        };
        match parent.remove(last) {
            Some(item) if !item.is_none() => {}
            _ => return Err(missing()),
        }

        for depth in (1..keys.len()).rev() {
            if !self.is_empty_table(&keys[..depth]) {
                break;
            }
            let (key, above) = keys[..depth].split_last().ok_or_else(missing)?;
            let holder: &mut dyn TableLike = if above.is_empty() {
                self.doc.as_table_mut()
            } else {
                self.item_mut(above)
                    .and_then(Item::as_table_like_mut)
                    .ok_or_else(missing)?
            };
            holder.remove(key);
        }
        Ok(())
    }

    fn remove_from_list(&mut self, path: &KeyPath, values: &[Value]) -> Result<()> {
        let keys = Self::keys(path)?;
        let Some(item) = self.item_mut(&keys) else {
            return Ok(());
        };
        match item {
            Item::Value(toml_edit::Value::Array(array)) => {
                let doomed: Vec<usize> = array
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| values.contains(&value_to_json(v)))
                    .map(|(i, _)| i)
                    .collect();
                for i in doomed.into_iter().rev() {
                    array.remove(i);
                }
            }
            Item::ArrayOfTables(tables) => {
                let doomed: Vec<usize> = tables
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| values.contains(&table_to_json(*t)))
                    .map(|(i, _)| i)
                    .collect();
                for i in doomed.into_iter().rev() {
                    tables.remove(i);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn append_items(&mut self, keys: &[String], values: Vec<Value>) -> Result<()> {
        let item = self
            .item_mut(keys)
            .ok_or_else(|| ConfweldError::NotFound(join_keys(keys)))?;
        match item {
            Item::Value(toml_edit::Value::Array(array)) => {
                for value in &values {
                    let mut fresh = json_to_value(value)?;
                    // Later elements carry the separator style (a newline and
                    // indent in multi-line arrays); the first one has none.
                    let separator = match array.len() {
                        0 | 1 => None,
                        _ => array.iter().last().map(|v| v.decor().clone()),
                    };
                    match separator {
                        Some(decor) => {
                            *fresh.decor_mut() = decor;
                            array.push_formatted(fresh);
                        }
                        None => array.push(fresh),
                    }
                }
                Ok(())
            }
            Item::ArrayOfTables(tables) => {
                for value in &values {
                    let Item::Table(table) = json_to_item(value)? else {
                        return Err(ConfweldError::InvalidType(format!(
                            "'{}' is an array of tables; only mappings can be appended",
                            join_keys(keys)
                        )));
                    };
                    tables.push(table);
                }
                Ok(())
            }
            _ => Err(ConfweldError::InvalidType(format!(
                "'{}' is not a list",
                join_keys(keys)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PYPROJECT: &str = r#"# project metadata
[project]
name = "demo"
version = "1.0"

[tool.ruff]
line-length = 100  # wide screens

[tool.ruff.format]
quote-style = "double"
"#;

    fn doc(text: &str) -> TomlDocument {
        TomlDocument::parse(text).unwrap()
    }

    #[test]
    fn get_reads_typed_values() {
        let d = doc(PYPROJECT);
        assert_eq!(d.get(&["tool", "ruff", "line-length"].into()).unwrap(), json!(100));
        assert_eq!(
            d.get(&["tool", "ruff", "format"].into()).unwrap(),
            json!({"quote-style": "double"})
        );
        assert!(d.contains(&["project", "name"].into()).unwrap());
        assert!(!d.contains(&["project", "nope"].into()).unwrap());
        assert!(!d.contains(&["project", "name", "deeper"].into()).unwrap());
    }

    #[test]
    fn get_absent_is_not_found() {
        let d = doc(PYPROJECT);
        let err = d.get(&["tool", "black"].into()).unwrap_err();
        assert!(matches!(err, ConfweldError::NotFound(_)));
    }

    #[test]
    fn regex_keys_are_unsupported() {
        let d = doc(PYPROJECT);
        let path = KeyPath::parse_args(&["tool", "/ru.*/"]).unwrap();
        assert!(matches!(
            d.get(&path).unwrap_err(),
            ConfweldError::Unsupported(_)
        ));
    }

    #[test]
    fn set_into_empty_document_hides_implicit_parent() {
        let mut d = doc("");
        d.set(&["tool", "ruff", "line-length"].into(), json!(88), false)
            .unwrap();
        assert_eq!(d.render(), "[tool.ruff]\nline-length = 88\n");
    }

    #[test]
    fn deep_path_uses_dotted_keys() {
        let mut d = doc("");
        d.set(&["tool", "ruff", "lint", "select"].into(), json!(["E", "F"]), false)
            .unwrap();
        assert_eq!(d.render(), "[tool.ruff]\nlint.select = [\"E\", \"F\"]\n");
    }

    #[test]
    fn deep_path_keeps_sibling_tables() {
        let mut d = doc(PYPROJECT);
        d.set(&["tool", "ruff", "lint", "select"].into(), json!(["E"]), false)
            .unwrap();
        let out = d.render();
        assert!(out.contains("[tool.ruff.format]\nquote-style = \"double\"\n"));
        assert!(out.contains("lint.select = [\"E\"]"));

        let reparsed = doc(&out);
        assert_eq!(
            reparsed.get(&["tool", "ruff", "lint", "select"].into()).unwrap(),
            json!(["E"])
        );
        assert_eq!(
            reparsed.get(&["tool", "ruff", "format", "quote-style"].into()).unwrap(),
            json!("double")
        );
    }

    #[test]
    fn overwrite_keeps_trailing_comment() {
        let mut d = doc(PYPROJECT);
        let path: KeyPath = ["tool", "ruff", "line-length"].into();
        assert!(matches!(
            d.set(&path, json!(88), false).unwrap_err(),
            ConfweldError::AlreadySet(_)
        ));
        d.set(&path, json!(88), true).unwrap();
        assert!(d.render().contains("line-length = 88  # wide screens\n"));
    }

    #[test]
    fn repeated_set_is_idempotent() {
        let mut once = doc(PYPROJECT);
        let path: KeyPath = ["tool", "mypy", "strict"].into();
        once.set(&path, json!(true), true).unwrap();
        let mut twice = once.clone();
        twice.set(&path, json!(true), true).unwrap();
        assert_eq!(once.render(), twice.render());
    }

    #[test]
    fn set_through_scalar_is_a_type_error() {
        let mut d = doc("name = \"demo\"\n");
        let err = d
            .set(&["name", "first"].into(), json!("x"), false)
            .unwrap_err();
        assert!(matches!(err, ConfweldError::InvalidType(_)));
    }

    #[test]
    fn delete_prunes_empty_tables() {
        let mut d = doc("[tool.ruff]\nline-length = 88\n\n[tool.black]\nline-length = 88\n");
        d.delete(&["tool", "ruff", "line-length"].into()).unwrap();
        assert!(!d.contains(&["tool", "ruff"].into()).unwrap());
        assert!(d.contains(&["tool", "black"].into()).unwrap());
        assert_eq!(d.render().trim_start(), "[tool.black]\nline-length = 88\n");
    }

    #[test]
    fn delete_absent_is_missing() {
        let mut d = doc(PYPROJECT);
        let path: KeyPath = ["project", "version"].into();
        d.delete(&path).unwrap();
        assert!(!d.contains(&path).unwrap());
        assert!(matches!(
            d.delete(&path).unwrap_err(),
            ConfweldError::Missing(_)
        ));
    }

    #[test]
    fn delete_root_clears_document() {
        let mut d = doc(PYPROJECT);
        d.delete(&KeyPath::root()).unwrap();
        assert!(!d.has_content());
        assert_eq!(d.get(&KeyPath::root()).unwrap(), json!({}));
    }

    #[test]
    fn extend_list_appends_or_creates() {
        let mut d = doc("[tool.ruff]\nselect = [\"E\"]\n");
        let path: KeyPath = ["tool", "ruff", "select"].into();
        d.extend_list(&path, vec![json!("F"), json!("I")]).unwrap();
        assert_eq!(d.get(&path).unwrap(), json!(["E", "F", "I"]));

        let fresh: KeyPath = ["tool", "ruff", "ignore"].into();
        d.extend_list(&fresh, vec![json!("E501")]).unwrap();
        assert_eq!(d.get(&fresh).unwrap(), json!(["E501"]));
    }

    #[test]
    fn extend_list_on_scalar_is_a_type_error() {
        let mut d = doc("x = 1\n");
        let err = d.extend_list(&["x"].into(), vec![json!(2)]).unwrap_err();
        assert!(matches!(err, ConfweldError::InvalidType(_)));
    }

    #[test]
    fn extend_list_at_root_is_structural() {
        let mut d = doc("");
        let err = d.extend_list(&KeyPath::root(), vec![json!(1)]).unwrap_err();
        assert!(matches!(err, ConfweldError::Structural(_)));
    }

    #[test]
    fn remove_from_list_filters_and_ignores_absent() {
        let mut d = doc("[tool.ruff]\nselect = [\"E\", \"F\", \"E\"]\n");
        let path: KeyPath = ["tool", "ruff", "select"].into();
        d.remove_from_list(&path, &[json!("E")]).unwrap();
        assert_eq!(d.get(&path).unwrap(), json!(["F"]));

        let before = d.render();
        d.remove_from_list(&["tool", "black", "x"].into(), &[json!("E")])
            .unwrap();
        d.remove_from_list(&["tool", "ruff"].into(), &[json!("E")])
            .unwrap();
        assert_eq!(d.render(), before);
    }

    #[test]
    fn decode_error_carries_parser_message() {
        let err = TomlDocument::parse("[tool\n").unwrap_err();
        assert!(matches!(err, ConfweldError::Decode { hint: None, .. }));
    }
}
