//! Document backends.

pub mod ini;
pub mod toml;
pub mod yaml;

pub use ini::IniDocument;
pub use toml::TomlDocument;
pub use yaml::YamlDocument;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::KeyValueDocument;
    use crate::error::ConfweldError;
    use crate::keypath::KeyPath;
    use serde_json::json;

    #[test]
    fn nesting_limits_differ_by_format() {
        let path = KeyPath::from(["a", "b", "c"]);

        let mut ini = IniDocument::parse("").unwrap();
        let err = ini.set(&path, json!("x"), false).unwrap_err();
        assert!(matches!(err, ConfweldError::Structural(_)));

        let mut toml = TomlDocument::parse("").unwrap();
        toml.set(&path, json!("x"), false).unwrap();
        assert_eq!(toml.get(&path).unwrap(), json!("x"));

        let mut yaml = YamlDocument::parse("").unwrap();
        yaml.set(&path, json!("x"), false).unwrap();
        assert_eq!(yaml.get(&path).unwrap(), json!("x"));
    }

    #[test]
    fn list_operations_need_a_section_and_option_in_ini() {
        let mut ini = IniDocument::parse("[flake8]\n").unwrap();
        let err = ini
            .extend_list(&KeyPath::from(["flake8"]), vec![json!("E1")])
            .unwrap_err();
        assert!(matches!(err, ConfweldError::Structural(_)));

        let mut yaml = YamlDocument::parse("").unwrap();
        yaml.extend_list(&KeyPath::from(["exclude"]), vec![json!("E1")])
            .unwrap();
        assert_eq!(yaml.get(&KeyPath::from(["exclude"])).unwrap(), json!(["E1"]));
    }

    #[test]
    fn regex_keys_are_unsupported_in_toml_only() {
        let pattern = KeyPath::parse_args(&["/tool.*/"]).unwrap();
        let toml = TomlDocument::parse("[tool]\nx = 1\n").unwrap();
        assert!(matches!(
            toml.get(&pattern).unwrap_err(),
            ConfweldError::Unsupported(_)
        ));
        let yaml = YamlDocument::parse("tool:\n  x: 1\n").unwrap();
        assert_eq!(yaml.get(&pattern).unwrap(), json!({"x": 1}));
    }
}
