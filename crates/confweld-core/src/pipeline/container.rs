use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Step topology of a CI pipeline.
///
/// Equality is structural: `parallel(A)` and `A` are different values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ContainerRepr", into = "ContainerRepr")]
pub enum Container {
    Leaf(String),
    Series(Vec<Container>),
    Parallel(Vec<Container>),
    /// A named stage. Its items run in series.
    DepGroup {
        items: Vec<Container>,
        config_group: String,
    },
}

impl Container {
    pub fn leaf(name: impl Into<String>) -> Self {
        Container::Leaf(name.into())
    }

    pub fn series<I, C>(items: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Container>,
    {
        Container::Series(items.into_iter().map(Into::into).collect())
    }

    pub fn parallel<I, C>(items: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Container>,
    {
        Container::Parallel(items.into_iter().map(Into::into).collect())
    }

    pub fn depgroup<I, C>(items: I, config_group: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Container>,
    {
        Container::DepGroup {
            items: items.into_iter().map(Into::into).collect(),
            config_group: config_group.into(),
        }
    }

    /// The step that finishes last. Among parallel branches the
    /// alphabetically greatest endpoint wins, which keeps generated
    /// instructions stable across runs.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Container::Leaf(name) => Some(name),
            Container::Series(items) | Container::DepGroup { items, .. } => {
                items.iter().rev().find_map(Container::endpoint)
            }
            Container::Parallel(items) => items.iter().filter_map(Container::endpoint).max(),
        }
    }

    /// Step names in document order.
    pub fn leaves(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Container::Leaf(name) => out.push(name),
            Container::Series(items)
            | Container::Parallel(items)
            | Container::DepGroup { items, .. } => {
                for item in items {
                    item.collect_leaves(out);
                }
            }
        }
    }

    pub fn contains_leaf(&self, name: &str) -> bool {
        match self {
            Container::Leaf(leaf) => leaf == name,
            Container::Series(items)
            | Container::Parallel(items)
            | Container::DepGroup { items, .. } => items.iter().any(|i| i.contains_leaf(name)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Container::Leaf(_) => false,
            Container::Series(items)
            | Container::Parallel(items)
            | Container::DepGroup { items, .. } => items.iter().all(Container::is_empty),
        }
    }

    /// The items of a dependency group whose config group is listed in
    /// `compatible`.
    pub(crate) fn compatible_items<'a>(
        &'a self,
        compatible: &BTreeSet<String>,
    ) -> Option<&'a [Container]> {
        match self {
            Container::DepGroup {
                items,
                config_group,
            } if compatible.contains(config_group) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Container {
    fn from(name: &str) -> Self {
        Container::leaf(name)
    }
}

impl From<String> for Container {
    fn from(name: String) -> Self {
        Container::Leaf(name)
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Container]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Leaf(name) => f.write_str(name),
            Container::Series(items) => {
                f.write_str("series(")?;
                write_items(f, items)?;
                f.write_str(")")
            }
            Container::Parallel(items) => {
                f.write_str("parallel(")?;
                write_items(f, items)?;
                f.write_str(")")
            }
            Container::DepGroup {
                items,
                config_group,
            } => {
                write!(f, "depgroup[{config_group}](")?;
                write_items(f, items)?;
                f.write_str(")")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Serialized form
// ---------------------------------------------------------------------------

/// `step`, `{series: [...]}`, `{parallel: [...]}` or
/// `{depgroup: [...], config_group: name}`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ContainerRepr {
    Leaf(String),
    Series {
        series: Vec<ContainerRepr>,
    },
    Parallel {
        parallel: Vec<ContainerRepr>,
    },
    DepGroup {
        depgroup: Vec<ContainerRepr>,
        config_group: String,
    },
}

impl From<ContainerRepr> for Container {
    fn from(repr: ContainerRepr) -> Self {
        match repr {
            ContainerRepr::Leaf(name) => Container::Leaf(name),
            ContainerRepr::Series { series } => Container::series(series),
            ContainerRepr::Parallel { parallel } => Container::parallel(parallel),
            ContainerRepr::DepGroup {
                depgroup,
                config_group,
            } => Container::depgroup(depgroup, config_group),
        }
    }
}

impl From<Container> for ContainerRepr {
    fn from(container: Container) -> Self {
        let convert = |items: Vec<Container>| items.into_iter().map(Into::into).collect();
        match container {
            Container::Leaf(name) => ContainerRepr::Leaf(name),
            Container::Series(items) => ContainerRepr::Series {
                series: convert(items),
            },
            Container::Parallel(items) => ContainerRepr::Parallel {
                parallel: convert(items),
            },
            Container::DepGroup {
                items,
                config_group,
            } => ContainerRepr::DepGroup {
                depgroup: convert(items),
                config_group,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Container {
        Container::series([
            Container::leaf("lint"),
            Container::parallel(["test", "docs"]),
            Container::depgroup(["build", "publish"], "release"),
        ])
    }

    #[test]
    fn display_uses_constructor_notation() {
        assert_eq!(
            sample().to_string(),
            "series(lint, parallel(test, docs), depgroup[release](build, publish))"
        );
    }

    #[test]
    fn endpoint_breaks_parallel_ties_alphabetically() {
        assert_eq!(Container::parallel(["b", "a", "c"]).endpoint(), Some("c"));
        assert_eq!(Container::series(["x", "a"]).endpoint(), Some("a"));
        assert_eq!(sample().endpoint(), Some("publish"));
        assert_eq!(Container::series(Vec::<Container>::new()).endpoint(), None);
    }

    #[test]
    fn leaves_in_document_order() {
        assert_eq!(sample().leaves(), vec!["lint", "test", "docs", "build", "publish"]);
        assert!(sample().contains_leaf("docs"));
        assert!(!sample().contains_leaf("deploy"));
        assert!(!sample().is_empty());
        assert!(Container::series([Container::parallel(Vec::<Container>::new())]).is_empty());
    }

    #[test]
    fn structural_equality_does_not_normalize() {
        assert_ne!(Container::parallel(["a"]), Container::leaf("a"));
        assert_eq!(Container::series(["a"]), Container::series([Container::leaf("a")]));
    }

    #[test]
    fn reads_yaml_notation() {
        let yaml = "series:\n  - lint\n  - parallel: [test, docs]\n  - depgroup: [build, publish]\n    config_group: release\n";
        let parsed: Container = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed, sample());
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["series"][1]["parallel"][0], "test");
        assert_eq!(json["series"][2]["config_group"], "release");
    }
}
