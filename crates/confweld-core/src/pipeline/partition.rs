//! Three-way split of a container around a step that is about to be added.

use super::container::Container;
use crate::error::{ConfweldError, Result};
use std::collections::BTreeSet;

/// What must run before the new step, what is unrelated to it, and what
/// must run after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub prerequisite: Option<Container>,
    pub nondependent: Option<Container>,
    pub postrequisite: Option<Container>,
    /// Endpoint of the prerequisite component; the anchor for "insert after".
    pub top_ranked_endpoint: Option<String>,
}

impl Partition {
    fn new(
        prerequisite: Option<Container>,
        nondependent: Option<Container>,
        postrequisite: Option<Container>,
    ) -> Self {
        let top_ranked_endpoint = prerequisite
            .as_ref()
            .and_then(Container::endpoint)
            .map(str::to_string);
        Self {
            prerequisite,
            nondependent,
            postrequisite,
            top_ranked_endpoint,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prerequisite.is_none() && self.nondependent.is_none() && self.postrequisite.is_none()
    }

    /// The components back in series order.
    pub fn flatten(self) -> Result<Container> {
        let mut out = None;
        for piece in [self.prerequisite, self.nondependent, self.postrequisite]
            .into_iter()
            .flatten()
        {
            out = Some(join(out, piece));
        }
        out.ok_or_else(|| {
            ConfweldError::InternalConsistency("flattened an empty partition".to_string())
        })
    }
}

/// Split `container` relative to the `pre` and `post` step names. Dependency
/// groups are atomic unless their config group is in `compatible`.
pub fn partition(
    container: &Container,
    pre: &BTreeSet<String>,
    post: &BTreeSet<String>,
    compatible: &BTreeSet<String>,
) -> Result<Partition> {
    match container {
        Container::Leaf(name) => {
            let before = pre.contains(name);
            let after = post.contains(name);
            match (before, after) {
                (true, true) => Err(ConfweldError::ConflictingConstraints(format!(
                    "'{name}' is both a prerequisite and a postrequisite"
                ))),
                (true, false) => Ok(Partition::new(Some(container.clone()), None, None)),
                (false, true) => Ok(Partition::new(None, None, Some(container.clone()))),
                (false, false) => Ok(Partition::new(None, Some(container.clone()), None)),
            }
        }
        Container::Series(items) => series(items, pre, post, compatible),
        Container::Parallel(items) => parallel(items, pre, post, compatible),
        Container::DepGroup {
            items,
            config_group,
        } if compatible.contains(config_group) => {
            let inner = series(items, pre, post, compatible)?;
            let regroup = |piece: Option<Container>| {
                piece.map(|p| Container::DepGroup {
                    items: series_items(p),
                    config_group: config_group.clone(),
                })
            };
            Ok(Partition::new(
                regroup(inner.prerequisite),
                regroup(inner.nondependent),
                regroup(inner.postrequisite),
            ))
        }
        Container::DepGroup { config_group, .. } => {
            let before = touches(container, pre);
            let after = touches(container, post);
            match (before, after) {
                (true, true) => Err(ConfweldError::ConflictingConstraints(format!(
                    "dependency group '{config_group}' holds both prerequisites and postrequisites"
                ))),
                (true, false) => Ok(Partition::new(Some(container.clone()), None, None)),
                (false, true) => Ok(Partition::new(None, None, Some(container.clone()))),
                (false, false) => Ok(Partition::new(None, Some(container.clone()), None)),
            }
        }
    }
}

/// True when any step of `container` is named in `names`.
pub(crate) fn touches(container: &Container, names: &BTreeSet<String>) -> bool {
    container.leaves().into_iter().any(|leaf| names.contains(leaf))
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

fn series(
    items: &[Container],
    pre: &BTreeSet<String>,
    post: &BTreeSet<String>,
    compatible: &BTreeSet<String>,
) -> Result<Partition> {
    let mut acc = Partition::default();
    for item in items {
        let next = partition(item, pre, post, compatible)?;
        if next.is_empty() {
            continue;
        }
        acc = merge_series(acc, next)?;
    }
    Ok(acc)
}

/// Append `next` to `acc` in series. Everything ahead of a prerequisite
/// becomes prerequisite; everything behind a postrequisite becomes
/// postrequisite.
pub(crate) fn merge_series(acc: Partition, next: Partition) -> Result<Partition> {
    if next.prerequisite.is_some() && acc.postrequisite.is_some() {
        return Err(ConfweldError::ConflictingConstraints(
            "a postrequisite runs before a prerequisite".to_string(),
        ));
    }
    if let Some(next_pre) = next.prerequisite {
        let head = if acc.is_empty() {
            None
        } else {
            Some(acc.flatten()?)
        };
        return Ok(Partition::new(
            Some(join(head, next_pre)),
            next.nondependent,
            next.postrequisite,
        ));
    }
    if let Some(acc_post) = acc.postrequisite {
        let tail = next.flatten()?;
        return Ok(Partition::new(
            acc.prerequisite,
            acc.nondependent,
            Some(join(Some(acc_post), tail)),
        ));
    }
    let nondependent = match next.nondependent {
        Some(piece) => Some(join(acc.nondependent, piece)),
        None => acc.nondependent,
    };
    Ok(Partition::new(
        acc.prerequisite,
        nondependent,
        next.postrequisite,
    ))
}

fn parallel(
    items: &[Container],
    pre: &BTreeSet<String>,
    post: &BTreeSet<String>,
    compatible: &BTreeSet<String>,
) -> Result<Partition> {
    let parts = items
        .iter()
        .map(|item| partition(item, pre, post, compatible))
        .collect::<Result<Vec<_>>>()?;
    Ok(merge_parallel(parts))
}

/// Combine sibling partitions component by component.
pub(crate) fn merge_parallel(parts: Vec<Partition>) -> Partition {
    let mut pres = Vec::new();
    let mut nondeps = Vec::new();
    let mut posts = Vec::new();
    for part in parts {
        pres.extend(part.prerequisite);
        nondeps.extend(part.nondependent);
        posts.extend(part.postrequisite);
    }
    Partition::new(branches(pres), branches(nondeps), branches(posts))
}

fn branches(mut pieces: Vec<Container>) -> Option<Container> {
    match pieces.len() {
        0 => None,
        1 => pieces.pop(),
        _ => Some(Container::Parallel(pieces)),
    }
}

fn series_items(container: Container) -> Vec<Container> {
    match container {
        Container::Series(items) => items,
        other => vec![other],
    }
}

/// `head` followed by `tail`, as one flat series.
fn join(head: Option<Container>, tail: Container) -> Container {
    let Some(head) = head else {
        return tail;
    };
    let mut items = series_items(head);
    items.extend(series_items(tail));
    Container::Series(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn split(c: &Container, pre: &[&str], post: &[&str]) -> Result<Partition> {
        partition(c, &names(pre), &names(post), &BTreeSet::new())
    }

    #[test]
    fn leaf_lands_in_one_component() {
        let p = split(&Container::leaf("a"), &["a"], &[]).unwrap();
        assert_eq!(p.prerequisite, Some(Container::leaf("a")));
        assert_eq!(p.top_ranked_endpoint.as_deref(), Some("a"));

        let p = split(&Container::leaf("a"), &[], &["a"]).unwrap();
        assert_eq!(p.postrequisite, Some(Container::leaf("a")));
        assert!(p.top_ranked_endpoint.is_none());

        let p = split(&Container::leaf("a"), &[], &[]).unwrap();
        assert_eq!(p.nondependent, Some(Container::leaf("a")));

        let err = split(&Container::leaf("a"), &["a"], &["a"]).unwrap_err();
        assert!(matches!(err, ConfweldError::ConflictingConstraints(_)));
    }

    #[test]
    fn series_pulls_earlier_steps_into_the_prerequisite_chain() {
        let c = Container::series(["x", "a", "y", "p", "z"]);
        let p = split(&c, &["a"], &["p"]).unwrap();
        assert_eq!(p.prerequisite, Some(Container::series(["x", "a"])));
        assert_eq!(p.nondependent, Some(Container::leaf("y")));
        assert_eq!(p.postrequisite, Some(Container::series(["p", "z"])));
        assert_eq!(p.top_ranked_endpoint.as_deref(), Some("a"));
    }

    #[test]
    fn series_rejects_postrequisite_before_prerequisite() {
        let c = Container::series(["p", "a"]);
        let err = split(&c, &["a"], &["p"]).unwrap_err();
        assert!(matches!(err, ConfweldError::ConflictingConstraints(_)));
    }

    #[test]
    fn parallel_wraps_components_with_several_contributors() {
        let c = Container::parallel(["b", "a", "x", "p"]);
        let p = split(&c, &["a", "b"], &["p"]).unwrap();
        assert_eq!(p.prerequisite, Some(Container::parallel(["b", "a"])));
        assert_eq!(p.nondependent, Some(Container::leaf("x")));
        assert_eq!(p.postrequisite, Some(Container::leaf("p")));
        assert_eq!(p.top_ranked_endpoint.as_deref(), Some("b"));
    }

    #[test]
    fn opaque_group_is_atomic() {
        let c = Container::depgroup(["a", "x"], "build");
        let p = split(&c, &["a"], &[]).unwrap();
        assert_eq!(p.prerequisite, Some(c.clone()));
        assert!(p.nondependent.is_none());

        let err = split(&c, &["a"], &["x"]).unwrap_err();
        assert!(matches!(err, ConfweldError::ConflictingConstraints(_)));
    }

    #[test]
    fn compatible_group_splits_like_a_series() {
        let c = Container::depgroup(["a", "x"], "build");
        let p = partition(&c, &names(&["a"]), &BTreeSet::new(), &names(&["build"])).unwrap();
        assert_eq!(p.prerequisite, Some(Container::depgroup(["a"], "build")));
        assert_eq!(p.nondependent, Some(Container::depgroup(["x"], "build")));
    }

    #[test]
    fn combinators_compose_independently() {
        let a = Partition::new(Some(Container::leaf("a")), None, None);
        let b = Partition::new(None, Some(Container::leaf("b")), None);
        let merged = merge_parallel(vec![a.clone(), b.clone()]);
        assert_eq!(merged.prerequisite, Some(Container::leaf("a")));
        assert_eq!(merged.nondependent, Some(Container::leaf("b")));

        let chained = merge_series(b, a).unwrap();
        assert_eq!(chained.prerequisite, Some(Container::series(["b", "a"])));
        assert!(chained.nondependent.is_none());
    }

    #[test]
    fn flattening_nothing_is_an_internal_failure() {
        let err = Partition::default().flatten().unwrap_err();
        assert!(matches!(err, ConfweldError::InternalConsistency(_)));
        let whole = split(&Container::series(["a", "b"]), &["a"], &["b"])
            .unwrap()
            .flatten()
            .unwrap();
        assert_eq!(whole, Container::series(["a", "b"]));
    }
}
