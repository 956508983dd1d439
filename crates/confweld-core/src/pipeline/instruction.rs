//! Primitive pipeline edits and their replay.

use super::container::Container;
use crate::error::{ConfweldError, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// One insertion. Inserting a step that is already in the pipeline moves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Run `step` in series right after the item holding `after`, or first
    /// when `after` is `None`.
    InsertSuccessor { step: String, after: Option<String> },
    /// Run `step` beside the item that follows `after`, or beside the first
    /// item when `after` is `None`.
    InsertParallel { step: String, after: Option<String> },
}

impl Instruction {
    pub fn step(&self) -> &str {
        match self {
            Instruction::InsertSuccessor { step, .. } | Instruction::InsertParallel { step, .. } => {
                step
            }
        }
    }

    pub fn after(&self) -> Option<&str> {
        match self {
            Instruction::InsertSuccessor { after, .. } | Instruction::InsertParallel { after, .. } => {
                after.as_deref()
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Instruction::InsertSuccessor { .. } => "insert-successor",
            Instruction::InsertParallel { .. } => "insert-parallel",
        };
        match self.after() {
            Some(after) => write!(f, "{op} {} after {after}", self.step()),
            None => write!(f, "{op} {} at start", self.step()),
        }
    }
}

/// Apply `instructions` to `pipeline` in order. The result is always a
/// series; a pipeline that is not one is wrapped first.
pub fn replay(
    pipeline: &Container,
    instructions: &[Instruction],
    compatible: &BTreeSet<String>,
) -> Result<Container> {
    let mut root = match pipeline.clone() {
        Container::Series(items) => items,
        other => vec![other],
    };
    for instruction in instructions {
        apply(&mut root, instruction, compatible)?;
    }
    Ok(Container::Series(root))
}

fn apply(
    root: &mut Vec<Container>,
    instruction: &Instruction,
    compatible: &BTreeSet<String>,
) -> Result<()> {
    let step = instruction.step();
    detach(root, step);

    let mut path = Vec::new();
    let anchor = match instruction.after() {
        Some(after) => Some(
            locate(root, after, compatible, &mut path)
                .ok_or_else(|| ConfweldError::UnknownStep(after.to_string()))?,
        ),
        None => None,
    };
    let seq = items_at(root, &path)?;
    let pos = anchor.map_or(0, |idx| idx + 1);
    let leaf = Container::leaf(step);

    match instruction {
        Instruction::InsertSuccessor { .. } => seq.insert(pos, leaf),
        Instruction::InsertParallel { .. } => match seq.get_mut(pos) {
            Some(Container::Parallel(branches)) => branches.push(leaf),
            Some(slot) => {
                let sibling = std::mem::replace(slot, Container::Parallel(Vec::new()));
                *slot = Container::Parallel(vec![sibling, leaf]);
            }
            None => seq.push(leaf),
        },
    }
    Ok(())
}

/// Index of the item holding `name`, descending into compatible groups.
/// The group indices walked through are pushed onto `path`.
fn locate(
    items: &[Container],
    name: &str,
    compatible: &BTreeSet<String>,
    path: &mut Vec<usize>,
) -> Option<usize> {
    let idx = items.iter().position(|item| item.contains_leaf(name))?;
    match items[idx].compatible_items(compatible) {
        Some(inner) => {
            path.push(idx);
            locate(inner, name, compatible, path)
        }
        None => Some(idx),
    }
}

fn items_at<'a>(root: &'a mut Vec<Container>, path: &[usize]) -> Result<&'a mut Vec<Container>> {
    let mut seq = root;
    for &idx in path {
        seq = match seq.get_mut(idx) {
            Some(Container::DepGroup { items, .. }) => items,
            _ => {
                return Err(ConfweldError::InternalConsistency(format!(
                    "no dependency group at index {idx}"
                )))
            }
        };
    }
    Ok(seq)
}

/// Remove the leaf `step`. Containers emptied by the removal disappear and
/// single-branch series or parallels collapse into their branch; groups
/// are kept as they are.
fn detach(items: &mut Vec<Container>, step: &str) -> bool {
    if let Some(pos) = items
        .iter()
        .position(|item| matches!(item, Container::Leaf(name) if name == step))
    {
        items.remove(pos);
        return true;
    }
    for idx in 0..items.len() {
        let inner = match &mut items[idx] {
            Container::Leaf(_) => continue,
            Container::Series(inner)
            | Container::Parallel(inner)
            | Container::DepGroup { items: inner, .. } => inner,
        };
        if !detach(inner, step) {
            continue;
        }
        let collapse = match &mut items[idx] {
            Container::Series(inner) | Container::Parallel(inner) if inner.len() <= 1 => {
                Some(inner.pop())
            }
            _ => None,
        };
        match collapse {
            Some(Some(only)) => items[idx] = only,
            Some(None) => {
                items.remove(idx);
            }
            None => {}
        }
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn successor(step: &str, after: Option<&str>) -> Instruction {
        Instruction::InsertSuccessor {
            step: step.to_string(),
            after: after.map(str::to_string),
        }
    }

    fn beside(step: &str, after: Option<&str>) -> Instruction {
        Instruction::InsertParallel {
            step: step.to_string(),
            after: after.map(str::to_string),
        }
    }

    fn run(pipeline: Container, instructions: &[Instruction]) -> Result<Container> {
        replay(&pipeline, instructions, &BTreeSet::new())
    }

    #[test]
    fn successor_goes_after_the_anchor_item() {
        let out = run(Container::series(["a", "b"]), &[successor("s", Some("a"))]).unwrap();
        assert_eq!(out, Container::series(["a", "s", "b"]));

        let out = run(Container::series(["a"]), &[successor("s", None)]).unwrap();
        assert_eq!(out, Container::series(["s", "a"]));
    }

    #[test]
    fn parallel_joins_the_following_item() {
        let out = run(Container::series(["a", "b"]), &[beside("s", Some("a"))]).unwrap();
        assert_eq!(
            out,
            Container::series([Container::leaf("a"), Container::parallel(["b", "s"])])
        );

        let pipeline = Container::series([Container::parallel(["a", "b"])]);
        let out = run(pipeline, &[beside("s", None)]).unwrap();
        assert_eq!(out, Container::series([Container::parallel(["a", "b", "s"])]));

        let out = run(Container::series(["a"]), &[beside("s", Some("a"))]).unwrap();
        assert_eq!(out, Container::series(["a", "s"]));
    }

    #[test]
    fn empty_pipeline_takes_the_first_step() {
        let out = run(Container::series(Vec::<Container>::new()), &[beside("s", None)]).unwrap();
        assert_eq!(out, Container::series(["s"]));
    }

    #[test]
    fn existing_steps_are_moved() {
        let pipeline = Container::series([Container::parallel(["a", "p"])]);
        let out = run(
            pipeline,
            &[successor("s", Some("a")), successor("p", Some("s"))],
        )
        .unwrap();
        assert_eq!(out, Container::series(["a", "s", "p"]));
    }

    #[test]
    fn groups_survive_losing_steps() {
        let pipeline = Container::series([Container::depgroup(["p"], "g"), Container::leaf("a")]);
        let out = run(pipeline, &[successor("p", Some("a"))]).unwrap();
        assert_eq!(
            out,
            Container::series([
                Container::depgroup(Vec::<Container>::new(), "g"),
                Container::leaf("a"),
                Container::leaf("p"),
            ])
        );
    }

    #[test]
    fn anchors_inside_compatible_groups_are_local() {
        let pipeline = Container::depgroup(["a", "b"], "g");
        let compatible = BTreeSet::from(["g".to_string()]);
        let out = replay(&pipeline, &[beside("c", Some("a"))], &compatible).unwrap();
        assert_eq!(
            out,
            Container::series([Container::depgroup(
                [Container::leaf("a"), Container::parallel(["b", "c"])],
                "g"
            )])
        );

        let out = replay(&pipeline, &[beside("c", Some("a"))], &BTreeSet::new()).unwrap();
        assert_eq!(
            out,
            Container::series([pipeline.clone(), Container::leaf("c")])
        );
    }

    #[test]
    fn unknown_anchor_fails() {
        let err = run(Container::series(["a"]), &[successor("s", Some("zz"))]).unwrap_err();
        assert!(matches!(err, ConfweldError::UnknownStep(name) if name == "zz"));
    }

    #[test]
    fn instructions_render_readably() {
        assert_eq!(
            successor("lint", Some("build")).to_string(),
            "insert-successor lint after build"
        );
        assert_eq!(beside("lint", None).to_string(), "insert-parallel lint at start");
        let json = serde_json::to_value(beside("lint", None)).unwrap();
        assert_eq!(json["op"], "insert_parallel");
        assert_eq!(json["step"], "lint");
        assert!(json["after"].is_null());
    }
}
