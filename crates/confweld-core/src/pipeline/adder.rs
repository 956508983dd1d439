//! Weld a new step into an existing pipeline.
//!
//! The step goes immediately after the last top-level item that holds a
//! prerequisite, joining whatever runs next in parallel when that item is
//! not itself a postrequisite. When prerequisites and postrequisites share
//! one item, the item is partitioned and its postrequisite component is
//! moved behind the new step.

use super::container::Container;
use super::instruction::{replay, Instruction};
use super::partition::{partition, touches};
use crate::error::{ConfweldError, Result};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeldResult {
    pub instructions: Vec<Instruction>,
    /// `pipeline` with `instructions` applied.
    pub solution: Container,
}

#[derive(Debug, Clone)]
pub struct Adder {
    pipeline: Container,
    step: String,
    prerequisites: BTreeSet<String>,
    postrequisites: BTreeSet<String>,
    compatible_groups: BTreeSet<String>,
}

impl Adder {
    pub fn new(pipeline: Container, step: impl Into<String>) -> Self {
        Self {
            pipeline,
            step: step.into(),
            prerequisites: BTreeSet::new(),
            postrequisites: BTreeSet::new(),
            compatible_groups: BTreeSet::new(),
        }
    }

    /// Steps that must finish before the new one starts.
    pub fn prerequisites<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites.extend(names.into_iter().map(Into::into));
        self
    }

    /// Steps that must not start before the new one finishes.
    pub fn postrequisites<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.postrequisites.extend(names.into_iter().map(Into::into));
        self
    }

    /// Config groups whose dependency groups may receive the new step.
    pub fn compatible_groups<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compatible_groups
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn add(&self) -> Result<WeldResult> {
        if let Some(both) = self
            .prerequisites
            .intersection(&self.postrequisites)
            .next()
        {
            return Err(ConfweldError::ConflictingConstraints(format!(
                "'{both}' is both a prerequisite and a postrequisite"
            )));
        }
        if self.pipeline.contains_leaf(&self.step) {
            return Err(ConfweldError::StepExists(self.step.clone()));
        }

        let root = match &self.pipeline {
            Container::Series(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        let instructions = self.weld(root)?;
        let solution = replay(&self.pipeline, &instructions, &self.compatible_groups)?;
        Ok(WeldResult {
            instructions,
            solution,
        })
    }

    fn weld(&self, items: &[Container]) -> Result<Vec<Instruction>> {
        let last_pre = items
            .iter()
            .rposition(|item| touches(item, &self.prerequisites));
        let first_post = items
            .iter()
            .position(|item| touches(item, &self.postrequisites));

        let Some(i) = last_pre else {
            let end = first_post.unwrap_or(items.len());
            return Ok(vec![self.insert(None, end > 0)]);
        };
        if first_post.is_some_and(|j| j < i) {
            return Err(ConfweldError::ConflictingConstraints(format!(
                "a postrequisite of '{}' runs before one of its prerequisites",
                self.step
            )));
        }
        if let Some(inner) = items[i].compatible_items(&self.compatible_groups) {
            return self.weld(inner);
        }
        if first_post == Some(i) {
            return self.split(&items[i]);
        }
        let end = first_post.unwrap_or(items.len());
        let after = items[i].endpoint().map(str::to_string);
        Ok(vec![self.insert(after, end > i + 1)])
    }

    fn insert(&self, after: Option<String>, beside_next: bool) -> Instruction {
        let step = self.step.clone();
        if beside_next {
            Instruction::InsertParallel { step, after }
        } else {
            Instruction::InsertSuccessor { step, after }
        }
    }

    /// `item` holds both prerequisites and postrequisites.
    fn split(&self, item: &Container) -> Result<Vec<Instruction>> {
        let parts = partition(
            item,
            &self.prerequisites,
            &self.postrequisites,
            &self.compatible_groups,
        )?;
        let anchor = parts.top_ranked_endpoint.ok_or_else(|| {
            ConfweldError::InternalConsistency(format!("no prerequisite endpoint in {item}"))
        })?;
        let moved = parts.postrequisite.ok_or_else(|| {
            ConfweldError::InternalConsistency(format!("no postrequisite component in {item}"))
        })?;

        let mut out = vec![self.insert(Some(anchor), false)];
        place(&moved, Some(&self.step), false, &mut out)?;
        Ok(out)
    }
}

/// Instructions that rebuild `container` after `after`.
fn place(
    container: &Container,
    after: Option<&str>,
    beside_next: bool,
    out: &mut Vec<Instruction>,
) -> Result<()> {
    match container {
        Container::Leaf(step) => {
            let step = step.clone();
            let after = after.map(str::to_string);
            out.push(if beside_next {
                Instruction::InsertParallel { step, after }
            } else {
                Instruction::InsertSuccessor { step, after }
            });
        }
        Container::Series(items) => {
            let mut anchor = after.map(str::to_string);
            for (k, item) in items.iter().enumerate() {
                place(item, anchor.as_deref(), beside_next && k == 0, out)?;
                if let Some(end) = item.endpoint() {
                    anchor = Some(end.to_string());
                }
            }
        }
        Container::Parallel(items) => {
            for (k, item) in items.iter().enumerate() {
                place(item, after, beside_next || k > 0, out)?;
            }
        }
        Container::DepGroup { config_group, .. } => {
            return Err(ConfweldError::UnmovableGroup(config_group.clone()));
        }
    }
    Ok(())
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

    /// `a` finishes before `b` starts in `c`.
    fn precedes(c: &Container, a: &str, b: &str) -> bool {
        match c {
            Container::Leaf(_) => false,
            Container::Series(items) | Container::DepGroup { items, .. } => {
                let ia = items.iter().position(|i| i.contains_leaf(a));
                let ib = items.iter().position(|i| i.contains_leaf(b));
                match (ia, ib) {
                    (Some(ia), Some(ib)) if ia == ib => precedes(&items[ia], a, b),
                    (Some(ia), Some(ib)) => ia < ib,
                    _ => false,
                }
            }
            Container::Parallel(items) => items
                .iter()
                .find(|i| i.contains_leaf(a))
                .is_some_and(|i| i.contains_leaf(b) && precedes(i, a, b)),
        }
    }

    #[test]
    fn no_constraints_runs_beside_the_first_item() {
        let result = Adder::new(Container::series(["a"]), "s").add().unwrap();
        assert_eq!(result.instructions, vec![beside("s", None)]);
        assert_eq!(
            result.solution,
            Container::series([Container::parallel(["a", "s"])])
        );
    }

    #[test]
    fn prerequisite_chain() {
        let result = Adder::new(Container::series(["A", "B"]), "C")
            .prerequisites(["A"])
            .add()
            .unwrap();
        assert_eq!(result.instructions, vec![beside("C", Some("A"))]);
        assert_eq!(
            result.solution,
            Container::series([Container::leaf("A"), Container::parallel(["B", "C"])])
        );
    }

    #[test]
    fn parallel_prerequisites_anchor_on_the_greatest_name() {
        let pipeline = Container::series([Container::parallel(["b", "a"]), Container::leaf("x")]);
        let result = Adder::new(pipeline, "s")
            .prerequisites(["a", "b"])
            .add()
            .unwrap();
        assert_eq!(result.instructions, vec![beside("s", Some("b"))]);
        assert_eq!(
            result.solution,
            Container::series([Container::parallel(["b", "a"]), Container::parallel(["x", "s"])])
        );
    }

    #[test]
    fn postrequisites_bound_the_insertion() {
        let result = Adder::new(Container::series(["a", "p"]), "s")
            .postrequisites(["p"])
            .add()
            .unwrap();
        assert_eq!(
            result.solution,
            Container::series([Container::parallel(["a", "s"]), Container::leaf("p")])
        );

        let result = Adder::new(Container::series(["p", "a"]), "s")
            .postrequisites(["p"])
            .add()
            .unwrap();
        assert_eq!(result.instructions, vec![successor("s", None)]);
        assert_eq!(result.solution, Container::series(["s", "p", "a"]));
    }

    #[test]
    fn prerequisite_and_postrequisite_ends_in_series() {
        let result = Adder::new(Container::series(["a", "p"]), "s")
            .prerequisites(["a"])
            .postrequisites(["p"])
            .add()
            .unwrap();
        assert_eq!(result.instructions, vec![successor("s", Some("a"))]);
        assert_eq!(result.solution, Container::series(["a", "s", "p"]));
    }

    #[test]
    fn shared_parallel_item_is_split() {
        let pipeline = Container::series([Container::parallel(["a", "p"])]);
        let result = Adder::new(pipeline, "s")
            .prerequisites(["a"])
            .postrequisites(["p"])
            .add()
            .unwrap();
        assert_eq!(
            result.instructions,
            vec![successor("s", Some("a")), successor("p", Some("s"))]
        );
        assert_eq!(result.solution, Container::series(["a", "s", "p"]));
    }

    #[test]
    fn compatible_group_takes_the_step() {
        let pipeline = Container::depgroup(["A", "B"], "g");
        let result = Adder::new(pipeline.clone(), "C")
            .prerequisites(["A"])
            .compatible_groups(["g"])
            .add()
            .unwrap();
        assert_eq!(
            result.solution,
            Container::series([Container::depgroup(
                [Container::leaf("A"), Container::parallel(["B", "C"])],
                "g"
            )])
        );

        let result = Adder::new(pipeline.clone(), "C")
            .prerequisites(["A"])
            .add()
            .unwrap();
        assert_eq!(result.instructions, vec![successor("C", Some("B"))]);
        assert_eq!(
            result.solution,
            Container::series([pipeline, Container::leaf("C")])
        );
    }

    #[test]
    fn contradictory_constraints_fail() {
        let err = Adder::new(Container::series(["p", "a"]), "s")
            .prerequisites(["a"])
            .postrequisites(["p"])
            .add()
            .unwrap_err();
        assert!(matches!(err, ConfweldError::ConflictingConstraints(_)));

        let err = Adder::new(Container::series(["a"]), "s")
            .prerequisites(["a"])
            .postrequisites(["a"])
            .add()
            .unwrap_err();
        assert!(matches!(err, ConfweldError::ConflictingConstraints(_)));

        let pipeline = Container::series([Container::depgroup(["a", "p"], "g")]);
        let err = Adder::new(pipeline, "s")
            .prerequisites(["a"])
            .postrequisites(["p"])
            .add()
            .unwrap_err();
        assert!(matches!(err, ConfweldError::ConflictingConstraints(_)));
    }

    #[test]
    fn existing_step_is_rejected() {
        let err = Adder::new(Container::series(["a"]), "a").add().unwrap_err();
        assert!(matches!(err, ConfweldError::StepExists(name) if name == "a"));
    }

    #[test]
    fn opaque_group_cannot_be_moved() {
        let pipeline = Container::series([Container::parallel([
            Container::leaf("a"),
            Container::depgroup(["p"], "deploy"),
        ])]);
        let err = Adder::new(pipeline, "s")
            .prerequisites(["a"])
            .postrequisites(["p"])
            .add()
            .unwrap_err();
        assert!(matches!(err, ConfweldError::UnmovableGroup(group) if group == "deploy"));
    }

    #[test]
    fn empty_pipeline_gets_a_single_step() {
        let result = Adder::new(Container::series(Vec::<Container>::new()), "s")
            .prerequisites(["missing"])
            .add()
            .unwrap();
        assert_eq!(result.solution, Container::series(["s"]));
    }

    #[test]
    fn solutions_replay_and_satisfy_constraints() {
        let cases: Vec<(Container, &[&str], &[&str])> = vec![
            (Container::series(["a", "b", "c"]), &["a"], &["c"]),
            (Container::series(["a", "b", "c"]), &["b"], &[]),
            (Container::series(["a", "b", "c"]), &[], &["b"]),
            (
                Container::series([
                    Container::leaf("lint"),
                    Container::parallel(["test", "docs"]),
                    Container::leaf("deploy"),
                ]),
                &["lint"],
                &["deploy"],
            ),
            (
                Container::series([
                    Container::parallel([
                        Container::series(["a", "x"]),
                        Container::series(["p", "y"]),
                    ]),
                    Container::leaf("z"),
                ]),
                &["a"],
                &["p"],
            ),
            (
                Container::series([Container::parallel(["a", "p", "q", "x"])]),
                &["a"],
                &["p", "q"],
            ),
            (
                Container::series([Container::series(["a", "x", "p"]), Container::leaf("z")]),
                &["a"],
                &["p"],
            ),
        ];

        for (pipeline, pre, post) in cases {
            let result = Adder::new(pipeline.clone(), "new")
                .prerequisites(pre.iter().copied())
                .postrequisites(post.iter().copied())
                .add()
                .unwrap();
            let replayed = replay(&pipeline, &result.instructions, &BTreeSet::new()).unwrap();
            assert_eq!(replayed, result.solution, "{pipeline}");

            let mut expected = pipeline.leaves();
            expected.push("new");
            expected.sort_unstable();
            let mut actual = result.solution.leaves();
            actual.sort_unstable();
            assert_eq!(actual, expected, "{pipeline}");

            for p in pre {
                assert!(precedes(&result.solution, p, "new"), "{p} before new in {}", result.solution);
            }
            for p in post {
                assert!(precedes(&result.solution, "new", p), "new before {p} in {}", result.solution);
            }
        }
    }
}
