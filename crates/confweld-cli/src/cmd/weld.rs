use crate::output::print_json;
use anyhow::Context;
use clap::Args;
use confweld_core::pipeline::{Adder, Container};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct WeldArgs {
    /// Pipeline file (YAML or JSON): a list of steps or a single container
    pub pipeline: PathBuf,

    /// Name of the step to add
    #[arg(long)]
    pub step: String,

    /// Step that must run before the new one (repeatable)
    #[arg(long = "after")]
    pub prerequisites: Vec<String>,

    /// Step that must run after the new one (repeatable)
    #[arg(long = "before")]
    pub postrequisites: Vec<String>,

    /// Dependency group the new step may join (repeatable)
    #[arg(long = "compatible")]
    pub compatible: Vec<String>,
}

/// A top-level list is read as a series.
#[derive(Deserialize)]
#[serde(untagged)]
enum PipelineFile {
    Steps(Vec<Container>),
    Single(Container),
}

impl From<PipelineFile> for Container {
    fn from(file: PipelineFile) -> Self {
        match file {
            PipelineFile::Steps(steps) => Container::Series(steps),
            PipelineFile::Single(container) => container,
        }
    }
}

fn load_pipeline(path: &Path) -> anyhow::Result<Container> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: PipelineFile = serde_yaml::from_str(&data)
        .with_context(|| format!("failed to parse pipeline {}", path.display()))?;
    Ok(file.into())
}

pub fn run(args: WeldArgs, json: bool) -> anyhow::Result<()> {
    let pipeline = load_pipeline(&args.pipeline)?;
    tracing::debug!(pipeline = %pipeline, step = %args.step, "welding step");

    let result = Adder::new(pipeline, args.step.as_str())
        .prerequisites(args.prerequisites)
        .postrequisites(args.postrequisites)
        .compatible_groups(args.compatible)
        .add()
        .with_context(|| format!("cannot add step '{}'", args.step))?;

    if json {
        print_json(&result)?;
    } else {
        for instruction in &result.instructions {
            println!("{instruction}");
        }
        println!("solution: {}", result.solution);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn top_level_list_is_a_series() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.yml");
        std::fs::write(&path, "- lint\n- parallel: [test, docs]\n").unwrap();
        let pipeline = load_pipeline(&path).unwrap();
        assert_eq!(
            pipeline,
            Container::series([Container::leaf("lint"), Container::parallel(["test", "docs"])])
        );
    }

    #[test]
    fn single_container_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"depgroup": ["build"], "config_group": "release"}"#).unwrap();
        let pipeline = load_pipeline(&path).unwrap();
        assert_eq!(pipeline, Container::depgroup(["build"], "release"));
    }
}
