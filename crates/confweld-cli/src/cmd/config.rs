use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use confweld_core::config::{config_path, Config, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective settings
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    match subcmd {
        ConfigSubcommand::Show => show(root, &config, json),
        ConfigSubcommand::Validate => validate(&config, json),
    }
}

fn show(root: &Path, config: &Config, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(config);
    }
    let path = config_path(root);
    let source = if path.exists() {
        path.display().to_string()
    } else {
        "(defaults)".to_string()
    };
    println!("Source:               {source}");
    println!("YAML guess indent:    {}", config.yaml.guess_indent);
    println!("YAML mapping indent:  {}", config.yaml.mapping_indent);
    println!("YAML sequence indent: {}", config.yaml.sequence_indent);
    println!("YAML sequence offset: {}", config.yaml.sequence_offset);
    println!("INI continuation:     {}", config.ini.continuation_indent);
    Ok(())
}

fn validate(config: &Config, json: bool) -> anyhow::Result<()> {
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
