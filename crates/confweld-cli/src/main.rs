mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, doc::DocArgs, weld::WeldArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "confweld",
    about = "Idempotent, format-preserving edits to TOML, YAML and INI project configuration",
    version,
    propagate_version = true
)]
struct Cli {
    /// Directory holding .confweld.yaml (default: auto-detect from .confweld.yaml or .git/)
    #[arg(long, global = true, env = "CONFWELD_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value at a key path
    Get(DocArgs),

    /// Report whether a key path exists
    Contains(DocArgs),

    /// Write a value, merging into whatever part of the path exists
    Set {
        #[command(flatten)]
        target: DocArgs,
        /// Value as JSON; anything that is not valid JSON is taken as a string
        #[arg(long)]
        value: String,
        /// Overwrite a value that is already set
        #[arg(long)]
        force: bool,
        /// Store the value under this YAML anchor, reusing it as an alias when possible
        #[arg(long)]
        anchor: Option<String>,
    },

    /// Remove a key path, pruning parents left empty
    Delete(DocArgs),

    /// Append values to a list, creating it when absent
    Extend {
        #[command(flatten)]
        target: DocArgs,
        #[arg(long = "value", required = true)]
        values: Vec<String>,
    },

    /// Remove values from a list
    Remove {
        #[command(flatten)]
        target: DocArgs,
        #[arg(long = "value", required = true)]
        values: Vec<String>,
    },

    /// Compute where a new step goes in a CI pipeline
    Weld(WeldArgs),

    /// Inspect the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Get(target) => cmd::doc::get(&root, target, cli.json),
        Commands::Contains(target) => cmd::doc::contains(&root, target, cli.json),
        Commands::Set {
            target,
            value,
            force,
            anchor,
        } => cmd::doc::set(&root, target, &value, force, anchor, cli.json),
        Commands::Delete(target) => cmd::doc::delete(&root, target, cli.json),
        Commands::Extend { target, values } => cmd::doc::extend(&root, target, &values, cli.json),
        Commands::Remove { target, values } => cmd::doc::remove(&root, target, &values, cli.json),
        Commands::Weld(args) => cmd::weld::run(args, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
