#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use depgraph_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "depgraph")]
#[command(author, version, about = "Restore project dependency graphs", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Restore every project in the solution
    Restore {
        /// Solution file or directory (default: nearest depgraph.json)
        solution: Option<PathBuf>,

        /// Restore even when nothing changed since the last restore
        #[arg(long)]
        force: bool,

        /// Use these package sources instead of the configured ones
        #[arg(long = "source", value_name = "SOURCE")]
        sources: Vec<String>,

        /// Only restore these projects (by id)
        #[arg(long = "project", value_name = "ID")]
        projects: Vec<String>,

        /// Maximum number of projects restored at once
        #[arg(long, env = "DEPGRAPH_MAX_PARALLELISM")]
        parallelism: Option<usize>,
    },

    /// Print the dependency graph spec
    Spec {
        /// Solution file or directory (default: nearest depgraph.json)
        solution: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(cli.json),
        Some(Commands::Restore {
            solution,
            force,
            sources,
            projects,
            parallelism,
        }) => {
            config = config.with_max_parallelism(parallelism);
            let span = tracing::info_span!("restore", cmd = "restore", cwd = %cwd.display());
            let _guard = span.enter();
            commands::restore::run(
                &config,
                &commands::restore::RestoreArgs {
                    solution,
                    force,
                    sources,
                    projects,
                },
                cli.json,
            )
        }
        Some(Commands::Spec { solution }) => {
            commands::spec::run(&config, solution.as_deref(), cli.json)
        }
    }
}
