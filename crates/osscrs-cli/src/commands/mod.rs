//! CLI command definitions and dispatch.

pub mod check;
pub mod plan;
pub mod run;

use clap::{Parser, Subcommand};

/// OSS-CRS resource orchestrator.
#[derive(Parser, Debug)]
#[command(name = "osscrs", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve and print the allocation plan without touching anything.
    Plan(plan::PlanArgs),
    /// Provision keys, build the cgroup hierarchy and launch every entity.
    Run(run::RunArgs),
    /// Check the container runtime and the delegated cgroup root.
    Check(check::CheckArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Plan(args) => plan::execute(&args),
        Command::Run(args) => run::execute(args),
        Command::Check(args) => check::execute(&args),
    }
}
