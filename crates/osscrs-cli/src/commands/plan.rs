//! `osscrs plan`: Print the allocation plan.

use std::path::PathBuf;

use clap::Args;
use osscrs_compose::ComposeConfig;

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the resource configuration document.
    #[arg(default_value = osscrs_common::constants::DEFAULT_CONFIG_FILE)]
    pub file: PathBuf,

    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `plan` command.
///
/// # Errors
///
/// Returns an error if the document is invalid or the resources cannot be
/// partitioned.
pub fn execute(args: &PlanArgs) -> anyhow::Result<()> {
    let config = ComposeConfig::load(&args.file)?;
    let plans = osscrs_compose::plan(&config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    println!("Allocation plan for: {}", args.file.display());
    println!();
    print!("{}", output::plan_table(&plans));
    if let Some(envelope) = &config.envelope {
        let total: osscrs_common::types::Budget =
            plans.iter().map(osscrs_compose::AllocationPlan::total_budget).sum();
        println!();
        println!("  Budget: ${total} of ${} envelope", envelope.max_budget);
    }
    Ok(())
}
