//! `osscrs check`: Verify the host can run a plan.

use std::path::PathBuf;

use clap::Args;
use osscrs_common::error::OssCrsError;
use osscrs_core::cgroup::CgroupHierarchy;
use osscrs_core::cgroup::delegation::default_delegated_root;
use osscrs_core::driver::{DockerProbe, check_driver};

use crate::output::{GREEN, RED, RESET};

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Delegated cgroup root; defaults to the invoking user's systemd root.
    #[arg(long, env = "OSSCRS_CGROUP_ROOT")]
    pub cgroup_root: Option<PathBuf>,
}

/// Executes the `check` command. Nothing is created or modified.
///
/// # Errors
///
/// Returns an error naming the failed checks.
pub fn execute(args: &CheckArgs) -> anyhow::Result<()> {
    let root = args.cgroup_root.clone().unwrap_or_else(default_delegated_root);

    let driver = DockerProbe::locate().and_then(|probe| check_driver(&probe));
    let delegation = CgroupHierarchy::new(&root).check();

    let mut failed = Vec::new();
    for (label, result) in [("cgroup driver", driver), ("cgroup delegation", delegation)] {
        match result {
            Ok(()) => println!("  {GREEN}ok{RESET}     {label}"),
            Err(OssCrsError::EnvironmentPrecondition {
                message,
                remediation,
            }) => {
                println!("  {RED}failed{RESET} {label}: {message}");
                for line in remediation.lines() {
                    println!("         {line}");
                }
                failed.push(label);
            }
            Err(e) => {
                println!("  {RED}failed{RESET} {label}: {e}");
                failed.push(label);
            }
        }
    }

    if failed.is_empty() {
        println!();
        println!("  Host is ready; delegated root: {}", root.display());
        return Ok(());
    }
    Err(anyhow::anyhow!("failed checks: {}", failed.join(", ")))
}
