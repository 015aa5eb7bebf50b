//! `osscrs run`: Execute a plan end to end.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, ValueEnum};
use osscrs_budget::{HttpGateway, KeySource};
use osscrs_common::constants::{DEFAULT_BUDGET_DURATION, DEFAULT_CONFIG_FILE, DEFAULT_GATEWAY_URL};
use osscrs_common::types::{Phase, RunId};
use osscrs_compose::ComposeConfig;
use osscrs_core::driver::DockerProbe;
use osscrs_runtime::{DockerLauncher, LaunchStatus, Orchestrator, ProvisioningPolicy, RunContext};

use crate::output::{BOLD, DIM, GREEN, RED, RESET, YELLOW};

/// Pipeline phase, as accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PhaseArg {
    /// Building CRS images and artifacts.
    Build,
    /// Running CRS instances.
    Run,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Build => Self::Build,
            PhaseArg::Run => Self::Run,
        }
    }
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the resource configuration document.
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    pub file: PathBuf,

    /// Base URL of the budget gateway.
    #[arg(long, env = "OSSCRS_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    pub gateway_url: String,

    /// Gateway master key used to mint per-entity keys.
    #[arg(long, env = "LITELLM_MASTER_KEY", hide_env_values = true)]
    pub master_key: Option<String>,

    /// Pre-issued key handed to every entity instead of minting one each.
    #[arg(long, env = "LITELLM_KEY", hide_env_values = true)]
    pub external_key: Option<String>,

    /// Lifetime of generated keys.
    #[arg(long, default_value = DEFAULT_BUDGET_DURATION)]
    pub budget_duration: String,

    /// Directory credential files are written to.
    #[arg(long, env = "OSSCRS_CREDENTIAL_DIR")]
    pub credential_dir: Option<PathBuf>,

    /// Delegated cgroup root; defaults to the invoking user's systemd root.
    #[arg(long, env = "OSSCRS_CGROUP_ROOT")]
    pub cgroup_root: Option<PathBuf>,

    /// Run identifier; generated when omitted.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Pipeline phase.
    #[arg(long, value_enum, default_value = "run")]
    pub phase: PhaseArg,

    /// Worker handled by this host; repeat for several. Defaults to all.
    #[arg(long = "worker")]
    pub workers: Vec<String>,

    /// Drop entities whose key cannot be provisioned instead of aborting.
    #[arg(long)]
    pub best_effort: bool,
}

impl RunArgs {
    fn context(&self) -> RunContext {
        let run_id = self.run_id.clone().map_or_else(RunId::generate, RunId::new);
        let mut ctx = RunContext::new(run_id, self.phase.into());
        if let Some(root) = &self.cgroup_root {
            ctx.cgroup_root.clone_from(root);
        }
        if let Some(dir) = &self.credential_dir {
            ctx.credential_dir.clone_from(dir);
        }
        ctx.budget_duration.clone_from(&self.budget_duration);
        ctx.key_source = self
            .external_key
            .clone()
            .map_or(KeySource::Generate, KeySource::External);
        if self.best_effort {
            ctx.policy = ProvisioningPolicy::BestEffort;
        }
        ctx.workers.clone_from(&self.workers);
        ctx
    }
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the run aborts or any container exits non-zero.
pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let started = Instant::now();
    let config = ComposeConfig::load(&args.file)?;
    let ctx = args.context();

    let cancel = ctx.cancel.clone();
    ctrlc::set_handler(move || cancel.cancel())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    if args.external_key.is_none() && args.master_key.is_none() {
        tracing::warn!("no master key set; entities with models will fail to provision");
    }
    let bearer = args
        .master_key
        .clone()
        .or_else(|| args.external_key.clone())
        .unwrap_or_default();
    let gateway = HttpGateway::new(&args.gateway_url, bearer)?;
    let probe = DockerProbe::locate()?;
    let launcher = DockerLauncher::locate()?;

    eprintln!();
    eprintln!(
        "  {BOLD}osscrs{RESET} {DIM}v{} run {} ({}){RESET}",
        env!("CARGO_PKG_VERSION"),
        ctx.run_id,
        ctx.phase
    );
    eprintln!();

    let report = Orchestrator::new(&ctx, &gateway, &probe, &launcher).run(&config)?;

    for name in &report.dropped {
        eprintln!("    {YELLOW}○{RESET} {BOLD}{name}{RESET} {DIM}dropped: no credential{RESET}");
    }
    for outcome in &report.outcomes {
        let (mark, detail) = match &outcome.status {
            LaunchStatus::Exited(0) => (format!("{GREEN}●{RESET}"), "exited 0".to_owned()),
            LaunchStatus::Exited(code) => (format!("{RED}●{RESET}"), format!("exited {code}")),
            LaunchStatus::Failed(reason) => (format!("{RED}●{RESET}"), reason.clone()),
        };
        eprintln!(
            "    {mark} {BOLD}{}{RESET} {DIM}[{}]{RESET} {detail}",
            outcome.entity_name, outcome.worker_name
        );
    }
    for warning in &report.warnings {
        eprintln!("  {YELLOW}Warning:{RESET} {warning}");
    }
    eprintln!();
    eprintln!(
        "  Finished in {:.1}s",
        started.elapsed().as_secs_f64()
    );

    if report.succeeded() {
        return Ok(());
    }
    let failed = report
        .outcomes
        .iter()
        .filter(|o| o.status != LaunchStatus::Exited(0))
        .count();
    Err(anyhow::anyhow!("{failed} container(s) did not exit cleanly"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::commands::{Cli, Command};

    fn parse(args: &[&str]) -> RunArgs {
        let mut argv = vec!["osscrs", "run"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Command::Run(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn context_from_flags() {
        let args = parse(&[
            "crs.yaml",
            "--run-id",
            "r7",
            "--phase",
            "build",
            "--worker",
            "a",
            "--worker",
            "b",
            "--best-effort",
            "--cgroup-root",
            "/tmp/cg",
            "--budget-duration",
            "7d",
        ]);
        let ctx = args.context();
        assert_eq!(ctx.run_id.as_str(), "r7");
        assert_eq!(ctx.phase, Phase::Build);
        assert_eq!(ctx.workers, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(ctx.policy, ProvisioningPolicy::BestEffort);
        assert_eq!(ctx.cgroup_root, PathBuf::from("/tmp/cg"));
        assert_eq!(ctx.budget_duration, "7d");
    }

    #[test]
    fn external_key_switches_key_source() {
        let args = parse(&["crs.yaml", "--run-id", "r1", "--external-key", "sk-shared"]);
        assert!(matches!(args.context().key_source, KeySource::External(k) if k == "sk-shared"));
    }

    #[test]
    fn defaults() {
        let args = parse(&["--run-id", "r1"]);
        assert_eq!(args.file, PathBuf::from("oss-crs.yaml"));
        let ctx = args.context();
        assert_eq!(ctx.phase, Phase::Run);
        assert_eq!(ctx.policy, ProvisioningPolicy::AllOrNothing);
        assert!(ctx.workers.is_empty());
    }
}
