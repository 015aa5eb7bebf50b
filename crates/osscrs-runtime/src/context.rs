//! Per-run settings and cooperative cancellation.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use osscrs_budget::KeySource;
use osscrs_common::constants::{CGROUP_V2_PATH, DEFAULT_BUDGET_DURATION, default_credential_dir};
use osscrs_common::error::{OssCrsError, Result};
use osscrs_common::types::{Phase, RunId};
use osscrs_core::cgroup::delegation::default_delegated_root;

/// What a provisioning failure takes down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProvisioningPolicy {
    /// Abort the run before any cgroup work.
    #[default]
    AllOrNothing,
    /// Drop only the failed entity from the launch set.
    BestEffort,
}

/// Shared cancellation flag, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`OssCrsError::Cancelled`] once cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::Cancelled`] if the flag is raised.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(OssCrsError::Cancelled);
        }
        Ok(())
    }
}

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Identifier shared by every node and key of the run.
    pub run_id: RunId,
    /// Pipeline phase.
    pub phase: Phase,
    /// Delegated cgroup root the `oss-crs` subtree is built under.
    pub cgroup_root: PathBuf,
    /// Mount point the runtime resolves `--cgroup-parent` against.
    pub cgroup_mount: PathBuf,
    /// Directory credential files are written to.
    pub credential_dir: PathBuf,
    /// Lifetime requested for generated keys.
    pub budget_duration: String,
    /// Where keys come from.
    pub key_source: KeySource,
    /// What a provisioning failure takes down.
    pub policy: ProvisioningPolicy,
    /// Workers handled by this host; empty means every planned worker.
    pub workers: Vec<String>,
    /// Cancellation flag.
    pub cancel: CancelFlag,
}

impl RunContext {
    /// Settings with the defaults for the invoking user.
    pub fn new(run_id: RunId, phase: Phase) -> Self {
        Self {
            run_id,
            phase,
            cgroup_root: default_delegated_root(),
            cgroup_mount: PathBuf::from(CGROUP_V2_PATH),
            credential_dir: default_credential_dir(),
            budget_duration: DEFAULT_BUDGET_DURATION.to_owned(),
            key_source: KeySource::Generate,
            policy: ProvisioningPolicy::default(),
            workers: Vec::new(),
            cancel: CancelFlag::new(),
        }
    }

    /// Whether this host handles `worker`.
    pub fn handles(&self, worker: &str) -> bool {
        self.workers.is_empty() || self.workers.iter().any(|w| w == worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(flag.check().is_ok());
        other.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(OssCrsError::Cancelled)));
    }

    #[test]
    fn default_context() {
        let ctx = RunContext::new(RunId::new("r1"), Phase::Run);
        assert_eq!(ctx.policy, ProvisioningPolicy::AllOrNothing);
        assert_eq!(ctx.budget_duration, "30d");
        assert_eq!(ctx.cgroup_mount, PathBuf::from("/sys/fs/cgroup"));
        assert!(ctx.cgroup_root.starts_with("/sys/fs/cgroup/user.slice"));
    }

    #[test]
    fn worker_filter() {
        let mut ctx = RunContext::new(RunId::new("r1"), Phase::Run);
        assert!(ctx.handles("anything"));
        ctx.workers = vec!["local".into()];
        assert!(ctx.handles("local"));
        assert!(!ctx.handles("remote"));
    }
}
