//! Run orchestration.
//!
//! Configuration and allocation errors abort before anything is touched.
//! Environment checks run before any key is minted or node created.
//! Declared models are checked against the gateway once, before any key is
//! requested. Provisioning failures, including missing models, follow the
//! run's [`ProvisioningPolicy`]. Once
//! nodes exist, every exit path tears them down again.

use std::collections::BTreeSet;

use osscrs_budget::{
    BudgetGateway, EntityGrant, ProvisionedCredential, Provisioner, unavailable_models_error,
};
use osscrs_common::error::{OssCrsError, Result};
use osscrs_compose::plan::entity_budget;
use osscrs_compose::{AllocationPlan, ComposeConfig};
use osscrs_core::binding::RuntimeBinding;
use osscrs_core::cgroup::{CgroupHierarchy, CleanupWarning, NodeSpec, RunNode, run_node_name};
use osscrs_core::driver::{DriverProbe, check_driver};

use crate::context::{ProvisioningPolicy, RunContext};
use crate::launch::{LaunchOutcome, LaunchSpec, LaunchStatus, Launcher};

/// What a completed run did.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Plans for the workers this host handled.
    pub plans: Vec<AllocationPlan>,
    /// Credentials written.
    pub credentials: Vec<ProvisionedCredential>,
    /// Entities dropped because they could not be provisioned.
    pub dropped: Vec<String>,
    /// One outcome per launched entity and worker.
    pub outcomes: Vec<LaunchOutcome>,
    /// Nodes teardown could not remove.
    pub warnings: Vec<CleanupWarning>,
}

impl RunReport {
    /// Whether every launched container exited with code 0.
    pub fn succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == LaunchStatus::Exited(0))
    }
}

/// A run node and the worker it was built for.
#[derive(Debug)]
struct BuiltNode {
    worker: String,
    node: RunNode,
}

/// Wires the run's collaborators together.
pub struct Orchestrator<'a> {
    ctx: &'a RunContext,
    gateway: &'a dyn BudgetGateway,
    probe: &'a dyn DriverProbe,
    launcher: &'a dyn Launcher,
    hierarchy: CgroupHierarchy,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator for one run.
    pub fn new(
        ctx: &'a RunContext,
        gateway: &'a dyn BudgetGateway,
        probe: &'a dyn DriverProbe,
        launcher: &'a dyn Launcher,
    ) -> Self {
        Self {
            ctx,
            gateway,
            probe,
            launcher,
            hierarchy: CgroupHierarchy::new(&ctx.cgroup_root),
        }
    }

    /// Resolves the plans for the workers this host handles.
    ///
    /// # Errors
    ///
    /// Returns an allocation error, or a configuration error if a selected
    /// worker is unknown or a selected entity has no image.
    pub fn plan(&self, config: &ComposeConfig) -> Result<Vec<AllocationPlan>> {
        let mut violations: Vec<String> = self
            .ctx
            .workers
            .iter()
            .filter(|w| config.worker(w).is_none())
            .map(|w| format!("selected worker \"{w}\" is not declared"))
            .collect();

        let plans: Vec<AllocationPlan> = osscrs_compose::plan(config)?
            .into_iter()
            .filter(|p| self.ctx.handles(&p.worker_name))
            .collect();

        for name in entity_names(&plans) {
            if config.entity(&name).is_none_or(|e| e.image.is_none()) {
                violations.push(format!("entity \"{name}\" has no image to launch"));
            }
        }
        if !violations.is_empty() {
            return Err(OssCrsError::Configuration { violations });
        }
        Ok(plans)
    }

    /// Runs the environment checks without touching anything.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::EnvironmentPrecondition`] with a remediation.
    pub fn preconditions(&self) -> Result<()> {
        check_driver(self.probe)?;
        self.hierarchy.check()
    }

    /// Executes a full run.
    ///
    /// # Errors
    ///
    /// Returns the first error that aborts the run. Nodes built before the
    /// error are torn down first.
    pub fn run(&self, config: &ComposeConfig) -> Result<RunReport> {
        tracing::info!(run_id = %self.ctx.run_id, phase = %self.ctx.phase, "run starting");
        let plans = self.plan(config)?;
        self.ctx.cancel.check()?;
        self.preconditions()?;
        self.ctx.cancel.check()?;

        let (credentials, dropped) = self.provision(config, &plans)?;
        self.ctx.cancel.check()?;

        let nodes = self.build(&plans, &dropped)?;
        if let Err(e) = self.ctx.cancel.check() {
            let _ = self.teardown(&nodes);
            return Err(e);
        }

        let specs = match self.launch_specs(config, &nodes, &credentials) {
            Ok(specs) => specs,
            Err(e) => {
                let _ = self.teardown(&nodes);
                return Err(e);
            }
        };
        let outcomes = self.launch_all(&specs);
        let warnings = self.teardown(&nodes);

        tracing::info!(
            run_id = %self.ctx.run_id,
            launched = outcomes.len(),
            warnings = warnings.len(),
            "run finished"
        );
        Ok(RunReport {
            plans,
            credentials,
            dropped: dropped.into_iter().collect(),
            outcomes,
            warnings,
        })
    }

    fn provision(
        &self,
        config: &ComposeConfig,
        plans: &[AllocationPlan],
    ) -> Result<(Vec<ProvisionedCredential>, BTreeSet<String>)> {
        let provisioner = Provisioner::new(
            self.gateway,
            &self.ctx.credential_dir,
            &self.ctx.budget_duration,
            self.ctx.key_source.clone(),
            self.ctx.run_id.as_str(),
        );
        let best_effort = self.ctx.policy == ProvisioningPolicy::BestEffort;
        let mut credentials = Vec::new();
        let mut dropped = BTreeSet::new();

        let grants: Vec<EntityGrant> = config
            .entities
            .iter()
            .filter(|e| plans.iter().any(|p| p.entry(&e.name).is_some()))
            .map(|entity| EntityGrant {
                name: entity.name.clone(),
                budget: entity_budget(plans, &entity.name),
                models: entity.models.clone(),
                rpm_limit: entity.rate_limit(config.envelope.as_ref()),
            })
            .collect();

        self.ctx.cancel.check()?;
        match provisioner.unavailable_models(&grants) {
            Ok(missing) if missing.is_empty() => {}
            Ok(missing) if best_effort => {
                for (model, entities) in &missing {
                    for entity in entities {
                        tracing::warn!(entity = %entity, model = %model, "model unavailable, dropping entity from run");
                        let _ = dropped.insert(entity.clone());
                    }
                }
            }
            Ok(missing) => return Err(unavailable_models_error(&missing)),
            Err(e) if best_effort => {
                tracing::warn!(error = %e, "could not list gateway models, provisioning each entity anyway");
            }
            Err(e) => return Err(e),
        }

        for grant in &grants {
            if dropped.contains(&grant.name) {
                continue;
            }
            self.ctx.cancel.check()?;
            match provisioner.provision(grant) {
                Ok(Some(credential)) => credentials.push(credential),
                Ok(None) => {}
                Err(e) if best_effort => {
                    tracing::warn!(entity = %grant.name, error = %e, "dropping entity from run");
                    let _ = dropped.insert(grant.name.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Ok((credentials, dropped))
    }

    fn build(&self, plans: &[AllocationPlan], dropped: &BTreeSet<String>) -> Result<Vec<BuiltNode>> {
        let jobs: Vec<(&str, String, Vec<NodeSpec>)> = plans
            .iter()
            .map(|plan| {
                let specs: Vec<NodeSpec> = plan
                    .entries
                    .iter()
                    .filter(|e| !dropped.contains(&e.entity_name))
                    .map(|e| NodeSpec {
                        name: e.entity_name.clone(),
                        cpuset: e.cpuset.clone(),
                        memory: e.memory,
                    })
                    .collect();
                let name = run_node_name(&self.ctx.run_id, self.ctx.phase, &plan.worker_name);
                (plan.worker_name.as_str(), name, specs)
            })
            .filter(|(_, _, specs)| !specs.is_empty())
            .collect();

        let hierarchy = &self.hierarchy;
        let results: Vec<Result<BuiltNode>> = std::thread::scope(|s| {
            let handles: Vec<_> = jobs
                .iter()
                .map(|(worker, name, specs)| {
                    (*worker, name, s.spawn(move || hierarchy.build(name, specs)))
                })
                .collect();
            handles
                .into_iter()
                .map(|(worker, name, handle)| -> Result<BuiltNode> {
                    let node = handle.join().unwrap_or_else(|_| {
                        Err(OssCrsError::Io {
                            path: hierarchy.subtree().join(name),
                            source: std::io::Error::other("cgroup builder thread panicked"),
                        })
                    })?;
                    Ok(BuiltNode {
                        worker: worker.to_owned(),
                        node,
                    })
                })
                .collect()
        });

        let mut nodes = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    tracing::error!(error = %e, "cgroup hierarchy construction failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            let _ = self.teardown(&nodes);
            return Err(e);
        }
        Ok(nodes)
    }

    fn launch_specs(
        &self,
        config: &ComposeConfig,
        nodes: &[BuiltNode],
        credentials: &[ProvisionedCredential],
    ) -> Result<Vec<LaunchSpec>> {
        let mut specs = Vec::new();
        for BuiltNode { worker, node } in nodes {
            for entity_node in &node.entities {
                let image = config
                    .entity(&entity_node.name)
                    .and_then(|e| e.image.clone())
                    .unwrap_or_default();
                specs.push(LaunchSpec {
                    entity_name: entity_node.name.clone(),
                    worker_name: worker.clone(),
                    container_name: format!("{}-{}-{}", self.ctx.run_id, entity_node.name, worker),
                    image,
                    binding: RuntimeBinding::for_node(entity_node, &self.ctx.cgroup_mount)?,
                    credential: credentials
                        .iter()
                        .find(|c| c.entity_name == entity_node.name)
                        .map(|c| c.path.clone()),
                });
            }
        }
        Ok(specs)
    }

    fn launch_all(&self, specs: &[LaunchSpec]) -> Vec<LaunchOutcome> {
        let launcher = self.launcher;
        std::thread::scope(|s| {
            let handles: Vec<_> = specs
                .iter()
                .map(|spec| (spec, s.spawn(move || launcher.launch(spec))))
                .collect();
            handles
                .into_iter()
                .map(|(spec, handle)| {
                    let status = match handle.join() {
                        Ok(Ok(code)) => LaunchStatus::Exited(code),
                        Ok(Err(e)) => LaunchStatus::Failed(e.to_string()),
                        Err(_) => LaunchStatus::Failed("launcher thread panicked".into()),
                    };
                    if let LaunchStatus::Failed(reason) = &status {
                        tracing::error!(entity = %spec.entity_name, %reason, "launch failed");
                    }
                    LaunchOutcome {
                        entity_name: spec.entity_name.clone(),
                        worker_name: spec.worker_name.clone(),
                        status,
                    }
                })
                .collect()
        })
    }

    fn teardown(&self, nodes: &[BuiltNode]) -> Vec<CleanupWarning> {
        nodes
            .iter()
            .flat_map(|built| self.hierarchy.teardown(&built.node))
            .collect()
    }
}

/// Entity names across `plans`, deduplicated.
fn entity_names(plans: &[AllocationPlan]) -> BTreeSet<String> {
    plans
        .iter()
        .flat_map(|p| p.entries.iter().map(|e| e.entity_name.clone()))
        .collect()
}
