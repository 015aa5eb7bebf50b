//! Cgroups v2 hierarchy construction and teardown.
//!
//! Layout below the delegated root:
//!
//! ```text
//! <root>/oss-crs/                      controllers: cpuset memory
//! <root>/oss-crs/<run-node>/           cpuset.cpus = union, memory.max = sum
//! <root>/oss-crs/<run-node>/<entity>/  cpuset.cpus, memory.max
//! ```
//!
//! Construction is parent-before-child and idempotent. If it fails partway,
//! every node the failed call created is removed again, deepest first.

pub mod control;
pub mod controllers;
pub mod cpuset;
pub mod delegation;
pub mod memory;

use std::fmt;
use std::path::{Path, PathBuf};

use osscrs_common::constants::{CGROUP_SUBTREE_NAME, REQUIRED_CONTROLLERS};
use osscrs_common::error::{OssCrsError, Result};
use osscrs_common::types::{CpuSet, MemoryBytes, Phase, RunId};

/// Limits for one entity node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    /// Entity name, used as the directory name.
    pub name: String,
    /// Cores the entity is pinned to.
    pub cpuset: CpuSet,
    /// Hard memory limit.
    pub memory: MemoryBytes,
}

/// A leaf node holding one entity's containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityNode {
    /// Entity name.
    pub name: String,
    /// Absolute path of the node.
    pub path: PathBuf,
    /// Pinned cores.
    pub cpuset: CpuSet,
    /// Hard memory limit.
    pub memory: MemoryBytes,
}

/// The aggregate node of one run, phase and worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunNode {
    /// Directory name below the `oss-crs` subtree.
    pub name: String,
    /// Absolute path of the node.
    pub path: PathBuf,
    /// Union of every entity's cores.
    pub cpuset: CpuSet,
    /// Sum of every entity's memory.
    pub memory: MemoryBytes,
    /// Entity nodes, in plan order.
    pub entities: Vec<EntityNode>,
}

impl RunNode {
    /// Looks up an entity node by name.
    pub fn entity(&self, name: &str) -> Option<&EntityNode> {
        self.entities.iter().find(|e| e.name == name)
    }
}

/// A node teardown could not remove. Logged and reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    /// Node left behind.
    pub path: PathBuf,
    /// Removal attempts made.
    pub attempts: u32,
    /// Last error reported by the kernel.
    pub message: String,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not remove {} after {} attempt(s): {}",
            self.path.display(),
            self.attempts,
            self.message
        )
    }
}

/// Builds the directory name of a run node:
/// `<run-id>-<phase>-<unix-ts>-<8 hex>-<worker>`.
///
/// The worker name is reduced to `[A-Za-z0-9-]`; anything else becomes `-`.
pub fn run_node_name(run_id: &RunId, phase: Phase, worker: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut nonce = uuid::Uuid::new_v4().simple().to_string();
    nonce.truncate(8);
    let worker: String = worker
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    format!("{run_id}-{phase}-{timestamp}-{nonce}-{worker}")
}

/// The hierarchy below one delegated root.
#[derive(Debug, Clone)]
pub struct CgroupHierarchy {
    root: PathBuf,
}

impl CgroupHierarchy {
    /// A hierarchy below an explicit root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The hierarchy below the invoking user's systemd-delegated root.
    pub fn for_current_user() -> Self {
        Self::new(delegation::default_delegated_root())
    }

    /// The delegated root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/oss-crs`.
    pub fn subtree(&self) -> PathBuf {
        self.root.join(CGROUP_SUBTREE_NAME)
    }

    /// Runs the delegation checks without modifying anything.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::EnvironmentPrecondition`] if the root cannot
    /// host the hierarchy.
    pub fn check(&self) -> Result<()> {
        delegation::check_delegation(&self.root)
    }

    /// Ensures `<root>/oss-crs` exists with `cpuset` and `memory` enabled at
    /// both levels. Safe to call any number of times.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::EnvironmentPrecondition`] if the root rejects
    /// the controllers, or an I/O error if the subtree cannot be created.
    pub fn ensure_base(&self) -> Result<PathBuf> {
        self.check()?;
        let _ = controllers::enable_controllers(&self.root, &REQUIRED_CONTROLLERS).map_err(
            |e| OssCrsError::EnvironmentPrecondition {
                message: format!("cannot enable controllers on {}: {e}", self.root.display()),
                remediation: delegation::remediation(&self.root),
            },
        )?;
        let subtree = self.subtree();
        let _ = control::create_node(&subtree)?;
        let _ = controllers::enable_controllers(&subtree, &REQUIRED_CONTROLLERS)?;
        Ok(subtree)
    }

    /// Builds a run node named `name` and one entity node per spec.
    ///
    /// Building the same run node twice is a no-op the second time. On
    /// failure, nodes created by this call are removed before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be created or a limit cannot be
    /// written.
    pub fn build(&self, name: &str, specs: &[NodeSpec]) -> Result<RunNode> {
        let subtree = self.ensure_base()?;
        let mut created = Vec::new();
        match build_run_node(&subtree, name, specs, &mut created) {
            Ok(node) => {
                tracing::info!(
                    path = %node.path.display(),
                    entities = node.entities.len(),
                    cpuset = %node.cpuset,
                    memory = %node.memory,
                    "run node ready"
                );
                Ok(node)
            }
            Err(e) => {
                tracing::warn!(run_node = name, error = %e, "run node construction failed, unwinding");
                for path in created.iter().rev() {
                    let _ = control::remove_node(path);
                }
                Err(e)
            }
        }
    }

    /// Removes every entity node and then the run node.
    ///
    /// Never fails: nodes that stay busy after the bounded retries are
    /// returned as warnings.
    pub fn teardown(&self, node: &RunNode) -> Vec<CleanupWarning> {
        tracing::info!(path = %node.path.display(), "tearing down run node");
        let mut warnings: Vec<CleanupWarning> = node
            .entities
            .iter()
            .filter_map(|e| control::remove_node(&e.path))
            .collect();
        warnings.extend(control::remove_node(&node.path));
        warnings
    }
}

fn build_run_node(
    subtree: &Path,
    name: &str,
    specs: &[NodeSpec],
    created: &mut Vec<PathBuf>,
) -> Result<RunNode> {
    let path = subtree.join(name);
    let total_cpuset = specs.iter().fold(CpuSet::new(), |acc, s| acc.union(&s.cpuset));
    let total_memory = specs.iter().map(|s| s.memory).sum();

    if control::create_node(&path)? {
        created.push(path.clone());
    }
    let _ = cpuset::set_cpuset_cpus(&path, &total_cpuset)?;
    let _ = memory::set_memory_max(&path, total_memory)?;
    let _ = controllers::enable_controllers(&path, &REQUIRED_CONTROLLERS)?;

    let mut entities = Vec::with_capacity(specs.len());
    for spec in specs {
        let entity_path = path.join(&spec.name);
        if control::create_node(&entity_path)? {
            created.push(entity_path.clone());
        }
        let _ = cpuset::set_cpuset_cpus(&entity_path, &spec.cpuset)?;
        let _ = memory::set_memory_max(&entity_path, spec.memory)?;
        entities.push(EntityNode {
            name: spec.name.clone(),
            path: entity_path,
            cpuset: spec.cpuset.clone(),
            memory: spec.memory,
        });
    }

    Ok(RunNode {
        name: name.to_owned(),
        path,
        cpuset: total_cpuset,
        memory: total_memory,
        entities,
    })
}
