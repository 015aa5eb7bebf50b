//! Translation of entity nodes into container runtime settings.

use std::path::{Path, PathBuf};

use osscrs_common::error::{OssCrsError, Result};
use serde::Serialize;

use crate::cgroup::EntityNode;

/// Settings handed to the container runtime for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeBinding {
    /// `--cgroup-parent`: the entity node relative to the cgroup mount.
    pub cgroup_parent: String,
    /// `--cpuset-cpus`: canonical core list.
    pub cpuset: String,
    /// `--memory`: byte count with a `b` suffix.
    pub memory: String,
}

impl RuntimeBinding {
    /// Binds an entity node mounted below `mount`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not below `mount`.
    pub fn for_node(node: &EntityNode, mount: &Path) -> Result<Self> {
        Ok(Self {
            cgroup_parent: cgroup_path_for_docker(&node.path, mount)?,
            cpuset: node.cpuset.to_string(),
            memory: format!("{}b", node.memory.as_u64()),
        })
    }
}

/// Strips the cgroup mount from `path`, yielding the runtime-relative
/// absolute path: `/sys/fs/cgroup/a/b` becomes `/a/b`.
///
/// The prefix is matched by whole path components, so
/// `/sys/fs/cgroupX/a` is not below `/sys/fs/cgroup`.
///
/// # Errors
///
/// Returns [`OssCrsError::Configuration`] if `path` is not strictly below
/// `mount`.
pub fn cgroup_path_for_docker(path: &Path, mount: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(mount)
        .ok()
        .filter(|rel| rel.components().next().is_some())
        .ok_or_else(|| OssCrsError::Configuration {
            violations: vec![format!(
                "cgroup path {} is not below the cgroup mount {}",
                path.display(),
                mount.display()
            )],
        })?;
    Ok(PathBuf::from("/").join(relative).display().to_string())
}
