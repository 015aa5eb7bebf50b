//! CPU pinning via the cgroups v2 `cpuset` controller.
//!
//! Manages `cpuset.cpus`. The kernel reports the list in the same maximal
//! range format [`CpuSet`] renders, but the current value is compared as a
//! set so formatting differences never force a rewrite.

use std::path::Path;

use osscrs_common::error::Result;
use osscrs_common::types::CpuSet;

use super::control::{read_control, write_control};

const CPUSET_CPUS: &str = "cpuset.cpus";

/// Reads the cores currently pinned on a node. An empty file reads as the
/// empty set.
///
/// # Errors
///
/// Returns an error if `cpuset.cpus` cannot be read or holds an invalid list.
pub fn cpuset_cpus(cgroup_path: &Path) -> Result<CpuSet> {
    let current = read_control(cgroup_path, CPUSET_CPUS)?;
    if current.is_empty() {
        return Ok(CpuSet::new());
    }
    current.parse()
}

/// Pins a node to `cores`. Returns `true` if the file was written.
///
/// # Errors
///
/// Returns an error if reading or writing `cpuset.cpus` fails.
pub fn set_cpuset_cpus(cgroup_path: &Path, cores: &CpuSet) -> Result<bool> {
    if cpuset_cpus(cgroup_path).is_ok_and(|current| &current == cores) {
        tracing::debug!(path = %cgroup_path.display(), %cores, "cpuset already set");
        return Ok(false);
    }
    write_control(cgroup_path, CPUSET_CPUS, &cores.to_string())?;
    Ok(true)
}
