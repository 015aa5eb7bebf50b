//! Memory resource control via cgroups v2.
//!
//! Manages `memory.max`. The kernel stores the limit rounded down to a page
//! boundary, so a read-back may sit slightly below what was written.

use std::path::Path;

use osscrs_common::constants::MAX_PAGE_SIZE;
use osscrs_common::error::Result;
use osscrs_common::types::MemoryBytes;

use super::control::{read_control, write_control};

const MEMORY_MAX: &str = "memory.max";

/// Sets the hard memory limit for a cgroup. Returns `true` if the file was
/// written, `false` if it already held `limit` up to page rounding.
///
/// # Errors
///
/// Returns an error if reading or writing `memory.max` fails.
pub fn set_memory_max(cgroup_path: &Path, limit: MemoryBytes) -> Result<bool> {
    let desired = limit.as_u64();
    let current = read_control(cgroup_path, MEMORY_MAX)?.parse::<u64>().ok();
    if current.is_some_and(|c| c <= desired && desired - c < MAX_PAGE_SIZE) {
        tracing::debug!(path = %cgroup_path.display(), bytes = limit.as_u64(), "memory limit already set");
        return Ok(false);
    }
    write_control(cgroup_path, MEMORY_MAX, &desired.to_string())?;
    Ok(true)
}

/// Reads the hard memory limit, `None` when unlimited (`max`) or unset.
///
/// # Errors
///
/// Returns an error if `memory.max` cannot be read.
pub fn memory_max(cgroup_path: &Path) -> Result<Option<MemoryBytes>> {
    let current = read_control(cgroup_path, MEMORY_MAX)?;
    Ok(current.parse::<u64>().ok().map(MemoryBytes::from_bytes))
}
