//! Controller delegation through `cgroup.subtree_control`.

use std::collections::BTreeSet;
use std::path::Path;

use osscrs_common::error::Result;

use super::control::{read_control, write_control};

const SUBTREE_CONTROL: &str = "cgroup.subtree_control";
const CONTROLLERS: &str = "cgroup.controllers";

fn tokens(content: &str) -> BTreeSet<String> {
    content
        .split_whitespace()
        .map(|t| t.trim_start_matches('+').to_owned())
        .collect()
}

/// Controllers enabled for a node's children.
///
/// # Errors
///
/// Returns an error if `cgroup.subtree_control` cannot be read.
pub fn enabled_controllers(cgroup_path: &Path) -> Result<BTreeSet<String>> {
    Ok(tokens(&read_control(cgroup_path, SUBTREE_CONTROL)?))
}

/// Controllers available to a node, as granted by its parent.
///
/// # Errors
///
/// Returns an error if `cgroup.controllers` cannot be read.
pub fn available_controllers(cgroup_path: &Path) -> Result<BTreeSet<String>> {
    Ok(tokens(&read_control(cgroup_path, CONTROLLERS)?))
}

/// Of `wanted`, the controllers not yet enabled on `cgroup_path`.
///
/// # Errors
///
/// Returns an error if `cgroup.subtree_control` cannot be read.
pub fn missing_controllers<'a>(cgroup_path: &Path, wanted: &[&'a str]) -> Result<Vec<&'a str>> {
    let enabled = enabled_controllers(cgroup_path)?;
    Ok(wanted
        .iter()
        .copied()
        .filter(|c| !enabled.contains(*c))
        .collect())
}

/// Enables `wanted` for the node's children, writing only the controllers
/// that are missing. Returns `true` if anything was written.
///
/// # Errors
///
/// Returns an error if reading or writing `cgroup.subtree_control` fails.
pub fn enable_controllers(cgroup_path: &Path, wanted: &[&str]) -> Result<bool> {
    let missing = missing_controllers(cgroup_path, wanted)?;
    if missing.is_empty() {
        return Ok(false);
    }
    let value = missing
        .iter()
        .map(|c| format!("+{c}"))
        .collect::<Vec<_>>()
        .join(" ");
    write_control(cgroup_path, SUBTREE_CONTROL, &value)?;
    tracing::info!(path = %cgroup_path.display(), controllers = %value, "controllers enabled");
    Ok(true)
}
