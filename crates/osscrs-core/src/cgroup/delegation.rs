//! Delegated cgroup root discovery and checks.
//!
//! systemd delegates `user@<uid>.service` to each logged-in user. Nodes are
//! only ever created below that root, so nothing here needs privileges; when
//! the root is unusable the error carries the exact commands an
//! administrator runs once to fix it.

use std::path::{Path, PathBuf};

use nix::unistd::{AccessFlags, Gid, Uid, access, getgid, getuid};
use osscrs_common::constants::{CGROUP_V2_PATH, REQUIRED_CONTROLLERS};
use osscrs_common::error::{OssCrsError, Result};

use super::control::is_cgroup2;
use super::controllers::{available_controllers, missing_controllers};

/// The systemd-delegated root for `uid`.
pub fn delegated_root(uid: Uid) -> PathBuf {
    PathBuf::from(CGROUP_V2_PATH)
        .join("user.slice")
        .join(format!("user-{uid}.slice"))
        .join(format!("user@{uid}.service"))
}

/// The delegated root for the invoking user.
pub fn default_delegated_root() -> PathBuf {
    delegated_root(getuid())
}

/// One-time setup commands that make `root` usable by the invoking user.
pub fn remediation(root: &Path) -> String {
    remediation_for(root, getuid(), getgid())
}

fn remediation_for(root: &Path, uid: Uid, gid: Gid) -> String {
    let root = root.display();
    let controllers = REQUIRED_CONTROLLERS
        .iter()
        .map(|c| format!("+{c}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "Delegate the cgroup root to uid {uid} once, as root:\n  \
         sudo mkdir -p {root}\n  \
         sudo chown -R {uid}:{gid} {root}\n  \
         echo \"{controllers}\" | sudo tee {root}/cgroup.subtree_control\n\
         or point --cgroup-root at a subtree you already own."
    )
}

fn precondition(root: &Path, message: String) -> OssCrsError {
    OssCrsError::EnvironmentPrecondition {
        message,
        remediation: remediation(root),
    }
}

/// Checks that `root` can host the hierarchy, without modifying anything.
///
/// The root must be a writable directory. On cgroup2 the parent must also
/// have granted `cpuset` and `memory` to it, and if they are not yet enabled
/// for its children, `cgroup.subtree_control` must be writable.
///
/// # Errors
///
/// Returns [`OssCrsError::EnvironmentPrecondition`] with the delegation
/// commands when any check fails.
pub fn check_delegation(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(precondition(
            root,
            format!("delegated cgroup root {} does not exist", root.display()),
        ));
    }
    if access(root, AccessFlags::W_OK).is_err() {
        return Err(precondition(
            root,
            format!("delegated cgroup root {} is not writable", root.display()),
        ));
    }
    if !is_cgroup2(root) {
        tracing::debug!(root = %root.display(), "root is not on cgroup2, skipping controller checks");
        return Ok(());
    }

    let available = available_controllers(root)?;
    let ungranted: Vec<_> = REQUIRED_CONTROLLERS
        .iter()
        .filter(|c| !available.contains(**c))
        .collect();
    if !ungranted.is_empty() {
        return Err(precondition(
            root,
            format!(
                "controllers {ungranted:?} are not delegated to {}",
                root.display()
            ),
        ));
    }

    let subtree_control = root.join("cgroup.subtree_control");
    if !missing_controllers(root, &REQUIRED_CONTROLLERS)?.is_empty()
        && access(&subtree_control, AccessFlags::W_OK).is_err()
    {
        return Err(precondition(
            root,
            format!("{} is not writable", subtree_control.display()),
        ));
    }
    tracing::debug!(root = %root.display(), "cgroup delegation verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delegated_root_follows_systemd_layout() {
        let root = delegated_root(Uid::from_raw(1000));
        assert_eq!(
            root,
            PathBuf::from("/sys/fs/cgroup/user.slice/user-1000.slice/user@1000.service")
        );
    }

    #[test]
    fn remediation_names_uid_gid_and_controllers() {
        let text = remediation_for(Path::new("/cg/root"), Uid::from_raw(1000), Gid::from_raw(100));
        assert!(text.contains("sudo mkdir -p /cg/root"), "got: {text}");
        assert!(text.contains("sudo chown -R 1000:100 /cg/root"), "got: {text}");
        assert!(
            text.contains("echo \"+cpuset +memory\" | sudo tee /cg/root/cgroup.subtree_control"),
            "got: {text}"
        );
    }

    #[test]
    fn missing_root_fails_with_remediation() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let root = dir.path().join("absent");
        let err = check_delegation(&root).unwrap_err();
        match err {
            OssCrsError::EnvironmentPrecondition { message, remediation } => {
                assert!(message.contains("does not exist"));
                assert!(remediation.contains("sudo mkdir -p"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn staged_root_passes() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        check_delegation(dir.path()).unwrap();
    }
}
