//! Reading, writing and removing cgroup interface files and nodes.
//!
//! Writes are compare-then-write: a value already present is left alone,
//! so re-applying the same limits touches nothing.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use osscrs_common::constants::{TEARDOWN_ATTEMPTS, TEARDOWN_RETRY_DELAY};
use osscrs_common::error::{OssCrsError, Result};

use super::CleanupWarning;

/// Reads an interface file, trimmed. A missing file reads as empty.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_control(node: &Path, file: &str) -> Result<String> {
    let path = node.join(file);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(content.trim().to_owned()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(OssCrsError::Io { path, source: e }),
    }
}

/// Writes `value` to an interface file.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn write_control(node: &Path, file: &str, value: &str) -> Result<()> {
    let path = node.join(file);
    std::fs::write(&path, value).map_err(|e| OssCrsError::Io { path, source: e })?;
    tracing::debug!(node = %node.display(), file, value, "control file written");
    Ok(())
}

/// Creates a node directory. Returns `true` if this call created it.
///
/// # Errors
///
/// Returns an error if the directory is missing and cannot be created.
pub fn create_node(path: &Path) -> Result<bool> {
    match std::fs::create_dir(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "cgroup node created");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(false),
        Err(e) => Err(OssCrsError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Whether `path` lives on a cgroup2 filesystem.
#[cfg(target_os = "linux")]
pub fn is_cgroup2(path: &Path) -> bool {
    use nix::sys::statfs::{CGROUP2_SUPER_MAGIC, statfs};

    statfs(path).is_ok_and(|fs| fs.filesystem_type() == CGROUP2_SUPER_MAGIC)
}

/// Always `false`: cgroup2 only exists on Linux.
#[cfg(not(target_os = "linux"))]
pub const fn is_cgroup2(_path: &Path) -> bool {
    false
}

/// Removes a node, retrying while the kernel reports it busy.
///
/// On cgroup2 a node is removed with `rmdir`; its interface files vanish
/// with it. Elsewhere they are ordinary files and the whole directory is
/// removed. A node that is already gone counts as removed.
pub fn remove_node(path: &Path) -> Option<CleanupWarning> {
    let on_cgroupfs = is_cgroup2(path);
    let mut last_error = None;

    for attempt in 1..=TEARDOWN_ATTEMPTS {
        let result = if on_cgroupfs {
            std::fs::remove_dir(path)
        } else {
            std::fs::remove_dir_all(path)
        };
        match result {
            Ok(()) => {
                tracing::info!(path = %path.display(), "cgroup node removed");
                return None;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) if is_busy(&e) => {
                tracing::debug!(path = %path.display(), attempt, error = %e, "cgroup node busy");
                last_error = Some(e);
                if attempt < TEARDOWN_ATTEMPTS {
                    std::thread::sleep(TEARDOWN_RETRY_DELAY);
                }
            }
            Err(e) => {
                return Some(warn(path, attempt, &e));
            }
        }
    }

    last_error.map(|e| warn(path, TEARDOWN_ATTEMPTS, &e))
}

fn is_busy(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ResourceBusy | ErrorKind::DirectoryNotEmpty
    )
}

fn warn(path: &Path, attempts: u32, e: &std::io::Error) -> CleanupWarning {
    let warning = CleanupWarning {
        path: PathBuf::from(path),
        attempts,
        message: e.to_string(),
    };
    tracing::warn!(path = %path.display(), attempts, error = %e, "cgroup node left behind");
    warning
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_missing_control_is_empty() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        assert_eq!(read_control(dir.path(), "memory.max").unwrap(), "");
    }

    #[test]
    fn write_then_read_trims() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        write_control(dir.path(), "memory.max", "1024\n").unwrap();
        assert_eq!(read_control(dir.path(), "memory.max").unwrap(), "1024");
    }

    #[test]
    fn create_node_reports_whether_it_created() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let node = dir.path().join("node");
        assert!(create_node(&node).unwrap());
        assert!(!create_node(&node).unwrap());
    }

    #[test]
    fn create_node_without_parent_fails() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let err = create_node(&dir.path().join("a/b")).unwrap_err();
        assert!(matches!(err, OssCrsError::Io { .. }));
    }

    #[test]
    fn remove_node_off_cgroupfs_removes_files() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let node = dir.path().join("node");
        std::fs::create_dir(&node).unwrap();
        std::fs::write(node.join("cpuset.cpus"), "0-3").unwrap();
        assert!(remove_node(&node).is_none());
        assert!(!node.exists());
    }

    #[test]
    fn remove_missing_node_is_not_a_warning() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        assert!(remove_node(&dir.path().join("gone")).is_none());
    }

    #[test]
    fn tempdir_is_not_cgroup2() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        assert!(!is_cgroup2(dir.path()));
    }
}
