//! Container runtime cgroup driver checks.
//!
//! Nodes are built by hand below the delegated root, so the runtime has to
//! accept a plain `--cgroup-parent` path. Only the `cgroupfs` driver does;
//! the `systemd` driver expects slice names and is refused up front.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use osscrs_common::constants::REQUIRED_CGROUP_DRIVER;
use osscrs_common::error::{OssCrsError, Result};

/// Cgroup driver reported by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CgroupDriver {
    /// Plain cgroupfs paths.
    Cgroupfs,
    /// systemd slices.
    Systemd,
    /// Anything else the runtime reported.
    Other(String),
}

impl From<&str> for CgroupDriver {
    fn from(value: &str) -> Self {
        match value.trim() {
            "cgroupfs" => Self::Cgroupfs,
            "systemd" => Self::Systemd,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for CgroupDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cgroupfs => write!(f, "cgroupfs"),
            Self::Systemd => write!(f, "systemd"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Reports which cgroup driver the container runtime uses.
pub trait DriverProbe: Send + Sync {
    /// Queries the runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn cgroup_driver(&self) -> Result<CgroupDriver>;
}

/// Probes the Docker daemon through the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerProbe {
    binary: PathBuf,
}

impl DockerProbe {
    /// Locates `docker` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::EnvironmentPrecondition`] if it is not installed.
    pub fn locate() -> Result<Self> {
        let binary = which::which("docker").map_err(|_| OssCrsError::EnvironmentPrecondition {
            message: "docker binary not found on PATH".into(),
            remediation: "Install Docker Engine and make sure `docker` is on PATH.".into(),
        })?;
        Ok(Self { binary })
    }
}

impl DriverProbe for DockerProbe {
    fn cgroup_driver(&self) -> Result<CgroupDriver> {
        let output = Command::new(&self.binary)
            .args(["info", "--format", "{{.CgroupDriver}}"])
            .output()
            .map_err(|e| OssCrsError::Io {
                path: self.binary.clone(),
                source: e,
            })?;
        if !output.status.success() {
            return Err(OssCrsError::EnvironmentPrecondition {
                message: format!(
                    "docker info failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                remediation: "Make sure the Docker daemon is running and the current user may access it."
                    .into(),
            });
        }
        let driver = CgroupDriver::from(String::from_utf8_lossy(&output.stdout).as_ref());
        tracing::debug!(%driver, "docker cgroup driver");
        Ok(driver)
    }
}

/// Refuses any driver other than `cgroupfs`.
///
/// # Errors
///
/// Returns [`OssCrsError::EnvironmentPrecondition`] with the `daemon.json`
/// change that switches the driver, or the probe's own error.
pub fn check_driver(probe: &dyn DriverProbe) -> Result<()> {
    let driver = probe.cgroup_driver()?;
    if driver == CgroupDriver::Cgroupfs {
        return Ok(());
    }
    Err(OssCrsError::EnvironmentPrecondition {
        message: format!(
            "container runtime uses the \"{driver}\" cgroup driver, \"{REQUIRED_CGROUP_DRIVER}\" is required"
        ),
        remediation: format!(
            "Add the following to /etc/docker/daemon.json and restart Docker:\n  \
             {{\"exec-opts\": [\"native.cgroupdriver={REQUIRED_CGROUP_DRIVER}\"]}}\n  \
             sudo systemctl restart docker"
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl DriverProbe for Fixed {
        fn cgroup_driver(&self) -> Result<CgroupDriver> {
            Ok(CgroupDriver::from(self.0))
        }
    }

    #[test]
    fn parses_driver_names() {
        assert_eq!(CgroupDriver::from("cgroupfs\n"), CgroupDriver::Cgroupfs);
        assert_eq!(CgroupDriver::from("systemd"), CgroupDriver::Systemd);
        assert_eq!(CgroupDriver::from("weird"), CgroupDriver::Other("weird".into()));
    }

    #[test]
    fn cgroupfs_passes() {
        check_driver(&Fixed("cgroupfs")).unwrap();
    }

    #[test]
    fn systemd_is_refused_with_daemon_json_fix() {
        match check_driver(&Fixed("systemd")).unwrap_err() {
            OssCrsError::EnvironmentPrecondition { message, remediation } => {
                assert!(message.contains("systemd"));
                assert!(remediation.contains("native.cgroupdriver=cgroupfs"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
