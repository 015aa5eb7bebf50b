//! Container launch seam.
//!
//! The engine hands each entity's runtime binding to a [`Launcher`] and
//! waits for it. [`DockerLauncher`] maps the binding onto `docker run`.

use std::path::PathBuf;
use std::process::Command;

use osscrs_common::constants::CONTAINER_CREDENTIAL_PATH;
use osscrs_common::error::{OssCrsError, Result};
use osscrs_core::binding::RuntimeBinding;

/// Everything needed to start one entity's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Entity name.
    pub entity_name: String,
    /// Worker the entity runs on.
    pub worker_name: String,
    /// Container name.
    pub container_name: String,
    /// Image to run.
    pub image: String,
    /// Cgroup parent and limits.
    pub binding: RuntimeBinding,
    /// Credential file mounted into the container, if provisioned.
    pub credential: Option<PathBuf>,
}

/// How a launch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStatus {
    /// The container ran and exited with this code.
    Exited(i32),
    /// The container could not be run.
    Failed(String),
}

/// Result of one entity's launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// Entity name.
    pub entity_name: String,
    /// Worker the entity ran on.
    pub worker_name: String,
    /// How it ended.
    pub status: LaunchStatus,
}

/// Starts an entity's container and waits for it to exit.
pub trait Launcher: Send + Sync {
    /// Runs the container described by `spec`, returning its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    fn launch(&self, spec: &LaunchSpec) -> Result<i32>;
}

/// Launches containers through the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerLauncher {
    binary: PathBuf,
}

impl DockerLauncher {
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

/// `docker run` arguments for `spec`.
pub fn docker_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "--rm".into(),
        "--name".into(),
        spec.container_name.clone(),
        "--cgroup-parent".into(),
        spec.binding.cgroup_parent.clone(),
        "--cpuset-cpus".into(),
        spec.binding.cpuset.clone(),
        "--memory".into(),
        spec.binding.memory.clone(),
    ];
    if let Some(credential) = &spec.credential {
        args.push("--volume".into());
        args.push(format!(
            "{}:{CONTAINER_CREDENTIAL_PATH}:ro",
            credential.display()
        ));
        args.push("--env".into());
        args.push(format!("OSSCRS_LLM_KEY_FILE={CONTAINER_CREDENTIAL_PATH}"));
    }
    args.push(spec.image.clone());
    args
}

impl Launcher for DockerLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<i32> {
        tracing::info!(
            entity = %spec.entity_name,
            worker = %spec.worker_name,
            cgroup_parent = %spec.binding.cgroup_parent,
            image = %spec.image,
            "launching container"
        );
        let status = Command::new(&self.binary)
            .args(docker_args(spec))
            .status()
            .map_err(|e| OssCrsError::Io {
                path: self.binary.clone(),
                source: e,
            })?;
        let code = status.code().unwrap_or(-1);
        tracing::info!(entity = %spec.entity_name, code, "container exited");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(credential: Option<&str>) -> LaunchSpec {
        LaunchSpec {
            entity_name: "crs1".into(),
            worker_name: "local".into(),
            container_name: "r1-crs1".into(),
            image: "ghcr.io/example/crs1:latest".into(),
            binding: RuntimeBinding {
                cgroup_parent: "/oss-crs/run/crs1".into(),
                cpuset: "0-7".into(),
                memory: "8589934592b".into(),
            },
            credential: credential.map(PathBuf::from),
        }
    }

    #[test]
    fn docker_args_carry_binding() {
        let args = docker_args(&spec(None));
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "--name",
                "r1-crs1",
                "--cgroup-parent",
                "/oss-crs/run/crs1",
                "--cpuset-cpus",
                "0-7",
                "--memory",
                "8589934592b",
                "ghcr.io/example/crs1:latest",
            ]
        );
    }

    #[test]
    fn docker_args_mount_credential_read_only() {
        let args = docker_args(&spec(Some("/keys/crs1")));
        assert!(args.contains(&"/keys/crs1:/run/oss-crs/llm-key:ro".to_owned()));
        assert_eq!(args.last().map(String::as_str), Some("ghcr.io/example/crs1:latest"));
    }
}
