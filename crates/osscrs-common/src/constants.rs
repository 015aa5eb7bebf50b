//! System-wide constants and default paths.

use std::path::PathBuf;
use std::time::Duration;

/// Cgroups v2 unified hierarchy mount point.
pub const CGROUP_V2_PATH: &str = "/sys/fs/cgroup";

/// Directory created under the delegated root to hold every run node.
pub const CGROUP_SUBTREE_NAME: &str = "oss-crs";

/// Controllers the hierarchy delegates to run and entity nodes.
pub const REQUIRED_CONTROLLERS: [&str; 2] = ["cpuset", "memory"];

/// Cgroup driver the container runtime must report.
pub const REQUIRED_CGROUP_DRIVER: &str = "cgroupfs";

/// Largest core ID accepted by the CPU-set parser (kernel `NR_CPUS` ceiling).
pub const MAX_CPU_ID: u32 = 8191;

/// Smallest memory share handed to an auto-divided entity (512 MiB).
pub const MIN_AUTO_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

/// Largest page size the kernel may round `memory.max` down to (64 KiB).
pub const MAX_PAGE_SIZE: u64 = 64 * 1024;

/// Number of attempts made to remove a busy cgroup node.
pub const TEARDOWN_ATTEMPTS: u32 = 5;

/// Pause between cgroup removal attempts.
pub const TEARDOWN_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Timeout applied to every budget-gateway request.
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default lifetime requested for provisioned credentials.
pub const DEFAULT_BUDGET_DURATION: &str = "30d";

/// Default base URL of the budget gateway.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:4000";

/// Path at which a provisioned credential is mounted inside containers.
pub const CONTAINER_CREDENTIAL_PATH: &str = "/run/oss-crs/llm-key";

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "oss-crs.yaml";

/// Application name used in CLI output and cgroup paths.
pub const APP_NAME: &str = "oss-crs";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "osscrs";

/// Returns the default directory provisioned credentials are written to.
///
/// Prefers `$XDG_RUNTIME_DIR/oss-crs/keys` (tmpfs, private to the user) and
/// falls back to `$HOME/.oss-crs/keys`.
pub fn default_credential_dir() -> PathBuf {
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime).join(APP_NAME).join("keys");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| String::from("."));
    PathBuf::from(home).join(".oss-crs").join("keys")
}
