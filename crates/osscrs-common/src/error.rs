//! Unified error types for the osscrs workspace.
//!
//! Every crate returns [`OssCrsError`]. Variants map one-to-one onto the
//! failure classes an orchestration run can hit, so callers can decide
//! whether anything has been touched yet: configuration and allocation
//! errors happen before any side effect, precondition errors before any
//! cgroup node exists.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Budget, CpuSet, MemoryBytes};

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum OssCrsError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration document is invalid. Carries every violation found.
    #[error("invalid configuration:\n{}", bullet_list(violations))]
    Configuration {
        /// One human-readable line per violation.
        violations: Vec<String>,
    },

    /// A single quantity string could not be parsed.
    #[error("invalid {kind} \"{input}\": {reason}")]
    Parse {
        /// Which quantity was being parsed (`cpuset`, `memory`, `budget`).
        kind: &'static str,
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The requested resources cannot be partitioned without conflict.
    #[error("allocation conflict:\n{}", bullet_list(conflicts))]
    Allocation {
        /// Every conflict found across all workers.
        conflicts: Vec<AllocationConflict>,
    },

    /// The host is not set up the way the cgroup builder requires.
    #[error("{message}\n{remediation}")]
    EnvironmentPrecondition {
        /// What is wrong with the environment.
        message: String,
        /// Concrete steps that fix it.
        remediation: String,
    },

    /// A credential could not be obtained for an entity.
    #[error("provisioning failed for \"{entity}\": {message}")]
    Provisioning {
        /// Entity whose credential request failed.
        entity: String,
        /// Description of the failure.
        message: String,
    },

    /// Models declared by entities are not served by the budget gateway.
    #[error("models not available from the budget gateway:\n{}", bullet_list(missing))]
    UnavailableModels {
        /// One line per missing model, naming the entities that declared it.
        missing: Vec<String>,
    },

    /// The budget gateway was unreachable or answered with an error.
    #[error("budget gateway {url}: {message}")]
    Gateway {
        /// Endpoint that was called.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// The run was cancelled before containers started.
    #[error("run cancelled")]
    Cancelled,

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The YAML configuration document is malformed.
    #[error("malformed configuration document: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

/// A single reason why a worker's resources cannot be partitioned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationConflict {
    /// Two entities pinned overlapping cores.
    #[error("worker \"{worker}\": entities \"{first}\" and \"{second}\" both claim cores {cores}")]
    CpuOverlap {
        /// Worker where the overlap occurs.
        worker: String,
        /// Entity declared first.
        first: String,
        /// Entity declared second.
        second: String,
        /// Cores claimed by both.
        cores: CpuSet,
    },

    /// An entity pinned cores the worker does not have.
    #[error("worker \"{worker}\": entity \"{entity}\" claims cores {cores} outside capacity {capacity}")]
    CpuOutOfRange {
        /// Worker whose capacity is exceeded.
        worker: String,
        /// Offending entity.
        entity: String,
        /// Cores outside the capacity.
        cores: CpuSet,
        /// The worker's declared capacity.
        capacity: CpuSet,
    },

    /// Not enough unclaimed cores to give every unpinned entity one.
    #[error("worker \"{worker}\": {available} core(s) left for {needed} auto-divided entit(ies)")]
    InsufficientCores {
        /// Worker being divided.
        worker: String,
        /// Number of entities that need cores.
        needed: usize,
        /// Number of cores left after explicit claims.
        available: usize,
    },

    /// Explicit memory requests exceed the worker's capacity.
    #[error("worker \"{worker}\": explicit memory {requested} exceeds capacity {capacity}")]
    MemoryOversubscribed {
        /// Worker whose capacity is exceeded.
        worker: String,
        /// Sum of explicit requests.
        requested: MemoryBytes,
        /// Declared capacity.
        capacity: MemoryBytes,
    },

    /// The memory left for auto-division is below the per-entity minimum.
    #[error("worker \"{worker}\": {remaining} left for {needed} auto-divided entit(ies), minimum share is {minimum}")]
    InsufficientMemory {
        /// Worker being divided.
        worker: String,
        /// Number of entities that need memory.
        needed: usize,
        /// Memory left after explicit requests.
        remaining: MemoryBytes,
        /// Minimum share per entity.
        minimum: MemoryBytes,
    },

    /// Explicit budgets exceed the worker's budget capacity.
    #[error("worker \"{worker}\": explicit budget ${requested} exceeds capacity ${capacity}")]
    BudgetOversubscribed {
        /// Worker whose capacity is exceeded.
        worker: String,
        /// Sum of explicit budgets.
        requested: Budget,
        /// Declared capacity.
        capacity: Budget,
    },

    /// The budgets resolved across all workers exceed the global envelope.
    #[error("resolved budget ${requested} exceeds the global envelope ${envelope}")]
    EnvelopeExceeded {
        /// Sum of all resolved budgets.
        requested: Budget,
        /// The envelope's `max_budget`.
        envelope: Budget,
    },
}

fn bullet_list<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OssCrsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_lists_every_violation() {
        let err = OssCrsError::Configuration {
            violations: vec!["first problem".into(), "second problem".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("  - first problem"), "got: {msg}");
        assert!(msg.contains("  - second problem"), "got: {msg}");
    }

    #[test]
    fn cpu_overlap_names_both_entities_and_cores() {
        let conflict = AllocationConflict::CpuOverlap {
            worker: "local".into(),
            first: "crs1".into(),
            second: "crs2".into(),
            cores: "4-5".parse().unwrap(),
        };
        let msg = conflict.to_string();
        assert!(msg.contains("crs1"), "got: {msg}");
        assert!(msg.contains("crs2"), "got: {msg}");
        assert!(msg.contains("4-5"), "got: {msg}");
    }

    #[test]
    fn unavailable_models_lists_each_model() {
        let err = OssCrsError::UnavailableModels {
            missing: vec!["gpt-5 (crs1)".into(), "o3 (crs1, crs2)".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("  - gpt-5 (crs1)"), "got: {msg}");
        assert!(msg.contains("  - o3 (crs1, crs2)"), "got: {msg}");
    }

    #[test]
    fn precondition_error_includes_remediation() {
        let err = OssCrsError::EnvironmentPrecondition {
            message: "driver is systemd".into(),
            remediation: "switch to cgroupfs".into(),
        };
        assert!(err.to_string().contains("switch to cgroupfs"));
    }
}
