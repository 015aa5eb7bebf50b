//! # osscrs-runtime
//!
//! Drives one orchestration run end to end:
//!
//! 1. resolve the allocation plan;
//! 2. check the container runtime and the delegated cgroup root;
//! 3. provision a credential per entity;
//! 4. build the cgroup hierarchy for every worker in parallel;
//! 5. launch every entity under its node;
//! 6. tear the hierarchy down again.
//!
//! Settings travel in an immutable [`RunContext`](context::RunContext);
//! container launch sits behind the [`Launcher`](launch::Launcher) trait.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod context;
pub mod engine;
pub mod launch;

pub use context::{CancelFlag, ProvisioningPolicy, RunContext};
pub use engine::{Orchestrator, RunReport};
pub use launch::{DockerLauncher, LaunchOutcome, LaunchSpec, LaunchStatus, Launcher};
