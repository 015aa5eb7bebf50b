//! # osscrs-core
//!
//! Kernel-level enforcement of an allocation plan.
//!
//! This crate provides:
//! - **Cgroups v2**: Construction of the `oss-crs` hierarchy below a
//!   delegated root, idempotent limit writes, unwinding on failure and
//!   bounded teardown.
//! - **Driver checks**: Verifying the container runtime uses the `cgroupfs`
//!   driver.
//! - **Binding**: Turning entity nodes into `--cgroup-parent`,
//!   `--cpuset-cpus` and `--memory` settings.
//!
//! Every environment problem is reported before the first node is created,
//! together with the commands that fix it.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod binding;
pub mod cgroup;
pub mod driver;
