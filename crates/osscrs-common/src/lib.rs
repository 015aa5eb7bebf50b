//! # osscrs-common
//!
//! Shared types, quantity parsers, error definitions, and constants used
//! across the entire osscrs workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives (`CpuSet`, `MemoryBytes`,
//! `Budget`, `RunId`) that the resolver, the cgroup builder and the budget
//! provisioner all exchange.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod constants;
pub mod error;
pub mod quantity;
pub mod types;
