//! # osscrs-compose
//!
//! Turns a resource configuration document into per-worker allocation plans.
//!
//! Handles:
//! - **Config**: Loading the raw YAML/JSON document.
//! - **Validator**: Converting the raw document into typed values, reporting
//!   every violation at once.
//! - **Resolver**: Fine-grained, global, and auto-division resolution of
//!   CPU cores, memory, and budget per worker, with conflict detection.
//! - **Plan**: The side-effect-free plan surface used for dry runs.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod plan;
pub mod resolver;
pub mod validator;

pub use plan::{AllocationPlan, DivisionMode, ResolvedEntry, plan};
pub use validator::{ComposeConfig, Entity, ResourceRequest, Worker};
