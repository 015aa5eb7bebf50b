//! # osscrs-budget
//!
//! Obtains one budget-limited API credential per entity from a
//! LiteLLM-compatible gateway and persists it where the entity's containers
//! can read it.
//!
//! - **Gateway**: The `GET /health`, `GET /models` and `POST /key/generate`
//!   protocol behind the [`BudgetGateway`](gateway::BudgetGateway) trait.
//! - **Provisioner**: Per-entity requests and atomic, owner-only key files.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod gateway;
pub mod provisioner;

pub use gateway::{BudgetGateway, HttpGateway, KeyRequest};
pub use provisioner::{
    EntityGrant, KeySource, ProvisionedCredential, Provisioner, unavailable_models_error,
};
