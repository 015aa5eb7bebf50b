//! Integration tests for cgroup hierarchy construction and provisioning.
//!
//! These tests are implemented in:
//! `crates/osscrs-core/tests/hierarchy_test.rs`
//! `crates/osscrs-budget/tests/provisioning_test.rs`
//!
//! Covered scenarios:
//! - `ensure_base_delegates_controllers_at_both_levels`: Root and subtree controller delegation
//! - `full_run_node_lifecycle`: Run and entity nodes, runtime binding, teardown
//! - `rebuilding_does_not_rewrite_limits`: Idempotent construction
//! - `separate_runs_coexist`: Teardown of one run leaves another intact
//! - `provision_over_http`: Health check, key generation and credential file over HTTP
//! - `failed_request_leaves_no_key_file`: No partial credential on gateway failure
//! - `external_key_only_checks_health`: External key mode never calls `/key/generate`
