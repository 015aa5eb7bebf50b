//! Integration tests for the run pipeline.
//!
//! These tests are implemented in:
//! `crates/osscrs-runtime/tests/pipeline_test.rs`
//!
//! Covered scenarios:
//! - `full_run_provisions_launches_and_tears_down`: Credentials, nodes during launch, teardown
//! - `non_zero_exit_is_reported_and_nodes_still_removed`: Failed containers still clean up
//! - `entity_without_models_runs_without_credential`: No models, no key
//! - `all_or_nothing_aborts_before_any_node`: Default provisioning policy
//! - `best_effort_drops_only_the_failed_entity`: Best-effort provisioning policy
//! - `external_key_is_shared_without_generation`: External key mode
//! - `unhealthy_gateway_fails_the_run`: Liveness check gates provisioning
//! - `models_with_zero_budget_abort_the_run`: Models need a non-zero budget
//! - `best_effort_drops_entity_with_zero_budget`: Zero budget under best effort
//! - `unavailable_model_aborts_before_any_key`: Model availability check
//! - `best_effort_drops_entities_needing_unavailable_models`: Missing models under best effort
//! - `systemd_driver_is_refused_before_side_effects`: Driver precondition with remediation
//! - `missing_delegated_root_is_a_precondition_failure`: Delegation precondition
//! - `allocation_conflict_touches_nothing`: Overlapping cpusets
//! - `missing_image_is_a_configuration_error`: Launch needs an image
//! - `cancelled_run_stops_before_side_effects`: Cancellation
//! - `only_selected_workers_are_built`: Worker selection
//! - `unknown_selected_worker_is_rejected`: Unknown worker selection
//! - `failed_build_on_every_worker_launches_nothing`: Build errors abort the launch
