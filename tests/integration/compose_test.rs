//! Integration tests from configuration document to allocation plan.
//!
//! These tests are implemented in:
//! `crates/osscrs-compose/tests/plan_test.rs`
//!
//! Covered scenarios:
//! - `load_and_plan_two_workers`: Mixed explicit and unspecified requests on two workers
//! - `envelope_covers_worker_without_capacity`: Envelope budget shared by undeclared workers
//! - `rate_limit_prefers_entity_override`: Entity `max_rate` over the envelope default
//! - `every_violation_is_reported`: Parse, naming and reference errors in one report
//! - `missing_file_is_an_io_error`: Unreadable document
//! - `plan_serializes_for_machine_consumers`: JSON shape printed by `osscrs plan --json`
