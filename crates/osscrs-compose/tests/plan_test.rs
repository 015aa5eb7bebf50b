//! Integration tests from configuration file to allocation plan.
//!
//! Covered:
//! 1. Loading a document from disk
//! 2. Mixed explicit and unspecified requests across two workers
//! 3. Envelope budget shared by workers without their own capacity
//! 4. Every violation reported at once
//! 5. Plan JSON shape

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;

use osscrs_common::error::OssCrsError;
use osscrs_common::types::Budget;
use osscrs_compose::plan::entity_budget;
use osscrs_compose::{ComposeConfig, DivisionMode, plan};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    file.write_all(content.as_bytes()).unwrap();
    file
}

const TWO_WORKERS: &str = r#"
workers:
  builder:
    cpu_capacity: "0-15"
    memory_capacity: 32G
    budget_capacity: 100
  fuzzer:
    cpu_capacity: "0-31"
    memory_capacity: 64G
entities:
  crs-multilang:
    models: [gpt-4o, claude-sonnet]
    image: ghcr.io/example/crs-multilang:latest
    worker_resources:
      builder: {cpuset: "0-7", memory: 16G, budget: 60}
      fuzzer: {}
  crs-libfuzzer:
    image: ghcr.io/example/crs-libfuzzer:latest
    worker_resources:
      builder: {}
      fuzzer: {cpuset: "0-3", memory: 8G}
  crs-java:
    models: [gpt-4o]
    max_rate: 20
    worker_resources:
      fuzzer: {}
budget:
  max_budget: 150
  max_rate: 60
"#;

// ── Loading ──────────────────────────────────────────────────────────

#[test]
fn load_and_plan_two_workers() {
    let file = write_config(TWO_WORKERS);
    let config = ComposeConfig::load(file.path()).unwrap();
    let plans = plan(&config).unwrap();

    assert_eq!(plans.len(), 2);
    let builder = &plans[0];
    assert_eq!(builder.worker_name, "builder");
    assert_eq!(builder.cpu_mode, DivisionMode::AutoDivision);
    let libfuzzer = builder.entry("crs-libfuzzer").unwrap();
    assert_eq!(libfuzzer.cpuset.to_string(), "8-15");
    assert_eq!(libfuzzer.memory.as_u64(), 16 << 30);
    assert_eq!(libfuzzer.budget, Budget::from_cents(4000));

    let fuzzer = &plans[1];
    assert_eq!(fuzzer.worker_name, "fuzzer");
    let entries: Vec<_> = fuzzer.entries.iter().map(|e| e.entity_name.as_str()).collect();
    assert_eq!(entries, ["crs-multilang", "crs-libfuzzer", "crs-java"]);
    assert_eq!(fuzzer.entry("crs-libfuzzer").unwrap().cpuset.to_string(), "0-3");
    let multilang = fuzzer.entry("crs-multilang").unwrap();
    let java = fuzzer.entry("crs-java").unwrap();
    assert!(multilang.cpuset.is_disjoint(&java.cpuset));
    assert_eq!(multilang.cpuset.len() + java.cpuset.len(), 28);
    assert_eq!(multilang.memory.as_u64() + java.memory.as_u64(), 56 << 30);
}

#[test]
fn envelope_covers_worker_without_capacity() {
    let config = ComposeConfig::from_yaml_str(TWO_WORKERS).unwrap();
    let plans = plan(&config).unwrap();

    // 150 envelope minus 100 declared on builder leaves 50 for fuzzer.
    assert_eq!(plans[1].total_budget(), Budget::from_cents(5000));
    assert_eq!(
        entity_budget(&plans, "crs-multilang"),
        Budget::from_cents(6000 + 1667)
    );
    let total: Budget = plans.iter().map(|p| p.total_budget()).sum();
    assert_eq!(total, Budget::from_cents(15_000));
}

#[test]
fn rate_limit_prefers_entity_override() {
    let config = ComposeConfig::from_yaml_str(TWO_WORKERS).unwrap();
    let envelope = config.envelope.as_ref();
    assert_eq!(config.entity("crs-java").unwrap().rate_limit(envelope), Some(20));
    assert_eq!(config.entity("crs-multilang").unwrap().rate_limit(envelope), Some(60));
}

// ── Validation ───────────────────────────────────────────────────────

#[test]
fn every_violation_is_reported() {
    let file = write_config(
        r#"
workers:
  local: {cpu_capacity: "3-1", memory_capacity: 4G}
entities:
  Upper: {worker_resources: {local: {}}}
  crs: {worker_resources: {remote: {}}}
"#,
    );
    let err = ComposeConfig::load(file.path()).unwrap_err();
    match err {
        OssCrsError::Configuration { violations } => {
            assert!(violations.len() >= 3, "got: {violations:?}");
            assert!(violations.iter().any(|v| v.contains("3-1")));
            assert!(violations.iter().any(|v| v.contains("Upper")));
            assert!(violations.iter().any(|v| v.contains("remote")));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let err = ComposeConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, OssCrsError::Io { .. }));
}

// ── Plan surface ─────────────────────────────────────────────────────

#[test]
fn plan_serializes_for_machine_consumers() {
    let config = ComposeConfig::from_yaml_str(
        r#"
workers:
  local: {cpu_capacity: "0-3", memory_capacity: 4G, budget_capacity: 10}
entities:
  crs: {worker_resources: {local: {}}}
"#,
    )
    .unwrap();
    let json = serde_json::to_value(plan(&config).unwrap()).unwrap();

    assert_eq!(
        json,
        serde_json::json!([{
            "worker_name": "local",
            "entries": [{
                "entity_name": "crs",
                "cpuset": "0-3",
                "memory": "4294967296B",
                "budget": "10"
            }],
            "cpu_mode": "global",
            "memory_mode": "global",
            "budget_mode": "global"
        }])
    );
}
