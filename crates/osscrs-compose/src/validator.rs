//! Conversion of the raw document into typed configuration.
//!
//! Every check runs to completion and every violation is reported in a
//! single [`OssCrsError::Configuration`]; nothing is accepted partially.
//!
//! # Checks performed
//!
//! 1. Every quantity parses.
//! 2. Each worker declares `cpu_capacity` and `memory_capacity`.
//! 3. Every worker referenced by an entity exists.
//! 4. Entity names are unique, lowercase, valid path components.
//! 5. At least one worker exists.

use std::collections::HashSet;
use std::path::Path;

use osscrs_common::error::{OssCrsError, Result};
use osscrs_common::quantity::{parse_budget, parse_cpuset, parse_memory};
use osscrs_common::types::{Budget, CpuSet, MemoryBytes};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{self, RawDocument, RawEntity, RawQuantity, RawRequest, RawWorker};

/// A validated configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposeConfig {
    /// Workers in declaration order.
    pub workers: Vec<Worker>,
    /// Global budget envelope, if declared.
    pub envelope: Option<BudgetEnvelope>,
    /// Entities in declaration order.
    pub entities: Vec<Entity>,
}

/// A machine and its declared capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Worker {
    /// Worker name.
    pub name: String,
    /// Cores available to entities.
    pub cpu_capacity: CpuSet,
    /// Memory available to entities.
    pub memory_capacity: MemoryBytes,
    /// Budget available to entities on this worker.
    pub budget_capacity: Option<Budget>,
}

/// Total budget across every worker and entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetEnvelope {
    /// Upper bound on the sum of all resolved budgets.
    pub max_budget: Budget,
    /// Default requests-per-minute limit for provisioned keys.
    pub max_rate: Option<u32>,
}

/// A CRS instance and what it asks for on each worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    /// Entity name, lowercase.
    pub name: String,
    /// One request per worker the entity runs on, in declaration order.
    pub requests: Vec<ResourceRequest>,
    /// Models the entity's credential may use.
    pub models: Vec<String>,
    /// Per-entity request rate override.
    pub max_rate: Option<u32>,
    /// Container image to launch.
    pub image: Option<String>,
}

/// What one entity asks for on one worker. `None` means auto-divide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRequest {
    /// Requesting entity.
    pub entity_name: String,
    /// Worker the request applies to.
    pub worker_name: String,
    /// Pinned cores.
    pub cpuset: Option<CpuSet>,
    /// Memory limit.
    pub memory: Option<MemoryBytes>,
    /// Dollar budget.
    pub budget: Option<Budget>,
}

impl ComposeConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is malformed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self> {
        validate(&config::load_file(path)?)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is malformed or fails validation.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        validate(&config::from_yaml_str(content)?)
    }

    /// Looks up a worker by name.
    pub fn worker(&self, name: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.name == name)
    }

    /// Looks up an entity by name.
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Requests targeting `worker`, in entity declaration order.
    pub fn requests_on<'a>(&'a self, worker: &'a str) -> impl Iterator<Item = &'a ResourceRequest> {
        self.entities
            .iter()
            .flat_map(|e| e.requests.iter())
            .filter(move |r| r.worker_name == worker)
    }
}

impl Entity {
    /// Request rate for this entity's credential: its own override, else the
    /// envelope default.
    pub fn rate_limit(&self, envelope: Option<&BudgetEnvelope>) -> Option<u32> {
        self.max_rate.or_else(|| envelope.and_then(|e| e.max_rate))
    }
}

/// Validates a raw document and converts it into a [`ComposeConfig`].
///
/// # Errors
///
/// Returns [`OssCrsError::Configuration`] listing every violation found.
pub fn validate(raw: &RawDocument) -> Result<ComposeConfig> {
    tracing::info!("validating resource configuration");
    let mut violations = Vec::new();

    let workers = validate_workers(raw, &mut violations);
    let worker_names: HashSet<&str> = raw.workers.keys().filter_map(|k| k.as_str()).collect();
    let envelope = raw.budget.as_ref().and_then(|env| {
        let max_budget = quantity(
            &mut violations,
            "budget.max_budget",
            Some(&env.max_budget),
            parse_budget,
        )?;
        Some(BudgetEnvelope {
            max_budget,
            max_rate: env.max_rate,
        })
    });
    let entities = validate_entities(raw, &worker_names, &mut violations);

    if violations.is_empty() {
        tracing::debug!(
            workers = workers.len(),
            entities = entities.len(),
            "configuration is valid"
        );
        Ok(ComposeConfig {
            workers,
            envelope,
            entities,
        })
    } else {
        Err(OssCrsError::Configuration { violations })
    }
}

fn validate_workers(raw: &RawDocument, violations: &mut Vec<String>) -> Vec<Worker> {
    if raw.workers.is_empty() {
        violations.push("no workers are declared".into());
    }

    let mut seen = HashSet::new();
    let mut workers = Vec::with_capacity(raw.workers.len());
    for (key, value) in &raw.workers {
        let Some(name) = key.as_str() else {
            violations.push(format!("worker name {key:?} is not a string"));
            continue;
        };
        if !seen.insert(name) {
            violations.push(format!("duplicate worker name: \"{name}\""));
            continue;
        }
        let Some(rw) = entry::<RawWorker>(violations, &format!("worker \"{name}\""), value) else {
            continue;
        };
        let ctx = format!("worker \"{name}\"");
        if rw.cpu_capacity.is_none() {
            violations.push(format!("{ctx}: cpu_capacity is required"));
        }
        if rw.memory_capacity.is_none() {
            violations.push(format!("{ctx}: memory_capacity is required"));
        }
        let cpu = quantity(violations, &ctx, rw.cpu_capacity.as_ref(), parse_cpuset);
        let memory = quantity(violations, &ctx, rw.memory_capacity.as_ref(), parse_memory);
        let budget = quantity(violations, &ctx, rw.budget_capacity.as_ref(), parse_budget);
        if let (Some(cpu_capacity), Some(memory_capacity)) = (cpu, memory) {
            workers.push(Worker {
                name: name.to_owned(),
                cpu_capacity,
                memory_capacity,
                budget_capacity: budget,
            });
        }
    }
    workers
}

fn validate_entities(
    raw: &RawDocument,
    worker_names: &HashSet<&str>,
    violations: &mut Vec<String>,
) -> Vec<Entity> {
    let mut seen = HashSet::new();
    let mut entities = Vec::with_capacity(raw.entities.len());

    for (key, value) in &raw.entities {
        let Some(name) = key.as_str() else {
            violations.push(format!("entity name {key:?} is not a string"));
            continue;
        };
        check_entity_name(name, violations);
        if !seen.insert(name.to_lowercase()) {
            violations.push(format!("duplicate entity name: \"{name}\""));
        }
        let ctx = format!("entity \"{name}\"");
        let Some(re) = entry::<RawEntity>(violations, &ctx, value) else {
            continue;
        };
        if re.worker_resources.is_empty() {
            violations.push(format!("{ctx}: worker_resources lists no worker"));
        }

        let mut requests = Vec::with_capacity(re.worker_resources.len());
        for (wkey, wvalue) in &re.worker_resources {
            let Some(worker) = wkey.as_str() else {
                violations.push(format!("{ctx}: worker name {wkey:?} is not a string"));
                continue;
            };
            if !worker_names.contains(worker) {
                violations.push(format!("{ctx} references unknown worker \"{worker}\""));
            }
            let rctx = format!("{ctx} on worker \"{worker}\"");
            let Some(rr) = entry::<RawRequest>(violations, &rctx, wvalue) else {
                continue;
            };
            requests.push(ResourceRequest {
                entity_name: name.to_owned(),
                worker_name: worker.to_owned(),
                cpuset: quantity(violations, &rctx, rr.cpuset.as_ref(), parse_cpuset),
                memory: quantity(violations, &rctx, rr.memory.as_ref(), parse_memory),
                budget: quantity(violations, &rctx, rr.budget.as_ref(), parse_budget),
            });
        }

        entities.push(Entity {
            name: name.to_owned(),
            requests,
            models: re.models,
            max_rate: re.max_rate,
            image: re.image,
        });
    }
    entities
}

/// Entity names become cgroup directory names, credential file names and
/// container names.
fn check_entity_name(name: &str, violations: &mut Vec<String>) {
    if name.chars().any(char::is_uppercase) {
        violations.push(format!("entity name \"{name}\" must be lowercase"));
        return;
    }
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-')
        });
    if !valid {
        violations.push(format!(
            "entity name \"{name}\" must match [a-z0-9][a-z0-9_.-]*"
        ));
    }
}

/// Deserializes one mapping value, treating an empty (`null`) value as all
/// defaults.
fn entry<T: DeserializeOwned + Default>(
    violations: &mut Vec<String>,
    ctx: &str,
    value: &serde_yaml::Value,
) -> Option<T> {
    if value.is_null() {
        return Some(T::default());
    }
    match serde_yaml::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            violations.push(format!("{ctx}: {e}"));
            None
        }
    }
}

fn quantity<T>(
    violations: &mut Vec<String>,
    ctx: &str,
    raw: Option<&RawQuantity>,
    parse: fn(&str) -> Result<T>,
) -> Option<T> {
    let text = raw?.to_string();
    match parse(&text) {
        Ok(v) => Some(v),
        Err(e) => {
            violations.push(format!("{ctx}: {e}"));
            None
        }
    }
}
