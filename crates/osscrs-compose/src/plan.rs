//! Allocation plans: the resolver's output and the dry-run surface.
//!
//! [`plan`] is side-effect free. It either returns one complete plan per
//! worker that hosts at least one entity, or every conflict found across
//! all workers.

use std::fmt;

use osscrs_common::error::{AllocationConflict, OssCrsError, Result};
use osscrs_common::types::{Budget, CpuSet, MemoryBytes};
use serde::Serialize;

use crate::resolver;
use crate::validator::{ComposeConfig, Worker};

/// How a resource dimension was resolved on a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisionMode {
    /// Every entity gave an explicit value.
    FineGrained,
    /// A single entity took the worker's whole capacity.
    Global,
    /// Unspecified entities split what explicit requests left over.
    AutoDivision,
}

impl fmt::Display for DivisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FineGrained => write!(f, "fine-grained"),
            Self::Global => write!(f, "global"),
            Self::AutoDivision => write!(f, "auto-division"),
        }
    }
}

/// Resources one entity receives on one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntry {
    /// Entity name.
    pub entity_name: String,
    /// Pinned cores.
    pub cpuset: CpuSet,
    /// Memory limit.
    pub memory: MemoryBytes,
    /// Dollar budget on this worker.
    pub budget: Budget,
}

/// The partition of one worker's resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationPlan {
    /// Worker name.
    pub worker_name: String,
    /// Entries in entity declaration order.
    pub entries: Vec<ResolvedEntry>,
    /// How cores were resolved.
    pub cpu_mode: DivisionMode,
    /// How memory was resolved.
    pub memory_mode: DivisionMode,
    /// How budget was resolved.
    pub budget_mode: DivisionMode,
}

impl AllocationPlan {
    /// Union of every entry's cores.
    pub fn total_cpuset(&self) -> CpuSet {
        self.entries
            .iter()
            .fold(CpuSet::new(), |acc, e| acc.union(&e.cpuset))
    }

    /// Sum of every entry's memory.
    pub fn total_memory(&self) -> MemoryBytes {
        self.entries.iter().map(|e| e.memory).sum()
    }

    /// Sum of every entry's budget.
    pub fn total_budget(&self) -> Budget {
        self.entries.iter().map(|e| e.budget).sum()
    }

    /// Looks up an entry by entity name.
    pub fn entry(&self, entity: &str) -> Option<&ResolvedEntry> {
        self.entries.iter().find(|e| e.entity_name == entity)
    }
}

/// Total budget an entity receives across every plan.
pub fn entity_budget(plans: &[AllocationPlan], entity: &str) -> Budget {
    plans
        .iter()
        .filter_map(|p| p.entry(entity))
        .map(|e| e.budget)
        .sum()
}

/// Resolves every worker's partition.
///
/// # Errors
///
/// Returns [`OssCrsError::Allocation`] carrying every conflict found across
/// all workers, including a breach of the global budget envelope.
pub fn plan(config: &ComposeConfig) -> Result<Vec<AllocationPlan>> {
    let budget_capacities = budget_capacities(config);
    let mut plans = Vec::with_capacity(config.workers.len());
    let mut conflicts = Vec::new();

    for (worker, budget_capacity) in config.workers.iter().zip(budget_capacities) {
        let requests: Vec<_> = config.requests_on(&worker.name).collect();
        if requests.is_empty() {
            tracing::debug!(worker = %worker.name, "no entity runs on worker, skipping");
            continue;
        }
        match resolver::resolve_worker(worker, &requests, budget_capacity) {
            Ok(plan) => {
                tracing::debug!(
                    worker = %worker.name,
                    entries = plan.entries.len(),
                    cpu_mode = %plan.cpu_mode,
                    memory_mode = %plan.memory_mode,
                    budget_mode = %plan.budget_mode,
                    "worker resolved"
                );
                plans.push(plan);
            }
            Err(found) => conflicts.extend(found),
        }
    }

    if conflicts.is_empty() {
        if let Some(envelope) = &config.envelope {
            let requested: Budget = plans.iter().map(AllocationPlan::total_budget).sum();
            if requested > envelope.max_budget {
                conflicts.push(AllocationConflict::EnvelopeExceeded {
                    requested,
                    envelope: envelope.max_budget,
                });
            }
        }
    }

    if conflicts.is_empty() {
        tracing::info!(workers = plans.len(), "allocation plan resolved");
        Ok(plans)
    } else {
        Err(OssCrsError::Allocation { conflicts })
    }
}

/// Budget capacity per worker, in worker order.
///
/// A worker's own `budget_capacity` wins. Workers without one share what the
/// envelope leaves after the declared capacities, evenly in cents with the
/// remainder going to earlier workers. Only workers that host an entity take
/// a share. Without an envelope, undeclared workers have no capacity.
fn budget_capacities(config: &ComposeConfig) -> Vec<Option<Budget>> {
    let Some(envelope) = &config.envelope else {
        return config.workers.iter().map(|w| w.budget_capacity).collect();
    };

    let hosts = |w: &Worker| config.requests_on(&w.name).next().is_some();
    let declared: Budget = config.workers.iter().filter_map(|w| w.budget_capacity).sum();
    let sharing = config
        .workers
        .iter()
        .filter(|w| w.budget_capacity.is_none() && hosts(w))
        .count();
    let mut shares = resolver::split_evenly(
        envelope.max_budget.saturating_sub(declared).cents(),
        sharing,
    )
    .into_iter();

    config
        .workers
        .iter()
        .map(|w| match w.budget_capacity {
            Some(capacity) => Some(capacity),
            None if hosts(w) => shares.next().map(Budget::from_cents),
            None => None,
        })
        .collect()
}
