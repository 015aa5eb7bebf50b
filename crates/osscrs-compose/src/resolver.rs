//! Per-worker resolution of cores, memory and budget.
//!
//! Each dimension is resolved independently. Explicit values are checked
//! and kept; whatever capacity they leave is split evenly among the
//! entities that gave no value. Even splits never lose or duplicate a
//! unit: the remainder goes one unit at a time to the earliest entities.

use osscrs_common::constants::MIN_AUTO_MEMORY_BYTES;
use osscrs_common::error::AllocationConflict;
use osscrs_common::types::{Budget, CpuSet, MemoryBytes};

use crate::plan::{AllocationPlan, DivisionMode, ResolvedEntry};
use crate::validator::{ResourceRequest, Worker};

/// Resolves one worker's partition among `requests`, given in entity
/// declaration order.
///
/// `budget_capacity` is the worker's effective budget capacity after the
/// envelope fallback; `None` means explicit budgets pass unchanged and
/// unspecified entities get nothing.
///
/// # Errors
///
/// Returns every conflict found on this worker.
pub fn resolve_worker(
    worker: &Worker,
    requests: &[&ResourceRequest],
    budget_capacity: Option<Budget>,
) -> Result<AllocationPlan, Vec<AllocationConflict>> {
    let mut conflicts = Vec::new();

    let (cpu_mode, cpusets) = resolve_cpu(worker, requests, &mut conflicts);
    let (memory_mode, memories) = resolve_memory(worker, requests, &mut conflicts);
    let (budget_mode, budgets) = resolve_budget(worker, requests, budget_capacity, &mut conflicts);

    if !conflicts.is_empty() {
        return Err(conflicts);
    }

    let entries = requests
        .iter()
        .zip(cpusets)
        .zip(memories)
        .zip(budgets)
        .map(|(((req, cpuset), memory), budget)| ResolvedEntry {
            entity_name: req.entity_name.clone(),
            cpuset,
            memory,
            budget,
        })
        .collect();

    Ok(AllocationPlan {
        worker_name: worker.name.clone(),
        entries,
        cpu_mode,
        memory_mode,
        budget_mode,
    })
}

fn division_mode(total: usize, unspecified: usize) -> DivisionMode {
    match (total, unspecified) {
        (_, 0) => DivisionMode::FineGrained,
        (1, 1) => DivisionMode::Global,
        _ => DivisionMode::AutoDivision,
    }
}

/// Splits `total` units into `parts` shares that differ by at most one,
/// larger shares first. The shares always sum to `total`.
pub fn split_evenly(total: u64, parts: usize) -> Vec<u64> {
    let Ok(n) = u64::try_from(parts) else {
        return Vec::new();
    };
    if n == 0 {
        return Vec::new();
    }
    let base = total / n;
    let extra = total % n;
    (0..n).map(|i| base + u64::from(i < extra)).collect()
}

/// Fills the `None` slots of `explicit` from `shares`, in order.
fn fill<T: Copy>(explicit: impl Iterator<Item = Option<T>>, shares: &[T]) -> Vec<T> {
    let mut shares = shares.iter().copied();
    explicit
        .filter_map(|value| value.or_else(|| shares.next()))
        .collect()
}

fn resolve_cpu(
    worker: &Worker,
    requests: &[&ResourceRequest],
    conflicts: &mut Vec<AllocationConflict>,
) -> (DivisionMode, Vec<CpuSet>) {
    let capacity = &worker.cpu_capacity;
    let mut claimed = CpuSet::new();

    for (i, req) in requests.iter().enumerate() {
        let Some(cores) = &req.cpuset else {
            continue;
        };
        let outside = cores.difference(capacity);
        if !outside.is_empty() {
            conflicts.push(AllocationConflict::CpuOutOfRange {
                worker: worker.name.clone(),
                entity: req.entity_name.clone(),
                cores: outside,
                capacity: capacity.clone(),
            });
        }
        for earlier in &requests[..i] {
            let Some(prev) = &earlier.cpuset else {
                continue;
            };
            let shared = prev.intersection(cores);
            if !shared.is_empty() {
                conflicts.push(AllocationConflict::CpuOverlap {
                    worker: worker.name.clone(),
                    first: earlier.entity_name.clone(),
                    second: req.entity_name.clone(),
                    cores: shared,
                });
            }
        }
        claimed = claimed.union(cores);
    }

    let unspecified = requests.iter().filter(|r| r.cpuset.is_none()).count();
    let mode = division_mode(requests.len(), unspecified);
    let remaining: Vec<u32> = capacity.difference(&claimed).iter().collect();
    if remaining.len() < unspecified {
        conflicts.push(AllocationConflict::InsufficientCores {
            worker: worker.name.clone(),
            needed: unspecified,
            available: remaining.len(),
        });
        return (mode, Vec::new());
    }

    let mut shares = Vec::with_capacity(unspecified);
    if unspecified > 0 {
        let base = remaining.len() / unspecified;
        let extra = remaining.len() % unspecified;
        let mut rest = remaining.as_slice();
        for i in 0..unspecified {
            let (run, tail) = rest.split_at(base + usize::from(i < extra));
            shares.push(run.iter().copied().collect::<CpuSet>());
            rest = tail;
        }
    }

    let mut shares = shares.into_iter();
    let cpusets = requests
        .iter()
        .filter_map(|r| r.cpuset.clone().or_else(|| shares.next()))
        .collect();
    (mode, cpusets)
}

fn resolve_memory(
    worker: &Worker,
    requests: &[&ResourceRequest],
    conflicts: &mut Vec<AllocationConflict>,
) -> (DivisionMode, Vec<MemoryBytes>) {
    let capacity = worker.memory_capacity;
    let requested: MemoryBytes = requests.iter().filter_map(|r| r.memory).sum();
    let unspecified = requests.iter().filter(|r| r.memory.is_none()).count();
    let mode = division_mode(requests.len(), unspecified);

    if requested > capacity {
        conflicts.push(AllocationConflict::MemoryOversubscribed {
            worker: worker.name.clone(),
            requested,
            capacity,
        });
        return (mode, Vec::new());
    }

    let remaining = capacity.saturating_sub(requested);
    let shares: Vec<MemoryBytes> = split_evenly(remaining.as_u64(), unspecified)
        .into_iter()
        .map(MemoryBytes::from_bytes)
        .collect();

    let minimum = MemoryBytes::from_bytes(MIN_AUTO_MEMORY_BYTES);
    if mode == DivisionMode::AutoDivision && shares.last().is_some_and(|s| *s < minimum) {
        conflicts.push(AllocationConflict::InsufficientMemory {
            worker: worker.name.clone(),
            needed: unspecified,
            remaining,
            minimum,
        });
        return (mode, Vec::new());
    }

    (mode, fill(requests.iter().map(|r| r.memory), &shares))
}

fn resolve_budget(
    worker: &Worker,
    requests: &[&ResourceRequest],
    capacity: Option<Budget>,
    conflicts: &mut Vec<AllocationConflict>,
) -> (DivisionMode, Vec<Budget>) {
    let requested: Budget = requests.iter().filter_map(|r| r.budget).sum();
    let unspecified = requests.iter().filter(|r| r.budget.is_none()).count();
    let mode = division_mode(requests.len(), unspecified);

    let remaining = match capacity {
        Some(capacity) if requested > capacity => {
            conflicts.push(AllocationConflict::BudgetOversubscribed {
                worker: worker.name.clone(),
                requested,
                capacity,
            });
            return (mode, Vec::new());
        }
        Some(capacity) => capacity.saturating_sub(requested),
        None => Budget::ZERO,
    };

    let shares: Vec<Budget> = split_evenly(remaining.cents(), unspecified)
        .into_iter()
        .map(Budget::from_cents)
        .collect();
    if shares.iter().any(|b| b.is_zero()) {
        tracing::warn!(
            worker = %worker.name,
            "auto-divided budget is zero for some entities; those declaring models cannot be provisioned"
        );
    }

    (mode, fill(requests.iter().map(|r| r.budget), &shares))
}
