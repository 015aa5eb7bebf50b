//! Formatted output helpers for CLI commands.

use std::fmt::Write;

use osscrs_compose::AllocationPlan;

// ANSI styles.
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const YELLOW: &str = "\x1b[33m";
pub const RESET: &str = "\x1b[0m";

/// Formats a byte count into a human-readable string (e.g., "128 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// One table per worker: entity, cores, memory, budget.
pub fn plan_table(plans: &[AllocationPlan]) -> String {
    let mut out = String::new();
    for plan in plans {
        let _ = writeln!(
            out,
            "  worker {} (cpu: {}, memory: {}, budget: {})",
            plan.worker_name, plan.cpu_mode, plan.memory_mode, plan.budget_mode
        );
        let _ = writeln!(out, "    {:<20} {:<16} {:>12} {:>10}", "ENTITY", "CPUSET", "MEMORY", "BUDGET");
        for entry in &plan.entries {
            let _ = writeln!(
                out,
                "    {:<20} {:<16} {:>12} {:>10}",
                entry.entity_name,
                entry.cpuset.to_string(),
                format_bytes(entry.memory.as_u64()),
                format!("${}", entry.budget)
            );
        }
        let _ = writeln!(
            out,
            "    {:<20} {:<16} {:>12} {:>10}",
            "total",
            plan.total_cpuset().to_string(),
            format_bytes(plan.total_memory().as_u64()),
            format!("${}", plan.total_budget())
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use osscrs_compose::ComposeConfig;

    use super::*;

    #[test]
    fn format_bytes_displays_bytes() {
        assert_eq!(format_bytes(512), "512 B");
    }

    #[test]
    fn format_bytes_displays_mib() {
        assert_eq!(format_bytes(536_870_912), "512.0 MiB");
    }

    #[test]
    fn format_bytes_displays_gib() {
        assert_eq!(format_bytes(8_589_934_592), "8.0 GiB");
    }

    #[test]
    fn plan_table_lists_entries_and_totals() {
        let config = ComposeConfig::from_yaml_str(
            r#"
workers:
  local: {cpu_capacity: "0-7", memory_capacity: 8G, budget_capacity: 100}
entities:
  crs1: {worker_resources: {local: {cpuset: "0-3", memory: 4G, budget: 60}}}
  crs2: {worker_resources: {local: {}}}
"#,
        )
        .unwrap();
        let table = plan_table(&osscrs_compose::plan(&config).unwrap());

        assert!(table.contains("worker local (cpu: auto-division"), "{table}");
        let crs2 = table.lines().find(|l| l.trim_start().starts_with("crs2")).unwrap();
        assert!(crs2.contains("4-7") && crs2.contains("4.0 GiB") && crs2.contains("$40"), "{crs2}");
        let total = table.lines().find(|l| l.trim_start().starts_with("total")).unwrap();
        assert!(total.contains("0-7") && total.contains("$100"), "{total}");
    }
}
