//! Domain primitive types used across the osscrs workspace.
//!
//! Quantities are stored in canonical integer form (core IDs, bytes, cents)
//! so comparisons and sums are exact. Each one round-trips through its
//! textual form via `Display`/`FromStr`, which is also how it is
//! serialized.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OssCrsError;
use crate::quantity;

/// An ordered set of CPU core IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CpuSet(BTreeSet<u32>);

impl CpuSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Number of cores in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set holds no cores.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `core` is in the set.
    #[must_use]
    pub fn contains(&self, core: u32) -> bool {
        self.0.contains(&core)
    }

    /// Iterates core IDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    /// Cores present in both sets.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// Cores present in either set.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// Cores in `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self(self.0.difference(&other.0).copied().collect())
    }

    /// Whether every core of `self` is in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Whether the two sets share no core.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.0.is_disjoint(&other.0)
    }
}

impl From<BTreeSet<u32>> for CpuSet {
    fn from(cores: BTreeSet<u32>) -> Self {
        Self(cores)
    }
}

impl FromIterator<u32> for CpuSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Kernel list format with maximal ranges, e.g. `0-3,5,7-9`.
impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cores = self.0.iter().copied().peekable();
        let mut first = true;
        while let Some(start) = cores.next() {
            let mut end = start;
            while let Some(next) = end.checked_add(1).filter(|n| cores.peek() == Some(n)) {
                end = next;
                let _ = cores.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for CpuSet {
    type Err = OssCrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        quantity::parse_cpuset(s)
    }
}

impl TryFrom<String> for CpuSet {
    type Error = OssCrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CpuSet> for String {
    fn from(set: CpuSet) -> Self {
        set.to_string()
    }
}

/// A memory size in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryBytes(u64);

impl MemoryBytes {
    /// Zero bytes.
    pub const ZERO: Self = Self(0);

    /// Wraps a byte count.
    #[must_use]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// The byte count.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Adds two sizes, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Subtracts `other`, clamping at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl std::iter::Sum for MemoryBytes {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.fold(0_u64, |acc, m| acc.saturating_add(m.0)))
    }
}

impl<'a> std::iter::Sum<&'a Self> for MemoryBytes {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for MemoryBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl FromStr for MemoryBytes {
    type Err = OssCrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        quantity::parse_memory(s)
    }
}

impl TryFrom<String> for MemoryBytes {
    type Error = OssCrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MemoryBytes> for String {
    fn from(mem: MemoryBytes) -> Self {
        mem.to_string()
    }
}

/// A dollar budget, held in whole cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Budget(u64);

impl Budget {
    /// No budget.
    pub const ZERO: Self = Self(0);

    /// Wraps an amount in cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// The amount in cents.
    #[must_use]
    pub const fn cents(self) -> u64 {
        self.0
    }

    /// The amount in dollars, for wire formats that expect a number.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Whether the budget is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Subtracts `other`, clamping at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl std::iter::Sum for Budget {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.fold(0_u64, |acc, b| acc.saturating_add(b.0)))
    }
}

impl<'a> std::iter::Sum<&'a Self> for Budget {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Dollars with trailing zero cents dropped: `60`, `12.5`, `33.34`.
impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dollars = self.0 / 100;
        let cents = self.0 % 100;
        match cents {
            0 => write!(f, "{dollars}"),
            c if c % 10 == 0 => write!(f, "{dollars}.{}", c / 10),
            c => write!(f, "{dollars}.{c:02}"),
        }
    }
}

impl FromStr for Budget {
    type Err = OssCrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        quantity::parse_budget(s)
    }
}

impl TryFrom<String> for Budget {
    type Error = OssCrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Budget> for String {
    fn from(budget: Budget) -> Self {
        budget.to_string()
    }
}

/// Identifier of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Creates a run ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a short random run ID.
    #[must_use]
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(12);
        Self(id)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phase of the pipeline a run node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Building CRS images and artifacts.
    Build,
    /// Running CRS instances against a target.
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Run => write!(f, "run"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpuset_display_compresses_ranges() {
        let set: CpuSet = [0, 1, 2, 3, 5, 7, 8, 9].into_iter().collect();
        assert_eq!(set.to_string(), "0-3,5,7-9");
    }

    #[test]
    fn cpuset_display_empty() {
        assert_eq!(CpuSet::new().to_string(), "");
    }

    #[test]
    fn cpuset_set_operations() {
        let a: CpuSet = "0-7".parse().unwrap();
        let b: CpuSet = "4-11".parse().unwrap();
        assert_eq!(a.intersection(&b).to_string(), "4-7");
        assert_eq!(a.union(&b).to_string(), "0-11");
        assert_eq!(a.difference(&b).to_string(), "0-3");
        assert!(!a.is_disjoint(&b));
        assert!(a.intersection(&b).is_subset(&a));
    }

    #[test]
    fn cpuset_serializes_as_canonical_string() {
        let set: CpuSet = "3,0-2".parse().unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "\"0-3\"");
        let back: CpuSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn budget_display_drops_trailing_zero_cents() {
        assert_eq!(Budget::from_cents(6000).to_string(), "60");
        assert_eq!(Budget::from_cents(1250).to_string(), "12.5");
        assert_eq!(Budget::from_cents(3334).to_string(), "33.34");
        assert_eq!(Budget::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn budget_sum_and_dollars() {
        let total: Budget = [Budget::from_cents(6000), Budget::from_cents(4000)]
            .into_iter()
            .sum();
        assert_eq!(total.cents(), 10_000);
        assert!((total.as_dollars() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn run_id_generate_is_short_and_unique() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_eq!(a.as_str().len(), 12);
        assert_ne!(a, b);
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Build.to_string(), "build");
        assert_eq!(Phase::Run.to_string(), "run");
    }
}
