//! Textual quantity parsers built on `nom`.
//!
//! Three grammars are accepted:
//!
//! - CPU sets in the kernel list format: `5`, `0,2,4`, `0-7`, `0-3,5,7-9`.
//! - Memory sizes: a non-negative, optionally decimal number immediately
//!   followed by `B`, `K`, `KB`, `M`, `MB`, `G`, `GB`, `T` or `TB`. Units are
//!   binary (`1K = 1024B`) and the two-letter spellings are aliases of the
//!   one-letter ones.
//! - Dollar budgets with at most two fractional digits: `60`, `12.5`.
//!
//! Whitespace is rejected everywhere; configuration values are expected to
//! be single tokens.

use std::collections::BTreeSet;

use nom::{
    IResult, Parser,
    character::complete::{alpha1, char, digit1},
    combinator::{all_consuming, map_res, opt, recognize},
    multi::separated_list1,
    sequence::preceded,
};

use crate::constants::MAX_CPU_ID;
use crate::error::{OssCrsError, Result};
use crate::types::{Budget, CpuSet, MemoryBytes};

const KIB: u128 = 1024;

fn parse_err(kind: &'static str, input: &str, reason: impl Into<String>) -> OssCrsError {
    OssCrsError::Parse {
        kind,
        input: input.to_owned(),
        reason: reason.into(),
    }
}

/// Rejections shared by every grammar, checked before `nom` runs so the
/// error names the actual problem rather than a byte offset.
fn reject_common(kind: &'static str, input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(parse_err(kind, input, "value is empty"));
    }
    if input.chars().any(char::is_whitespace) {
        return Err(parse_err(kind, input, "whitespace is not allowed"));
    }
    if input.starts_with('-') || input.contains(",-") || input.contains("--") {
        return Err(parse_err(kind, input, "negative values are not allowed"));
    }
    Ok(())
}

fn core_id(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse::<u32>).parse(input)
}

fn cpu_item(input: &str) -> IResult<&str, (u32, Option<u32>)> {
    (core_id, opt(preceded(char('-'), core_id))).parse(input)
}

fn cpu_list(input: &str) -> IResult<&str, Vec<(u32, Option<u32>)>> {
    separated_list1(char(','), cpu_item).parse(input)
}

/// Parses a CPU set such as `0-3,5,7-9` into a [`CpuSet`].
///
/// Duplicate and overlapping items collapse into the set.
///
/// # Errors
///
/// Returns [`OssCrsError::Parse`] on out-of-order ranges (`5-2`), negative
/// numbers, non-numeric tokens, whitespace, or core IDs above
/// [`MAX_CPU_ID`].
pub fn parse_cpuset(input: &str) -> Result<CpuSet> {
    const KIND: &str = "cpuset";
    reject_common(KIND, input)?;

    let (_, items) = all_consuming(cpu_list)
        .parse(input)
        .map_err(|e| match e {
            nom::Err::Error(inner) | nom::Err::Failure(inner) => parse_err(
                KIND,
                input,
                format!("expected a core ID or an a-b range at \"{}\"", inner.input),
            ),
            nom::Err::Incomplete(_) => parse_err(KIND, input, "truncated value"),
        })?;

    let mut cores = BTreeSet::new();
    for (start, end) in items {
        let end = end.unwrap_or(start);
        if start > end {
            return Err(parse_err(
                KIND,
                input,
                format!("range {start}-{end} is out of order"),
            ));
        }
        if end > MAX_CPU_ID {
            return Err(parse_err(
                KIND,
                input,
                format!("core {end} exceeds the maximum core ID {MAX_CPU_ID}"),
            ));
        }
        cores.extend(start..=end);
    }
    Ok(CpuSet::from(cores))
}

fn decimal(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    (digit1, opt(preceded(char('.'), digit1))).parse(input)
}

fn memory_quantity(input: &str) -> IResult<&str, ((&str, Option<&str>), &str)> {
    (decimal, recognize(opt(alpha1))).parse(input)
}

/// Multiplier in bytes for a memory unit suffix, matched case-insensitively.
fn unit_multiplier(suffix: &str) -> Option<u128> {
    match suffix.to_ascii_uppercase().as_str() {
        "B" => Some(1),
        "K" | "KB" => Some(KIB),
        "M" | "MB" => Some(KIB.pow(2)),
        "G" | "GB" => Some(KIB.pow(3)),
        "T" | "TB" => Some(KIB.pow(4)),
        _ => None,
    }
}

/// Parses a memory size such as `8G`, `1.5G` or `512MB` into bytes.
///
/// Fractional bytes are truncated.
///
/// # Errors
///
/// Returns [`OssCrsError::Parse`] on a missing or unknown unit suffix,
/// whitespace, negative values, or a size that overflows `u64`.
pub fn parse_memory(input: &str) -> Result<MemoryBytes> {
    const KIND: &str = "memory";
    reject_common(KIND, input)?;

    let (_, ((whole, fraction), suffix)) = all_consuming(memory_quantity)
        .parse(input)
        .map_err(|_| parse_err(KIND, input, "expected a number followed by a unit suffix"))?;

    if suffix.is_empty() {
        return Err(parse_err(
            KIND,
            input,
            "missing unit suffix (one of B, K, KB, M, MB, G, GB, T, TB)",
        ));
    }
    let multiplier = unit_multiplier(suffix).ok_or_else(|| {
        parse_err(
            KIND,
            input,
            format!("unknown unit suffix \"{suffix}\" (one of B, K, KB, M, MB, G, GB, T, TB)"),
        )
    })?;

    let overflow = || parse_err(KIND, input, "value is too large");
    let (mantissa, scale) = scaled_decimal(whole, fraction.unwrap_or(""), 9)
        .ok_or_else(|| parse_err(KIND, input, "too many digits"))?;
    let bytes = mantissa.checked_mul(multiplier).ok_or_else(overflow)? / scale;
    u64::try_from(bytes)
        .map(MemoryBytes::from_bytes)
        .map_err(|_| overflow())
}

/// Parses a dollar amount such as `60` or `12.50` into a [`Budget`].
///
/// # Errors
///
/// Returns [`OssCrsError::Parse`] on negative values, more than two
/// fractional digits, non-numeric input, or overflow.
pub fn parse_budget(input: &str) -> Result<Budget> {
    const KIND: &str = "budget";
    reject_common(KIND, input)?;

    let (_, (whole, fraction)) = all_consuming(decimal)
        .parse(input)
        .map_err(|_| parse_err(KIND, input, "expected a dollar amount such as 60 or 12.50"))?;

    let fraction = fraction.unwrap_or("");
    if fraction.len() > 2 {
        return Err(parse_err(KIND, input, "at most two fractional digits (cents)"));
    }
    let (mantissa, scale) = scaled_decimal(whole, fraction, 2)
        .ok_or_else(|| parse_err(KIND, input, "value is too large"))?;
    let cents = mantissa * (100 / scale);
    u64::try_from(cents)
        .map(Budget::from_cents)
        .map_err(|_| parse_err(KIND, input, "value is too large"))
}

/// Combines `whole.fraction` into an integer mantissa and its power-of-ten
/// scale. Returns `None` if either part has more digits than fit.
fn scaled_decimal(whole: &str, fraction: &str, max_fraction_digits: usize) -> Option<(u128, u128)> {
    if fraction.len() > max_fraction_digits {
        return None;
    }
    let whole: u128 = whole.parse::<u64>().ok()?.into();
    let exponent = u32::try_from(fraction.len()).ok()?;
    let scale = 10_u128.pow(exponent);
    let fraction: u128 = if fraction.is_empty() {
        0
    } else {
        fraction.parse().ok()?
    };
    Some((whole.checked_mul(scale)?.checked_add(fraction)?, scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cores(set: &CpuSet) -> Vec<u32> {
        set.iter().collect()
    }

    #[test]
    fn cpuset_mixed_list_and_ranges() {
        let set = parse_cpuset("0-3,5,7-9").unwrap();
        assert_eq!(cores(&set), vec![0, 1, 2, 3, 5, 7, 8, 9]);
    }

    #[test]
    fn cpuset_single_core() {
        assert_eq!(cores(&parse_cpuset("5").unwrap()), vec![5]);
    }

    #[test]
    fn cpuset_plain_list() {
        assert_eq!(cores(&parse_cpuset("0,2,4,6").unwrap()), vec![0, 2, 4, 6]);
    }

    #[test]
    fn cpuset_degenerate_range() {
        assert_eq!(cores(&parse_cpuset("3-3").unwrap()), vec![3]);
    }

    #[test]
    fn cpuset_overlaps_collapse() {
        assert_eq!(cores(&parse_cpuset("0-3,2-5,4").unwrap()), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn cpuset_canonical_form_reparses_to_same_set() {
        let set = parse_cpuset("9,8,7,0-3,5,2").unwrap();
        let canonical = set.to_string();
        assert_eq!(canonical, "0-3,5,7-9");
        assert_eq!(parse_cpuset(&canonical).unwrap(), set);
    }

    #[test]
    fn cpuset_rejects_out_of_order_range() {
        let err = parse_cpuset("5-2").unwrap_err();
        assert!(err.to_string().contains("out of order"), "got: {err}");
    }

    #[test]
    fn cpuset_rejects_negative() {
        for input in ["-1", "0,-1", "2--3"] {
            let err = parse_cpuset(input).unwrap_err();
            assert!(err.to_string().contains("negative"), "{input}: {err}");
        }
    }

    #[test]
    fn cpuset_rejects_non_numeric_tokens() {
        for input in ["a", "0-x", "1,,2", "1,", "0-3;5"] {
            assert!(parse_cpuset(input).is_err(), "{input} should fail");
        }
    }

    #[test]
    fn cpuset_rejects_whitespace_and_empty() {
        assert!(parse_cpuset("0, 1").is_err());
        assert!(parse_cpuset("").is_err());
    }

    #[test]
    fn cpuset_rejects_core_above_ceiling() {
        let err = parse_cpuset("0-9000").unwrap_err();
        assert!(err.to_string().contains("maximum core ID"), "got: {err}");
    }

    #[test]
    fn memory_binary_units() {
        assert_eq!(parse_memory("512B").unwrap().as_u64(), 512);
        assert_eq!(parse_memory("4K").unwrap().as_u64(), 4096);
        assert_eq!(parse_memory("512M").unwrap().as_u64(), 512 * 1024 * 1024);
        assert_eq!(parse_memory("8G").unwrap().as_u64(), 8 * 1024 * 1024 * 1024);
        assert_eq!(parse_memory("1T").unwrap().as_u64(), 1024_u64.pow(4));
    }

    #[test]
    fn memory_two_letter_suffix_is_alias() {
        assert_eq!(parse_memory("16GB").unwrap(), parse_memory("16G").unwrap());
        assert_eq!(parse_memory("2048MB").unwrap(), parse_memory("2G").unwrap());
    }

    #[test]
    fn memory_suffix_is_case_insensitive() {
        assert_eq!(parse_memory("8g").unwrap(), parse_memory("8G").unwrap());
    }

    #[test]
    fn memory_decimal_value() {
        assert_eq!(parse_memory("1.5G").unwrap().as_u64(), 1_610_612_736);
        assert_eq!(parse_memory("0.5K").unwrap().as_u64(), 512);
    }

    #[test]
    fn memory_rejects_missing_suffix() {
        let err = parse_memory("8").unwrap_err();
        assert!(err.to_string().contains("missing unit suffix"), "got: {err}");
    }

    #[test]
    fn memory_rejects_invalid_suffix() {
        assert!(parse_memory("8 Gigabytes").is_err());
        assert!(parse_memory("8Gigabytes").is_err());
        assert!(parse_memory("8GiB").is_err());
    }

    #[test]
    fn memory_rejects_negative_and_whitespace() {
        assert!(parse_memory("-1G").is_err());
        assert!(parse_memory(" 8G").is_err());
        assert!(parse_memory("8 G").is_err());
    }

    #[test]
    fn memory_rejects_overflow() {
        assert!(parse_memory("99999999999T").is_err());
    }

    #[test]
    fn memory_canonical_form_reparses() {
        let mem = parse_memory("1.5G").unwrap();
        assert_eq!(parse_memory(&mem.to_string()).unwrap(), mem);
    }

    #[test]
    fn budget_whole_and_fractional() {
        assert_eq!(parse_budget("60").unwrap().cents(), 6000);
        assert_eq!(parse_budget("12.5").unwrap().cents(), 1250);
        assert_eq!(parse_budget("0.01").unwrap().cents(), 1);
    }

    #[test]
    fn budget_rejects_sub_cent_and_negative() {
        assert!(parse_budget("1.005").is_err());
        assert!(parse_budget("-5").is_err());
        assert!(parse_budget("five").is_err());
    }
}
