//! Coverage analysis of explored symbolic values.
//!
//! An exploration run reports, for each finished path and each symbolic
//! value on it, the inclusive range of concrete values the path covers, one
//! `low high` pair of hex numbers per line. Consecutive groups of
//! `symbols_per_path` lines belong to one path.

use crate::SchedError;

/// Inclusive range of concrete values covered by one symbolic value on one
/// path.
pub type Range = (u64, u64);

/// Covered portion of the exploration space.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    /// Number of distinct value tuples covered, summed over paths.
    pub covered: u128,
    /// Complete paths seen.
    pub paths: usize,
    /// `covered / (interval + 1)^symbols_per_path`.
    pub fraction: f64,
}

impl CoverageReport {
    /// Sums the per-path products of range widths.
    ///
    /// A trailing incomplete group is ignored.
    pub fn analyze(ranges: &[Range], symbols_per_path: usize, interval: u64) -> Self {
        if symbols_per_path == 0 {
            return Self {
                covered: 0,
                paths: 0,
                fraction: 0.0,
            };
        }

        let mut covered: u128 = 0;
        let mut paths = 0;
        for path in ranges.chunks_exact(symbols_per_path) {
            let per_path = path.iter().fold(1u128, |acc, &(low, high)| {
                acc.saturating_mul(u128::from(high.saturating_sub(low)) + 1)
            });
            covered = covered.saturating_add(per_path);
            paths += 1;
        }

        let exponent = i32::try_from(symbols_per_path).unwrap_or(i32::MAX);
        let space = (interval as f64 + 1.0).powi(exponent);
        Self {
            covered,
            paths,
            fraction: covered as f64 / space,
        }
    }
}

fn parse_hex(token: &str, line: usize) -> Result<u64, SchedError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u64::from_str_radix(digits, 16).map_err(|e| SchedError::MalformedCoverage {
        line,
        detail: format!("{token:?}: {e}"),
    })
}

/// Parses `low high` hex pairs, one per line. Blank lines are skipped.
pub fn parse_ranges(text: &str) -> Result<Vec<Range>, SchedError> {
    let mut ranges = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let mut tokens = raw.split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };
        let Some(second) = tokens.next() else {
            return Err(SchedError::MalformedCoverage {
                line,
                detail: "expected two values".to_string(),
            });
        };
        let (low, high) = (parse_hex(first, line)?, parse_hex(second, line)?);
        if low > high {
            return Err(SchedError::MalformedCoverage {
                line,
                detail: format!("range {low:#x}..{high:#x} is reversed"),
            });
        }
        ranges.push((low, high));
    }
    Ok(ranges)
}

/// Returns the largest hex value in whitespace-separated input, or zero if
/// there is none.
pub fn max_updated_time(text: &str) -> Result<u64, SchedError> {
    let mut max = 0;
    for (index, raw) in text.lines().enumerate() {
        for token in raw.split_whitespace() {
            max = max.max(parse_hex(token, index + 1)?);
        }
    }
    Ok(max)
}
