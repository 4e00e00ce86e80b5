//! npm version-range parsing on top of the semver crate.
//!
//! npm's range grammar is wider than what `semver::VersionReq` accepts
//! directly: OR alternatives (`^1.0.0 || ^2.0.0`), hyphen ranges
//! (`1.2.0 - 1.4.0`), x-ranges (`1.x`, `1.2.*`), and space-separated
//! comparator sets (`>= 2.1.2 < 3.0.0`). [`NpmRange`] lowers each
//! alternative to a `VersionReq` up front so matching is a plain scan.
//!
//! Bare versions (`1.2.3`) follow the semver crate's caret interpretation
//! here; callers that need npm's exact-version treatment handle that case
//! before parsing a range.

use crate::error::Error;
use semver::{Version, VersionReq};

/// A parsed npm version range: one or more OR-ed comparator sets.
#[derive(Debug, Clone)]
pub struct NpmRange {
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    /// Parse an npm range expression.
    ///
    /// An empty range means "any version", as npm treats it. Within an OR
    /// expression, unparseable alternatives are skipped as long as at least
    /// one parses.
    ///
    /// # Errors
    /// Fails when the expression (or every OR alternative) is unparseable.
    pub fn parse(range: &str) -> Result<Self, Error> {
        let range = range.trim();
        if range.is_empty() {
            return Ok(Self {
                alternatives: vec![VersionReq::STAR],
            });
        }

        if !range.contains("||") {
            return Ok(Self {
                alternatives: vec![parse_single(range)?],
            });
        }

        let alternatives: Vec<VersionReq> = range
            .split("||")
            .map(str::trim)
            .filter(|alt| !alt.is_empty())
            .filter_map(|alt| parse_single(alt).ok())
            .collect();
        if alternatives.is_empty() {
            return Err(Error::InvalidRange {
                range: range.to_string(),
                message: "no valid alternatives".to_string(),
            });
        }
        Ok(Self { alternatives })
    }

    /// True when `version` satisfies any alternative.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Parse one alternative: hyphen range, x-range, or comparator set.
fn parse_single(range: &str) -> Result<VersionReq, Error> {
    let range = range.trim();

    // "1.0.0 - 2.0.0" -> ">=1.0.0, <=2.0.0"
    if let Some((start, end)) = split_hyphen_range(range) {
        return parse_req(range, &format!(">={start}, <={end}"));
    }

    // "1.x" -> ">=1.0.0, <2.0.0", "*" -> ">=0.0.0"
    if let Some(expanded) = expand_wildcard(range) {
        return parse_req(range, &expanded);
    }

    // ">= 2.1.2 < 3.0.0" -> ">=2.1.2, <3.0.0"
    parse_req(range, &join_comparators(range))
}

fn parse_req(original: &str, converted: &str) -> Result<VersionReq, Error> {
    VersionReq::parse(converted).map_err(|e| Error::InvalidRange {
        range: original.to_string(),
        message: e.to_string(),
    })
}

/// Split `"a - b"` (space-hyphen-space keeps prerelease hyphens intact).
fn split_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return None;
    }
    Some((start, end))
}

fn is_wildcard(part: &str) -> bool {
    matches!(part, "x" | "X" | "*")
}

/// Expand an x-range to explicit bounds; `None` when the shape is not an
/// x-range (so `1.0.0-x.1` style prereleases fall through untouched) or the
/// upper bound has no representable successor (a component at `u64::MAX`
/// falls through to the semver parser's own wildcard handling).
fn expand_wildcard(range: &str) -> Option<String> {
    let parts: Vec<&str> = range.split('.').collect();
    match parts.as_slice() {
        [p] if is_wildcard(p) => Some(">=0.0.0".to_string()),
        [major, p] if is_wildcard(p) => {
            let m: u64 = major.parse().ok()?;
            let next = m.checked_add(1)?;
            Some(format!(">={m}.0.0, <{next}.0.0"))
        }
        [major, minor, p] if is_wildcard(p) && is_wildcard(minor) => {
            let m: u64 = major.parse().ok()?;
            let next = m.checked_add(1)?;
            Some(format!(">={m}.0.0, <{next}.0.0"))
        }
        [major, minor, p] if is_wildcard(p) => {
            let m: u64 = major.parse().ok()?;
            let n: u64 = minor.parse().ok()?;
            let next = n.checked_add(1)?;
            Some(format!(">={m}.{n}.0, <{m}.{next}.0"))
        }
        _ => None,
    }
}

/// Join whitespace-separated comparators with commas, re-attaching operators
/// that npm allows to float free of their version (`>= 1.2.3`).
fn join_comparators(range: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            match pending_op.take() {
                Some(op) => comparators.push(format!("{op}{token}")),
                None => comparators.push(token.to_string()),
            }
        } else {
            pending_op = Some(match pending_op.take() {
                Some(prev) => prev + token,
                None => token.to_string(),
            });
        }
    }
    // A trailing bare operator is left for the semver parser to reject.
    if let Some(op) = pending_op {
        comparators.push(op);
    }

    comparators.join(", ")
}
