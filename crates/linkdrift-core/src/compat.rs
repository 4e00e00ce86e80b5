//! Compatibility checking: resolved version against declared range.
//!
//! Pure functions of their inputs; no I/O. The one npm-specific wrinkle is
//! that an exact declared version is treated as a floor (`resolved >=
//! declared`) rather than an equality: a linked checkout sitting a few
//! commits past the declared release is the normal, acceptable state.

use crate::range::NpmRange;
use crate::registry::PackageMetadata;
use semver::Version;
use serde::Serialize;

/// Outcome of one dependency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The linked checkout descends from a release satisfying the range.
    Satisfied { version: String, range: String },
    /// The resolved release does not satisfy the range. The minimum fields
    /// carry the remediation hint when one exists.
    Violated {
        version: String,
        range: String,
        minimum_version: Option<String>,
        minimum_commit: Option<String>,
    },
    /// No version to compare.
    Unresolvable { reason: UnresolvableReason },
}

impl Verdict {
    /// Stable lowercase tag for machine output.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Satisfied { .. } => "satisfied",
            Self::Violated { .. } => "violated",
            Self::Unresolvable { .. } => "unresolvable",
        }
    }
}

/// Why a dependency check produced no comparable version.
///
/// Serializes as a stable kebab-case tag for machine output; human wording
/// is the reporting layer's concern, since it weaves the package name into
/// the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvableReason {
    /// Registry returned 404 for the package name.
    PackageNotFound,
    /// No commit in the linked HEAD ancestry matches a published release.
    NoReleasedAncestor,
    /// The manifest declares no range for the linked package.
    NoDeclaredRange,
}

/// Classify `resolved` against `declared_range`.
///
/// With no resolved version the verdict is unresolvable. Otherwise the
/// verdict is satisfied or violated per [`range_allows`]; on violation the
/// published set is scanned for the lowest satisfying version to suggest,
/// with its source commit in short form when recorded.
#[must_use]
pub fn check(resolved: Option<&str>, declared_range: &str, metadata: &PackageMetadata) -> Verdict {
    let Some(resolved) = resolved else {
        return Verdict::Unresolvable {
            reason: UnresolvableReason::NoReleasedAncestor,
        };
    };

    let satisfied = Version::parse(resolved)
        .map(|version| range_allows(&version, declared_range))
        .unwrap_or(false);
    if satisfied {
        return Verdict::Satisfied {
            version: resolved.to_string(),
            range: declared_range.to_string(),
        };
    }

    let (minimum_version, minimum_commit) = match minimum_satisfying(metadata, declared_range) {
        Some((version, commit)) => (
            Some(version.to_string()),
            commit.map(|c| short_commit(c).to_string()),
        ),
        None => (None, None),
    };
    Verdict::Violated {
        version: resolved.to_string(),
        range: declared_range.to_string(),
        minimum_version,
        minimum_commit,
    }
}

/// Does `version` satisfy `declared_range`?
///
/// An exact declared version is a floor (`>=`); anything else goes through
/// the npm range grammar. Unparseable ranges allow nothing, matching npm
/// semver's treatment of invalid ranges.
#[must_use]
pub fn range_allows(version: &Version, declared_range: &str) -> bool {
    if let Ok(exact) = Version::parse(declared_range.trim()) {
        return *version >= exact;
    }
    NpmRange::parse(declared_range)
        .map(|range| range.matches(version))
        .unwrap_or(false)
}

/// Lowest published version satisfying `declared_range`, with its recorded
/// source commit. Versions that do not parse are skipped.
#[must_use]
pub fn minimum_satisfying<'a>(
    metadata: &'a PackageMetadata,
    declared_range: &str,
) -> Option<(&'a str, Option<&'a str>)> {
    metadata
        .versions
        .iter()
        .filter_map(|(version, release)| {
            let parsed = Version::parse(version).ok()?;
            range_allows(&parsed, declared_range).then_some((parsed, version, release))
        })
        .min_by(|(a, _, _), (b, _, _)| a.cmp(b))
        .map(|(_, version, release)| (version.as_str(), release.source_commit.as_deref()))
}

/// First 7 characters of a commit hash, the customary display form.
#[must_use]
pub fn short_commit(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}
