//! Version resolution: which released version is the linked checkout based on?
//!
//! A release is tied to a commit through the `gitHead` its publisher
//! recorded. Inverting the published versions into a commit → version index
//! and walking the linked repository's history from HEAD backward finds the
//! closest ancestor release in one pass: the first history commit present in
//! the index belongs to the most recently released ancestor. Ties are
//! impossible — each release maps to at most one commit and the walk visits
//! each commit once.

use crate::error::Error;
use crate::git;
use crate::registry::PackageMetadata;
use std::collections::HashMap;
use std::path::Path;

/// Commit → version lookup derived from [`PackageMetadata`], borrowed for
/// the duration of one check.
#[derive(Debug)]
pub struct CommitIndex<'a> {
    by_commit: HashMap<&'a str, &'a str>,
}

impl<'a> CommitIndex<'a> {
    /// Invert `versions` into a commit-keyed index. Releases with no
    /// recorded source commit cannot match any history entry and are left
    /// out.
    #[must_use]
    pub fn new(metadata: &'a PackageMetadata) -> Self {
        let by_commit = metadata
            .versions
            .iter()
            .filter_map(|(version, release)| {
                release
                    .source_commit
                    .as_deref()
                    .filter(|commit| !commit.is_empty())
                    .map(|commit| (commit, version.as_str()))
            })
            .collect();
        Self { by_commit }
    }

    /// Version released from `commit`, if any.
    #[must_use]
    pub fn version_for(&self, commit: &str) -> Option<&'a str> {
        self.by_commit.get(commit).copied()
    }
}

/// First commit of `history` present in `index`, as its version.
///
/// `history` must be ordered most recent first; the scan stops at the first
/// hit, so the returned version is the closest ancestor release. `None` when
/// the history is exhausted without a match — a normal outcome, distinct
/// from any fetch failure.
pub fn closest_release<'a, 'h, I>(history: I, index: &CommitIndex<'a>) -> Option<&'a str>
where
    I: IntoIterator<Item = &'h str>,
{
    history
        .into_iter()
        .find_map(|commit| index.version_for(commit))
}

/// Resolve the released version the linked checkout at `repo_root` is based
/// on.
///
/// # Errors
/// Fails when the git history cannot be enumerated. An empty result is not
/// an error.
pub async fn resolve(
    repo_root: &Path,
    metadata: &PackageMetadata,
) -> Result<Option<String>, Error> {
    let index = CommitIndex::new(metadata);
    let history = git::head_history(repo_root).await?;
    Ok(closest_release(history.iter().map(String::as_str), &index).map(ToString::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_metadata(releases: &[(&str, Option<&str>)]) -> PackageMetadata {
        let versions = releases
            .iter()
            .map(|(version, commit)| {
                let mut release = serde_json::json!({ "version": version });
                if let Some(commit) = commit {
                    release["gitHead"] = serde_json::json!(commit);
                }
                ((*version).to_string(), serde_json::from_value(release).unwrap())
            })
            .collect();
        PackageMetadata {
            name: "left-pad".to_string(),
            versions,
        }
    }

    #[test]
    fn test_first_history_match_wins() {
        let meta = make_metadata(&[
            ("1.1.0", Some("aaa")),
            ("1.2.0", Some("bbb")),
            ("1.3.0", Some("ccc")),
        ]);
        let index = CommitIndex::new(&meta);

        // ddd is an unreleased commit on top of 1.2.0.
        let history = ["ddd", "bbb", "aaa"];
        assert_eq!(closest_release(history, &index), Some("1.2.0"));
    }

    #[test]
    fn test_head_itself_released() {
        let meta = make_metadata(&[("1.1.0", Some("aaa")), ("1.2.0", Some("bbb"))]);
        let index = CommitIndex::new(&meta);
        assert_eq!(closest_release(["bbb", "aaa"], &index), Some("1.2.0"));
    }

    #[test]
    fn test_older_ancestor_only() {
        let meta = make_metadata(&[
            ("1.1.0", Some("aaa")),
            ("1.2.0", Some("bbb")),
            ("1.3.0", Some("ccc")),
        ]);
        let index = CommitIndex::new(&meta);
        assert_eq!(closest_release(["eee", "aaa"], &index), Some("1.1.0"));
    }

    #[test]
    fn test_no_history_commit_released() {
        let meta = make_metadata(&[("1.1.0", Some("aaa"))]);
        let index = CommitIndex::new(&meta);
        assert_eq!(closest_release(["xxx", "yyy"], &index), None);
    }

    #[test]
    fn test_empty_history() {
        let meta = make_metadata(&[("1.1.0", Some("aaa"))]);
        let index = CommitIndex::new(&meta);
        assert_eq!(closest_release([], &index), None);
    }

    #[test]
    fn test_releases_without_commits_ignored() {
        let meta = make_metadata(&[
            ("1.0.0", None),
            ("1.1.0", Some("")),
            ("1.2.0", Some("bbb")),
        ]);
        let index = CommitIndex::new(&meta);
        assert_eq!(index.version_for("bbb"), Some("1.2.0"));
        assert_eq!(closest_release(["bbb"], &index), Some("1.2.0"));
        // The empty-string head must not have been indexed.
        assert_eq!(index.version_for(""), None);
    }

    #[test]
    fn test_index_empty_when_no_release_has_a_commit() {
        let meta = make_metadata(&[("1.0.0", None), ("2.0.0", None)]);
        let index = CommitIndex::new(&meta);
        assert_eq!(closest_release(["aaa", "bbb"], &index), None);
    }

    #[test]
    fn test_closer_match_shadows_older_release() {
        // Both commits are in history; the nearer one must win even though
        // its version is older.
        let meta = make_metadata(&[("2.0.0", Some("old")), ("1.0.0", Some("near"))]);
        let index = CommitIndex::new(&meta);
        assert_eq!(closest_release(["near", "old"], &index), Some("1.0.0"));
    }
}
