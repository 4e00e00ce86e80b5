//! Read-only git queries over the linked working copy.
//!
//! Two subprocess invocations per check: `rev-parse --show-toplevel` to find
//! the repository root from the link target, and `log --format=%H` for the
//! full HEAD ancestry, most recent first. Both run through the `git` binary;
//! a missing binary or a non-repository path is a hard failure.

use crate::error::Error;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Root of the working copy containing `path`.
///
/// # Errors
/// Fails if git cannot be spawned or `path` is not inside a repository.
pub async fn repo_root(path: &Path) -> Result<PathBuf, Error> {
    let stdout = run_git(path, &["rev-parse", "--show-toplevel"]).await?;
    Ok(PathBuf::from(stdout.trim()))
}

/// Full commit hashes of HEAD's ancestry, most recent first.
///
/// # Errors
/// Fails if git cannot be spawned or exits non-zero (for example a
/// repository with no commits).
pub async fn head_history(repo_root: &Path) -> Result<Vec<String>, Error> {
    let stdout = run_git(repo_root, &["log", "--format=%H"]).await?;
    Ok(stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}

/// Path of the HEAD reference file for a repository root.
#[must_use]
pub fn head_ref_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".git").join("HEAD")
}

async fn run_git(cwd: &Path, args: &[&str]) -> Result<String, Error> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::GitSpawn {
            args: args.join(" "),
            source: e,
        })?;

    if !output.status.success() {
        return Err(Error::GitFailed {
            args: args.join(" "),
            cwd: cwd.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_head_ref_path() {
        assert_eq!(
            head_ref_path(Path::new("/work/left-pad")),
            Path::new("/work/left-pad/.git/HEAD")
        );
    }

    // Spawn failure (missing cwd) and exit failure (not a repository) both
    // map to errors; which one depends on whether git is installed, so the
    // assertion stays at the error level.
    #[tokio::test]
    async fn test_repo_root_outside_any_repository() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("not-here");
        assert!(repo_root(&missing).await.is_err());
    }
}
