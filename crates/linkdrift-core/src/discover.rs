//! Linked-dependency discovery in `node_modules`.
//!
//! A linked dependency is an entry that is a symbolic link to an external
//! working copy rather than an installed package. Scoped entries (`@scope/`)
//! sit one level deeper, so the scan descends exactly one level into scope
//! directories. Enumeration is lazy; calling [`linked_dependencies`] again
//! re-reads the directory.

use crate::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

/// A dependency installed as a symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedDependency {
    /// npm-style name, `@scope/name` for scoped entries.
    pub name: String,
    /// Canonicalized symlink target.
    pub path: PathBuf,
}

/// Iterate the symlinked entries of a `node_modules` directory.
///
/// Non-symlink entries are ordinary installed packages and are skipped, as
/// are dot-entries (`.bin`, `.package-lock.json`).
///
/// # Errors
/// Fails with `NodeModulesNotFound` when the directory does not exist.
/// Per-entry failures surface as `Err` items from the iterator.
pub fn linked_dependencies(node_modules: &Path) -> Result<LinkedDependencies, Error> {
    let entries = fs::read_dir(node_modules).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NodeModulesNotFound {
                path: node_modules.to_path_buf(),
            }
        } else {
            Error::Io(e)
        }
    })?;
    Ok(LinkedDependencies {
        top: entries,
        scope: None,
    })
}

/// Lazy iterator over linked dependencies. See [`linked_dependencies`].
#[derive(Debug)]
pub struct LinkedDependencies {
    top: fs::ReadDir,
    /// Scope currently being drained: (scope name, its entries).
    scope: Option<(String, fs::ReadDir)>,
}

impl Iterator for LinkedDependencies {
    type Item = Result<LinkedDependency, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((scope, entries)) = &mut self.scope {
                match entries.next() {
                    Some(Ok(entry)) => {
                        let name = format!("{scope}/{}", entry.file_name().to_string_lossy());
                        match link_target(&name, &entry.path()) {
                            Ok(Some(path)) => return Some(Ok(LinkedDependency { name, path })),
                            Ok(None) => continue,
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    Some(Err(e)) => return Some(Err(Error::Io(e))),
                    None => {
                        self.scope = None;
                        continue;
                    }
                }
            }

            match self.top.next()? {
                Ok(entry) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name.starts_with('.') {
                        continue;
                    }
                    if name.starts_with('@') {
                        match fs::read_dir(entry.path()) {
                            Ok(entries) => {
                                self.scope = Some((name, entries));
                                continue;
                            }
                            Err(e) => return Some(Err(Error::Io(e))),
                        }
                    }
                    match link_target(&name, &entry.path()) {
                        Ok(Some(path)) => return Some(Ok(LinkedDependency { name, path })),
                        Ok(None) => continue,
                        Err(e) => return Some(Err(e)),
                    }
                }
                Err(e) => return Some(Err(Error::Io(e))),
            }
        }
    }
}

/// Canonicalized target of `path` if it is a symlink, `None` otherwise.
fn link_target(name: &str, path: &Path) -> Result<Option<PathBuf>, Error> {
    let metadata = fs::symlink_metadata(path).map_err(|e| Error::LinkTarget {
        name: name.to_string(),
        source: e,
    })?;
    if !metadata.file_type().is_symlink() {
        return Ok(None);
    }
    let target = fs::canonicalize(path).map_err(|e| Error::LinkTarget {
        name: name.to_string(),
        source: e,
    })?;
    Ok(Some(target))
}
