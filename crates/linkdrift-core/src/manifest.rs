//! Consumer manifest (package.json) reading.
//!
//! The checker only needs one answer from the manifest: the version range the
//! project declares for a given dependency name. Ranges are collected from
//! `dependencies`, `devDependencies`, and `optionalDependencies`, with earlier
//! sections taking precedence, because linked packages are routinely declared
//! in any of the three.

use crate::error::Error;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Sections consulted for declared ranges, highest precedence first.
const SECTIONS: [&str; 3] = ["dependencies", "devDependencies", "optionalDependencies"];

/// Declared dependency ranges of a consumer project, keyed by package name.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    ranges: HashMap<String, String>,
}

impl Manifest {
    /// Read and parse the manifest at `path`.
    ///
    /// Non-string range values are skipped; they make a single entry
    /// unusable, not the whole file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a JSON object.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path).map_err(|e| Error::ManifestRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let root: serde_json::Map<String, Value> =
            serde_json::from_str(&content).map_err(|e| Error::ManifestParse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut ranges = HashMap::new();
        // Walk sections lowest-precedence first so later inserts overwrite.
        for section in SECTIONS.iter().rev() {
            let Some(entries) = root.get(*section).and_then(Value::as_object) else {
                continue;
            };
            for (name, range) in entries {
                if let Some(range) = range.as_str() {
                    ranges.insert(name.clone(), range.to_string());
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            ranges,
        })
    }

    /// Path this manifest was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The declared range for `name`, if any section declares one.
    #[must_use]
    pub fn declared_range(&self, name: &str) -> Option<&str> {
        self.ranges.get(name).map(String::as_str)
    }
}
