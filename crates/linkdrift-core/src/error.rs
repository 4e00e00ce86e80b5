use std::path::PathBuf;
use thiserror::Error;

/// Core error type for linkdrift operations.
///
/// `PackageNotFound` is the only variant the per-dependency check boundary
/// recovers from; everything else aborts the run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No node_modules directory at {path}")]
    NodeModulesNotFound { path: PathBuf },

    #[error("Failed to resolve link target for {name}: {source}")]
    LinkTarget {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read manifest at {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest at {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid registry URL '{url}': {source}")]
    RegistryUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to create HTTP client: {source}")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },

    #[error("Package {name} not found in registry")]
    PackageNotFound { name: String },

    #[error("Registry request for {name} failed: {source}")]
    RegistryRequest {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Registry returned HTTP {status} for {name}")]
    RegistryStatus { name: String, status: u16 },

    #[error("Failed to run git {args}: {source}")]
    GitSpawn {
        args: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {args} failed in {cwd}: {stderr}")]
    GitFailed {
        args: String,
        cwd: PathBuf,
        stderr: String,
    },

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Invalid version range '{range}': {message}")]
    InvalidRange { range: String, message: String },
}
