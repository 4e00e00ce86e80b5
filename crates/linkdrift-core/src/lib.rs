#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod compat;
pub mod discover;
pub mod error;
pub mod git;
pub mod manifest;
pub mod npmrc;
pub mod range;
pub mod registry;
pub mod resolve;
pub mod watch;

pub use compat::{check, minimum_satisfying, short_commit, UnresolvableReason, Verdict};
pub use discover::{linked_dependencies, LinkedDependencies, LinkedDependency};
pub use error::Error;
pub use manifest::Manifest;
pub use npmrc::{RegistryConfig, RegistryEndpoint, DEFAULT_REGISTRY, REGISTRY_ENV};
pub use range::NpmRange;
pub use registry::{PackageMetadata, RegistryClient, ReleaseRecord};
pub use resolve::{closest_release, resolve, CommitIndex};
pub use watch::HeadWatch;
