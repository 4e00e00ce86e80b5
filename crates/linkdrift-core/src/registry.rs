//! npm registry client and packument model.

use crate::error::Error;
use crate::npmrc::RegistryConfig;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Published metadata for one package: every released version, keyed by
/// version string.
///
/// Fetched fresh on every check; nothing is cached across checks.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default)]
    pub versions: BTreeMap<String, ReleaseRecord>,
}

/// One released version as the registry records it.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseRecord {
    pub version: String,
    /// Commit the release was published from, when the publisher recorded one.
    #[serde(rename = "gitHead", default)]
    pub source_commit: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

/// Registry client for fetching package metadata.
///
/// Holds one connection pool for the whole run; routing and credentials come
/// from the [`RegistryConfig`] chosen per package name.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
    config: RegistryConfig,
}

impl RegistryClient {
    /// Create a client over the given registry configuration.
    ///
    /// No request timeout is configured: a check waits as long as the
    /// registry does.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: RegistryConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(concat!("linkdrift/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::HttpClient { source: e })?;
        Ok(Self { http, config })
    }

    /// The registry configuration this client routes with.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Fetch the packument for `name` from its configured registry.
    ///
    /// # Errors
    /// `PackageNotFound` on HTTP 404 (the caller recovers from this one);
    /// any other non-success status, transport fault, or malformed body is a
    /// hard failure.
    pub async fn fetch_metadata(&self, name: &str) -> Result<PackageMetadata, Error> {
        let endpoint = self.config.endpoint_for(name);
        let url = endpoint
            .url
            .join(&encode_name(name))
            .map_err(|e| Error::RegistryUrl {
                url: format!("{}{name}", endpoint.url),
                source: e,
            })?;

        let mut request = self.http.get(url.as_str());
        if let Some(token) = endpoint.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| Error::RegistryRequest {
            name: name.to_string(),
            source: e,
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::PackageNotFound {
                name: name.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(Error::RegistryStatus {
                name: name.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .json::<PackageMetadata>()
            .await
            .map_err(|e| Error::RegistryRequest {
                name: name.to_string(),
                source: e,
            })
    }
}

/// URL-encode a package name for the packument path; the `/` in scoped names
/// must arrive as `%2F`.
fn encode_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}
