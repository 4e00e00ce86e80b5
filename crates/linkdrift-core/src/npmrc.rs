//! Registry configuration from `.npmrc` files.
//!
//! Assembles a [`RegistryConfig`] by parsing:
//! - `@scope:registry=URL` directives for routing scoped packages
//! - `registry=URL` for the default registry
//! - `//host/:_authToken=TOKEN` directives for registry authentication
//! - `${ENV_VAR}` expansion in token values
//!
//! All ambient reads (npmrc chain, environment override) happen once in
//! [`RegistryConfig::load`]; endpoint selection for a package name is a pure
//! lookup on the assembled value, so it is testable without touching the
//! process environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;

/// Fallback registry when neither npmrc nor the environment names one.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment override for the default registry URL.
pub const REGISTRY_ENV: &str = "LINKDRIFT_NPM_REGISTRY";

/// Registry routing and credentials for one checker run.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Registry used for unscoped packages and scopes with no mapping.
    pub default_registry: Url,
    /// Scope → registry URL mapping (e.g. `@myorg` → `https://npm.pkg.github.com/`).
    pub scoped_registries: HashMap<String, Url>,
    /// Registry key (`host[:port]`, optionally with a path) → auth token mapping.
    pub auth_tokens: HashMap<String, String>,
}

/// The registry endpoint selected for one package name.
#[derive(Debug, Clone, Copy)]
pub struct RegistryEndpoint<'a> {
    pub url: &'a Url,
    pub token: Option<&'a str>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_registry: Url::parse(DEFAULT_REGISTRY).unwrap(),
            scoped_registries: HashMap::new(),
            auth_tokens: HashMap::new(),
        }
    }
}

impl RegistryConfig {
    /// Assemble the registry configuration for a project directory.
    ///
    /// Merges `.npmrc` files from `project_dir` upward plus `$HOME/.npmrc`,
    /// nearest file winning per key. The [`REGISTRY_ENV`] variable, when set
    /// to a valid URL, overrides the default registry from any npmrc.
    #[must_use]
    pub fn load(project_dir: &Path) -> Self {
        let mut config = Self::default();
        let mut default_from_npmrc = None;

        let mut dir = Some(project_dir.to_path_buf());
        while let Some(d) = dir {
            merge_file(&mut config, &mut default_from_npmrc, &d.join(".npmrc"));
            dir = d.parent().map(Path::to_path_buf);
        }

        // The walk covers HOME only when project_dir sits under it.
        if let Some(home) = home_dir() {
            merge_file(&mut config, &mut default_from_npmrc, &home.join(".npmrc"));
        }

        let env_override = std::env::var(REGISTRY_ENV).ok().and_then(|value| {
            let parsed = parse_registry_url(&value);
            if parsed.is_none() {
                warn!(value, "ignoring invalid {REGISTRY_ENV} override");
            }
            parsed
        });
        if let Some(url) = env_override.or(default_from_npmrc) {
            config.default_registry = url;
        }

        config
    }

    /// Select the registry endpoint for `package`.
    ///
    /// A leading `@scope/` routes to that scope's registry when one is
    /// configured; everything else uses the default registry. The credential
    /// is matched by the chosen URL's `host/path`, then bare host.
    #[must_use]
    pub fn endpoint_for(&self, package: &str) -> RegistryEndpoint<'_> {
        let url = package_scope(package)
            .and_then(|scope| self.scoped_registries.get(scope))
            .unwrap_or(&self.default_registry);
        RegistryEndpoint {
            url,
            token: self.token_for(url),
        }
    }

    fn token_for(&self, url: &Url) -> Option<&str> {
        let host = url.host_str()?;
        // npmrc keys carry a non-default port ("//localhost:4873/"), which
        // url normalization keeps out of host_str.
        let host_key = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let path = url.path().trim_end_matches('/');
        if !path.is_empty() {
            if let Some(token) = self.auth_tokens.get(&format!("{host_key}{path}")) {
                return Some(token);
            }
        }
        self.auth_tokens.get(&host_key).map(String::as_str)
    }
}

/// The `@scope` prefix of a package name, if it has one.
#[must_use]
pub fn package_scope(package: &str) -> Option<&str> {
    if !package.starts_with('@') {
        return None;
    }
    package.split('/').next().filter(|scope| scope.len() > 1)
}

fn merge_file(config: &mut RegistryConfig, default_registry: &mut Option<Url>, path: &Path) {
    if !path.is_file() {
        return;
    }
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let parsed = parse_npmrc(&content);
    for (scope, url) in parsed.scoped_registries {
        config.scoped_registries.entry(scope).or_insert(url);
    }
    for (key, token) in parsed.auth_tokens {
        config.auth_tokens.entry(key).or_insert(token);
    }
    if default_registry.is_none() {
        *default_registry = parsed.default_registry;
    }
}

/// Directives extracted from a single `.npmrc` file.
#[derive(Debug, Clone, Default)]
struct NpmrcFile {
    default_registry: Option<Url>,
    scoped_registries: HashMap<String, Url>,
    auth_tokens: HashMap<String, String>,
}

/// Parse one `.npmrc` file's content.
///
/// Ignores comments (`#`, `;`), blank lines, and directives it does not
/// recognize.
fn parse_npmrc(content: &str) -> NpmrcFile {
    let mut file = NpmrcFile::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        // @scope:registry=URL
        if line.starts_with('@') {
            if let Some((key, value)) = line.split_once('=') {
                if let Some((scope, directive)) = key.trim().split_once(':') {
                    if directive == "registry" {
                        if let Some(url) = parse_registry_url(value.trim()) {
                            file.scoped_registries.insert(scope.to_string(), url);
                        }
                    }
                }
            }
            continue;
        }

        // //host/:_authToken=TOKEN  or  //host/path/:_authToken=TOKEN
        if line.starts_with("//") {
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if key.ends_with(":_authToken") {
                    let registry_key = key
                        .strip_prefix("//")
                        .unwrap_or(key)
                        .strip_suffix(":_authToken")
                        .unwrap_or(key)
                        .trim_end_matches('/');
                    let token = expand_env_vars(value.trim());
                    if !token.is_empty() {
                        file.auth_tokens.insert(registry_key.to_string(), token);
                    }
                }
            }
            continue;
        }

        // registry=URL (default registry)
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "registry" {
                file.default_registry = parse_registry_url(value.trim());
            }
        }
    }

    file
}

/// Parse a registry URL, normalizing to a trailing slash so joins keep the
/// base path.
fn parse_registry_url(value: &str) -> Option<Url> {
    if value.is_empty() {
        return None;
    }
    let normalized = if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    };
    Url::parse(&normalized).ok()
}

/// Expand `${ENV_VAR}` patterns; unset variables expand to the empty string,
/// matching npm.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
            if let Ok(val) = std::env::var(&var_name) {
                result.push_str(&val);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config_with(scopes: &[(&str, &str)], tokens: &[(&str, &str)]) -> RegistryConfig {
        RegistryConfig {
            default_registry: Url::parse(DEFAULT_REGISTRY).unwrap(),
            scoped_registries: scopes
                .iter()
                .map(|(s, u)| ((*s).to_string(), Url::parse(u).unwrap()))
                .collect(),
            auth_tokens: tokens
                .iter()
                .map(|(k, t)| ((*k).to_string(), (*t).to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_parse_scoped_registry() {
        let file = parse_npmrc("@myorg:registry=https://npm.pkg.github.com/\n");
        assert_eq!(file.scoped_registries.len(), 1);
        assert_eq!(
            file.scoped_registries["@myorg"].as_str(),
            "https://npm.pkg.github.com/"
        );
    }

    #[test]
    fn test_parse_default_registry() {
        let file = parse_npmrc("registry=https://mirror.example.com/npm\n");
        assert_eq!(
            file.default_registry.unwrap().as_str(),
            "https://mirror.example.com/npm/"
        );
    }

    #[test]
    fn test_parse_auth_token() {
        let file = parse_npmrc("//registry.example.com/:_authToken=secret123\n");
        assert_eq!(file.auth_tokens["registry.example.com"], "secret123");
    }

    #[test]
    fn test_parse_auth_token_keeps_port() {
        let file = parse_npmrc("//localhost:4873/:_authToken=local-secret\n");
        assert_eq!(file.auth_tokens["localhost:4873"], "local-secret");
    }

    #[test]
    fn test_parse_combined() {
        let content = "\
# private packages
@myorg:registry=https://npm.pkg.github.com/
//npm.pkg.github.com/:_authToken=ghp_abc123

; default mirror
registry=https://mirror.example.com/
";
        let file = parse_npmrc(content);
        assert_eq!(file.scoped_registries.len(), 1);
        assert_eq!(file.auth_tokens["npm.pkg.github.com"], "ghp_abc123");
        assert_eq!(
            file.default_registry.unwrap().as_str(),
            "https://mirror.example.com/"
        );
    }

    #[test]
    fn test_trailing_slash_added() {
        let file = parse_npmrc("@scope:registry=https://example.com\n");
        assert_eq!(file.scoped_registries["@scope"].as_str(), "https://example.com/");
    }

    #[test]
    fn test_comments_and_unknown_directives_ignored() {
        let content = "\
# comment
; another
save-exact=true
@scope:registry=https://example.com/
";
        let file = parse_npmrc(content);
        assert_eq!(file.scoped_registries.len(), 1);
        assert!(file.default_registry.is_none());
    }

    #[test]
    #[serial]
    fn test_env_var_expansion() {
        std::env::set_var("LINKDRIFT_TEST_TOKEN", "expanded_value");
        let file = parse_npmrc("//registry.example.com/:_authToken=${LINKDRIFT_TEST_TOKEN}\n");
        assert_eq!(file.auth_tokens["registry.example.com"], "expanded_value");
        std::env::remove_var("LINKDRIFT_TEST_TOKEN");
    }

    #[test]
    #[serial]
    fn test_env_var_missing_drops_token() {
        let file = parse_npmrc("//registry.example.com/:_authToken=${LINKDRIFT_NO_SUCH_VAR}\n");
        assert!(file.auth_tokens.is_empty());
    }

    #[test]
    fn test_endpoint_for_scoped_package() {
        let config = config_with(
            &[("@myorg", "https://npm.pkg.github.com/")],
            &[("npm.pkg.github.com", "token123")],
        );
        let endpoint = config.endpoint_for("@myorg/widget");
        assert_eq!(endpoint.url.as_str(), "https://npm.pkg.github.com/");
        assert_eq!(endpoint.token, Some("token123"));
    }

    #[test]
    fn test_endpoint_for_unscoped_package() {
        let config = config_with(&[("@myorg", "https://npm.pkg.github.com/")], &[]);
        let endpoint = config.endpoint_for("left-pad");
        assert_eq!(endpoint.url.as_str(), DEFAULT_REGISTRY);
        assert_eq!(endpoint.token, None);
    }

    #[test]
    fn test_endpoint_for_unmapped_scope_falls_back() {
        let config = config_with(&[("@other", "https://npm.example.com/")], &[]);
        let endpoint = config.endpoint_for("@myorg/widget");
        assert_eq!(endpoint.url.as_str(), DEFAULT_REGISTRY);
    }

    #[test]
    fn test_endpoint_token_matched_by_host_and_path() {
        let config = config_with(
            &[("@myorg", "https://registry.example.com/myorg")],
            &[
                ("registry.example.com/myorg", "path-token"),
                ("registry.example.com", "host-token"),
            ],
        );
        let endpoint = config.endpoint_for("@myorg/widget");
        assert_eq!(endpoint.token, Some("path-token"));
    }

    #[test]
    fn test_endpoint_token_falls_back_to_host() {
        let config = config_with(
            &[("@myorg", "https://registry.example.com/myorg")],
            &[("registry.example.com", "host-token")],
        );
        let endpoint = config.endpoint_for("@myorg/widget");
        assert_eq!(endpoint.token, Some("host-token"));
    }

    #[test]
    fn test_endpoint_token_matched_with_port() {
        // A verdaccio-style local registry keys its token by host:port.
        let config = config_with(
            &[("@myorg", "http://localhost:4873/")],
            &[("localhost:4873", "local-secret")],
        );
        let endpoint = config.endpoint_for("@myorg/widget");
        assert_eq!(endpoint.token, Some("local-secret"));
    }

    #[test]
    fn test_endpoint_token_matched_with_port_and_path() {
        let config = config_with(
            &[("@myorg", "http://localhost:4873/private")],
            &[
                ("localhost:4873/private", "path-token"),
                ("localhost:4873", "host-token"),
            ],
        );
        let endpoint = config.endpoint_for("@myorg/widget");
        assert_eq!(endpoint.token, Some("path-token"));
    }

    #[test]
    fn test_package_scope() {
        assert_eq!(package_scope("@myorg/widget"), Some("@myorg"));
        assert_eq!(package_scope("left-pad"), None);
        assert_eq!(package_scope("@/broken"), None);
    }

    #[test]
    fn test_merge_first_wins() {
        let mut config = RegistryConfig::default();
        let mut default_registry = None;
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.npmrc");
        let second = dir.path().join("second.npmrc");
        std::fs::write(&first, "@scope:registry=https://first.com/\nregistry=https://one.com/\n")
            .unwrap();
        std::fs::write(&second, "@scope:registry=https://second.com/\nregistry=https://two.com/\n")
            .unwrap();

        merge_file(&mut config, &mut default_registry, &first);
        merge_file(&mut config, &mut default_registry, &second);

        assert_eq!(config.scoped_registries["@scope"].as_str(), "https://first.com/");
        assert_eq!(default_registry.unwrap().as_str(), "https://one.com/");
    }
}
