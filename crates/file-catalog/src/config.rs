//! Configuration types for catalog client construction.

use std::collections::BTreeMap;
use std::path::Path;

use config::{Config as HierarchicalConfig, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Prefix of environment variables read by [CatalogClientConfig::load].
pub const ENV_PREFIX: &str = "FILE_CATALOG";

/// Configuration for catalog client construction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogClientConfig {
    /// Base URL of the catalog, without the `/api` suffix.
    pub catalog_url: String,
    /// Port appended to `catalog_url` as `:<port>`.
    #[serde(default)]
    pub port: Option<u16>,
    /// Keep idle connections around and reuse them for later requests.
    #[serde(default)]
    pub reuse_connections: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Additional headers to include in requests.
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Timeout for a whole request, including reading the response body.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read catalog client configuration")]
    Read(#[from] config::ConfigError),
}

impl CatalogClientConfig {
    /// A configuration for `catalog_url` with everything else left at its default.
    pub fn new(catalog_url: impl Into<String>) -> Self {
        Self {
            catalog_url: catalog_url.into(),
            port: None,
            reuse_connections: false,
            user_agent: None,
            extra_headers: BTreeMap::new(),
            connect_timeout_secs: None,
            timeout_secs: None,
        }
    }

    /// Read the configuration from an optional TOML file,
    /// overridden by `FILE_CATALOG_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = HierarchicalConfig::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "reading catalog client config file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// `catalog_url` with the port applied.
    pub(crate) fn authority_url(&self) -> String {
        let url = self.catalog_url.trim_end_matches('/');
        match self.port {
            Some(port) => format!("{url}:{port}"),
            None => url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn authority_url_appends_port() {
        let config = CatalogClientConfig {
            port: Some(8888),
            ..CatalogClientConfig::new("https://example.com/")
        };
        assert_eq!(config.authority_url(), "https://example.com:8888");

        let config = CatalogClientConfig::new("https://example.com");
        assert_eq!(config.authority_url(), "https://example.com");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, r#"
            catalog_url = "http://localhost"
            port = 8888
            reuse_connections = true
            timeout_secs = 30

            [extra_headers]
            x-request-source = "tests"
        "#)
        .unwrap();

        let config = temp_env::with_vars_unset(
            ["FILE_CATALOG_CATALOG_URL", "FILE_CATALOG_PORT"],
            || CatalogClientConfig::load(Some(file.path())).unwrap(),
        );

        assert_eq!(config, CatalogClientConfig {
            port: Some(8888),
            reuse_connections: true,
            timeout_secs: Some(30),
            extra_headers: BTreeMap::from([("x-request-source".to_string(), "tests".to_string())]),
            ..CatalogClientConfig::new("http://localhost")
        });
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, r#"catalog_url = "http://localhost""#).unwrap();

        let config = temp_env::with_vars(
            [
                ("FILE_CATALOG_CATALOG_URL", Some("http://catalog.example.com")),
                ("FILE_CATALOG_PORT", Some("9000")),
            ],
            || CatalogClientConfig::load(Some(file.path())).unwrap(),
        );

        assert_eq!(config.catalog_url, "http://catalog.example.com");
        assert_eq!(config.port, Some(9000));
    }

    #[test]
    fn load_without_url_fails() {
        let result = temp_env::with_vars_unset(
            ["FILE_CATALOG_CATALOG_URL", "FILE_CATALOG_PORT"],
            || CatalogClientConfig::load(None),
        );
        assert!(matches!(result, Err(ConfigError::Read(_))));
    }
}
