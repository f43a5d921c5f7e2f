//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//!
//! Endpoint tables are validated once, when handlers are built: driver names
//! are resolved and `query` / `default` overrides are normalized into string
//! lists.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{BackendConfig, ConnectionRegistry, DriverKind};
use crate::cache::{FileCache, FileKind, Loaded};
use crate::handler::{AggregatePolicy, DataHandler, DataSource};
use crate::query::{ParamOverrides, QueryOverrides};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9988
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// One `[endpoints.<name>]` table as written in the file
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub driver: String,

    pub url: String,

    #[serde(default)]
    pub table: String,

    #[serde(default)]
    pub aggregate_policy: AggregatePolicy,

    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,

    /// Always overrides the request
    #[serde(default)]
    pub query: toml::Table,

    /// Used when the request omits a key
    #[serde(default)]
    pub default: toml::Table,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl EndpointConfig {
    /// Validate into a [`DataSource`]
    pub fn to_source(&self, name: &str) -> Result<DataSource, ConfigError> {
        let driver = DriverKind::from_name(&self.driver).map_err(|_| ConfigError::UnknownDriver {
            endpoint: name.to_string(),
            driver: self.driver.clone(),
        })?;

        let invalid = |e: ConfigError| ConfigError::InvalidEndpoint {
            endpoint: name.to_string(),
            reason: e.to_string(),
        };
        let overrides = QueryOverrides::new(
            ParamOverrides::from_toml(&self.query).map_err(invalid)?,
            ParamOverrides::from_toml(&self.default).map_err(invalid)?,
        );

        let mut backend = BackendConfig::new(driver, &self.url, &self.table);
        backend.parameters = self.parameters.clone();

        Ok(DataSource {
            name: name.to_string(),
            backend,
            overrides,
            headers: self.headers.clone(),
            aggregate_policy: self.aggregate_policy,
        })
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(path, &content)
    }

    /// Parse configuration text; `path` is only used in errors
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Load through a [`FileCache`], re-parsing only when the file changed
    pub fn load_cached(cache: &FileCache, path: &Path) -> Result<Self, ConfigError> {
        let loaded = cache.load(path, FileKind::Toml)?;
        match loaded.as_ref() {
            Loaded::Toml(table) => toml::Value::Table(table.clone())
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::Parse {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                }),
            _ => Err(ConfigError::Parse {
                path: path.to_path_buf(),
                error: "expected a TOML document".to_string(),
            }),
        }
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default config file locations, in search order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("tablegate").join("config.toml")),
            Some(PathBuf::from("/etc/tablegate/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        for path in Self::default_paths() {
            if path.exists() {
                match Self::load_with_env(&path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("TABLEGATE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TABLEGATE_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid TABLEGATE_PORT"),
            }
        }
        if let Some(level) = lookup("TABLEGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("TABLEGATE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate every endpoint and build its handler on a shared registry
    pub fn build_handlers(
        &self,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<BTreeMap<String, DataHandler>, ConfigError> {
        self.endpoints
            .iter()
            .map(|(name, endpoint)| {
                let source = endpoint.to_source(name)?;
                Ok((name.clone(), DataHandler::new(source, Arc::clone(&registry))))
            })
            .collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid override for '{key}': {reason}")]
    InvalidOverride { key: String, reason: String },

    #[error("Endpoint '{endpoint}' uses unknown driver '{driver}'")]
    UnknownDriver { endpoint: String, driver: String },

    #[error("Endpoint '{endpoint}' is invalid: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Lock error: {0}")]
    Lock(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Tablegate Configuration
#
# Environment variables override these settings:
# - TABLEGATE_HOST
# - TABLEGATE_PORT
# - TABLEGATE_LOG_LEVEL
# - TABLEGATE_LOG_FORMAT

[server]
# Server host
host = "0.0.0.0"

# Server port
port = 9988

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Each endpoint is served at GET /data/<name>
#
# driver: relational (SQLite) or array (delimited file)
# query:   always wins over request parameters
# default: used when the request omits a parameter
# aggregate_policy: what to do with `agg` without `groupby` (ignore | reject)

# [endpoints.flags]
# driver = "relational"
# url = "sqlite:///var/lib/tablegate/tutorial.db"
# table = "flags"
# aggregate_policy = "ignore"
# parameters = { read_only = true, busy_timeout_ms = 5000 }
# default = { limit = 100 }
# headers = { "Cache-Control" = "max-age=60" }

# [endpoints.cities]
# driver = "array"
# url = "/var/lib/tablegate/csv"
# table = "cities"
# parameters = { delimiter = ",", has_headers = true }
# query = { select = ["name", "population"] }
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[server]
port = 8000

[endpoints.flags]
driver = "sqlalchemy"
url = "sqlite:///tmp/flags.db"
table = "flags"
aggregate_policy = "reject"
parameters = { read_only = true }
query = { where = { country = "=US" } }
default = { limit = 10, agg = { total = "sum(count)" } }
headers = { "Cache-Control" = "max-age=60" }

[endpoints.cities]
driver = "array"
url = "/tmp/cities.csv"
"#;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.addr(), "0.0.0.0:9988");
        assert_eq!(config.logging.level, "info");
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn test_parse_endpoints() {
        let config = Config::parse(Path::new("sample.toml"), SAMPLE).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");

        let flags = config.endpoints["flags"].to_source("flags").unwrap();
        assert_eq!(flags.backend.driver, DriverKind::Relational);
        assert_eq!(flags.aggregate_policy, AggregatePolicy::Reject);
        assert_eq!(flags.backend.parameters["read_only"], serde_json::json!(true));
        assert_eq!(flags.overrides.query.get("where").unwrap(), ["country=US"]);
        assert_eq!(flags.overrides.default.get("limit").unwrap(), ["10"]);
        assert_eq!(flags.overrides.default.get("agg").unwrap(), ["total:sum(count)"]);
        assert_eq!(flags.headers["Cache-Control"], "max-age=60");

        let cities = config.endpoints["cities"].to_source("cities").unwrap();
        assert_eq!(cities.backend.driver, DriverKind::Array);
        assert_eq!(cities.aggregate_policy, AggregatePolicy::Ignore);
        assert!(cities.overrides.query.is_empty());
    }

    #[test]
    fn test_unknown_driver_fails_at_setup() {
        let content = "[endpoints.x]\ndriver = \"mongo\"\nurl = \"mongodb://\"\n";
        let config = Config::parse(Path::new("x.toml"), content).unwrap();

        let result = config.build_handlers(Arc::new(ConnectionRegistry::new()));
        assert!(matches!(
            result,
            Err(ConfigError::UnknownDriver { driver, .. }) if driver == "mongo"
        ));
    }

    #[test]
    fn test_invalid_override_table() {
        let content = "[endpoints.x]\ndriver = \"array\"\nurl = \"x.csv\"\n\
                       query = { limit = { a = 1 } }\n";
        let config = Config::parse(Path::new("x.toml"), content).unwrap();

        assert!(matches!(
            config.endpoints["x"].to_source("x"),
            Err(ConfigError::InvalidEndpoint { endpoint, .. }) if endpoint == "x"
        ));
    }

    #[test]
    fn test_parse_error() {
        let result = Config::parse(Path::new("bad.toml"), "[server\nport = ");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TABLEGATE_HOST", "127.0.0.1"),
            ("TABLEGATE_PORT", "not-a-port"),
            ("TABLEGATE_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9988);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(Path::new("default.toml"), &generate_default_config()).unwrap();
        assert_eq!(config.server.port, 9988);
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn test_load_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let cache = FileCache::new();
        let config = Config::load_cached(&cache, &path).unwrap();
        assert_eq!(config.endpoints.len(), 2);

        let handlers = config
            .build_handlers(Arc::new(ConnectionRegistry::new()))
            .unwrap();
        assert_eq!(handlers.keys().collect::<Vec<_>>(), ["cities", "flags"]);
    }
}
