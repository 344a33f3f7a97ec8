//! Harness configuration.
//!
//! Loaded from an optional YAML file and then overridden by CLI flags:
//!
//! ```yaml
//! endpoint:
//!   host: 127.0.0.1
//!   port: 6432
//!   user: pgdog
//!   password: pgdog
//!   statement_cache_size: 0
//! strictness: values
//! scenarios:
//!   unsharded:
//!     repeat: 100
//!   sharded:
//!     database: pgdog_sharded
//!     shard_keys: [0, 1, 2]
//!     timeout_ms: 5000
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default proxy host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default proxy port.
pub const DEFAULT_PORT: u16 = 6432;
/// Default user, password and database name.
pub const DEFAULT_CREDENTIAL: &str = "pgdog";

/// Options used to open one session. Immutable for the lifetime of a scenario.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Client-side prepared statement cache size. `0` disables caching.
    pub statement_cache_size: usize,
    pub application_name: String,
    /// Bound on the handshake. `None` leaves it to the driver.
    pub connect_timeout: Option<Duration>,
}

impl ConnectionOptions {
    /// `host:port` of the proxy.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        EndpointConfig::default().connection_options(DEFAULT_CREDENTIAL)
    }
}

// Password stays out of logs.
impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("statement_cache_size", &self.statement_cache_size)
            .field("application_name", &self.application_name)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// How much of an expectation the runner enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Only that every query returned.
    Liveness,
    /// Row counts and arity.
    Shape,
    /// Everything, including exact rows and shard-key filters.
    #[default]
    Values,
}

impl FromStr for Strictness {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "liveness" | "live" => Ok(Self::Liveness),
            "shape" => Ok(Self::Shape),
            "values" | "strict" => Ok(Self::Values),
            _ => Err(Error::Config(format!(
                "invalid strictness '{value}' (expected liveness, shape or values)"
            ))),
        }
    }
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Liveness => "liveness",
            Self::Shape => "shape",
            Self::Values => "values",
        };
        f.write_str(s)
    }
}

/// Proxy endpoint and credentials shared by all scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub statement_cache_size: usize,
    pub application_name: String,
    pub connect_timeout_ms: Option<u64>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_CREDENTIAL.to_string(),
            password: DEFAULT_CREDENTIAL.to_string(),
            statement_cache_size: 0,
            application_name: "pgprobe".to_string(),
            connect_timeout_ms: None,
        }
    }
}

impl EndpointConfig {
    /// Options for a session against `database`.
    #[must_use]
    pub fn connection_options(&self, database: &str) -> ConnectionOptions {
        ConnectionOptions {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: database.to_string(),
            statement_cache_size: self.statement_cache_size,
            application_name: self.application_name.clone(),
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Per-scenario overrides. Unset fields fall back to the scenario's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSettings {
    pub database: Option<String>,
    pub repeat: Option<usize>,
    pub shard_keys: Option<Vec<i64>>,
    pub strictness: Option<Strictness>,
    pub timeout_ms: Option<u64>,
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub endpoint: EndpointConfig,
    /// Default strictness for scenarios that don't set their own.
    pub strictness: Strictness,
    /// Default per-scenario timeout. `None` means no harness-level timeout.
    pub timeout_ms: Option<u64>,
    pub scenarios: BTreeMap<String, ScenarioSettings>,
}

impl HarnessConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Check values that serde can't.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host.trim().is_empty() {
            return Err(Error::Config("endpoint.host must not be empty".to_string()));
        }
        if self.endpoint.port == 0 {
            return Err(Error::Config("endpoint.port must be non-zero".to_string()));
        }
        if self.endpoint.user.is_empty() {
            return Err(Error::Config("endpoint.user must not be empty".to_string()));
        }
        if self.timeout_ms == Some(0) {
            return Err(Error::Config("timeout_ms must be non-zero".to_string()));
        }
        for (name, settings) in &self.scenarios {
            if settings.timeout_ms == Some(0) {
                return Err(Error::Config(format!(
                    "scenarios.{name}.timeout_ms must be non-zero"
                )));
            }
            if matches!(&settings.database, Some(db) if db.is_empty()) {
                return Err(Error::Config(format!(
                    "scenarios.{name}.database must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Overrides for `name`, or empty settings.
    #[must_use]
    pub fn settings(&self, name: &str) -> ScenarioSettings {
        self.scenarios.get(name).cloned().unwrap_or_default()
    }

    /// Effective strictness for `name`.
    #[must_use]
    pub fn strictness_for(&self, name: &str) -> Strictness {
        self.scenarios
            .get(name)
            .and_then(|s| s.strictness)
            .unwrap_or(self.strictness)
    }

    /// Effective timeout for `name`.
    #[must_use]
    pub fn timeout_for(&self, name: &str) -> Option<Duration> {
        self.scenarios
            .get(name)
            .and_then(|s| s.timeout_ms)
            .or(self.timeout_ms)
            .map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_pgdog_dev_setup() {
        let opts = ConnectionOptions::default();
        assert_eq!(opts.endpoint(), "127.0.0.1:6432");
        assert_eq!(opts.user, "pgdog");
        assert_eq!(opts.database, "pgdog");
        assert_eq!(opts.statement_cache_size, 0);
        assert!(opts.connect_timeout.is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let opts = EndpointConfig {
            password: "hunter2".to_string(),
            ..EndpointConfig::default()
        }
        .connection_options("pgdog");
        let rendered = format!("{opts:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_parse_yaml_with_overrides() {
        let yaml = r"
endpoint:
  host: proxy.local
  port: 7432
  connect_timeout_ms: 250
strictness: shape
timeout_ms: 10000
scenarios:
  sharded:
    database: shards
    shard_keys: [0, 1, 2]
    strictness: values
    timeout_ms: 500
";
        let config = HarnessConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.endpoint.host, "proxy.local");
        assert_eq!(config.endpoint.port, 7432);
        assert_eq!(config.endpoint.user, "pgdog");
        assert_eq!(config.strictness_for("sharded"), Strictness::Values);
        assert_eq!(config.strictness_for("unsharded"), Strictness::Shape);
        assert_eq!(
            config.timeout_for("sharded"),
            Some(Duration::from_millis(500))
        );
        assert_eq!(
            config.timeout_for("unsharded"),
            Some(Duration::from_millis(10_000))
        );
        assert_eq!(config.settings("sharded").shard_keys, Some(vec![0, 1, 2]));

        let opts = config.endpoint.connection_options("shards");
        assert_eq!(opts.connect_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_example_file_parses() {
        let config =
            HarnessConfig::from_yaml_str(include_str!("../pgprobe.example.yaml")).unwrap();
        assert_eq!(config.settings("sharded").shard_keys, Some(vec![0, 1, 2, 3]));
        assert_eq!(config.endpoint.statement_cache_size, 0);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = HarnessConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert!(config.timeout_for("anything").is_none());
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let err = HarnessConfig::from_yaml_str("endpoint:\n  port: 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_scenario_timeout() {
        let yaml = "scenarios:\n  unsharded:\n    timeout_ms: 0\n";
        let err = HarnessConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("scenarios.unsharded.timeout_ms"));
    }

    #[test]
    fn test_invalid_yaml_is_yaml_error() {
        let err = HarnessConfig::from_yaml_str("endpoint: [").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "endpoint:\n  port: 6543").unwrap();
        let config = HarnessConfig::from_file(file.path()).unwrap();
        assert_eq!(config.endpoint.port, 6543);
    }

    #[test]
    fn test_strictness_from_str() {
        assert_eq!("LIVENESS".parse::<Strictness>().unwrap(), Strictness::Liveness);
        assert_eq!("strict".parse::<Strictness>().unwrap(), Strictness::Values);
        assert!("loose".parse::<Strictness>().is_err());
    }
}
