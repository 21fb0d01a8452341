use fedgate_clickhouse::ClickHouseConfig;
use fedgate_core::{Error, Result};
use fedgate_paging::PagingConfig;
use fedgate_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Per-backend adapter settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub clickhouse: ClickHouseConfig,
    pub postgres: PostgresConfig,
}

/// Server configuration, loaded from a YAML file with full defaults.
/// The paging values double as ceilings for per-request overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub paging: PagingConfig,
    pub backends: BackendsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ([0, 0, 0, 0], 8480).into(),
            paging: PagingConfig::default(),
            backends: BackendsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load and parse a YAML config file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfiguration(format!("read {}: {}", path.display(), e))
        })?;

        serde_yaml::from_str(&raw).map_err(|e| {
            Error::InvalidConfiguration(format!("parse {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen.port(), 8480);
        assert_eq!(config.paging.queue_capacity, 4);
        assert_eq!(config.backends.clickhouse.scheme, "http");
    }

    #[test]
    fn test_partial_yaml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "listen: \"127.0.0.1:9000\"\npaging:\n  queue_capacity: 2\n"
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.paging.queue_capacity, 2);
        // untouched sections keep their defaults
        assert_eq!(config.paging.buffer_rows, 1024);
        assert_eq!(config.backends.postgres.connect_timeout_secs, 10);
    }

    #[test]
    fn test_malformed_yaml_is_a_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "listen: [not an address\n").unwrap();

        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_missing_file_is_a_configuration_error() {
        let err = ServerConfig::load(Path::new("/nonexistent/fedgate.yaml")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
