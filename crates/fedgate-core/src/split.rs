use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Backend kinds with a registered adapter.
///
/// The set is closed: adding a backend means adding an adapter crate, a
/// variant here, and a registry entry, all checked at compile time.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// ClickHouse (column store)
    ClickHouse,
    /// PostgreSQL (row store)
    Postgres,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "clickhouse" => Ok(BackendKind::ClickHouse),
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            other => Err(Error::unsupported_source(other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::ClickHouse => write!(f, "clickhouse"),
            BackendKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// Network endpoint of a backend, with resolved credentials.
///
/// Credential loading happens upstream; by the time a split reaches the
/// connector the endpoint is fully resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Additional backend-specific options as key-value pairs
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: None,
            password: None,
            options: HashMap::new(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Endpoint identity for display and pool keying (no password)
    pub fn authority(&self) -> String {
        let mut parts = Vec::new();

        if let Some(username) = &self.username {
            parts.push(format!("{}@", username));
        }

        parts.push(format!("{}:{}", self.host, self.port));
        parts.push(format!("/{}", self.database));

        parts.join("")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.authority())
    }
}

/// A projected column: the name plus the backend-native type declared by
/// the planner, mapped to a logical type by the backend's type mapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRef {
    pub name: String,
    pub backend_type: String,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>, backend_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend_type: backend_type.into(),
        }
    }
}

/// A planned, self-contained unit of query work bound to one backend
/// endpoint. Immutable; lifetime is one streaming call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Split {
    /// Backend kind tag as produced by the planner. Parsed by the
    /// registry; an unknown tag is an unsupported-source error there,
    /// not a deserialization failure here.
    pub backend: String,
    pub endpoint: Endpoint,
    /// Source table
    pub table: String,
    /// Column projection, in output order
    pub columns: Vec<ColumnRef>,
    /// Optional predicate text, embedded verbatim into the SELECT.
    /// Dialect translation happens upstream in the planner.
    #[serde(default)]
    pub predicate: Option<String>,
    /// Optional row limit pushed down to the backend
    #[serde(default)]
    pub limit: Option<u64>,
}

impl Split {
    /// Parse the backend tag into a known kind
    pub fn backend_kind(&self) -> Result<BackendKind> {
        self.backend.parse()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Reject malformed splits before any session starts
    pub fn validate(&self) -> Result<()> {
        if self.table.is_empty() {
            return Err(Error::invalid_split("empty table name"));
        }

        if self.columns.is_empty() {
            return Err(Error::invalid_split(format!(
                "split for table '{}' has an empty projection",
                self.table
            )));
        }

        if self.limit == Some(0) {
            return Err(Error::invalid_split(format!(
                "split for table '{}' has a zero row limit",
                self.table
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_split() -> Split {
        Split {
            backend: "postgres".to_string(),
            endpoint: Endpoint::new("localhost", 5432, "orders").with_username("reader"),
            table: "line_items".to_string(),
            columns: vec![
                ColumnRef::new("id", "bigint"),
                ColumnRef::new("sku", "text"),
            ],
            predicate: None,
            limit: None,
        }
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!(
            "clickhouse".parse::<BackendKind>().unwrap(),
            BackendKind::ClickHouse
        );
        assert_eq!(
            "POSTGRESQL".parse::<BackendKind>().unwrap(),
            BackendKind::Postgres
        );

        let err = "UNKNOWN".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedSource(_)));
    }

    #[test]
    fn test_endpoint_authority_hides_password() {
        let endpoint = Endpoint::new("db.internal", 5432, "orders")
            .with_username("reader")
            .with_password("secret");

        let authority = endpoint.authority();
        assert_eq!(authority, "reader@db.internal:5432/orders");
        assert!(!authority.contains("secret"));
    }

    #[test]
    fn test_split_validation() {
        let split = sample_split();
        assert!(split.validate().is_ok());

        let mut empty_projection = sample_split();
        empty_projection.columns.clear();
        assert!(matches!(
            empty_projection.validate(),
            Err(Error::InvalidSplit(_))
        ));

        let mut zero_limit = sample_split();
        zero_limit.limit = Some(0);
        assert!(matches!(zero_limit.validate(), Err(Error::InvalidSplit(_))));
    }

    #[test]
    fn test_split_roundtrip() {
        let split = sample_split();
        let json = serde_json::to_string(&split).unwrap();
        let back: Split = serde_json::from_str(&json).unwrap();
        assert_eq!(back.table, "line_items");
        assert_eq!(back.column_names(), vec!["id", "sku"]);
    }
}
