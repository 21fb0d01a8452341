//! PostgreSQL adapter for fedgate
//!
//! Implements the SqlFormatter, ConnectionManager and TypeMapper contracts
//! for the row-store backend. One client is kept per endpoint and shared
//! across sessions; rows are streamed with `query_raw` and decoded into
//! logical values per the split's derived schema.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use fedgate_core::{Endpoint, Error, LogicalType, Result, Row, Split, SplitSchema, Value};
use fedgate_rdbms::{Connection, ConnectionManager, Preset, RowStream, SqlFormatter, TypeMapper};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

/// Adapter settings for the PostgreSQL backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// application_name reported to the server
    pub application_name: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            application_name: "fedgate".to_string(),
        }
    }
}

/// Build the PostgreSQL adapter preset
pub fn preset(config: PostgresConfig) -> Preset {
    Preset::new(
        Arc::new(PostgresSqlFormatter),
        Arc::new(PostgresConnectionManager::new(config)),
        Arc::new(PostgresTypeMapper),
    )
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// SELECT rendering with PostgreSQL double-quote identifier quoting
pub struct PostgresSqlFormatter;

impl SqlFormatter for PostgresSqlFormatter {
    fn format_select(&self, split: &Split) -> Result<String> {
        if split.columns.is_empty() {
            return Err(Error::invalid_split("empty projection"));
        }

        let columns = split
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("SELECT {} FROM {}", columns, quote_table(&split.table));

        if let Some(predicate) = &split.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }

        if let Some(limit) = split.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        Ok(sql)
    }
}

/// PostgreSQL type names mapped into the logical type system
pub struct PostgresTypeMapper;

impl TypeMapper for PostgresTypeMapper {
    fn map(&self, backend_type: &str) -> Result<LogicalType> {
        let mapped = match backend_type.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => LogicalType::Bool,
            "smallint" | "int2" | "integer" | "int" | "int4" => LogicalType::Int32,
            "bigint" | "int8" => LogicalType::Int64,
            "real" | "float4" => LogicalType::Float32,
            "double precision" | "float8" | "numeric" | "decimal" => LogicalType::Float64,
            "character varying" | "varchar" | "character" | "char" | "bpchar" | "text" => {
                LogicalType::String
            }
            "bytea" => LogicalType::Bytes,
            "date" => LogicalType::Date,
            "timestamp" | "timestamp without time zone" | "timestamp with time zone"
            | "timestamptz" => LogicalType::Timestamp,
            "uuid" => LogicalType::Uuid,
            other => {
                return Err(Error::TypeMapping(format!(
                    "unknown PostgreSQL type: {}",
                    other
                )))
            }
        };

        Ok(mapped)
    }
}

/// One client per endpoint, shared across sessions and re-dialed when the
/// backend closes it
pub struct PostgresConnectionManager {
    config: PostgresConfig,
    clients: Mutex<HashMap<String, Arc<RwLock<Client>>>>,
}

impl PostgresConnectionManager {
    pub fn new(config: PostgresConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<RwLock<Client>>> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&endpoint.host)
            .port(endpoint.port)
            .dbname(&endpoint.database)
            .application_name(&self.config.application_name)
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs));

        if let Some(username) = &endpoint.username {
            pg_config.user(username);
        }
        if let Some(password) = &endpoint.password {
            pg_config.password(password);
        }

        debug!("connecting to PostgreSQL at {}", endpoint.authority());

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
            Error::connection_failed(format!("PostgreSQL {}: {}", endpoint.authority(), e))
        })?;

        // Drive the connection until it closes
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Arc::new(RwLock::new(client)))
    }
}

#[async_trait]
impl ConnectionManager for PostgresConnectionManager {
    async fn acquire(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>> {
        let key = endpoint.authority();
        let mut clients = self.clients.lock().await;

        if let Some(client) = clients.get(&key) {
            if !client.read().await.is_closed() {
                return Ok(Box::new(PostgresConnection {
                    client: client.clone(),
                }));
            }

            debug!("cached PostgreSQL client for {} is closed, re-dialing", key);
            clients.remove(&key);
        }

        let client = self.connect(endpoint).await?;
        clients.insert(key, client.clone());

        Ok(Box::new(PostgresConnection { client }))
    }
}

struct PostgresConnection {
    client: Arc<RwLock<Client>>,
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn query(&mut self, sql: &str, schema: &SplitSchema) -> Result<RowStream> {
        let client = self.client.read().await;

        let params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let rows = client
            .query_raw(sql, params)
            .await
            .map_err(|e| Error::query_failed(pg_error_message(&e)))?;

        let schema = schema.clone();
        let stream = rows.map(move |item| {
            let row = item.map_err(|e| Error::query_failed(pg_error_message(&e)))?;
            extract_row(&row, &schema)
        });

        Ok(stream.boxed())
    }
}

fn extract_row(row: &tokio_postgres::Row, schema: &SplitSchema) -> Result<Row> {
    schema
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| extract_value(row, idx, column.logical_type, &column.name))
        .collect()
}

fn extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
    logical_type: LogicalType,
    name: &str,
) -> Result<Value> {
    let value = match logical_type {
        LogicalType::Bool => row
            .try_get::<_, Option<bool>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Bool)),
        LogicalType::Int32 => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Int32)),
        LogicalType::Int64 => row
            .try_get::<_, Option<i64>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Int64)),
        LogicalType::Float32 => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Float32)),
        LogicalType::Float64 => row
            .try_get::<_, Option<f64>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Float64)),
        LogicalType::String => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map_or(Value::Null, Value::String)),
        LogicalType::Bytes => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Bytes)),
        LogicalType::Date => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Date)),
        LogicalType::Timestamp => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Timestamp))
            .or_else(|_| {
                // timestamptz columns decode as DateTime<Utc>
                row.try_get::<_, Option<DateTime<Utc>>>(idx)
                    .map(|v| v.map_or(Value::Null, |ts| Value::Timestamp(ts.naive_utc())))
            }),
        LogicalType::Uuid => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Uuid)),
    };

    value.map_err(|e| Error::query_failed(format!("decode column '{}': {}", name, e)))
}

fn pg_error_message(e: &tokio_postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        let mut msg = db_error.message().to_string();

        if let Some(detail) = db_error.detail() {
            msg.push_str(&format!("\nDetail: {}", detail));
        }

        if let Some(hint) = db_error.hint() {
            msg.push_str(&format!("\nHint: {}", hint));
        }

        msg
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedgate_core::ColumnRef;

    fn sample_split() -> Split {
        Split {
            backend: "postgres".to_string(),
            endpoint: Endpoint::new("localhost", 5432, "orders"),
            table: "public.line_items".to_string(),
            columns: vec![
                ColumnRef::new("id", "bigint"),
                ColumnRef::new("sku", "text"),
            ],
            predicate: None,
            limit: None,
        }
    }

    #[test]
    fn test_format_select_basic() {
        let sql = PostgresSqlFormatter.format_select(&sample_split()).unwrap();
        assert_eq!(
            sql,
            r#"SELECT "id", "sku" FROM "public"."line_items""#
        );
    }

    #[test]
    fn test_format_select_with_predicate_and_limit() {
        let mut split = sample_split();
        split.predicate = Some("qty > 10".to_string());
        split.limit = Some(500);

        let sql = PostgresSqlFormatter.format_select(&split).unwrap();
        assert_eq!(
            sql,
            r#"SELECT "id", "sku" FROM "public"."line_items" WHERE qty > 10 LIMIT 500"#
        );
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn test_type_mapping() {
        let mapper = PostgresTypeMapper;
        assert_eq!(mapper.map("integer").unwrap(), LogicalType::Int32);
        assert_eq!(mapper.map("bigint").unwrap(), LogicalType::Int64);
        assert_eq!(mapper.map("TEXT").unwrap(), LogicalType::String);
        assert_eq!(mapper.map("timestamptz").unwrap(), LogicalType::Timestamp);
        assert_eq!(mapper.map("uuid").unwrap(), LogicalType::Uuid);

        let err = mapper.map("geometry").unwrap_err();
        assert!(matches!(err, Error::TypeMapping(_)));
    }

    #[test]
    fn test_schema_derivation() {
        let schema = PostgresTypeMapper.schema(&sample_split()).unwrap();
        assert_eq!(schema.width(), 2);
        assert_eq!(schema.columns[0].logical_type, LogicalType::Int64);
        assert_eq!(schema.columns[1].logical_type, LogicalType::String);
    }
}
