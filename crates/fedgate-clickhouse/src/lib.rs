//! ClickHouse adapter for fedgate
//!
//! Implements the SqlFormatter, ConnectionManager and TypeMapper contracts
//! for the column-store backend over ClickHouse's native HTTP interface.
//! Queries run with `FORMAT JSONEachRow` and the response body is decoded
//! line by line as it streams in, so row pulling stays incremental and
//! subject to the sink's backpressure.

use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use fedgate_core::{Endpoint, Error, LogicalType, Result, Row, Split, SplitSchema, Value};
use fedgate_rdbms::{Connection, ConnectionManager, Preset, RowStream, SqlFormatter, TypeMapper};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Adapter settings for the ClickHouse backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    /// URL scheme of the HTTP interface
    pub scheme: String,
    /// Whole-query timeout in seconds
    pub query_timeout_secs: u64,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            query_timeout_secs: 300,
        }
    }
}

/// Build the ClickHouse adapter preset
pub fn preset(config: ClickHouseConfig) -> Result<Preset> {
    Ok(Preset::new(
        Arc::new(ClickHouseSqlFormatter),
        Arc::new(ClickHouseConnectionManager::new(config)?),
        Arc::new(ClickHouseTypeMapper),
    ))
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "\\`"))
}

fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// SELECT rendering with ClickHouse backtick identifier quoting
pub struct ClickHouseSqlFormatter;

impl SqlFormatter for ClickHouseSqlFormatter {
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

/// ClickHouse type names mapped into the logical type system.
/// `Nullable(T)` wrappers map as their inner type; nullability is carried
/// by the values themselves.
pub struct ClickHouseTypeMapper;

impl TypeMapper for ClickHouseTypeMapper {
    fn map(&self, backend_type: &str) -> Result<LogicalType> {
        let unwrapped = backend_type
            .strip_prefix("Nullable(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(backend_type);

        let mapped = match unwrapped {
            "Bool" => LogicalType::Bool,
            "Int8" | "Int16" | "Int32" | "UInt8" | "UInt16" => LogicalType::Int32,
            "Int64" | "UInt32" | "UInt64" => LogicalType::Int64,
            "Float32" => LogicalType::Float32,
            "Float64" => LogicalType::Float64,
            "String" => LogicalType::String,
            "Date" | "Date32" => LogicalType::Date,
            "UUID" => LogicalType::Uuid,
            other if other.starts_with("FixedString(") => LogicalType::String,
            other if other.starts_with("DateTime64(") || other == "DateTime" => {
                LogicalType::Timestamp
            }
            other if other.starts_with("Decimal(") => LogicalType::Float64,
            other => {
                return Err(Error::TypeMapping(format!(
                    "unknown ClickHouse type: {}",
                    other
                )))
            }
        };

        Ok(mapped)
    }
}

/// Hands out HTTP "connections". The shared reqwest client does the
/// actual pooling and keep-alive across sessions.
pub struct ClickHouseConnectionManager {
    config: ClickHouseConfig,
    http: reqwest::Client,
}

impl ClickHouseConnectionManager {
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.query_timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }
}

#[async_trait]
impl ConnectionManager for ClickHouseConnectionManager {
    async fn acquire(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>> {
        Ok(Box::new(ClickHouseConnection {
            http: self.http.clone(),
            scheme: self.config.scheme.clone(),
            endpoint: endpoint.clone(),
        }))
    }
}

struct ClickHouseConnection {
    http: reqwest::Client,
    scheme: String,
    endpoint: Endpoint,
}

#[async_trait]
impl Connection for ClickHouseConnection {
    async fn query(&mut self, sql: &str, schema: &SplitSchema) -> Result<RowStream> {
        let url = format!(
            "{}://{}:{}/",
            self.scheme, self.endpoint.host, self.endpoint.port
        );

        debug!("querying ClickHouse at {}", self.endpoint.authority());

        let mut request = self
            .http
            .post(&url)
            .query(&[("database", self.endpoint.database.as_str())])
            .body(format!("{} FORMAT JSONEachRow", sql));

        if let Some(username) = &self.endpoint.username {
            request = request.basic_auth(username, self.endpoint.password.as_deref());
        }

        let response = request.send().await.map_err(|e| {
            Error::connection_failed(format!(
                "ClickHouse {}: {}",
                self.endpoint.authority(),
                e
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::query_failed(format!(
                "ClickHouse returned {}: {}",
                status,
                body.trim()
            )));
        }

        let schema = schema.clone();
        let stream = try_stream! {
            let mut body = response.bytes_stream();
            let mut buf: Vec<u8> = Vec::new();

            while let Some(chunk) = body.next().await {
                let chunk = chunk
                    .map_err(|e| Error::query_failed(format!("response stream: {}", e)))?;
                buf.extend_from_slice(&chunk);

                while let Some(line) = split_line(&mut buf) {
                    if !line.is_empty() {
                        yield parse_row(&line, &schema)?;
                    }
                }
            }

            if !buf.is_empty() {
                yield parse_row(&buf, &schema)?;
            }
        };

        Ok(stream.boxed())
    }
}

/// Drain one newline-terminated line off the front of the buffer
fn split_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = buf.drain(..=pos).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(line)
}

/// Decode one JSONEachRow line into a logical row per the schema
fn parse_row(line: &[u8], schema: &SplitSchema) -> Result<Row> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(line)
        .map_err(|e| Error::query_failed(format!("malformed JSONEachRow line: {}", e)))?;

    let null = serde_json::Value::Null;
    schema
        .columns
        .iter()
        .map(|column| {
            let json = object.get(&column.name).unwrap_or(&null);
            json_to_value(json, column.logical_type, &column.name)
        })
        .collect()
}

fn json_to_value(
    json: &serde_json::Value,
    logical_type: LogicalType,
    name: &str,
) -> Result<Value> {
    use serde_json::Value as Json;

    if json.is_null() {
        return Ok(Value::Null);
    }

    let mismatch = || {
        Error::query_failed(format!(
            "column '{}': JSON value {} does not decode as {}",
            name, json, logical_type
        ))
    };

    let value = match logical_type {
        LogicalType::Bool => match json {
            Json::Bool(v) => Value::Bool(*v),
            // ClickHouse may render Bool as 0/1
            Json::Number(n) => Value::Bool(n.as_i64().ok_or_else(mismatch)? != 0),
            _ => return Err(mismatch()),
        },
        LogicalType::Int32 => {
            let n = json.as_i64().ok_or_else(mismatch)?;
            Value::Int32(i32::try_from(n).map_err(|_| mismatch())?)
        }
        // 64-bit integers arrive quoted by default
        // (output_format_json_quote_64bit_integers)
        LogicalType::Int64 => match json {
            Json::Number(n) => Value::Int64(n.as_i64().ok_or_else(mismatch)?),
            Json::String(s) => Value::Int64(s.parse().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        LogicalType::Float32 => Value::Float32(json.as_f64().ok_or_else(mismatch)? as f32),
        LogicalType::Float64 => Value::Float64(json.as_f64().ok_or_else(mismatch)?),
        LogicalType::String => Value::String(json.as_str().ok_or_else(mismatch)?.to_string()),
        LogicalType::Bytes => Value::Bytes(json.as_str().ok_or_else(mismatch)?.as_bytes().to_vec()),
        LogicalType::Date => {
            let s = json.as_str().ok_or_else(mismatch)?;
            Value::Date(NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| mismatch())?)
        }
        LogicalType::Timestamp => {
            let s = json.as_str().ok_or_else(mismatch)?;
            let parsed = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                .map_err(|_| mismatch())?;
            Value::Timestamp(parsed)
        }
        LogicalType::Uuid => {
            let s = json.as_str().ok_or_else(mismatch)?;
            Value::Uuid(s.parse().map_err(|_| mismatch())?)
        }
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedgate_core::{ColumnRef, LogicalColumn};

    fn sample_split() -> Split {
        Split {
            backend: "clickhouse".to_string(),
            endpoint: Endpoint::new("localhost", 8123, "metrics"),
            table: "events".to_string(),
            columns: vec![
                ColumnRef::new("ts", "DateTime"),
                ColumnRef::new("count", "UInt64"),
            ],
            predicate: Some("count > 0".to_string()),
            limit: Some(100),
        }
    }

    #[test]
    fn test_format_select() {
        let sql = ClickHouseSqlFormatter
            .format_select(&sample_split())
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `ts`, `count` FROM `events` WHERE count > 0 LIMIT 100"
        );
    }

    #[test]
    fn test_type_mapping() {
        let mapper = ClickHouseTypeMapper;
        assert_eq!(mapper.map("UInt64").unwrap(), LogicalType::Int64);
        assert_eq!(mapper.map("Nullable(String)").unwrap(), LogicalType::String);
        assert_eq!(mapper.map("DateTime64(3)").unwrap(), LogicalType::Timestamp);
        assert_eq!(mapper.map("FixedString(16)").unwrap(), LogicalType::String);

        let err = mapper.map("AggregateFunction(sum, UInt64)").unwrap_err();
        assert!(matches!(err, Error::TypeMapping(_)));
    }

    #[test]
    fn test_split_line_handles_partial_chunks() {
        let mut buf = b"{\"a\":1}\n{\"a\":".to_vec();

        let line = split_line(&mut buf).unwrap();
        assert_eq!(line, b"{\"a\":1}");
        assert!(split_line(&mut buf).is_none());
        assert_eq!(buf, b"{\"a\":");
    }

    #[test]
    fn test_parse_row_jsoneachrow() {
        let schema = SplitSchema::new(vec![
            LogicalColumn::new("ts", LogicalType::Timestamp),
            LogicalColumn::new("count", LogicalType::Int64),
            LogicalColumn::new("tag", LogicalType::String),
        ]);

        // 64-bit integers arrive quoted, timestamps as naive strings
        let line = br#"{"ts":"2024-03-01 12:30:45","count":"12345678901","tag":"alpha"}"#;
        let row = parse_row(line, &schema).unwrap();

        assert_eq!(row[1], Value::Int64(12345678901));
        assert_eq!(row[2], Value::String("alpha".to_string()));
        match &row[0] {
            Value::Timestamp(ts) => {
                assert_eq!(ts.to_string(), "2024-03-01 12:30:45");
            }
            other => panic!("expected timestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_row_null_and_mismatch() {
        let schema = SplitSchema::new(vec![LogicalColumn::new("n", LogicalType::Int64)]);

        let row = parse_row(br#"{"n":null}"#, &schema).unwrap();
        assert_eq!(row[0], Value::Null);

        let err = parse_row(br#"{"n":"not-a-number"}"#, &schema).unwrap_err();
        assert!(matches!(err, Error::QueryFailed(_)));
    }
}
