use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Logical column types backend-native types are mapped into
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    /// Boolean true/false
    Bool,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// UTF-8 string
    String,
    /// Binary data
    Bytes,
    /// Calendar date
    Date,
    /// Timestamp without timezone
    Timestamp,
    /// UUID
    Uuid,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Bool => write!(f, "bool"),
            LogicalType::Int32 => write!(f, "int32"),
            LogicalType::Int64 => write!(f, "int64"),
            LogicalType::Float32 => write!(f, "float32"),
            LogicalType::Float64 => write!(f, "float64"),
            LogicalType::String => write!(f, "string"),
            LogicalType::Bytes => write!(f, "bytes"),
            LogicalType::Date => write!(f, "date"),
            LogicalType::Timestamp => write!(f, "timestamp"),
            LogicalType::Uuid => write!(f, "uuid"),
        }
    }
}

/// A single value in the common logical type system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Logical type of the value, `None` for nulls
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(LogicalType::Bool),
            Value::Int32(_) => Some(LogicalType::Int32),
            Value::Int64(_) => Some(LogicalType::Int64),
            Value::Float32(_) => Some(LogicalType::Float32),
            Value::Float64(_) => Some(LogicalType::Float64),
            Value::String(_) => Some(LogicalType::String),
            Value::Bytes(_) => Some(LogicalType::Bytes),
            Value::Date(_) => Some(LogicalType::Date),
            Value::Timestamp(_) => Some(LogicalType::Timestamp),
            Value::Uuid(_) => Some(LogicalType::Uuid),
        }
    }

    /// Rough in-memory size, used for buffer byte accounting
    pub fn estimated_size(&self) -> usize {
        match self {
            Value::Null => 1,
            Value::Bool(_) => 1,
            Value::Int32(_) | Value::Float32(_) => 4,
            Value::Int64(_) | Value::Float64(_) | Value::Date(_) | Value::Timestamp(_) => 8,
            Value::String(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Uuid(_) => 16,
        }
    }
}

/// A single row of logical values, ordered per the split's projection
pub type Row = Vec<Value>;

/// A column in the derived logical schema of a split
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct LogicalColumn {
    pub name: String,
    pub logical_type: LogicalType,
}

impl LogicalColumn {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }
}

/// Logical schema of a split, derived from the split's declared backend
/// column types by the backend's type mapper
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SplitSchema {
    pub columns: Vec<LogicalColumn>,
}

impl SplitSchema {
    pub fn new(columns: Vec<LogicalColumn>) -> Self {
        Self { columns }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}
