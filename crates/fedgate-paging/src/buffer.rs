use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};
use fedgate_core::{Error, LogicalType, ReadStats, Result, Row, SplitSchema, Value};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Accounting for columnar buffer memory across one session.
///
/// Every buffer registers itself on creation and releases its reservation
/// exactly once, on drop. The counters make the single-release invariant
/// observable: after a session is torn down, `outstanding_buffers` must be
/// zero and `released` must equal `produced`.
#[derive(Debug, Default)]
pub struct MemoryQuota {
    buffers: AtomicUsize,
    bytes: AtomicUsize,
    produced: AtomicU64,
    released: AtomicU64,
}

impl MemoryQuota {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self) {
        self.buffers.fetch_add(1, Ordering::SeqCst);
        self.produced.fetch_add(1, Ordering::SeqCst);
    }

    fn add_bytes(&self, amount: usize) {
        self.bytes.fetch_add(amount, Ordering::SeqCst);
    }

    fn release(&self, bytes: usize) {
        self.buffers.fetch_sub(1, Ordering::SeqCst);
        self.bytes.fetch_sub(bytes, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    /// Buffers currently alive (registered but not yet released)
    pub fn outstanding_buffers(&self) -> usize {
        self.buffers.load(Ordering::SeqCst)
    }

    /// Estimated bytes currently held by alive buffers
    pub fn outstanding_bytes(&self) -> usize {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Total buffers ever registered
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }

    /// Total buffers ever released
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }
}

/// Column-oriented storage for one projected column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Bool(Vec<Option<bool>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    String(Vec<Option<String>>),
    Bytes(Vec<Option<Vec<u8>>>),
    Date(Vec<Option<NaiveDate>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Uuid(Vec<Option<Uuid>>),
}

impl ColumnData {
    fn for_type(logical_type: LogicalType) -> Self {
        match logical_type {
            LogicalType::Bool => ColumnData::Bool(Vec::new()),
            LogicalType::Int32 => ColumnData::Int32(Vec::new()),
            LogicalType::Int64 => ColumnData::Int64(Vec::new()),
            LogicalType::Float32 => ColumnData::Float32(Vec::new()),
            LogicalType::Float64 => ColumnData::Float64(Vec::new()),
            LogicalType::String => ColumnData::String(Vec::new()),
            LogicalType::Bytes => ColumnData::Bytes(Vec::new()),
            LogicalType::Date => ColumnData::Date(Vec::new()),
            LogicalType::Timestamp => ColumnData::Timestamp(Vec::new()),
            LogicalType::Uuid => ColumnData::Uuid(Vec::new()),
        }
    }

    fn push(&mut self, value: Value) -> Result<()> {
        match (self, value) {
            (ColumnData::Bool(col), Value::Bool(v)) => col.push(Some(v)),
            (ColumnData::Bool(col), Value::Null) => col.push(None),
            (ColumnData::Int32(col), Value::Int32(v)) => col.push(Some(v)),
            (ColumnData::Int32(col), Value::Null) => col.push(None),
            (ColumnData::Int64(col), Value::Int64(v)) => col.push(Some(v)),
            (ColumnData::Int64(col), Value::Null) => col.push(None),
            (ColumnData::Float32(col), Value::Float32(v)) => col.push(Some(v)),
            (ColumnData::Float32(col), Value::Null) => col.push(None),
            (ColumnData::Float64(col), Value::Float64(v)) => col.push(Some(v)),
            (ColumnData::Float64(col), Value::Null) => col.push(None),
            (ColumnData::String(col), Value::String(v)) => col.push(Some(v)),
            (ColumnData::String(col), Value::Null) => col.push(None),
            (ColumnData::Bytes(col), Value::Bytes(v)) => col.push(Some(v)),
            (ColumnData::Bytes(col), Value::Null) => col.push(None),
            (ColumnData::Date(col), Value::Date(v)) => col.push(Some(v)),
            (ColumnData::Date(col), Value::Null) => col.push(None),
            (ColumnData::Timestamp(col), Value::Timestamp(v)) => col.push(Some(v)),
            (ColumnData::Timestamp(col), Value::Null) => col.push(None),
            (ColumnData::Uuid(col), Value::Uuid(v)) => col.push(Some(v)),
            (ColumnData::Uuid(col), Value::Null) => col.push(None),
            (col, value) => {
                return Err(Error::Internal(format!(
                    "value of type {:?} does not fit column {:?}",
                    value.logical_type(),
                    col.logical_type()
                )))
            }
        }

        Ok(())
    }

    pub fn logical_type(&self) -> LogicalType {
        match self {
            ColumnData::Bool(_) => LogicalType::Bool,
            ColumnData::Int32(_) => LogicalType::Int32,
            ColumnData::Int64(_) => LogicalType::Int64,
            ColumnData::Float32(_) => LogicalType::Float32,
            ColumnData::Float64(_) => LogicalType::Float64,
            ColumnData::String(_) => LogicalType::String,
            ColumnData::Bytes(_) => LogicalType::Bytes,
            ColumnData::Date(_) => LogicalType::Date,
            ColumnData::Timestamp(_) => LogicalType::Timestamp,
            ColumnData::Uuid(_) => LogicalType::Uuid,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Bool(col) => col.len(),
            ColumnData::Int32(col) => col.len(),
            ColumnData::Int64(col) => col.len(),
            ColumnData::Float32(col) => col.len(),
            ColumnData::Float64(col) => col.len(),
            ColumnData::String(col) => col.len(),
            ColumnData::Bytes(col) => col.len(),
            ColumnData::Date(col) => col.len(),
            ColumnData::Timestamp(col) => col.len(),
            ColumnData::Uuid(col) => col.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owned deserialized form of a columnar page, the unit callers decode
/// from a `ReadSplitsResponse` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub schema: SplitSchema,
    pub columns: Vec<ColumnData>,
    pub rows: u64,
}

impl Page {
    /// Decode a page from serialized payload bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(format!("page decode: {}", e)))
    }
}

/// Borrowed serialization view over a buffer's content. Field order must
/// match [`Page`], which decodes the same byte stream.
#[derive(Serialize)]
struct PageRef<'a> {
    schema: &'a SplitSchema,
    columns: &'a [ColumnData],
    rows: u64,
}

/// A mutable accumulator of rows in column-oriented storage.
///
/// Move-only: ownership transfers from the sink to a queue slot to the
/// consumer, and the quota reservation is released exactly once, on drop
/// at the final owner. Serialization borrows the content, so the drop
/// point stays after the page has been handed to the transport.
#[derive(Debug)]
pub struct ColumnarBuffer {
    schema: Arc<SplitSchema>,
    columns: Vec<ColumnData>,
    rows: usize,
    bytes: usize,
    started_at: Instant,
    quota: Arc<MemoryQuota>,
}

impl ColumnarBuffer {
    pub fn new(schema: Arc<SplitSchema>, quota: Arc<MemoryQuota>) -> Self {
        quota.register();

        let columns = schema
            .columns
            .iter()
            .map(|c| ColumnData::for_type(c.logical_type))
            .collect();

        Self {
            schema,
            columns,
            rows: 0,
            bytes: 0,
            started_at: Instant::now(),
            quota,
        }
    }

    /// Append one row. The row must match the schema width and column
    /// types; anything else is a conversion bug upstream.
    pub fn append_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Internal(format!(
                "row width {} does not match schema width {}",
                row.len(),
                self.columns.len()
            )));
        }

        let mut row_bytes = 0;
        for (column, value) in self.columns.iter_mut().zip(row) {
            row_bytes += value.estimated_size();
            column.push(value)?;
        }

        self.rows += 1;
        self.bytes += row_bytes;
        self.quota.add_bytes(row_bytes);

        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn byte_size(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn schema(&self) -> &SplitSchema {
        &self.schema
    }

    /// Stats snapshot for the outbound message
    pub fn stats(&self) -> ReadStats {
        ReadStats::new(
            self.rows as u64,
            self.bytes as u64,
            self.started_at.elapsed().as_millis() as u64,
        )
    }

    /// Serialize the content into a transportable page. Borrows rather
    /// than consumes, so the buffer (and its quota reservation) outlives
    /// the send and is dropped by the final owner afterwards.
    pub fn to_page(&self) -> Result<Bytes> {
        let page = PageRef {
            schema: &self.schema,
            columns: &self.columns,
            rows: self.rows as u64,
        };

        let encoded = bincode::serialize(&page)
            .map_err(|e| Error::Serialization(format!("page encode: {}", e)))?;

        Ok(Bytes::from(encoded))
    }
}

impl Drop for ColumnarBuffer {
    fn drop(&mut self) {
        self.quota.release(self.bytes);
    }
}
