use crate::error::{Error, Result};
use crate::split::Split;
use base64::prelude::{Engine, BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-request overrides of the paging defaults. Values are clamped to
/// the server-configured ceilings; zero values are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PagingOverrides {
    /// Rows per columnar buffer before it is flushed
    #[serde(default)]
    pub buffer_rows: Option<usize>,
    /// Approximate bytes per columnar buffer before it is flushed
    #[serde(default)]
    pub buffer_bytes: Option<usize>,
    /// Result queue capacity (the backpressure bound)
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

impl PagingOverrides {
    pub fn is_empty(&self) -> bool {
        self.buffer_rows.is_none() && self.buffer_bytes.is_none() && self.queue_capacity.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_rows == Some(0)
            || self.buffer_bytes == Some(0)
            || self.queue_capacity == Some(0)
        {
            return Err(Error::invalid_split("paging overrides must be non-zero"));
        }

        Ok(())
    }
}

/// Inbound request: a list of planned splits to read and stream back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadSplitsRequest {
    /// Caller-provided request id; one is generated when absent
    #[serde(default)]
    pub request_id: Option<Uuid>,
    pub splits: Vec<Split>,
    #[serde(default)]
    pub paging: PagingOverrides,
}

impl ReadSplitsRequest {
    pub fn new(splits: Vec<Split>) -> Self {
        Self {
            request_id: None,
            splits,
            paging: PagingOverrides::default(),
        }
    }

    /// Effective request id, generating one for callers that sent none
    pub fn effective_request_id(&self) -> Uuid {
        self.request_id.unwrap_or_else(Uuid::new_v4)
    }

    pub fn validate(&self) -> Result<()> {
        if self.splits.is_empty() {
            return Err(Error::invalid_split("request carries no splits"));
        }

        for split in &self.splits {
            split.validate()?;
        }

        self.paging.validate()
    }
}

/// Per-buffer statistics, attached to every outbound page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStats {
    /// Rows in this buffer
    pub rows: u64,
    /// Approximate bytes accumulated into this buffer
    pub bytes: u64,
    /// Time spent filling this buffer, milliseconds
    pub elapsed_ms: u64,
}

impl ReadStats {
    pub fn new(rows: u64, bytes: u64, elapsed_ms: u64) -> Self {
        Self {
            rows,
            bytes,
            elapsed_ms,
        }
    }
}

/// One outbound page: a serialized columnar buffer plus its stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadSplitsResponse {
    /// Index of the originating split within the request
    pub split_index: usize,
    /// Columnar page, base64-encoded for transport inside JSON
    pub payload: String,
    pub stats: ReadStats,
}

impl ReadSplitsResponse {
    pub fn new(split_index: usize, page: &[u8], stats: ReadStats) -> Self {
        Self {
            split_index,
            payload: BASE64_STANDARD.encode(page),
            stats,
        }
    }

    /// Decode the columnar page bytes
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        BASE64_STANDARD
            .decode(&self.payload)
            .map_err(|e| Error::Serialization(format!("payload decode: {}", e)))
    }
}

/// Terminal error event for a stream that has already begun
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamError {
    pub split_index: usize,
    pub message: String,
    /// True when the session ended by cancellation rather than a fault
    pub cancelled: bool,
}

/// One NDJSON line of the streaming response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSplitsEvent {
    Page(ReadSplitsResponse),
    Error(StreamError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::{ColumnRef, Endpoint};

    fn sample_request() -> ReadSplitsRequest {
        ReadSplitsRequest::new(vec![Split {
            backend: "clickhouse".to_string(),
            endpoint: Endpoint::new("localhost", 8123, "metrics"),
            table: "events".to_string(),
            columns: vec![ColumnRef::new("ts", "DateTime")],
            predicate: None,
            limit: Some(1000),
        }])
    }

    #[test]
    fn test_request_validation() {
        assert!(sample_request().validate().is_ok());

        let empty = ReadSplitsRequest::new(vec![]);
        assert!(matches!(empty.validate(), Err(Error::InvalidSplit(_))));

        let mut bad_paging = sample_request();
        bad_paging.paging.queue_capacity = Some(0);
        assert!(matches!(bad_paging.validate(), Err(Error::InvalidSplit(_))));
    }

    #[test]
    fn test_response_payload_roundtrip() {
        let page = vec![1u8, 2, 3, 4, 5];
        let response = ReadSplitsResponse::new(0, &page, ReadStats::new(2, 5, 1));
        assert_eq!(response.payload_bytes().unwrap(), page);
    }

    #[test]
    fn test_event_ndjson_roundtrip() {
        let event = ReadSplitsEvent::Page(ReadSplitsResponse::new(
            1,
            b"page",
            ReadStats::new(10, 4, 2),
        ));
        let line = serde_json::to_string(&event).unwrap();
        let back: ReadSplitsEvent = serde_json::from_str(&line).unwrap();

        match back {
            ReadSplitsEvent::Page(page) => {
                assert_eq!(page.split_index, 1);
                assert_eq!(page.stats.rows, 10);
            }
            ReadSplitsEvent::Error(_) => panic!("expected page event"),
        }
    }

    #[test]
    fn test_error_event_carries_cancellation_flag() {
        let event = ReadSplitsEvent::Error(StreamError {
            split_index: 0,
            message: "Read cancelled".to_string(),
            cancelled: true,
        });
        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains("\"cancelled\":true"));
    }
}
