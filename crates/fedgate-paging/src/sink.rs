use crate::buffer::{ColumnarBuffer, MemoryQuota};
use fedgate_core::{Error, PagingOverrides, ReadStats, Result, Row, SplitSchema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Paging tuning: buffer flush thresholds and the queue capacity bound
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Rows per columnar buffer before it is flushed
    pub buffer_rows: usize,
    /// Approximate bytes per columnar buffer before it is flushed
    pub buffer_bytes: usize,
    /// Result queue capacity. This bound is the backpressure mechanism:
    /// memory use stays within queue capacity x buffer size.
    pub queue_capacity: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            buffer_rows: 1024,
            buffer_bytes: 4 * 1024 * 1024,
            queue_capacity: 4,
        }
    }
}

impl PagingConfig {
    /// Apply per-request overrides, treating the configured values as
    /// ceilings: callers may lower the thresholds, never raise them.
    pub fn apply_overrides(&self, overrides: &PagingOverrides) -> PagingConfig {
        PagingConfig {
            buffer_rows: overrides
                .buffer_rows
                .map_or(self.buffer_rows, |v| v.min(self.buffer_rows)),
            buffer_bytes: overrides
                .buffer_bytes
                .map_or(self.buffer_bytes, |v| v.min(self.buffer_bytes)),
            queue_capacity: overrides
                .queue_capacity
                .map_or(self.queue_capacity, |v| v.min(self.queue_capacity)),
        }
    }
}

/// One item of the result queue: a filled buffer with its stats, or the
/// single terminal error of a failed read
#[derive(Debug)]
pub enum ReadResult {
    Data {
        buffer: ColumnarBuffer,
        stats: ReadStats,
    },
    Error(Error),
}

/// Accumulates rows into columnar buffers and feeds the bounded result
/// queue.
///
/// Owned by the producer side (the data source read). Pushing to a full
/// queue suspends the producer, and every suspension also observes the
/// session token, so a blocked push unblocks promptly on cancellation.
/// The queue closes when the sink's sender is dropped (`close`, `fail`,
/// or sink drop). The producer closes the queue, never the consumer.
pub struct Sink {
    tx: Option<mpsc::Sender<ReadResult>>,
    token: CancellationToken,
    schema: Arc<SplitSchema>,
    quota: Arc<MemoryQuota>,
    config: PagingConfig,
    buffer: Option<ColumnarBuffer>,
}

impl Sink {
    /// Create a sink and the receiving end of its result queue
    pub fn new(
        schema: Arc<SplitSchema>,
        config: PagingConfig,
        quota: Arc<MemoryQuota>,
        token: CancellationToken,
    ) -> (Self, mpsc::Receiver<ReadResult>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);

        let sink = Self {
            tx: Some(tx),
            token,
            schema,
            quota,
            config,
            buffer: None,
        };

        (sink, rx)
    }

    /// Append one converted row, flushing the buffer once it reaches a
    /// threshold. Suspends on a full queue and on cancellation.
    pub async fn push_row(&mut self, row: Row) -> Result<()> {
        if self.tx.is_none() {
            return Err(Error::Internal("push into a closed sink".to_string()));
        }

        let buffer = self.buffer.get_or_insert_with(|| {
            ColumnarBuffer::new(self.schema.clone(), self.quota.clone())
        });

        buffer.append_row(row)?;

        if buffer.row_count() >= self.config.buffer_rows
            || buffer.byte_size() >= self.config.buffer_bytes
        {
            self.flush().await?;
        }

        Ok(())
    }

    /// Flush the trailing partial buffer and close the queue. Idempotent:
    /// a second call is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.tx.is_none() {
            return Ok(());
        }

        self.flush().await?;
        self.tx = None;

        Ok(())
    }

    /// Deliver the single terminal error and close the queue. A partially
    /// filled buffer is discarded: no partial pages after an error.
    pub async fn fail(&mut self, error: Error) {
        if self.tx.is_none() {
            debug!("sink already closed, dropping error: {}", error);
            return;
        }

        self.buffer = None;

        if let Err(send_error) = self.send(ReadResult::Error(error)).await {
            debug!("terminal error not delivered: {}", send_error);
        }

        self.tx = None;
    }

    async fn flush(&mut self) -> Result<()> {
        let Some(buffer) = self.buffer.take() else {
            return Ok(());
        };

        if buffer.is_empty() {
            return Ok(());
        }

        let stats = buffer.stats();
        debug!(
            rows = stats.rows,
            bytes = stats.bytes,
            "flushing columnar buffer"
        );

        self.send(ReadResult::Data { buffer, stats }).await
    }

    async fn send(&mut self, item: ReadResult) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::Internal("send into a closed sink".to_string()))?;

        tokio::select! {
            _ = self.token.cancelled() => Err(Error::Cancelled),
            sent = tx.send(item) => {
                sent.map_err(|_| Error::Transport("result queue receiver dropped".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedgate_core::{LogicalColumn, LogicalType, Value};

    fn sample_schema() -> Arc<SplitSchema> {
        Arc::new(SplitSchema::new(vec![LogicalColumn::new(
            "id",
            LogicalType::Int64,
        )]))
    }

    fn sink_with(config: PagingConfig) -> (Sink, mpsc::Receiver<ReadResult>, Arc<MemoryQuota>) {
        let quota = MemoryQuota::new();
        let (sink, rx) = Sink::new(
            sample_schema(),
            config,
            quota.clone(),
            CancellationToken::new(),
        );
        (sink, rx, quota)
    }

    #[test]
    fn test_overrides_clamp_to_ceiling() {
        let config = PagingConfig {
            buffer_rows: 100,
            buffer_bytes: 1000,
            queue_capacity: 4,
        };

        let effective = config.apply_overrides(&PagingOverrides {
            buffer_rows: Some(10),
            buffer_bytes: Some(5000),
            queue_capacity: None,
        });

        assert_eq!(effective.buffer_rows, 10);
        assert_eq!(effective.buffer_bytes, 1000);
        assert_eq!(effective.queue_capacity, 4);
    }

    #[tokio::test]
    async fn test_flush_at_row_threshold() {
        let (mut sink, mut rx, _quota) = sink_with(PagingConfig {
            buffer_rows: 2,
            ..PagingConfig::default()
        });

        for n in 0..4 {
            sink.push_row(vec![Value::Int64(n)]).await.unwrap();
        }

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        for item in [first, second] {
            match item {
                ReadResult::Data { stats, .. } => assert_eq!(stats.rows, 2),
                ReadResult::Error(e) => panic!("unexpected error: {}", e),
            }
        }
    }

    #[tokio::test]
    async fn test_close_flushes_trailing_buffer_once() {
        let (mut sink, mut rx, _quota) = sink_with(PagingConfig::default());

        sink.push_row(vec![Value::Int64(1)]).await.unwrap();
        sink.close().await.unwrap();
        // second close is a no-op, not a second trailing flush
        sink.close().await.unwrap();

        match rx.recv().await.unwrap() {
            ReadResult::Data { stats, .. } => assert_eq!(stats.rows, 1),
            ReadResult::Error(e) => panic!("unexpected error: {}", e),
        }

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_without_rows_closes_empty() {
        let (mut sink, mut rx, quota) = sink_with(PagingConfig::default());

        sink.close().await.unwrap();

        assert!(rx.recv().await.is_none());
        assert_eq!(quota.produced(), 0);
    }

    #[tokio::test]
    async fn test_fail_discards_partial_buffer() {
        let (mut sink, mut rx, quota) = sink_with(PagingConfig::default());

        sink.push_row(vec![Value::Int64(1)]).await.unwrap();
        sink.fail(Error::query_failed("connection reset")).await;

        match rx.recv().await.unwrap() {
            ReadResult::Error(e) => assert!(matches!(e, Error::QueryFailed(_))),
            ReadResult::Data { .. } => panic!("partial buffer leaked past an error"),
        }

        assert!(rx.recv().await.is_none());
        assert_eq!(quota.outstanding_buffers(), 0);
    }

    #[tokio::test]
    async fn test_push_after_close_is_rejected() {
        let (mut sink, _rx, _quota) = sink_with(PagingConfig::default());

        sink.close().await.unwrap();
        let err = sink.push_row(vec![Value::Int64(1)]).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
