use async_trait::async_trait;
use fedgate_core::{Error, ReadSplitsResponse, ReadStats, Result, Split, StreamError};
use fedgate_paging::{ColumnarBuffer, MemoryQuota, PagingConfig, ReadResult, Sink};
use fedgate_rdbms::DataSource;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Outbound side of one streaming call.
///
/// `send` returning an error means the caller is gone; the cancellation
/// token ends when the caller's own context does (disconnect, deadline,
/// server shutdown).
#[async_trait]
pub trait ResponseStream: Send {
    /// Send one page message
    async fn send(&mut self, response: ReadSplitsResponse) -> Result<()>;

    /// Send the terminal error event of a stream that has already begun
    async fn send_error(&mut self, error: StreamError) -> Result<()>;

    /// Token tied to the caller's context
    fn cancellation(&self) -> CancellationToken;
}

/// Totals across one session, for the teardown log line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub buffers: u64,
    pub rows: u64,
    pub bytes: u64,
}

impl SessionStats {
    fn record(&mut self, stats: ReadStats) {
        self.buffers += 1;
        self.rows += stats.rows;
        self.bytes += stats.bytes;
    }
}

/// One split-read session.
///
/// Terminal outcomes map onto the run result: `Ok(stats)` is a completed
/// session, `Err(Error::Cancelled)` a cancelled one, and any other error
/// a failed one. On every terminal path the session token is cancelled
/// and the producer task is awaited, so no task outlives its session.
pub struct Streamer<'a, S: ResponseStream> {
    split_index: usize,
    stream: &'a mut S,
    /// The transport's own token; ending it cancels the session
    transport_token: CancellationToken,
    /// Session token handed to the producer, child of the transport's
    session_token: CancellationToken,
    queue: mpsc::Receiver<ReadResult>,
    producer: JoinHandle<()>,
}

impl<'a, S: ResponseStream> Streamer<'a, S> {
    /// Set up a session: derive the session token, build the sink, and
    /// launch the data source read as the producer task.
    pub fn new(
        split_index: usize,
        stream: &'a mut S,
        source: Arc<dyn DataSource>,
        split: Split,
        config: PagingConfig,
        quota: Arc<MemoryQuota>,
    ) -> Result<Self> {
        let schema = Arc::new(source.schema(&split)?);

        let transport_token = stream.cancellation();
        let session_token = transport_token.child_token();

        let (sink, queue) = Sink::new(schema, config, quota, session_token.clone());

        let producer = tokio::spawn({
            let token = session_token.clone();
            async move {
                source.read_split(token, &split, sink).await;
            }
        });

        Ok(Self {
            split_index,
            stream,
            transport_token,
            session_token,
            queue,
            producer,
        })
    }

    /// Drive the session to a terminal state
    pub async fn run(mut self) -> Result<SessionStats> {
        let mut result = self.write_to_stream().await;

        // Terminal transition: stop the producer and wait for it to
        // actually finish. Cancellation is a request, not a guarantee of
        // instant stop.
        self.session_token.cancel();

        if let Err(join_error) = self.producer.await {
            error!(
                split_index = self.split_index,
                "producer task aborted: {}", join_error
            );
            if result.is_ok() {
                result = Err(Error::Internal(format!(
                    "producer task aborted: {}",
                    join_error
                )));
            }
        }

        result
    }

    async fn write_to_stream(&mut self) -> Result<SessionStats> {
        let mut totals = SessionStats::default();

        loop {
            tokio::select! {
                _ = self.transport_token.cancelled() => {
                    debug!(split_index = self.split_index, "caller context ended");
                    return Err(Error::Cancelled);
                }
                item = self.queue.recv() => match item {
                    // queue closed by the producer: correct termination,
                    // unless the caller's context ended first
                    None => {
                        if self.transport_token.is_cancelled() {
                            return Err(Error::Cancelled);
                        }
                        return Ok(totals);
                    }
                    Some(ReadResult::Data { buffer, stats }) => {
                        self.send_result(buffer, stats).await?;
                        totals.record(stats);
                    }
                    Some(ReadResult::Error(e)) => return Err(e),
                }
            }
        }
    }

    async fn send_result(&mut self, buffer: ColumnarBuffer, stats: ReadStats) -> Result<()> {
        let page = buffer.to_page()?;

        self.stream
            .send(ReadSplitsResponse::new(self.split_index, &page, stats))
            .await?;

        // buffer drops here, after its content reached the transport:
        // the single release point of its memory reservation
        Ok(())
    }
}
