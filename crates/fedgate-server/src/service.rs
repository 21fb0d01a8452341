use crate::registry::DataSourceRegistry;
use fedgate_core::{ReadSplitsRequest, Result, Split, StreamError};
use fedgate_paging::{MemoryQuota, PagingConfig};
use fedgate_streaming::{ResponseStream, SessionStats, Streamer};
use tracing::{error, info, warn};

/// Executes read-splits calls: one streamer session per split, in
/// request order, against the backend resolved through the registry.
pub struct ReadSplitsService {
    registry: DataSourceRegistry,
    paging: PagingConfig,
}

impl ReadSplitsService {
    pub fn new(registry: DataSourceRegistry, paging: PagingConfig) -> Self {
        Self { registry, paging }
    }

    /// Stream every split of the request. The first failing or cancelled
    /// split emits a terminal error event and ends the call.
    pub async fn read_splits<S: ResponseStream>(
        &self,
        request: &ReadSplitsRequest,
        stream: &mut S,
    ) -> Result<()> {
        let request_id = request.effective_request_id();

        if let Err(e) = request.validate() {
            warn!(%request_id, "rejected read_splits request: {}", e);
            let _ = stream
                .send_error(StreamError {
                    split_index: 0,
                    message: e.to_string(),
                    cancelled: false,
                })
                .await;
            return Err(e);
        }

        let config = self.paging.apply_overrides(&request.paging);
        info!(%request_id, splits = request.splits.len(), "read_splits started");

        for (index, split) in request.splits.iter().enumerate() {
            match self.stream_split(index, split, config, stream).await {
                Ok(stats) => {
                    info!(
                        %request_id,
                        split_index = index,
                        backend = %split.backend,
                        buffers = stats.buffers,
                        rows = stats.rows,
                        bytes = stats.bytes,
                        "split completed"
                    );
                }
                Err(e) => {
                    if e.is_cancelled() {
                        info!(%request_id, split_index = index, "read_splits cancelled");
                    } else {
                        error!(%request_id, split_index = index, "split failed: {}", e);
                    }

                    let _ = stream
                        .send_error(StreamError {
                            split_index: index,
                            message: e.to_string(),
                            cancelled: e.is_cancelled(),
                        })
                        .await;
                    return Err(e);
                }
            }
        }

        info!(%request_id, "read_splits finished");
        Ok(())
    }

    async fn stream_split<S: ResponseStream>(
        &self,
        index: usize,
        split: &Split,
        config: PagingConfig,
        stream: &mut S,
    ) -> Result<SessionStats> {
        let source = self.registry.resolve(&split.backend)?;
        let quota = MemoryQuota::new();

        Streamer::new(index, stream, source, split.clone(), config, quota)?
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendsConfig;
    use async_trait::async_trait;
    use fedgate_core::{
        ColumnRef, Endpoint, Error, ReadSplitsResponse, Result, Split,
    };
    use tokio_util::sync::CancellationToken;

    struct RecordingStream {
        token: CancellationToken,
        pages: Vec<ReadSplitsResponse>,
        errors: Vec<StreamError>,
    }

    impl RecordingStream {
        fn new() -> Self {
            Self {
                token: CancellationToken::new(),
                pages: Vec::new(),
                errors: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ResponseStream for RecordingStream {
        async fn send(&mut self, response: ReadSplitsResponse) -> Result<()> {
            self.pages.push(response);
            Ok(())
        }

        async fn send_error(&mut self, error: StreamError) -> Result<()> {
            self.errors.push(error);
            Ok(())
        }

        fn cancellation(&self) -> CancellationToken {
            self.token.clone()
        }
    }

    fn service() -> ReadSplitsService {
        ReadSplitsService::new(
            DataSourceRegistry::new(&BackendsConfig::default()).unwrap(),
            PagingConfig::default(),
        )
    }

    fn split_for(backend: &str) -> Split {
        Split {
            backend: backend.to_string(),
            endpoint: Endpoint::new("localhost", 1, "db"),
            table: "t".to_string(),
            columns: vec![ColumnRef::new("n", "bigint")],
            predicate: None,
            limit: None,
        }
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected_with_an_error_event() {
        let mut stream = RecordingStream::new();
        let request = ReadSplitsRequest::new(vec![]);

        let err = service()
            .read_splits(&request, &mut stream)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidSplit(_)));
        assert!(stream.pages.is_empty());
        assert_eq!(stream.errors.len(), 1);
        assert!(!stream.errors[0].cancelled);
    }

    #[tokio::test]
    async fn test_unknown_backend_ends_the_call() {
        let mut stream = RecordingStream::new();
        let request = ReadSplitsRequest::new(vec![split_for("UNKNOWN")]);

        let err = service()
            .read_splits(&request, &mut stream)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedSource(_)));
        assert!(stream.pages.is_empty());
        assert_eq!(stream.errors.len(), 1);
        assert_eq!(stream.errors[0].split_index, 0);
    }

    #[tokio::test]
    async fn test_unmapped_column_type_fails_before_any_session_output() {
        let mut stream = RecordingStream::new();
        let mut split = split_for("postgres");
        split.columns = vec![ColumnRef::new("shape", "geometry")];
        let request = ReadSplitsRequest::new(vec![split]);

        let err = service()
            .read_splits(&request, &mut stream)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TypeMapping(_)));
        assert!(stream.pages.is_empty());
    }
}
