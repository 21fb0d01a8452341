use crate::traits::{ConnectionManager, SqlFormatter, TypeMapper};
use async_trait::async_trait;
use fedgate_core::{Error, Result, Split, SplitSchema};
use fedgate_paging::Sink;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Uniform read capability wrapping one backend adapter
#[async_trait]
pub trait DataSource: std::fmt::Debug + Send + Sync {
    /// Backend kind tag, for logging
    fn kind(&self) -> &'static str;

    /// Derive the logical schema of a split before reading it
    fn schema(&self, split: &Split) -> Result<SplitSchema>;

    /// Read one split, pushing rows into the sink. All outcomes (data,
    /// end-of-data, or a terminal error) are communicated through the
    /// sink and its queue; the call itself returns nothing.
    async fn read_split(&self, token: CancellationToken, split: &Split, sink: Sink);
}

/// The backend adapter triple: everything backend-specific behind the
/// uniform read capability
pub struct Preset {
    pub formatter: Arc<dyn SqlFormatter>,
    pub connections: Arc<dyn ConnectionManager>,
    pub type_mapper: Arc<dyn TypeMapper>,
}

impl Preset {
    pub fn new(
        formatter: Arc<dyn SqlFormatter>,
        connections: Arc<dyn ConnectionManager>,
        type_mapper: Arc<dyn TypeMapper>,
    ) -> Self {
        Self {
            formatter,
            connections,
            type_mapper,
        }
    }
}

/// Generic data source over any relational backend preset
pub struct RdbmsDataSource {
    kind: &'static str,
    preset: Preset,
}

impl std::fmt::Debug for RdbmsDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdbmsDataSource")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl RdbmsDataSource {
    pub fn new(kind: &'static str, preset: Preset) -> Self {
        Self { kind, preset }
    }

    async fn do_read_split(
        &self,
        token: &CancellationToken,
        split: &Split,
        sink: &mut Sink,
    ) -> Result<()> {
        split.validate()?;

        let sql = self.preset.formatter.format_select(split)?;
        debug!(backend = self.kind, table = %split.table, query = %sql, "reading split");

        // Dropping the acquire future on cancellation abandons the dial;
        // the connection itself is released when it goes out of scope at
        // the end of this function, on every path.
        let mut connection = tokio::select! {
            _ = token.cancelled() => return Err(Error::Cancelled),
            acquired = self.preset.connections.acquire(&split.endpoint) => acquired?,
        };

        let schema = Arc::new(self.preset.type_mapper.schema(split)?);
        let mut rows = connection.query(&sql, &schema).await?;

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                next = rows.next() => match next {
                    Some(Ok(row)) => sink.push_row(row).await?,
                    Some(Err(e)) => return Err(e),
                    None => break,
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl DataSource for RdbmsDataSource {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn schema(&self, split: &Split) -> Result<SplitSchema> {
        self.preset.type_mapper.schema(split)
    }

    async fn read_split(&self, token: CancellationToken, split: &Split, mut sink: Sink) {
        match self.do_read_split(&token, split, &mut sink).await {
            Ok(()) => {
                if let Err(e) = sink.close().await {
                    debug!(backend = self.kind, "sink close interrupted: {}", e);
                }
            }
            Err(e) if e.is_cancelled() => {
                debug!(backend = self.kind, table = %split.table, "split read cancelled");
                sink.fail(Error::Cancelled).await;
            }
            Err(e) => {
                error!(backend = self.kind, table = %split.table, "split read failed: {}", e);
                sink.fail(e).await;
            }
        }
    }
}
