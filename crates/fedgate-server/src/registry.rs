use crate::config::BackendsConfig;
use fedgate_core::{BackendKind, Result};
use fedgate_rdbms::{DataSource, RdbmsDataSource};
use std::sync::Arc;
use tracing::debug;

/// Maps a backend-kind tag to its preconstructed data source.
///
/// Adapter presets are built once at startup; resolution only hands out
/// references, so it is safe and cheap for concurrent calls. An unknown
/// tag is a permanent unsupported-source error: a planning or
/// configuration bug, never retried.
pub struct DataSourceRegistry {
    clickhouse: Arc<RdbmsDataSource>,
    postgres: Arc<RdbmsDataSource>,
}

impl DataSourceRegistry {
    pub fn new(config: &BackendsConfig) -> Result<Self> {
        debug!("constructing backend adapter presets");

        Ok(Self {
            clickhouse: Arc::new(RdbmsDataSource::new(
                "clickhouse",
                fedgate_clickhouse::preset(config.clickhouse.clone())?,
            )),
            postgres: Arc::new(RdbmsDataSource::new(
                "postgres",
                fedgate_postgres::preset(config.postgres.clone()),
            )),
        })
    }

    /// Resolve a backend-kind tag as it appears in a split
    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn DataSource>> {
        match kind.parse::<BackendKind>()? {
            BackendKind::ClickHouse => Ok(self.clickhouse.clone()),
            BackendKind::Postgres => Ok(self.postgres.clone()),
        }
    }
}
