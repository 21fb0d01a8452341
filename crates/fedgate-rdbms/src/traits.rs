use async_trait::async_trait;
use fedgate_core::{Endpoint, LogicalColumn, LogicalType, Result, Row, Split, SplitSchema};
use futures::stream::BoxStream;

/// Stream of rows already converted into the logical type system
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Renders backend-native SQL for a split
pub trait SqlFormatter: Send + Sync {
    /// Build the SELECT for the split's projection, predicate and limit.
    /// The predicate text is embedded verbatim; dialect translation is
    /// the planner's job.
    fn format_select(&self, split: &Split) -> Result<String>;
}

/// Maps backend-native column types into the common logical type system
pub trait TypeMapper: Send + Sync {
    /// Map one backend type name
    fn map(&self, backend_type: &str) -> Result<LogicalType>;

    /// Derive the logical schema of a split from its declared column types
    fn schema(&self, split: &Split) -> Result<SplitSchema> {
        let columns = split
            .columns
            .iter()
            .map(|c| {
                Ok(LogicalColumn::new(
                    c.name.clone(),
                    self.map(&c.backend_type)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SplitSchema::new(columns))
    }
}

/// One live backend connection.
///
/// Dropping the connection releases it back to its manager. Release is
/// scoped to the read, guaranteed on every exit path including errors
/// and cancellation.
#[async_trait]
pub trait Connection: Send {
    /// Execute the query and stream back rows decoded per the schema
    async fn query(&mut self, sql: &str, schema: &SplitSchema) -> Result<RowStream>;
}

/// Hands out connections for an endpoint. Shared across concurrent
/// sessions; implementations serialize acquisition internally.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn acquire(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>>;
}
