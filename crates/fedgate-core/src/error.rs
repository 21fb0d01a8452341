use thiserror::Error;

/// Unified error type for all connector operations
#[derive(Error, Debug)]
pub enum Error {
    /// Requested backend kind has no registered adapter.
    /// Permanent condition, signals a planning or configuration bug.
    #[error("Data source not supported: {0}")]
    UnsupportedSource(String),

    /// Connection failed (authentication, network, etc.)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Backend column type could not be mapped to a logical type
    #[error("Type mapping failed: {0}")]
    TypeMapping(String),

    /// Split descriptor is malformed or incomplete
    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    /// Sending to the outbound stream failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The session context was cancelled. Distinct terminal outcome,
    /// never a backend failure.
    #[error("Read cancelled")]
    Cancelled,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unsupported data source error
    pub fn unsupported_source(kind: impl Into<String>) -> Self {
        Error::UnsupportedSource(kind.into())
    }

    /// Create a connection failure error
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Error::ConnectionFailed(msg.into())
    }

    /// Create a query failure error
    pub fn query_failed(msg: impl Into<String>) -> Self {
        Error::QueryFailed(msg.into())
    }

    /// Create an invalid split error
    pub fn invalid_split(msg: impl Into<String>) -> Self {
        Error::InvalidSplit(msg.into())
    }

    /// True when this error represents cancellation rather than a fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unsupported_source("oracle");
        assert_eq!(err.to_string(), "Data source not supported: oracle");
        assert!(!err.is_cancelled());
        assert!(Error::Cancelled.is_cancelled());
    }
}
