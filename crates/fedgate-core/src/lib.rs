//! # fedgate-core
//!
//! Shared vocabulary for the fedgate connector workspace.
//!
//! This crate defines the types every other fedgate crate speaks:
//!
//! - **Split**: a planned, self-contained unit of query work bound to one
//!   backend endpoint. Splits are produced by an external planner and
//!   consumed read-only here.
//! - **Logical types and values**: the common type system backend column
//!   types are mapped into before rows enter the columnar pipeline.
//! - **Wire structs**: the request/response shapes of the `read_splits`
//!   streaming call.
//! - **Error**: the unified error type for all connector operations.
//!
//! Backend-specific behavior (SQL formatting, connections, type mapping)
//! lives in the adapter crates; orchestration lives in `fedgate-streaming`
//! and `fedgate-server`.

pub mod error;
pub mod split;
pub mod types;
pub mod wire;

// Re-export commonly used items
pub use error::{Error, Result};
pub use split::{BackendKind, ColumnRef, Endpoint, Split};
pub use types::{LogicalColumn, LogicalType, Row, SplitSchema, Value};
pub use wire::{
    PagingOverrides, ReadSplitsEvent, ReadSplitsRequest, ReadSplitsResponse, ReadStats,
    StreamError,
};
