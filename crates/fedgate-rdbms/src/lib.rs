//! # fedgate-rdbms
//!
//! The uniform read capability over relational backends.
//!
//! Every backend plugs in as a [`Preset`]: the
//! {[`SqlFormatter`], [`ConnectionManager`], [`TypeMapper`]} triple behind
//! which all backend-specific behavior lives. [`RdbmsDataSource`] drives
//! any preset identically: format the split's SELECT, acquire a
//! connection, stream rows converted into the logical type system, and
//! feed the sink. All outcomes (rows, end-of-data, errors) travel through
//! the sink's queue; the read itself returns nothing.
//!
//! Adding a backend is an adapter crate implementing the three contracts
//! plus a registry entry; the generic reader never changes.

pub mod datasource;
pub mod traits;

pub use datasource::{DataSource, Preset, RdbmsDataSource};
pub use traits::{Connection, ConnectionManager, RowStream, SqlFormatter, TypeMapper};
