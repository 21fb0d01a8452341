//! # fedgate-paging
//!
//! The columnar buffer pipeline between a data source and the streamer.
//!
//! A [`Sink`] accumulates rows into size-bounded [`ColumnarBuffer`]s and
//! pushes them as [`ReadResult`]s onto a bounded queue. The queue bound is
//! the backpressure mechanism: a slow consumer blocks the producer's push,
//! which throttles backend row pulling and caps memory at roughly
//! `queue capacity x buffer size`.
//!
//! The queue is the single channel multiplexing data and terminal errors:
//! a backend fault mid-read arrives as a `ReadResult::Error` in correct
//! position relative to the buffers produced before it, so the consumer
//! never needs a second signaling path.
//!
//! Buffers have single ownership at every point in time (sink while
//! accumulating, queue slot in transit, consumer while sending) and their
//! [`MemoryQuota`] reservation is released exactly once, when the final
//! owner drops them.

pub mod buffer;
pub mod sink;

pub use buffer::{ColumnData, ColumnarBuffer, MemoryQuota, Page};
pub use sink::{PagingConfig, ReadResult, Sink};
