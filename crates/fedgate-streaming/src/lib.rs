//! # fedgate-streaming
//!
//! The per-session orchestrator between a data source and the outbound
//! response stream.
//!
//! A [`Streamer`] owns one split read: it derives a session token from the
//! transport's own cancellation token, launches the data source read as a
//! background producer task, and drains the result queue in the
//! foreground, turning each filled buffer into exactly one outbound
//! message in production order. Whichever side notices termination first
//! (queue closure, a transport send failure, or the transport's own
//! cancellation) cancels the session token, and the streamer always
//! waits for the producer task to actually finish before the session
//! counts as torn down.

pub mod streamer;

pub use streamer::{ResponseStream, SessionStats, Streamer};
