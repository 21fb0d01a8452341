//! # fedgate-server
//!
//! The inbound surface of the connector: the backend registry, the
//! read-splits service, the HTTP routes, and the server configuration.
//!
//! A request carries a list of planned splits. The service resolves each
//! split's backend through the registry, runs one streamer session per
//! split sequentially, and the route layer turns the session's outbound
//! messages into a chunked NDJSON response body. A failed or cancelled
//! split ends the whole call with a terminal error event.

pub mod config;
pub mod registry;
pub mod routes;
pub mod service;

pub use config::{BackendsConfig, ServerConfig};
pub use registry::DataSourceRegistry;
pub use routes::{router, AppState};
pub use service::ReadSplitsService;
