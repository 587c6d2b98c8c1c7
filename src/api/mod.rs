//! HTTP API Module
//!
//! Serves the published peer table and map views, the network selector,
//! and Prometheus/JSON metrics.

mod routes;
mod metrics;

pub use routes::run_api_server;
pub use metrics::Metrics;
