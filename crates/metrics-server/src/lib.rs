//! Metrics server: ingests gauge and counter samples over HTTP and JSON-RPC
//! and serves their current values.

pub mod api;
pub mod app;
pub mod config;
pub mod storage;

pub use api::IngressConfig;
pub use storage::MetricStore;
