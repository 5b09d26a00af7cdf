//! Metrics agent: samples host and process metrics and pushes them to the
//! metrics server over every enabled delivery channel.

pub mod app;
pub mod collector;
pub mod config;
pub mod report;

pub use collector::Collector;
pub use collector::Sampler;
pub use collector::Snapshot;
pub use report::ReportLoop;
