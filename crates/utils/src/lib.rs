//! Helpers shared by the metrics agent and server binaries.

pub mod logging;
pub mod shutdown;
pub mod version;
