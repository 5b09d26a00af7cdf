//! provides logging helpers

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// initiate the global tracing subscriber
///
/// Events are written to stderr through a non-blocking writer; keep the
/// returned guard alive until shutdown so buffered lines are flushed.
pub fn init() -> WorkerGuard {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let fmt_layer = layer()
        .with_writer(writer)
        .with_target(true)
        .with_filter(env_filter);

    registry().with(fmt_layer).init();
    guard
}

/// Sets up a panic hook that reports panics through tracing as well.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}
