use anyhow::Result;
use clap::Parser;
use metrics_server::config::ServerArgs;
use utils::logging;
use utils::version;

#[tokio::main]
async fn main() -> Result<()> {
    logging::install_panic_hook();
    let args = ServerArgs::parse();
    let _guard = logging::init();

    tracing::info!("Starting metrics server {}", &**version::VERSION);

    metrics_server::app::run(args).await
}
