use anyhow::Result;
use clap::Parser;
use metrics_agent::config::AgentArgs;
use utils::logging;
use utils::version;

#[tokio::main]
async fn main() -> Result<()> {
    logging::install_panic_hook();
    let args = AgentArgs::parse();
    let _guard = logging::init();

    tracing::info!("Starting metrics agent {}", &**version::VERSION);

    metrics_agent::app::run(args).await
}
