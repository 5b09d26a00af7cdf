use anyhow::Result;
use tokio_util::sync::CancellationToken;
use utils::shutdown::spawn_signal_handler;

use crate::api::server::ApiServer;
use crate::config::ServerArgs;
use crate::storage::MetricStore;

/// Run the server until a shutdown signal arrives.
pub async fn run(args: ServerArgs) -> Result<()> {
    let token = CancellationToken::new();
    let signals = spawn_signal_handler(token.clone())?;

    let server = ApiServer::new(
        MetricStore::new(),
        args.address.clone(),
        args.rpc_address.clone(),
        args.ingress(),
        args.shutdown_timeout(),
    );
    let result = server.run(token.clone()).await;

    token.cancel();
    if let Err(e) = signals.await {
        tracing::error!("Signal handler failed: {e}");
    }
    result.map_err(|report| anyhow::anyhow!("{report:?}"))
}
