use std::time::Duration;

use error_stack::Report;
use poem::listener::TcpListener;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::instrument;

use super::errors::ApiError;
use super::http_routes;
use super::rpc_routes;
use super::IngressConfig;
use crate::storage::MetricStore;

/// Metrics server: the HTTP listener and the RPC listener over one store.
pub struct ApiServer {
    store: MetricStore,
    http_addr: String,
    rpc_addr: String,
    ingress: IngressConfig,
    shutdown_timeout: Duration,
}

impl ApiServer {
    pub fn new(
        store: MetricStore,
        http_addr: String,
        rpc_addr: String,
        ingress: IngressConfig,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            store,
            http_addr,
            rpc_addr,
            ingress,
            shutdown_timeout,
        }
    }

    /// Serve both listeners until `cancel` fires, then drain in-flight requests.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if either listener fails to bind or stops with an error
    #[instrument(skip_all, fields(http = %self.http_addr, rpc = %self.rpc_addr))]
    pub async fn run(self, cancel: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting metrics server");

        let http = Server::new(TcpListener::bind(self.http_addr.clone()))
            .run_with_graceful_shutdown(
                http_routes(self.store.clone(), &self.ingress),
                cancel.clone().cancelled_owned(),
                Some(self.shutdown_timeout),
            );
        let rpc = Server::new(TcpListener::bind(self.rpc_addr.clone()))
            .run_with_graceful_shutdown(
                rpc_routes(self.store.clone(), &self.ingress),
                cancel.clone().cancelled_owned(),
                Some(self.shutdown_timeout),
            );

        let result = tokio::try_join!(
            async {
                http.await.map_err(|e| {
                    error!("HTTP listener failed: {e}");
                    Report::new(ApiError::ServerError {
                        message: format!("HTTP listener on {} failed: {e}", self.http_addr),
                    })
                })
            },
            async {
                rpc.await.map_err(|e| {
                    error!("RPC listener failed: {e}");
                    Report::new(ApiError::ServerError {
                        message: format!("RPC listener on {} failed: {e}", self.rpc_addr),
                    })
                })
            },
        );

        // one listener failing takes the other down with it
        cancel.cancel();
        result.map(|_| info!("Metrics server stopped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn stops_when_cancelled() {
        let cancel = CancellationToken::new();
        let server = ApiServer::new(
            MetricStore::new(),
            "127.0.0.1:0".to_string(),
            "127.0.0.1:0".to_string(),
            IngressConfig::default(),
            Duration::from_secs(1),
        );
        let handle = tokio::spawn(server.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("should stop in time")
            .expect("should not panic");
        assert!(result.is_ok());
    }

    #[test_log::test(tokio::test)]
    async fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let server = ApiServer::new(
            MetricStore::new(),
            addr,
            "127.0.0.1:0".to_string(),
            IngressConfig::default(),
            Duration::from_secs(1),
        );

        let result = tokio::time::timeout(Duration::from_secs(5), server.run(CancellationToken::new()))
            .await
            .expect("should fail fast");

        assert!(result.is_err());
    }
}
