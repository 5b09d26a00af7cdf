//! HTTP and RPC surface of the metrics server
//!
//! # HTTP endpoints
//!
//! - `POST /update/:kind/:name/:value` - path-encoded update
//! - `POST /update/` - single JSON sample
//! - `POST /updates/` - JSON array of samples, applied atomically
//! - `GET /value/:kind/:name` - current value as plain text
//! - `POST /value/` - current value as JSON
//! - `GET /` - HTML listing of all series
//!
//! # RPC endpoint
//!
//! - `POST /rpc` - JSON-RPC 2.0, served on its own listener
//!
//! Ingestion routes sit behind the trusted-subnet and signature checks; every
//! route is logged and gzip-aware. See [`middleware`] for the ordering.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod rpc;
pub mod server;

use ipnet::IpNet;
use poem::endpoint::BoxEndpoint;
use poem::get;
use poem::post;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;

use self::middleware::Gzip;
use self::middleware::RequestLog;
use self::middleware::TrustedSubnet;
use self::middleware::VerifySignature;
use crate::storage::MetricStore;

/// Checks applied to ingestion requests.
#[derive(Debug, Clone, Default)]
pub struct IngressConfig {
    /// shared HMAC key; `None` disables signature checks
    pub signing_key: Option<String>,
    /// trusted client subnet; `None` admits every address
    pub trusted_subnet: Option<IpNet>,
}

fn guarded<E>(ep: E, ingress: &IngressConfig) -> BoxEndpoint<'static>
where E: Endpoint + 'static {
    ep.with(VerifySignature::new(ingress.signing_key.as_deref()))
        .with(TrustedSubnet::new(ingress.trusted_subnet))
        .boxed()
}

/// Routes of the HTTP listener with the full middleware chain.
pub fn http_routes(store: MetricStore, ingress: &IngressConfig) -> impl Endpoint {
    Route::new()
        .at("/", get(handlers::index))
        .at(
            "/update/:kind/:name/:value",
            guarded(post(handlers::update_path), ingress),
        )
        .at(
            "/update/:kind/:name",
            guarded(post(handlers::update_path_missing_value), ingress),
        )
        .at("/update/", guarded(post(handlers::update_json), ingress))
        .at("/updates/", guarded(post(handlers::update_batch), ingress))
        .at("/value/:kind/:name", get(handlers::value_path))
        .at("/value/", post(handlers::value_json))
        .data(store)
        .with(Gzip::default())
        .with(RequestLog)
}

/// Routes of the RPC listener with the same middleware chain.
pub fn rpc_routes(store: MetricStore, ingress: &IngressConfig) -> impl Endpoint {
    Route::new()
        .at("/rpc", guarded(post(rpc::handle), ingress))
        .data(store)
        .with(Gzip::default())
        .with(RequestLog)
}
