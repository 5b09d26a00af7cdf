//! JSON-RPC endpoint for `Metrics.AddCounterMetric` and `Metrics.AddGaugeMetric`.

use api_types::rpc::AddMetricResponse;
use api_types::rpc::JsonRpcError;
use api_types::rpc::JsonRpcRequest;
use api_types::rpc::JsonRpcResponse;
use api_types::rpc::MetricCall;
use poem::handler;
use poem::web::Data;
use poem::web::Json;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use super::errors::ApiError;
use crate::storage::MetricStore;

/// `POST /rpc`
///
/// Protocol failures are answered with a JSON-RPC error object; a call that
/// decodes but carries an unusable metric succeeds with a non-empty `error`.
#[handler]
pub async fn handle(body: Vec<u8>, store: Data<&MetricStore>) -> poem::Result<Json<JsonRpcResponse>> {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Unparsable RPC request");
            return Ok(Json(JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::parse_error(),
            )));
        }
    };
    let id = request.id.clone();

    if request.jsonrpc != "2.0" {
        return Ok(Json(JsonRpcResponse::error(id, JsonRpcError::invalid_request())));
    }

    let call = match MetricCall::from_request(&request) {
        Ok(Some(call)) => call,
        Ok(None) => {
            warn!(method = %request.method, "Unknown RPC method");
            return Ok(Json(JsonRpcResponse::error(id, JsonRpcError::method_not_found())));
        }
        Err(e) => {
            return Ok(Json(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_params(&e.to_string()),
            )));
        }
    };

    let method = call.method();
    let outcome = match call.into_sample() {
        Some(sample) => {
            store.apply(&sample);
            debug!(id = %sample.id, method, "Applied RPC update");
            AddMetricResponse::default()
        }
        None => AddMetricResponse {
            error: "metric name must not be empty and value must be finite".into(),
        },
    };

    let result = serde_json::to_value(&outcome).map_err(|e| ApiError::ServerError {
        message: format!("Failed to encode RPC result: {e}"),
    })?;
    Ok(Json(JsonRpcResponse::success(id, result)))
}
