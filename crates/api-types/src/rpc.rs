//! Typed RPC messages for the metrics service.
//!
//! The RPC channel speaks JSON-RPC 2.0 over HTTP. Two methods are exposed,
//! [`ADD_COUNTER_METHOD`] and [`ADD_GAUGE_METHOD`], each taking a typed request
//! and answering with an [`AddMetricResponse`] whose `error` is empty on success.
//!
//! ```
//! use api_types::rpc::{AddGaugeRequest, GaugeMetric, JsonRpcRequest, ADD_GAUGE_METHOD};
//!
//! let params = AddGaugeRequest { metric: GaugeMetric { name: "Alloc".into(), value: 1.0 } };
//! let request = JsonRpcRequest::new(ADD_GAUGE_METHOD, &params, 1).unwrap();
//! assert_eq!(request.jsonrpc, "2.0");
//! ```

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::MetricSample;
use crate::MetricValue;

pub const ADD_COUNTER_METHOD: &str = "Metrics.AddCounterMetric";
pub const ADD_GAUGE_METHOD: &str = "Metrics.AddGaugeMetric";

/// Invalid JSON was received by the server
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid Request object
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist / is not available
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameter(s)
pub const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterMetric {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeMetric {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddCounterRequest {
    pub metric: CounterMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddGaugeRequest {
    pub metric: GaugeMetric,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddMetricResponse {
    #[serde(default)]
    pub error: String,
}

/// Typed RPC call derived from a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricCall {
    AddCounter(AddCounterRequest),
    AddGauge(AddGaugeRequest),
}

impl MetricCall {
    pub fn method(&self) -> &'static str {
        match self {
            MetricCall::AddCounter(_) => ADD_COUNTER_METHOD,
            MetricCall::AddGauge(_) => ADD_GAUGE_METHOD,
        }
    }

    pub fn params(&self) -> Result<Value, serde_json::Error> {
        match self {
            MetricCall::AddCounter(req) => serde_json::to_value(req),
            MetricCall::AddGauge(req) => serde_json::to_value(req),
        }
    }

    /// Decode the params of a request for a known method.
    ///
    /// Returns `Ok(None)` for an unknown method.
    pub fn from_request(request: &JsonRpcRequest) -> Result<Option<Self>, serde_json::Error> {
        let call = match request.method.as_str() {
            ADD_COUNTER_METHOD => {
                MetricCall::AddCounter(serde_json::from_value(request.params.clone())?)
            }
            ADD_GAUGE_METHOD => MetricCall::AddGauge(serde_json::from_value(request.params.clone())?),
            _ => return Ok(None),
        };
        Ok(Some(call))
    }

    /// Convert into a sample, rejecting an empty series name.
    pub fn into_sample(self) -> Option<MetricSample> {
        let sample = match self {
            MetricCall::AddCounter(req) => MetricSample::counter(req.metric.name, req.metric.value),
            MetricCall::AddGauge(req) => MetricSample::gauge(req.metric.name, req.metric.value),
        };
        if sample.id.is_empty() {
            return None;
        }
        if let MetricValue::Gauge(value) = sample.value {
            if !value.is_finite() {
                return None;
            }
        }
        Some(sample)
    }
}

impl From<&MetricSample> for MetricCall {
    fn from(sample: &MetricSample) -> Self {
        match sample.value {
            MetricValue::Counter(delta) => MetricCall::AddCounter(AddCounterRequest {
                metric: CounterMetric {
                    name: sample.id.clone(),
                    value: delta,
                },
            }),
            MetricValue::Gauge(value) => MetricCall::AddGauge(AddGaugeRequest {
                metric: GaugeMetric {
                    name: sample.id.clone(),
                    value,
                },
            }),
        }
    }
}

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    pub fn new(
        method: &str,
        params: &impl Serialize,
        id: impl Into<Value>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params: serde_json::to_value(params)?,
            id: id.into(),
        })
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC 2.0 error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcError {
    pub fn parse_error() -> Self {
        Self {
            code: PARSE_ERROR,
            message: "Parse error".into(),
        }
    }

    pub fn invalid_request() -> Self {
        Self {
            code: INVALID_REQUEST,
            message: "Invalid Request".into(),
        }
    }

    pub fn method_not_found() -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: "Method not found".into(),
        }
    }

    pub fn invalid_params(msg: &str) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: msg.into(),
        }
    }
}
