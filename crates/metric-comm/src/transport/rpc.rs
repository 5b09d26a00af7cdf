use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use api_types::rpc::AddMetricResponse;
use api_types::rpc::JsonRpcResponse;
use api_types::rpc::MetricCall;
use api_types::MetricSample;
use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;

use super::Delivery;
use super::HttpSender;
use crate::config::Channel;
use crate::config::ClientConfig;
use crate::encoder::Encoder;
use crate::error::CommError;
use crate::error::CommResult;

/// JSON-RPC `Metrics.AddCounterMetric` / `Metrics.AddGaugeMetric`, one call per sample.
#[derive(Debug)]
pub struct RpcDelivery {
    sender: HttpSender,
    encoder: Encoder,
    next_id: AtomicU64,
}

impl RpcDelivery {
    pub fn new(config: &ClientConfig) -> CommResult<Self> {
        Ok(Self {
            sender: HttpSender::new(&config.rpc_url, config)?,
            encoder: HttpSender::encoder(config),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, call: &MetricCall) -> CommResult<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = self.encoder.encode_rpc(call, id)?;
        let body = self.sender.send(request).await?;

        let response: JsonRpcResponse =
            serde_json::from_slice(&body).change_context(CommError::Serialization {
                message: "Malformed RPC response".into(),
            })?;
        if let Some(error) = response.error {
            return Err(Report::new(CommError::Rpc {
                message: format!("{} ({})", error.message, error.code),
            }));
        }

        let result: AddMetricResponse = response
            .result
            .map(serde_json::from_value)
            .transpose()
            .change_context(CommError::Serialization {
                message: "Malformed RPC result".into(),
            })?
            .unwrap_or_default();
        if !result.error.is_empty() {
            return Err(Report::new(CommError::Rpc {
                message: result.error,
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl Delivery for RpcDelivery {
    fn channel(&self) -> Channel {
        Channel::Rpc
    }

    async fn deliver(&self, samples: &[MetricSample]) -> CommResult<()> {
        for sample in samples {
            let call = MetricCall::from(sample);
            self.call(&call).await?;
            debug!(id = %sample.id, method = call.method(), "Delivered sample over rpc channel");
        }
        Ok(())
    }
}
