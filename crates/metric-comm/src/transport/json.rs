use api_types::MetricSample;
use async_trait::async_trait;
use tracing::debug;

use super::Delivery;
use super::HttpSender;
use crate::config::Channel;
use crate::config::ClientConfig;
use crate::encoder::Encoder;
use crate::error::CommResult;

/// `POST /update/` with one JSON sample per request.
#[derive(Debug, Clone)]
pub struct JsonDelivery {
    sender: HttpSender,
    encoder: Encoder,
}

impl JsonDelivery {
    pub fn new(config: &ClientConfig) -> CommResult<Self> {
        Ok(Self {
            sender: HttpSender::new(&config.server_url, config)?,
            encoder: HttpSender::encoder(config),
        })
    }
}

#[async_trait]
impl Delivery for JsonDelivery {
    fn channel(&self) -> Channel {
        Channel::Json
    }

    async fn deliver(&self, samples: &[MetricSample]) -> CommResult<()> {
        for sample in samples {
            let request = self.encoder.encode_json(sample)?;
            self.sender.send(request).await?;
            debug!(id = %sample.id, kind = %sample.kind(), "Delivered sample over json channel");
        }
        Ok(())
    }
}

/// `POST /updates/` with the whole report as one JSON array.
#[derive(Debug, Clone)]
pub struct BatchDelivery {
    sender: HttpSender,
    encoder: Encoder,
}

impl BatchDelivery {
    pub fn new(config: &ClientConfig) -> CommResult<Self> {
        Ok(Self {
            sender: HttpSender::new(&config.server_url, config)?,
            encoder: HttpSender::encoder(config),
        })
    }
}

#[async_trait]
impl Delivery for BatchDelivery {
    fn channel(&self) -> Channel {
        Channel::Batch
    }

    fn split<'a>(&self, samples: &'a [MetricSample]) -> Vec<&'a [MetricSample]> {
        // the server rejects empty batches
        if samples.is_empty() {
            Vec::new()
        } else {
            vec![samples]
        }
    }

    async fn deliver(&self, samples: &[MetricSample]) -> CommResult<()> {
        let request = self.encoder.encode_batch(samples)?;
        self.sender.send(request).await?;
        debug!(count = samples.len(), "Delivered batch");
        Ok(())
    }
}
