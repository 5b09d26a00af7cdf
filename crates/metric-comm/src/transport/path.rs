use api_types::MetricSample;
use async_trait::async_trait;
use tracing::debug;

use super::Delivery;
use super::HttpSender;
use crate::config::Channel;
use crate::config::ClientConfig;
use crate::encoder::Encoder;
use crate::error::CommResult;

/// `POST /update/{type}/{name}/{value}`, one request per sample.
#[derive(Debug, Clone)]
pub struct PathDelivery {
    sender: HttpSender,
    encoder: Encoder,
}

impl PathDelivery {
    pub fn new(config: &ClientConfig) -> CommResult<Self> {
        Ok(Self {
            sender: HttpSender::new(&config.server_url, config)?,
            encoder: HttpSender::encoder(config),
        })
    }
}

#[async_trait]
impl Delivery for PathDelivery {
    fn channel(&self) -> Channel {
        Channel::Path
    }

    async fn deliver(&self, samples: &[MetricSample]) -> CommResult<()> {
        for sample in samples {
            let request = self.encoder.encode_path(sample)?;
            self.sender.send(request).await?;
            debug!(id = %sample.id, kind = %sample.kind(), "Delivered sample over path channel");
        }
        Ok(())
    }
}
