//! Delivery channels.
//!
//! Every channel implements [`Delivery`]: a single attempt at pushing samples
//! to the server. Retrying is layered on top by [`Retrying`], so the three
//! channels share one retry and error path.

mod json;
mod path;
mod rpc;

use std::net::IpAddr;

use api_types::MetricSample;
use api_types::REAL_IP_HEADER;
use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
pub use json::BatchDelivery;
pub use json::JsonDelivery;
pub use path::PathDelivery;
use reqwest::Client;
pub use rpc::RpcDelivery;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use url::Url;

use crate::codec;
use crate::config::Channel;
use crate::config::ClientConfig;
use crate::encoder::EncodedRequest;
use crate::encoder::Encoder;
use crate::error::CommError;
use crate::error::CommResult;
use crate::retry::RetryPolicy;

/// A way of pushing samples to the server.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn channel(&self) -> Channel;

    /// Group a report into pushes. Each push is delivered (and retried) on its own.
    ///
    /// Defaults to one push per sample.
    fn split<'a>(&self, samples: &'a [MetricSample]) -> Vec<&'a [MetricSample]> {
        samples.chunks(1).collect()
    }

    /// Make one attempt at delivering a push.
    async fn deliver(&self, samples: &[MetricSample]) -> CommResult<()>;
}

/// Wraps a channel with a cancellable retry schedule.
pub struct Retrying<D> {
    inner: D,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<D: Delivery> Retrying<D> {
    pub fn new(inner: D, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            cancel,
        }
    }
}

#[async_trait]
impl<D: Delivery> Delivery for Retrying<D> {
    fn channel(&self) -> Channel {
        self.inner.channel()
    }

    fn split<'a>(&self, samples: &'a [MetricSample]) -> Vec<&'a [MetricSample]> {
        self.inner.split(samples)
    }

    async fn deliver(&self, samples: &[MetricSample]) -> CommResult<()> {
        self.policy
            .run(&self.cancel, || self.inner.deliver(samples))
            .await
    }
}

/// Build the retried delivery for `channel` from a client config.
pub fn build_delivery(
    channel: Channel,
    config: &ClientConfig,
    cancel: CancellationToken,
) -> CommResult<Box<dyn Delivery>> {
    let policy = RetryPolicy::new(config.retry_delays.clone());
    let delivery: Box<dyn Delivery> = match channel {
        Channel::Path => Box::new(Retrying::new(PathDelivery::new(config)?, policy, cancel)),
        Channel::Json => Box::new(Retrying::new(JsonDelivery::new(config)?, policy, cancel)),
        Channel::Batch => Box::new(Retrying::new(BatchDelivery::new(config)?, policy, cancel)),
        Channel::Rpc => Box::new(Retrying::new(RpcDelivery::new(config)?, policy, cancel)),
    };
    Ok(delivery)
}

/// Parse a server address, accepting bare `host:port`.
pub fn parse_base_url(raw: &str) -> CommResult<Url> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    Url::parse(&with_scheme).change_context(CommError::Configuration {
        message: format!("Invalid server address `{raw}`"),
    })
}

/// Shared HTTP sender: one attempt per call, no retries.
#[derive(Debug, Clone)]
pub(crate) struct HttpSender {
    http: Client,
    base: Url,
    real_ip: Option<IpAddr>,
    timeout_secs: u64,
}

impl HttpSender {
    pub(crate) fn new(base_url: &str, config: &ClientConfig) -> CommResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .change_context(CommError::Configuration {
                message: "Failed to create HTTP client".into(),
            })?;

        Ok(Self {
            http,
            base: parse_base_url(base_url)?,
            real_ip: config.real_ip,
            timeout_secs: config.request_timeout.as_secs(),
        })
    }

    pub(crate) fn encoder(config: &ClientConfig) -> Encoder {
        Encoder::new(config.signing_key.as_deref(), config.compress)
    }

    fn url(&self, segments: &[String]) -> CommResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                Report::new(CommError::Configuration {
                    message: format!("Server address `{}` cannot be a base", self.base),
                })
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// POST the request and return the (inflated) response body.
    pub(crate) async fn send(&self, request: EncodedRequest) -> CommResult<Vec<u8>> {
        let url = self.url(&request.segments)?;
        trace!(%url, bytes = request.body.len(), "Sending request");

        let mut builder = self.http.post(url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(ip) = self.real_ip {
            builder = builder.header(REAL_IP_HEADER, ip.to_string());
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| Report::new(CommError::from_reqwest(&e, self.timeout_secs)))?;

        let status = response.status();
        let gzipped = response
            .headers()
            .get(reqwest::header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
        let body = response
            .bytes()
            .await
            .map_err(|e| Report::new(CommError::from_reqwest(&e, self.timeout_secs)))?;
        let body = if gzipped && !body.is_empty() {
            codec::decompress(&body)?
        } else {
            body.to_vec()
        };

        if !status.is_success() {
            return Err(Report::new(CommError::Http {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).trim().to_string(),
            }));
        }
        Ok(body)
    }
}
