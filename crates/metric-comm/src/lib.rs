//! Agent to server metric delivery.
//!
//! This crate holds everything both ends of the wire agree on, plus the
//! agent's side of it:
//!
//! - [`codec`]: gzip and HMAC-SHA256 signing, shared with the server
//! - [`Encoder`]: pure rendering of samples into path, JSON, batch and RPC requests
//! - [`Delivery`]: one contract with a channel per transport
//! - [`RetryPolicy`]: cancellable fixed-delay retry on connection failures
//!
//! # Examples
//!
//! ```no_run
//! # use metric_comm::{build_delivery, Channel, ClientConfig, Delivery};
//! # use api_types::MetricSample;
//! # use tokio_util::sync::CancellationToken;
//! # async fn run() -> metric_comm::CommResult<()> {
//! let config = ClientConfig::new("http://localhost:8080", "http://localhost:3200")
//!     .with_signing_key(Some("secret".into()));
//! let delivery = build_delivery(Channel::Batch, &config, CancellationToken::new())?;
//!
//! let samples = vec![MetricSample::counter("PollCount", 1)];
//! for push in delivery.split(&samples) {
//!     delivery.deliver(push).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod encoder;
pub mod error;
pub mod retry;
pub mod transport;

pub use config::Channel;
pub use config::ClientConfig;
pub use encoder::EncodedRequest;
pub use encoder::Encoder;
pub use error::CommError;
pub use error::CommResult;
pub use retry::RetryPolicy;
pub use transport::build_delivery;
pub use transport::BatchDelivery;
pub use transport::Delivery;
pub use transport::JsonDelivery;
pub use transport::PathDelivery;
pub use transport::Retrying;
pub use transport::RpcDelivery;
