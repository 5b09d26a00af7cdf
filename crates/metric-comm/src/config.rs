//! client config
//!
//! This config is shared by every delivery channel.

use core::fmt;
use core::str::FromStr;
use std::net::IpAddr;
use std::time::Duration;

/// Delivery channel pushing samples to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// `POST /update/{type}/{name}/{value}`
    Path,
    /// `POST /update/` with a single JSON sample
    Json,
    /// `POST /updates/` with a JSON array
    Batch,
    /// JSON-RPC add-counter / add-gauge
    Rpc,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Path, Channel::Json, Channel::Batch, Channel::Rpc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Path => "path",
            Channel::Json => "json",
            Channel::Batch => "batch",
            Channel::Rpc => "rpc",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown delivery channel `{s}`"))
    }
}

/// HTTP/RPC client config.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// server base url, e.g. `http://localhost:8080`
    pub server_url: String,
    /// rpc server base url
    pub rpc_url: String,
    /// timeout of a single attempt
    pub request_timeout: Duration,
    /// delays before each retry on transient failure
    pub retry_delays: Vec<Duration>,
    /// shared HMAC key; `None` disables signing
    pub signing_key: Option<String>,
    /// gzip structured bodies
    pub compress: bool,
    /// value of the `X-Real-IP` header
    pub real_ip: Option<IpAddr>,
}

impl ClientConfig {
    /// create new client config with default parameters.
    pub fn new(server_url: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            rpc_url: rpc_url.into(),
            request_timeout: Duration::from_secs(5),
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
            ],
            signing_key: None,
            compress: true,
            real_ip: None,
        }
    }

    /// set request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// set the retry schedule.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// set the signing key; an empty key disables signing.
    pub fn with_signing_key(mut self, key: Option<String>) -> Self {
        self.signing_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_real_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.real_ip = ip;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_parse_case_insensitively() {
        assert_eq!("RPC".parse::<Channel>().unwrap(), Channel::Rpc);
        assert_eq!(" batch".parse::<Channel>().unwrap(), Channel::Batch);
        assert!("grpc".parse::<Channel>().is_err());
    }

    #[test]
    fn empty_signing_key_disables_signing() {
        let config = ClientConfig::new("http://localhost:8080", "http://localhost:3200")
            .with_signing_key(Some(String::new()));

        assert!(config.signing_key.is_none());
    }

    #[test]
    fn default_retry_schedule_is_one_two_three_seconds() {
        let config = ClientConfig::new("http://a", "http://b");

        assert_eq!(config.retry_delays, vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3)
        ]);
    }
}
