use std::net::IpAddr;
use std::net::UdpSocket;
use std::time::Duration;

use clap::Parser;
use metric_comm::transport::parse_base_url;
use metric_comm::Channel;
use metric_comm::ClientConfig;
use tracing::warn;
use utils::version;

#[derive(Parser, Debug, Clone)]
#[command(about = "Metrics collection agent", long_about = None, version = &**version::VERSION)]
pub struct AgentArgs {
    #[arg(
        short = 'a',
        long,
        env = "ADDRESS",
        default_value = "localhost:8080",
        help = "Metrics server HTTP address"
    )]
    pub address: String,

    #[arg(
        long,
        env = "RPC_ADDRESS",
        default_value = "localhost:3200",
        help = "Metrics server JSON-RPC address"
    )]
    pub rpc_address: String,

    #[arg(
        short = 'r',
        long,
        env = "REPORT_INTERVAL",
        default_value = "10",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds between reports"
    )]
    pub report_interval: u64,

    #[arg(
        short = 'p',
        long,
        env = "POLL_INTERVAL",
        default_value = "2",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds between polls"
    )]
    pub poll_interval: u64,

    #[arg(
        short = 'l',
        long,
        env = "RATE_LIMIT",
        default_value = "3",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Maximum number of concurrent outbound deliveries"
    )]
    pub rate_limit: u64,

    #[arg(
        short = 'k',
        long,
        env = "KEY",
        help = "Shared key for HashSHA256 request signatures"
    )]
    pub key: Option<String>,

    #[arg(
        long,
        env = "REAL_IP",
        help = "Value of the X-Real-IP header, detected from the route to the server if unset"
    )]
    pub real_ip: Option<IpAddr>,

    #[arg(
        long,
        env = "NO_COMPRESS",
        help = "Send JSON and RPC bodies uncompressed"
    )]
    pub no_compress: bool,

    #[arg(
        long,
        env = "REQUEST_TIMEOUT",
        default_value = "5",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Timeout in seconds of a single delivery attempt"
    )]
    pub request_timeout_secs: u64,

    #[arg(
        long,
        env = "CHANNELS",
        value_delimiter = ',',
        default_value = "path,json,batch,rpc",
        help = "Enabled delivery channels"
    )]
    pub channels: Vec<Channel>,
}

impl AgentArgs {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval)
    }

    pub fn rate_limit(&self) -> usize {
        usize::try_from(self.rate_limit).unwrap_or(usize::MAX)
    }

    /// Enabled channels, each listed once.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            if !channels.contains(channel) {
                channels.push(*channel);
            }
        }
        channels
    }

    /// Client configuration shared by every channel.
    pub fn client_config(&self) -> ClientConfig {
        let real_ip = self.real_ip.or_else(|| detect_real_ip(&self.address));
        ClientConfig::new(self.address.clone(), self.rpc_address.clone())
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_signing_key(self.key.clone())
            .with_compression(!self.no_compress)
            .with_real_ip(real_ip)
    }
}

/// Local address of the interface used to reach `server`.
///
/// Connecting a UDP socket sends nothing; it only resolves the route.
fn detect_real_ip(server: &str) -> Option<IpAddr> {
    let detect = || -> std::io::Result<IpAddr> {
        let url = parse_base_url(server)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;
        let host = url.host_str().unwrap_or("localhost").to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect((host.as_str(), port))?;
        Ok(socket.local_addr()?.ip())
    };
    detect()
        .map_err(|e| warn!("Could not detect local address, X-Real-IP disabled: {e}"))
        .ok()
}
