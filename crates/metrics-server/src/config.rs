use std::time::Duration;

use clap::Parser;
use ipnet::IpNet;
use utils::version;

use crate::api::IngressConfig;

#[derive(Parser, Debug, Clone)]
#[command(about = "Metrics collection server", long_about = None, version = &**version::VERSION)]
pub struct ServerArgs {
    #[arg(
        short = 'a',
        long,
        env = "ADDRESS",
        default_value = "localhost:8080",
        help = "HTTP listen address"
    )]
    pub address: String,

    #[arg(
        long,
        env = "RPC_ADDRESS",
        default_value = "localhost:3200",
        help = "JSON-RPC listen address"
    )]
    pub rpc_address: String,

    #[arg(
        short = 'k',
        long,
        env = "KEY",
        help = "Shared key for HashSHA256 request signatures"
    )]
    pub key: Option<String>,

    #[arg(
        short = 't',
        long,
        env = "TRUSTED_SUBNET",
        value_parser = parse_subnet,
        help = "Trusted client subnet in CIDR notation, e.g. 192.168.1.0/24"
    )]
    pub trusted_subnet: Option<IpNet>,

    #[arg(
        long,
        env = "SHUTDOWN_TIMEOUT",
        default_value = "30",
        help = "Seconds to drain in-flight requests on shutdown"
    )]
    pub shutdown_timeout_secs: u64,
}

fn parse_subnet(raw: &str) -> Result<IpNet, String> {
    raw.trim()
        .parse::<IpNet>()
        .map_err(|e| format!("invalid CIDR `{raw}`: {e}"))
}

impl ServerArgs {
    pub fn ingress(&self) -> IngressConfig {
        IngressConfig {
            signing_key: self.key.clone().filter(|k| !k.is_empty()),
            trusted_subnet: self.trusted_subnet,
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
