//! Network adapters behind the core network capabilities
//!
//! - [`wifi::WifiLink`]: brings the station up and down around each session
//! - [`mqtt::MqttCollector`]: MQTT v5 over TCP with rust-mqtt
//! - [`sntp::SntpClient`]: single-packet SNTP over UDP

pub mod mqtt;
pub mod sntp;
pub mod wifi;

use embassy_net::dns::DnsQueryType;
use embassy_net::{IpAddress, Ipv4Address, Stack};
use embassy_time::{Duration, with_timeout};
use log::{debug, error};

pub use mqtt::MqttCollector;
pub use sntp::SntpClient;
pub use wifi::WifiLink;

/// Resolves `host` to an IPv4 address. Dotted-quad literals skip DNS.
pub async fn resolve_host(
    stack: Stack<'_>,
    host: &str,
    timeout: Duration,
) -> Result<Ipv4Address, &'static str> {
    if let Ok(address) = host.parse::<Ipv4Address>() {
        return Ok(address);
    }

    match with_timeout(timeout, stack.dns_query(host, DnsQueryType::A)).await {
        Ok(Ok(addresses)) => {
            for address in addresses {
                if let IpAddress::Ipv4(ipv4) = address {
                    debug!("DNS: {} is {}", host, ipv4);
                    return Ok(ipv4);
                }
            }
            Err("no IPv4 address")
        }
        Ok(Err(e)) => {
            error!("DNS: lookup of {} failed: {:?}", host, e);
            Err("DNS lookup failed")
        }
        Err(_) => Err("DNS timeout"),
    }
}
