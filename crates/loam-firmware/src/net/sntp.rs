use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, Stack};
use embassy_time::Duration;
use log::{debug, error, warn};
use loam_core::network::{NetworkError, NetworkTime};
use loam_core::time_sync::{NTP_PACKET_LEN, build_request, parse_response};

use super::resolve_host;

const NTP_PORT: u16 = 123;

/// Local port for SNTP replies
const LOCAL_PORT: u16 = 50_123;

/// Asks one SNTP server for the time.
pub struct SntpClient {
    stack: Stack<'static>,
    server: &'static str,
    network_timeout: Duration,
}

impl SntpClient {
    pub fn new(stack: Stack<'static>, server: &'static str, network_timeout: Duration) -> Self {
        Self {
            stack,
            server,
            network_timeout,
        }
    }
}

impl NetworkTime for SntpClient {
    async fn fetch_time(&mut self) -> Result<u32, NetworkError> {
        let server = resolve_host(self.stack, self.server, self.network_timeout)
            .await
            .map_err(NetworkError::TimeServer)?;

        let mut rx_meta = [PacketMetadata::EMPTY; 2];
        let mut rx_buffer = [0u8; 2 * NTP_PACKET_LEN];
        let mut tx_meta = [PacketMetadata::EMPTY; 1];
        let mut tx_buffer = [0u8; NTP_PACKET_LEN];
        let mut socket = UdpSocket::new(
            self.stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        socket.bind(LOCAL_PORT).map_err(|e| {
            error!("SNTP: bind failed: {:?}", e);
            NetworkError::TimeServer("bind failed")
        })?;

        socket
            .send_to(&build_request(), (server, NTP_PORT))
            .await
            .map_err(|e| {
                error!("SNTP: request to {} failed: {:?}", server, e);
                NetworkError::TimeServer("request not sent")
            })?;

        let mut response = [0u8; NTP_PACKET_LEN];
        loop {
            let (len, meta) = socket.recv_from(&mut response).await.map_err(|e| {
                error!("SNTP: receive failed: {:?}", e);
                NetworkError::TimeServer("receive failed")
            })?;

            if meta.endpoint.addr != IpAddress::Ipv4(server) {
                debug!("SNTP: ignoring packet from {}", meta.endpoint);
                continue;
            }

            return parse_response(&response[..len]).map_err(|e| {
                warn!("SNTP: {}", e);
                NetworkError::TimeServer("malformed response")
            });
        }
    }
}
