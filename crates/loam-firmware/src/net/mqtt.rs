use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_time::Duration;
use log::{error, info, warn};
use loam_core::config::CollectorConfig;
use loam_core::network::{Collector, CollectorSession, NetworkError};
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::utils::rng_generator::CountingRng;
use rust_mqtt::utils::types::EncodedString;

use super::resolve_host;

const SOCKET_BUFFER_LEN: usize = 1536;

/// MQTT packet buffers, well above one payload plus headers
const MQTT_BUFFER_LEN: usize = 1024;

const KEEP_ALIVE_SECS: u16 = 60;

const MAX_PROPERTIES: usize = 5;

/// MQTT broker connection factory.
///
/// Owns the socket and packet buffers so a session can borrow them for
/// exactly one upload cycle.
pub struct MqttCollector {
    stack: Stack<'static>,
    settings: CollectorConfig<'static>,
    network_timeout: Duration,
    socket_rx: [u8; SOCKET_BUFFER_LEN],
    socket_tx: [u8; SOCKET_BUFFER_LEN],
    mqtt_tx: [u8; MQTT_BUFFER_LEN],
    mqtt_rx: [u8; MQTT_BUFFER_LEN],
}

impl MqttCollector {
    pub fn new(
        stack: Stack<'static>,
        settings: CollectorConfig<'static>,
        network_timeout: Duration,
    ) -> Self {
        Self {
            stack,
            settings,
            network_timeout,
            socket_rx: [0; SOCKET_BUFFER_LEN],
            socket_tx: [0; SOCKET_BUFFER_LEN],
            mqtt_tx: [0; MQTT_BUFFER_LEN],
            mqtt_rx: [0; MQTT_BUFFER_LEN],
        }
    }
}

pub struct MqttSession<'s> {
    client: MqttClient<'s, TcpSocket<'s>, MAX_PROPERTIES, CountingRng>,
    topic: &'s str,
}

impl Collector for MqttCollector {
    type Session<'s> = MqttSession<'s>;

    async fn open(&mut self) -> Result<Self::Session<'_>, NetworkError> {
        let Self {
            stack,
            settings,
            network_timeout,
            socket_rx,
            socket_tx,
            mqtt_tx,
            mqtt_rx,
        } = self;

        let broker = resolve_host(*stack, settings.broker, *network_timeout)
            .await
            .map_err(NetworkError::Collector)?;

        let mut socket = TcpSocket::new(*stack, socket_rx, socket_tx);
        socket.set_timeout(Some(*network_timeout));
        socket.connect((broker, settings.port)).await.map_err(|e| {
            error!("MQTT: TCP connect to {}:{} failed: {:?}", broker, settings.port, e);
            NetworkError::Collector("TCP connect failed")
        })?;

        let rng = CountingRng(20000);
        let mut config = ClientConfig::<MAX_PROPERTIES, _>::new(MqttVersion::MQTTv5, rng);
        config.client_id = EncodedString {
            string: settings.client_id,
            len: settings.client_id.len() as u16,
        };
        if !settings.username.is_empty() {
            config.add_username(settings.username);
            config.add_password(settings.password);
        }
        config.keep_alive = KEEP_ALIVE_SECS;
        config.max_packet_size = MQTT_BUFFER_LEN as u32;

        let mut client = MqttClient::<_, MAX_PROPERTIES, _>::new(
            socket,
            mqtt_tx,
            MQTT_BUFFER_LEN,
            mqtt_rx,
            MQTT_BUFFER_LEN,
            config,
        );

        client.connect_to_broker().await.map_err(|code| {
            error!("MQTT: broker refused the connection: {:?}", code);
            NetworkError::Collector("broker refused the connection")
        })?;
        info!("MQTT: connected to {}", settings.broker);

        Ok(MqttSession {
            client,
            topic: settings.topic,
        })
    }
}

impl CollectorSession for MqttSession<'_> {
    /// QoS 1, so success means the broker acknowledged the record.
    async fn publish(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
        self.client
            .send_message(self.topic, payload, QualityOfService::QoS1, false)
            .await
            .map_err(|code| {
                error!("MQTT: publish to {} failed: {:?}", self.topic, code);
                NetworkError::Publish("not acknowledged")
            })
    }

    async fn close(mut self) {
        if let Err(code) = self.client.disconnect().await {
            warn!("MQTT: disconnect failed: {:?}", code);
        }
    }
}
