//! Compile-time configuration
//!
//! WiFi credentials are required at build time. Everything else falls back
//! to the core defaults when the variable is unset.

use loam_core::config::Config;

const WIFI_SSID: &str = env!("WIFI_SSID", "Set WIFI_SSID in .env or the build environment");
const WIFI_PASSWORD: &str = env!(
    "WIFI_PASSWORD",
    "Set WIFI_PASSWORD in .env or the build environment"
);

/// I2C bus shared by the DS1308 and the SHT40
pub const I2C_FREQUENCY_KHZ: u32 = 400;

/// SD card SPI clock. Card initialization requires 400 kHz or less.
pub const SD_SPI_FREQUENCY_KHZ: u32 = 400;

/// Firmware configuration assembled from the baked-in environment.
pub fn config() -> Config<'static> {
    let mut config = Config::default();

    config.internet.ssid = WIFI_SSID;
    config.internet.password = WIFI_PASSWORD;

    let collector = &mut config.collector;
    match option_env!("MQTT_BROKER") {
        Some(broker) if !broker.is_empty() => collector.broker = broker,
        _ => collector.enabled = false,
    }
    if let Some(port) = option_env!("MQTT_PORT").and_then(|p| p.parse().ok()) {
        collector.port = port;
    }
    if let Some(client_id) = option_env!("MQTT_CLIENT_ID") {
        collector.client_id = client_id;
    }
    if let Some(username) = option_env!("MQTT_USERNAME") {
        collector.username = username;
    }
    if let Some(password) = option_env!("MQTT_PASSWORD") {
        collector.password = password;
    }
    if let Some(topic) = option_env!("MQTT_TOPIC") {
        collector.topic = topic;
    }
    collector.device_id = option_env!("DEVICE_ID").unwrap_or(collector.client_id);

    if let Some(server) = option_env!("NTP_SERVER") {
        config.time.ntp_server = server;
    }

    config
}
