//! Bakes deployment secrets from `.env` into the firmware and adds the
//! esp-hal linker script.

/// Variables forwarded to `env!`/`option_env!` in `src/config.rs`
const FORWARDED: &[&str] = &[
    "WIFI_SSID",
    "WIFI_PASSWORD",
    "MQTT_BROKER",
    "MQTT_PORT",
    "MQTT_CLIENT_ID",
    "MQTT_USERNAME",
    "MQTT_PASSWORD",
    "MQTT_TOPIC",
    "DEVICE_ID",
    "NTP_SERVER",
];

fn main() {
    // A missing .env is fine as long as the variables come from the environment
    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=.env not loaded ({e}), using the build environment");
    }

    for key in FORWARDED {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }
    println!("cargo:rerun-if-changed=.env");

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
