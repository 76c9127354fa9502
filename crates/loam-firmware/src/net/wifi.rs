use embassy_net::{Runner, Stack};
use embassy_time::{Duration, Timer};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice};
use log::{error, info, warn};
use loam_core::app_state::SYSTEM_STATUS;
use loam_core::config::InternetConfig;
use loam_core::network::{NetworkError, NetworkLink};

/// Poll period while waiting for DHCP
const DHCP_POLL: Duration = Duration::from_millis(200);

/// WiFi station that is only powered while a task holds the link.
///
/// `connect` starts the radio, associates and waits for a DHCP lease;
/// `disconnect` leaves the access point and stops the radio again.
pub struct WifiLink {
    controller: WifiController<'static>,
    stack: Stack<'static>,
    ssid: &'static str,
    password: &'static str,
}

impl WifiLink {
    pub fn new(
        controller: WifiController<'static>,
        stack: Stack<'static>,
        settings: &InternetConfig<'static>,
    ) -> Self {
        Self {
            controller,
            stack,
            ssid: settings.ssid,
            password: settings.password,
        }
    }

    async fn start(&mut self) -> Result<(), NetworkError> {
        if matches!(self.controller.is_started(), Ok(true)) {
            return Ok(());
        }

        let client_config = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(self.ssid.into())
                .with_password(self.password.into()),
        );
        self.controller.set_config(&client_config).map_err(|e| {
            error!("WiFi: configuration rejected: {:?}", e);
            NetworkError::Link("configuration rejected")
        })?;

        self.controller.start_async().await.map_err(|e| {
            error!("WiFi: radio start failed: {:?}", e);
            NetworkError::Link("radio start failed")
        })
    }

    async fn wait_for_address(&self) {
        loop {
            if self.stack.is_link_up() {
                if let Some(config) = self.stack.config_v4() {
                    info!("WiFi: address {}", config.address);
                    return;
                }
            }
            Timer::after(DHCP_POLL).await;
        }
    }
}

impl NetworkLink for WifiLink {
    async fn connect(&mut self) -> Result<(), NetworkError> {
        self.start().await?;

        info!("WiFi: connecting to '{}'", self.ssid);
        self.controller.connect_async().await.map_err(|e| {
            error!("WiFi: association failed: {:?}", e);
            NetworkError::Link("association failed")
        })?;

        match self.controller.rssi() {
            Ok(dbm) => {
                info!("WiFi: RSSI {} dBm", dbm);
                SYSTEM_STATUS.set_wifi_rssi(dbm.clamp(i8::MIN as i32, -1) as i8);
            }
            Err(e) => warn!("WiFi: RSSI unavailable: {:?}", e),
        }

        self.wait_for_address().await;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if matches!(self.controller.is_connected(), Ok(true)) {
            if let Err(e) = self.controller.disconnect_async().await {
                warn!("WiFi: disconnect failed: {:?}", e);
            }
        }
        if matches!(self.controller.is_started(), Ok(true)) {
            if let Err(e) = self.controller.stop_async().await {
                warn!("WiFi: radio stop failed: {:?}", e);
            }
        }
    }
}

/// Drives the embassy-net stack.
#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}
