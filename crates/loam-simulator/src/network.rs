//! Fake link, collector and time server with scheduled failures
//!
//! Failures follow fixed counters instead of chance, so two runs of the
//! simulator log the same sequence of outages.

use std::time::{SystemTime, UNIX_EPOCH};

use embassy_time::{Duration, Timer};
use loam_core::app_state::SYSTEM_STATUS;
use loam_core::network::{Collector, CollectorSession, NetworkError, NetworkLink, NetworkTime};
use log::{info, warn};

/// Association time of the fake access point
const CONNECT_DELAY: Duration = Duration::from_millis(300);

/// WiFi stand-in whose every `fail_every`th connect is rejected.
pub struct FlakyLink {
    fail_every: u32,
    connects: u32,
    up: bool,
}

impl FlakyLink {
    pub fn new(fail_every: u32) -> Self {
        Self {
            fail_every,
            connects: 0,
            up: false,
        }
    }
}

impl NetworkLink for FlakyLink {
    async fn connect(&mut self) -> Result<(), NetworkError> {
        self.connects += 1;
        Timer::after(CONNECT_DELAY).await;

        if self.fail_every != 0 && self.connects % self.fail_every == 0 {
            return Err(NetworkError::Link("association rejected"));
        }
        self.up = true;
        // Drifts between -60 and -69 dBm
        SYSTEM_STATUS.set_wifi_rssi(-60 - (self.connects % 10) as i8);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.up = false;
    }
}

/// Broker stand-in that logs every payload.
///
/// The connection drops on every `drop_every`th publish, leaving the rest of
/// the cycle's records queued.
pub struct LogCollector {
    topic: &'static str,
    drop_every: u32,
    publishes: u32,
}

impl LogCollector {
    pub fn new(topic: &'static str, drop_every: u32) -> Self {
        Self {
            topic,
            drop_every,
            publishes: 0,
        }
    }
}

pub struct LogSession<'s> {
    collector: &'s mut LogCollector,
}

impl Collector for LogCollector {
    type Session<'s> = LogSession<'s>;

    async fn open(&mut self) -> Result<Self::Session<'_>, NetworkError> {
        info!("MQTT: session open");
        Ok(LogSession { collector: self })
    }
}

impl CollectorSession for LogSession<'_> {
    async fn publish(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
        let collector = &mut *self.collector;
        collector.publishes += 1;
        if collector.drop_every != 0 && collector.publishes % collector.drop_every == 0 {
            return Err(NetworkError::Publish("broker closed the connection"));
        }

        let text = core::str::from_utf8(payload).unwrap_or("<binary>");
        info!("MQTT {} <- {}", collector.topic, text);
        Ok(())
    }

    async fn close(self) {
        info!("MQTT: session closed");
    }
}

/// Time server answering with the host clock. The first request goes
/// unanswered so the retry path runs on every start.
#[derive(Default)]
pub struct HostTime {
    fetches: u32,
}

impl NetworkTime for HostTime {
    async fn fetch_time(&mut self) -> Result<u32, NetworkError> {
        self.fetches += 1;
        if self.fetches == 1 {
            warn!("SNTP: request lost");
            return Err(NetworkError::TimeServer("no response"));
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| NetworkError::TimeServer("host clock before 1970"))?;
        u32::try_from(now.as_secs()).map_err(|_| NetworkError::TimeServer("time out of range"))
    }
}
