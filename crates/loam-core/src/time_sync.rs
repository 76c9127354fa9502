//! Keeps the hardware clock close to UTC
//!
//! Each attempt brings the link up, asks the time server, writes the answer
//! to the clock and reads it back. An attempt only counts as a success when
//! the read-back time agrees with what was written.

use embassy_time::{Duration, Ticker, Timer, with_timeout};
use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::app_state::SystemStatus;
use crate::config::TimeConfig;
use crate::network::{LinkCell, NetworkError, NetworkLink, NetworkTime, acquire_link, release_link};
use crate::sensors::clock::{Clock, ClockError, is_plausible};

/// Size of an SNTP packet without extensions
pub const NTP_PACKET_LEN: usize = 48;

/// Seconds from the NTP epoch (1900) to the Unix epoch (1970)
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Leap indicator 0, version 4, mode 3 (client)
const CLIENT_HEADER: u8 = (4 << 3) | 3;
const MODE_SERVER: u8 = 4;
const LEAP_UNSYNCHRONIZED: u8 = 3;
const TRANSMIT_SECONDS: usize = 40;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSyncError {
    #[error("Network unavailable: {0}")]
    Network(NetworkError),
    #[error("Malformed time server response: {0}")]
    MalformedResponse(&'static str),
    #[error("Server time {0} is implausible")]
    Implausible(u32),
    #[error("Clock write failed: {0}")]
    ClockWrite(ClockError),
    #[error("Clock read back failed: {0}")]
    ClockRead(ClockError),
    #[error("Clock read back {read} after writing {written}")]
    ReadbackMismatch { written: u32, read: u32 },
}

impl From<NetworkError> for TimeSyncError {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

/// Builds an SNTP client request.
pub fn build_request() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = CLIENT_HEADER;
    packet
}

/// Extracts the transmit time of an SNTP server response as Unix seconds.
///
/// NTP era 1 (from 2036-02-07) is assumed for transmit seconds below the
/// Unix offset.
pub fn parse_response(packet: &[u8]) -> Result<u32, TimeSyncError> {
    if packet.len() < NTP_PACKET_LEN {
        return Err(TimeSyncError::MalformedResponse("short packet"));
    }
    if packet[0] & 0x07 != MODE_SERVER {
        return Err(TimeSyncError::MalformedResponse("not a server reply"));
    }
    if packet[0] >> 6 == LEAP_UNSYNCHRONIZED {
        return Err(TimeSyncError::MalformedResponse("server unsynchronized"));
    }
    if packet[1] == 0 {
        return Err(TimeSyncError::MalformedResponse("kiss-of-death"));
    }

    let mut seconds = [0u8; 4];
    seconds.copy_from_slice(&packet[TRANSMIT_SECONDS..TRANSMIT_SECONDS + 4]);
    let seconds = u32::from_be_bytes(seconds) as u64;

    let unix = if seconds >= NTP_UNIX_OFFSET {
        seconds - NTP_UNIX_OFFSET
    } else {
        seconds + (1u64 << 32) - NTP_UNIX_OFFSET
    };
    u32::try_from(unix).map_err(|_| TimeSyncError::MalformedResponse("time out of range"))
}

/// Time-sync task state.
pub struct TimeSync<'a, L: NetworkLink, T: NetworkTime, C: Clock> {
    link: &'a LinkCell<L>,
    source: T,
    clock: C,
    status: &'a SystemStatus,
    config: TimeConfig<'a>,
    network_timeout: Duration,
}

impl<'a, L: NetworkLink, T: NetworkTime, C: Clock> TimeSync<'a, L, T, C> {
    pub fn new(
        link: &'a LinkCell<L>,
        source: T,
        clock: C,
        status: &'a SystemStatus,
        config: TimeConfig<'a>,
        network_timeout: Duration,
    ) -> Self {
        Self {
            link,
            source,
            clock,
            status,
            config,
            network_timeout,
        }
    }

    pub fn source(&self) -> &T {
        &self.source
    }

    /// One synchronization attempt, returning the time written.
    ///
    /// The link is torn down afterwards whatever the outcome.
    pub async fn sync_once(&mut self) -> Result<u32, TimeSyncError> {
        let result = match acquire_link(self.link, self.network_timeout, self.status).await {
            Ok(link) => {
                let result = self.correct_clock().await;
                release_link(link, self.status).await;
                result
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(timestamp) => {
                info!("Time sync: clock set to {}", timestamp);
                self.status.record_time_sync(timestamp);
            }
            Err(e) => {
                error!("Time sync against {} failed: {}", self.config.ntp_server, e);
                self.status.record_time_sync_failure();
            }
        }
        result
    }

    async fn correct_clock(&mut self) -> Result<u32, TimeSyncError> {
        let server_time = with_timeout(self.network_timeout, self.source.fetch_time())
            .await
            .map_err(|_| NetworkError::TimeServer("timeout"))??;

        if !is_plausible(server_time) {
            return Err(TimeSyncError::Implausible(server_time));
        }

        self.clock
            .set_time(server_time)
            .await
            .map_err(TimeSyncError::ClockWrite)?;

        let read = self.clock.now().await.map_err(TimeSyncError::ClockRead)?;
        if read.abs_diff(server_time) > self.config.readback_tolerance_secs {
            return Err(TimeSyncError::ReadbackMismatch {
                written: server_time,
                read,
            });
        }

        Ok(server_time)
    }

    /// Startup phase: up to `attempts` tries, `retry_delay` apart.
    pub async fn initial_sync(&mut self) -> bool {
        let attempts = self.config.attempts;
        for attempt in 1..=attempts {
            if self.sync_once().await.is_ok() {
                return true;
            }
            if attempt < attempts {
                warn!(
                    "Time sync attempt {}/{} failed, retrying in {} s",
                    attempt,
                    attempts,
                    self.config.retry_delay().as_secs()
                );
                Timer::after(self.config.retry_delay()).await;
            }
        }

        error!("Time sync: startup attempts exhausted, waiting for the periodic resync");
        false
    }

    pub async fn run(&mut self) -> ! {
        Timer::after(self.config.settle_delay()).await;
        self.initial_sync().await;

        let mut ticker = Ticker::every(self.config.resync_interval());
        loop {
            ticker.next().await;
            // Failures are counted inside; the loop never stops
            let _ = self.sync_once().await;
        }
    }
}
