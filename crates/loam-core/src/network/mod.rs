//! Network capabilities used by the upload and time-sync tasks
//!
//! The link (WiFi), the collector (MQTT broker) and the time source (SNTP)
//! are separate capabilities so each can be faked in tests. The link lives
//! in a [`LinkCell`]; whoever needs the network takes the lock for the whole
//! session, brings the link up, and always tears it down before unlocking.

pub mod payload;
pub mod upload;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_time::{Duration, with_timeout};
use log::{info, warn};
use thiserror_no_std::Error;

use crate::app_state::SystemStatus;

pub use payload::{PAYLOAD_LEN, Payload, format_payload};
pub use upload::{Upload, UploadReport};

/// Longest wait for another task's network session to finish
pub const LINK_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Timed out waiting for the network lock")]
    LockTimeout,
    #[error("Network link did not come up in time")]
    ConnectTimeout,
    #[error("Network link failed: {0}")]
    Link(&'static str),
    #[error("Collector connection failed: {0}")]
    Collector(&'static str),
    #[error("Publish failed: {0}")]
    Publish(&'static str),
    #[error("Time server failed: {0}")]
    TimeServer(&'static str),
    #[error("Payload does not fit the buffer")]
    PayloadOverflow,
}

/// Physical network connectivity.
pub trait NetworkLink {
    /// Brings the link up. Callers bound this with a timeout.
    fn connect(&mut self) -> impl Future<Output = Result<(), NetworkError>>;

    /// Takes the link down. Safe to call on a link that never came up.
    fn disconnect(&mut self) -> impl Future<Output = ()>;
}

pub type LinkCell<L> = Mutex<CriticalSectionRawMutex, L>;

/// Application-level connection factory for the remote collector.
pub trait Collector {
    type Session<'s>: CollectorSession
    where
        Self: 's;

    /// Opens a session over an already connected link.
    fn open(&mut self) -> impl Future<Output = Result<Self::Session<'_>, NetworkError>>;
}

/// One open collector connection.
pub trait CollectorSession {
    /// Publishes one payload to the configured topic.
    fn publish(&mut self, payload: &[u8]) -> impl Future<Output = Result<(), NetworkError>>;

    fn close(self) -> impl Future<Output = ()>;
}

/// Source of authoritative UTC time.
pub trait NetworkTime {
    /// Fetches the current time as UTC seconds over a connected link.
    fn fetch_time(&mut self) -> impl Future<Output = Result<u32, NetworkError>>;
}

/// Locks the link and brings it up within `connect_timeout`.
///
/// On success the caller owns a connected link and must hand it back
/// through [`release_link`]. On failure the link is already down again.
pub async fn acquire_link<'l, L: NetworkLink>(
    cell: &'l LinkCell<L>,
    connect_timeout: Duration,
    status: &SystemStatus,
) -> Result<MutexGuard<'l, CriticalSectionRawMutex, L>, NetworkError> {
    let mut link = with_timeout(LINK_LOCK_TIMEOUT, cell.lock())
        .await
        .map_err(|_| NetworkError::LockTimeout)?;

    let connected = match with_timeout(connect_timeout, link.connect()).await {
        Ok(result) => result,
        Err(_) => Err(NetworkError::ConnectTimeout),
    };

    match connected {
        Ok(()) => {
            status.set_wifi_connected(true);
            info!("Network link up");
            Ok(link)
        }
        Err(e) => {
            warn!("Network link failed: {}", e);
            link.disconnect().await;
            Err(e)
        }
    }
}

/// Tears the link down and releases the lock.
pub async fn release_link<L: NetworkLink>(
    mut link: MutexGuard<'_, CriticalSectionRawMutex, L>,
    status: &SystemStatus,
) {
    link.disconnect().await;
    status.set_wifi_connected(false);
    info!("Network link down");
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable network fakes

    use super::*;
    use alloc::vec::Vec;

    #[derive(Debug, Default)]
    pub struct FakeLink {
        pub fail_connect: bool,
        /// Never completes `connect`, to exercise the timeout
        pub hang: bool,
        pub up: bool,
        pub connects: u32,
        pub disconnects: u32,
    }

    impl NetworkLink for FakeLink {
        async fn connect(&mut self) -> Result<(), NetworkError> {
            self.connects += 1;
            if self.hang {
                core::future::pending::<()>().await;
            }
            if self.fail_connect {
                return Err(NetworkError::Link("scripted failure"));
            }
            self.up = true;
            Ok(())
        }

        async fn disconnect(&mut self) {
            self.disconnects += 1;
            self.up = false;
        }
    }

    /// Collector whose publishes succeed until `fail_at` publishes were made.
    #[derive(Debug, Default)]
    pub struct FakeCollector {
        pub fail_open: bool,
        pub fail_at: Option<usize>,
        pub published: Vec<Vec<u8>>,
        pub attempts: usize,
        pub opened: u32,
        pub closed: u32,
    }

    pub struct FakeSession<'s> {
        collector: &'s mut FakeCollector,
    }

    impl Collector for FakeCollector {
        type Session<'s> = FakeSession<'s>;

        async fn open(&mut self) -> Result<Self::Session<'_>, NetworkError> {
            if self.fail_open {
                return Err(NetworkError::Collector("scripted failure"));
            }
            self.opened += 1;
            Ok(FakeSession { collector: self })
        }
    }

    impl CollectorSession for FakeSession<'_> {
        async fn publish(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
            let collector = &mut *self.collector;
            let attempt = collector.attempts;
            collector.attempts += 1;
            if collector.fail_at == Some(attempt) {
                return Err(NetworkError::Publish("scripted failure"));
            }
            collector.published.push(payload.to_vec());
            Ok(())
        }

        async fn close(self) {
            self.collector.closed += 1;
        }
    }

    /// Time source returning a fixed answer.
    #[derive(Debug)]
    pub struct FakeTime {
        pub answer: Result<u32, NetworkError>,
        pub fetches: u32,
    }

    impl NetworkTime for FakeTime {
        async fn fetch_time(&mut self) -> Result<u32, NetworkError> {
            self.fetches += 1;
            self.answer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeLink;
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_failed_connect_leaves_link_down() {
        let cell = LinkCell::new(FakeLink {
            fail_connect: true,
            ..FakeLink::default()
        });
        let status = SystemStatus::new();

        let result = block_on(acquire_link(&cell, Duration::from_secs(1), &status));
        assert!(matches!(result, Err(NetworkError::Link(_))));

        let link = block_on(cell.lock());
        assert_eq!(link.disconnects, 1, "partial link must be torn down");
        assert!(!status.wifi_connected());
    }

    #[test]
    fn test_hanging_connect_times_out() {
        let cell = LinkCell::new(FakeLink {
            hang: true,
            ..FakeLink::default()
        });
        let status = SystemStatus::new();

        let result = block_on(acquire_link(&cell, Duration::from_millis(20), &status));
        assert_eq!(result.err(), Some(NetworkError::ConnectTimeout));
        assert_eq!(block_on(cell.lock()).disconnects, 1);
    }

    #[test]
    fn test_release_disconnects_and_unlocks() {
        let cell = LinkCell::new(FakeLink::default());
        let status = SystemStatus::new();

        let link = block_on(acquire_link(&cell, Duration::from_secs(1), &status)).unwrap();
        assert!(link.up);
        assert!(status.wifi_connected());

        block_on(release_link(link, &status));
        let link = cell.try_lock().expect("lock released");
        assert!(!link.up);
        assert!(!status.wifi_connected());
    }
}
