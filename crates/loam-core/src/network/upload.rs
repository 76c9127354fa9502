use embassy_time::{Duration, Ticker, Timer, with_timeout};
use log::{error, info};

use super::{
    Collector, CollectorSession, LinkCell, NetworkError, NetworkLink, acquire_link,
    format_payload, release_link,
};
use crate::app_state::SystemStatus;
use crate::pipeline::UploadQueue;

/// Result of one upload cycle that got as far as the collector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub published: u32,
    /// Records still queued after the cycle
    pub remaining: usize,
    /// A publish failed and draining stopped early
    pub interrupted: bool,
}

/// Upload task: periodically connects, drains the backlog to the collector,
/// and disconnects again.
///
/// Delivery is at-least-once. A record leaves the queue only after its
/// publish succeeded; the first failure ends the cycle with that record
/// still at the front, so the next cycle retries it in order.
pub struct Upload<'a, L: NetworkLink, C: Collector> {
    link: &'a LinkCell<L>,
    collector: C,
    queue: &'a UploadQueue,
    status: &'a SystemStatus,
    device_id: &'a str,
    /// Bound for link bring-up, collector connect and each publish
    network_timeout: Duration,
    publish_spacing: Duration,
}

impl<'a, L: NetworkLink, C: Collector> Upload<'a, L, C> {
    pub fn new(
        link: &'a LinkCell<L>,
        collector: C,
        queue: &'a UploadQueue,
        status: &'a SystemStatus,
        device_id: &'a str,
        network_timeout: Duration,
        publish_spacing: Duration,
    ) -> Self {
        Self {
            link,
            collector,
            queue,
            status,
            device_id,
            network_timeout,
            publish_spacing,
        }
    }

    pub fn collector(&self) -> &C {
        &self.collector
    }

    /// Runs one full cycle. The link is always torn down before returning.
    ///
    /// Connects even when the queue is empty.
    pub async fn cycle(&mut self) -> Result<UploadReport, NetworkError> {
        info!("Upload: cycle starting, {} records pending", self.queue.len());

        let link = match acquire_link(self.link, self.network_timeout, self.status).await {
            Ok(link) => link,
            Err(e) => {
                error!("Upload: no network, skipping cycle: {}", e);
                self.status.record_upload_error();
                return Err(e);
            }
        };

        let result = self.deliver().await;
        release_link(link, self.status).await;

        match &result {
            Ok(report) => info!(
                "Upload: published {}, {} remaining",
                report.published, report.remaining
            ),
            Err(e) => error!("Upload: cycle aborted: {}", e),
        }
        result
    }

    async fn deliver(&mut self) -> Result<UploadReport, NetworkError> {
        let opened = with_timeout(self.network_timeout, self.collector.open()).await;
        let mut session = match opened {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                self.status.record_upload_error();
                return Err(e);
            }
            Err(_) => {
                self.status.record_upload_error();
                return Err(NetworkError::Collector("connect timeout"));
            }
        };
        self.status.set_mqtt_connected(true);

        let mut report = UploadReport::default();
        while let Some(record) = self.queue.front() {
            let payload = match format_payload(self.device_id, &record) {
                Ok(payload) => payload,
                Err(e) => {
                    // Cannot succeed on any later cycle either
                    error!("Upload: record {} discarded: {}", record.window_start, e);
                    self.queue.pop_front();
                    self.status.record_upload_error();
                    continue;
                }
            };

            let sent = match with_timeout(
                self.network_timeout,
                session.publish(payload.as_bytes()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(NetworkError::Publish("timeout")),
            };

            if let Err(e) = sent {
                error!("Upload: record {} not delivered: {}", record.window_start, e);
                self.status.record_upload_error();
                report.interrupted = true;
                break;
            }

            self.queue.pop_front();
            self.status.record_upload();
            report.published += 1;

            if !self.queue.is_empty() {
                Timer::after(self.publish_spacing).await;
            }
        }

        session.close().await;
        self.status.set_mqtt_connected(false);

        report.remaining = self.queue.len();
        Ok(report)
    }

    pub async fn run(&mut self, interval: Duration) -> ! {
        let mut ticker = Ticker::every(interval);
        loop {
            ticker.next().await;
            // Errors are counted inside; the next cycle retries
            let _ = self.cycle().await;
        }
    }
}
