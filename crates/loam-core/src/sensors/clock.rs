//! Clock capability used for timestamps and corrected by time sync

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use thiserror_no_std::Error;

/// 2020-01-01T00:00:00Z. Anything earlier means the clock was never set.
pub const MIN_PLAUSIBLE_TIMESTAMP: u32 = 1_577_836_800;

/// 2100-01-01T00:00:00Z. The RTC's two-digit year register ends at 2099.
pub const MAX_PLAUSIBLE_TIMESTAMP: u32 = 4_102_444_800;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("Clock not found on the bus")]
    NotFound,
    #[error("Clock bus transfer failed")]
    Bus,
    #[error("Clock reports an implausible time: {0}")]
    Implausible(u32),
    #[error("Clock registers hold an invalid date")]
    InvalidDate,
}

/// Returns whether `timestamp` lies in the range a running logger can see.
pub const fn is_plausible(timestamp: u32) -> bool {
    timestamp >= MIN_PLAUSIBLE_TIMESTAMP && timestamp < MAX_PLAUSIBLE_TIMESTAMP
}

/// UTC wall clock, usually a battery-backed RTC.
pub trait Clock {
    /// Current UTC time in seconds. Implausible times are errors.
    fn now(&mut self) -> impl Future<Output = Result<u32, ClockError>>;

    fn set_time(&mut self, timestamp: u32) -> impl Future<Output = Result<(), ClockError>>;

    /// Whether the clock lost its backup supply and restarted from its
    /// reset value. Clocks that cannot tell report `false`.
    fn lost_power(&mut self) -> impl Future<Output = Result<bool, ClockError>> {
        async { Ok(false) }
    }
}

/// Mutex a clock lives in when acquisition and time sync both use it
pub type ClockCell<C> = Mutex<CriticalSectionRawMutex, C>;

/// Handle onto a clock shared between tasks.
pub struct SharedClock<'a, C> {
    clock: &'a ClockCell<C>,
}

impl<'a, C> SharedClock<'a, C> {
    pub const fn new(clock: &'a ClockCell<C>) -> Self {
        Self { clock }
    }
}

impl<C> Clone for SharedClock<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for SharedClock<'_, C> {}

impl<C: Clock> Clock for SharedClock<'_, C> {
    async fn now(&mut self) -> Result<u32, ClockError> {
        self.clock.lock().await.now().await
    }

    async fn set_time(&mut self, timestamp: u32) -> Result<(), ClockError> {
        self.clock.lock().await.set_time(timestamp).await
    }

    async fn lost_power(&mut self) -> Result<bool, ClockError> {
        self.clock.lock().await.lost_power().await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeClock;
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_plausibility_bounds() {
        assert!(!is_plausible(0));
        assert!(!is_plausible(MIN_PLAUSIBLE_TIMESTAMP - 1));
        assert!(is_plausible(MIN_PLAUSIBLE_TIMESTAMP));
        assert!(is_plausible(1_760_000_000));
        // 2099-12-31T23:59:59Z is the last second the RTC can hold
        assert!(is_plausible(4_102_444_799));
        assert!(!is_plausible(MAX_PLAUSIBLE_TIMESTAMP));
    }

    #[test]
    fn test_shared_clock_sees_writes_from_other_handle() {
        let cell: ClockCell<FakeClock> = Mutex::new(FakeClock::at(0));
        let mut acquisition = SharedClock::new(&cell);
        let mut sync = acquisition;

        assert_eq!(block_on(acquisition.now()), Err(ClockError::Implausible(0)));
        block_on(sync.set_time(1_700_000_000)).expect("write succeeds");
        assert_eq!(block_on(acquisition.now()), Ok(1_700_000_000));
        assert_eq!(block_on(acquisition.lost_power()), Ok(false));
    }
}
