use crate::robots::RobotsStatus;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

/// Request bookkeeping for one host
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests admitted for this host in the current crawl
    pub request_count: u32,

    /// When the last admitted request was granted
    pub last_request_time: Option<Instant>,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, min_delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < min_delay).then(|| min_delay - elapsed)
    }

    /// Records that a request was made to this host
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Admits a request if the host is not cooling down
    ///
    /// Check and record happen together, so two callers can never both be
    /// admitted inside one `min_delay` window.
    pub fn try_acquire(&mut self, min_delay: Duration, now: Instant) -> Option<Duration> {
        match self.time_until_next_request(min_delay, now) {
            Some(wait) => Some(wait),
            None => {
                self.record_request(now);
                None
            }
        }
    }
}

/// Everything the gate tracks per host key
#[derive(Debug, Default)]
pub(crate) struct HostSlot {
    /// robots.txt, fetched on first use and then reused for the whole run
    pub(crate) robots: OnceCell<RobotsStatus>,
    state: Mutex<HostState>,
}

impl HostSlot {
    pub(crate) fn try_acquire(&self, min_delay: Duration, now: Instant) -> Option<Duration> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(min_delay, now)
    }

    pub(crate) fn request_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .request_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(1000);

    #[test]
    fn test_new_host_state() {
        let state = HostState::new();
        assert_eq!(state.request_count, 0);
        assert!(state.last_request_time.is_none());
        assert_eq!(state.time_until_next_request(DELAY, Instant::now()), None);
    }

    #[test]
    fn test_record_request() {
        let mut state = HostState::new();
        let now = Instant::now();

        state.record_request(now);
        assert_eq!(state.request_count, 1);
        assert_eq!(state.last_request_time, Some(now));

        state.record_request(now);
        assert_eq!(state.request_count, 2);
    }

    #[test]
    fn test_time_until_next_request() {
        let mut state = HostState::new();
        let now = Instant::now();
        state.record_request(now);

        let wait = state
            .time_until_next_request(DELAY, now + Duration::from_millis(400))
            .unwrap();
        assert_eq!(wait, Duration::from_millis(600));

        assert_eq!(state.time_until_next_request(DELAY, now + DELAY), None);
        assert_eq!(state.time_until_next_request(Duration::ZERO, now), None);
    }

    #[test]
    fn test_try_acquire_records_only_when_admitted() {
        let mut state = HostState::new();
        let now = Instant::now();

        assert_eq!(state.try_acquire(DELAY, now), None);
        assert_eq!(state.request_count, 1);

        let wait = state.try_acquire(DELAY, now + Duration::from_millis(250));
        assert_eq!(wait, Some(Duration::from_millis(750)));
        assert_eq!(state.request_count, 1);

        assert_eq!(state.try_acquire(DELAY, now + DELAY), None);
        assert_eq!(state.request_count, 2);
        assert_eq!(state.last_request_time, Some(now + DELAY));
    }

    #[test]
    fn test_slot_starts_without_robots() {
        let slot = HostSlot::default();
        assert!(slot.robots.get().is_none());
        assert_eq!(slot.try_acquire(DELAY, Instant::now()), None);
        assert_eq!(slot.request_count(), 1);
    }
}
