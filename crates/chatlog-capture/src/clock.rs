//! Clock for the worker loop.

use chatlog_core::Clock;
use chrono::{Duration, NaiveDateTime};
use tokio::time::Instant;

/// Wall time derived from tokio's monotonic clock.
///
/// Anchored to a wall-clock reading at creation and advanced by
/// [`tokio::time::Instant`], so the worker's timers and its notion of "now"
/// never disagree, including under paused test time.
#[derive(Debug, Clone, Copy)]
pub struct InstantClock {
    wall: NaiveDateTime,
    started: Instant,
}

impl InstantClock {
    pub fn new(wall: NaiveDateTime) -> Self {
        Self {
            wall,
            started: Instant::now(),
        }
    }

    /// Anchor to the system's local time.
    pub fn system() -> Self {
        Self::new(chatlog_core::SystemClock.now())
    }

    /// Wall time at which `instant` occurs.
    pub fn at(&self, instant: Instant) -> NaiveDateTime {
        let elapsed = instant.saturating_duration_since(self.started);
        self.wall + Duration::from_std(elapsed).unwrap_or(Duration::zero())
    }

    /// Instant at which wall time `at` occurs (now, if it is already past).
    pub fn instant_of(&self, at: NaiveDateTime) -> Instant {
        let offset = (at - self.wall).to_std().unwrap_or_default();
        self.started + offset
    }
}

impl Clock for InstantClock {
    fn now(&self) -> NaiveDateTime {
        self.at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn nine() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_follows_paused_time() {
        let clock = InstantClock::new(nine());
        assert_eq!(clock.now(), nine());
        tokio::time::advance(std::time::Duration::from_millis(1_500)).await;
        assert_eq!(clock.now(), nine() + Duration::milliseconds(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_of_roundtrips() {
        let clock = InstantClock::new(nine());
        let later = nine() + Duration::seconds(2);
        assert_eq!(clock.at(clock.instant_of(later)), later);
        assert_eq!(clock.instant_of(nine() - Duration::seconds(5)), clock.started);
    }
}
