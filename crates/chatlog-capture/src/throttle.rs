//! Coalescing throttle for mutation callbacks.

use chrono::{Duration, NaiveDateTime};

/// Drops callbacks that arrive within `min_interval` of the last admitted
/// one. Dropped callbacks are not queued.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last: Option<NaiveDateTime>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Admit or drop a callback arriving at `now`.
    ///
    /// A clock that moved backwards admits the callback and restarts the
    /// window from `now`.
    pub fn admit(&mut self, now: NaiveDateTime) -> bool {
        if let Some(last) = self.last {
            let elapsed = now - last;
            if elapsed >= Duration::zero() && elapsed < self.min_interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }

    pub fn last_admitted(&self) -> Option<NaiveDateTime> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(ms: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + Duration::milliseconds(ms)
    }

    #[test]
    fn test_callback_within_window_is_dropped() {
        let mut throttle = Throttle::new(Duration::milliseconds(100));
        assert!(throttle.admit(t(0)));
        assert!(!throttle.admit(t(50)));
        assert!(!throttle.admit(t(99)));
        assert!(throttle.admit(t(100)));
        assert_eq!(throttle.last_admitted(), Some(t(100)));
    }

    #[test]
    fn test_dropped_callbacks_do_not_extend_window() {
        let mut throttle = Throttle::new(Duration::milliseconds(100));
        assert!(throttle.admit(t(0)));
        assert!(!throttle.admit(t(60)));
        assert!(throttle.admit(t(120)));
    }

    #[test]
    fn test_clock_rewind_admits() {
        let mut throttle = Throttle::new(Duration::milliseconds(100));
        assert!(throttle.admit(t(1_000)));
        assert!(throttle.admit(t(0)));
        assert!(!throttle.admit(t(10)));
    }
}
