//! Session cache of recently seen identity keys.
//!
//! Every key carries a last-seen time. A key that has not been seen for the
//! staleness window is forgotten, so the same text reappearing after a long
//! gap is treated as new again.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};

/// Known-key set with per-key recency.
#[derive(Debug, Clone)]
pub struct KnownKeys {
    last_seen: HashMap<String, NaiveDateTime>,
    stale_after: Duration,
}

impl KnownKeys {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            stale_after,
        }
    }

    /// Refresh the key's last-seen time and report whether it was unknown.
    ///
    /// An unknown key becomes known.
    pub fn observe(&mut self, key: &str, now: NaiveDateTime) -> bool {
        match self.last_seen.get_mut(key) {
            Some(seen) => {
                *seen = now;
                false
            }
            None => {
                self.last_seen.insert(key.to_string(), now);
                true
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.last_seen.contains_key(key)
    }

    /// Mark keys as known, seen at `now`. Returns how many were new.
    pub fn seed<I>(&mut self, keys: I, now: NaiveDateTime) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        keys.into_iter()
            .filter(|key| self.observe(key, now))
            .count()
    }

    /// Forget keys not seen within the staleness window. Returns how many
    /// were evicted.
    pub fn sweep(&mut self, now: NaiveDateTime) -> usize {
        let before = self.last_seen.len();
        let cutoff = now - self.stale_after;
        self.last_seen.retain(|_, seen| *seen >= cutoff);
        before - self.last_seen.len()
    }

    /// Drop everything, e.g. before rebuilding from the store.
    pub fn clear(&mut self) {
        self.last_seen.clear();
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(min: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + Duration::minutes(min)
    }

    #[test]
    fn test_observe_reports_new_keys_once() {
        let mut keys = KnownKeys::new(Duration::minutes(30));
        assert!(keys.observe("a", t(0)));
        assert!(!keys.observe("a", t(1)));
        assert!(keys.contains("a"));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_stale_keys_are_evicted() {
        let mut keys = KnownKeys::new(Duration::minutes(30));
        keys.observe("old", t(0));
        keys.observe("fresh", t(0));
        keys.observe("fresh", t(20));

        assert_eq!(keys.sweep(t(31)), 1);
        assert!(!keys.contains("old"));
        assert!(keys.contains("fresh"));

        assert!(keys.observe("old", t(32)));
    }

    #[test]
    fn test_seed_counts_new_keys() {
        let mut keys = KnownKeys::new(Duration::minutes(30));
        keys.observe("a", t(0));
        let added = keys.seed(vec!["a".to_string(), "b".to_string()], t(5));
        assert_eq!(added, 1);
        assert_eq!(keys.sweep(t(34)), 0);
        keys.clear();
        assert!(keys.is_empty());
    }
}
