//! Capture tuning.

use std::time::Duration;

use chatlog_core::defaults;
use chatlog_db::CompactionPolicy;

/// Configuration for the capture pipeline and worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Minimum interval between processed mutation callbacks (ms).
    pub throttle_ms: u64,
    /// Delay between mount and the start of observation (ms).
    pub settle_delay_ms: u64,
    /// Records processed per drain chunk.
    pub batch_size: usize,
    /// Delay between drain chunks (ms).
    pub drain_interval_ms: u64,
    /// Known keys not seen for this long are forgotten (s).
    pub stale_after_secs: i64,
    /// Stored records newer than this seed the known keys on mount (h).
    pub seed_window_hours: i64,
    /// Interval of the compaction check (s).
    pub compact_interval_secs: u64,
    /// Capacity of the worker's command channel.
    pub channel_capacity: usize,
    pub compaction: CompactionPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            throttle_ms: defaults::THROTTLE_MS,
            settle_delay_ms: defaults::SETTLE_DELAY_MS,
            batch_size: defaults::BATCH_SIZE,
            drain_interval_ms: defaults::DRAIN_INTERVAL_MS,
            stale_after_secs: defaults::STALE_AFTER_SECS,
            seed_window_hours: defaults::SEED_WINDOW_HOURS,
            compact_interval_secs: defaults::COMPACT_INTERVAL_SECS,
            channel_capacity: defaults::CHANNEL_CAPACITY,
            compaction: CompactionPolicy::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl CaptureConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CHATLOG_THROTTLE_MS` | `100` | Minimum gap between processed mutations |
    /// | `CHATLOG_SETTLE_DELAY_MS` | `2000` | Delay before observing after mount |
    /// | `CHATLOG_BATCH_SIZE` | `50` | Records per drain chunk |
    /// | `CHATLOG_DRAIN_INTERVAL_MS` | `500` | Delay between drain chunks |
    /// | `CHATLOG_STALE_AFTER_SECS` | `1800` | Known-key staleness window |
    /// | `CHATLOG_SEED_WINDOW_HOURS` | `24` | Age limit for seeding known keys |
    /// | `CHATLOG_COMPACT_INTERVAL_SECS` | `300` | Compaction check interval |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            throttle_ms: env_parse("CHATLOG_THROTTLE_MS").unwrap_or(base.throttle_ms),
            settle_delay_ms: env_parse("CHATLOG_SETTLE_DELAY_MS").unwrap_or(base.settle_delay_ms),
            batch_size: env_parse::<usize>("CHATLOG_BATCH_SIZE")
                .unwrap_or(base.batch_size)
                .max(1),
            drain_interval_ms: env_parse("CHATLOG_DRAIN_INTERVAL_MS")
                .unwrap_or(base.drain_interval_ms),
            stale_after_secs: env_parse("CHATLOG_STALE_AFTER_SECS")
                .unwrap_or(base.stale_after_secs),
            seed_window_hours: env_parse("CHATLOG_SEED_WINDOW_HOURS")
                .unwrap_or(base.seed_window_hours),
            compact_interval_secs: env_parse::<u64>("CHATLOG_COMPACT_INTERVAL_SECS")
                .unwrap_or(base.compact_interval_secs)
                .max(1),
            ..base
        }
    }

    pub fn with_throttle_ms(mut self, ms: u64) -> Self {
        self.throttle_ms = ms;
        self
    }

    pub fn with_settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    /// Set the drain chunk size (at least one).
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_drain_interval_ms(mut self, ms: u64) -> Self {
        self.drain_interval_ms = ms;
        self
    }

    pub fn with_stale_after_secs(mut self, secs: i64) -> Self {
        self.stale_after_secs = secs;
        self
    }

    pub fn with_seed_window_hours(mut self, hours: i64) -> Self {
        self.seed_window_hours = hours;
        self
    }

    pub fn with_compact_interval_secs(mut self, secs: u64) -> Self {
        self.compact_interval_secs = secs.max(1);
        self
    }

    pub fn with_compaction(mut self, policy: CompactionPolicy) -> Self {
        self.compaction = policy;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub(crate) fn throttle(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.throttle_ms as i64)
    }

    pub(crate) fn settle_delay(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.settle_delay_ms as i64)
    }

    pub(crate) fn drain_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.drain_interval_ms as i64)
    }

    pub(crate) fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs)
    }

    pub(crate) fn seed_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.seed_window_hours)
    }

    pub(crate) fn compact_interval(&self) -> Duration {
        Duration::from_secs(self.compact_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = CaptureConfig::default();
        assert_eq!(config.throttle_ms, 100);
        assert_eq!(config.settle_delay_ms, 2_000);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.drain_interval_ms, 500);
        assert_eq!(config.stale_after_secs, 1_800);
        assert_eq!(config.seed_window_hours, 24);
        assert_eq!(config.compact_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_builders() {
        let config = CaptureConfig::default()
            .with_throttle_ms(10)
            .with_batch_size(0)
            .with_settle_delay_ms(0);
        assert_eq!(config.throttle(), chrono::Duration::milliseconds(10));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.settle_delay_ms, 0);
    }
}
