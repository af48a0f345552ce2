//! Centralized default constants for chatlog.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// CAPTURE
// =============================================================================

/// Minimum interval between two processed mutation callbacks (milliseconds).
///
/// Callbacks arriving sooner are dropped, not queued.
pub const THROTTLE_MS: u64 = 100;

/// Delay between the mount signal and the start of observation (milliseconds).
pub const SETTLE_DELAY_MS: u64 = 2_000;

/// Known keys not seen for this long are evicted (seconds).
pub const STALE_AFTER_SECS: i64 = 30 * 60;

/// Only persisted records newer than this seed the known-key set (hours).
pub const SEED_WINDOW_HOURS: i64 = 24;

// =============================================================================
// BATCHING
// =============================================================================

/// Records processed per drain chunk.
pub const BATCH_SIZE: usize = 50;

/// Interval between two drain chunks (milliseconds).
pub const DRAIN_INTERVAL_MS: u64 = 500;

/// Capacity of the DOM event channel feeding the capture worker.
pub const CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Interval between compaction checks (seconds).
pub const COMPACT_INTERVAL_SECS: u64 = 5 * 60;

/// Stored record count above which compaction truncates the log.
pub const COMPACT_HIGH_WATER: usize = 10_000;

/// Number of most recent records kept by compaction.
pub const COMPACT_LOW_WATER: usize = 5_000;

/// Backend key holding the per-installation storage key.
pub const STORAGE_KEY_POINTER: &str = "current_storage_key";

/// Prefix of generated per-installation storage keys.
pub const STORAGE_KEY_PREFIX: &str = "message_save";

/// Suffix appended to the storage key for the filter rule document.
pub const FILTER_RULES_SUFFIX: &str = "_filter_rules";

// =============================================================================
// MESSAGES
// =============================================================================

/// Placeholder stored instead of empty (emoji or sticker only) content.
pub const EMPTY_CONTENT_PLACEHOLDER: &str = "表情";

/// Format of a fully qualified message time.
pub const FULL_TIME_FORMAT: &str = "%Y%m%d %H:%M";

/// Format of the time of day shown for a captured message.
pub const SHORT_TIME_FORMAT: &str = "%H:%M";

/// Date prefix format used when qualifying a captured time.
pub const DATE_PREFIX_FORMAT: &str = "%Y%m%d";

// =============================================================================
// VIEW / EXPORT
// =============================================================================

/// Messages per page in the search view.
pub const PAGE_SIZE: usize = 50;

/// Version string written into export documents.
pub const EXPORT_VERSION: &str = "1.0.3";

/// File name stem for exports (followed by `_YYYYMMDD_HHMM`).
pub const EXPORT_FILE_STEM: &str = "chat_messages";

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compaction_watermarks_ordered() {
        assert!(COMPACT_LOW_WATER < COMPACT_HIGH_WATER);
    }

    #[test]
    fn test_throttle_shorter_than_drain() {
        assert!(THROTTLE_MS < DRAIN_INTERVAL_MS);
    }
}
