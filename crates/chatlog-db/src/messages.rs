//! Durable, deduplicated message log.
//!
//! The store keeps the full list in memory and rewrites the whole JSON
//! document on every change. That is fine for a single-user archive of a
//! few thousand records; [`MessageStore::compact_if_oversized`] keeps it in
//! that range by discarding the oldest records.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, error, info, instrument, trace, warn};

use chatlog_core::defaults::{COMPACT_HIGH_WATER, COMPACT_LOW_WATER};
use chatlog_core::{capture_key, message_key, same_message, Error, MessageRecord, Result};

use crate::backend::StorageBackend;

/// High/low water marks for compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionPolicy {
    /// Compaction runs only when the record count exceeds this.
    pub high_water: usize,
    /// Number of most recent records kept.
    pub low_water: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            high_water: COMPACT_HIGH_WATER,
            low_water: COMPACT_LOW_WATER,
        }
    }
}

impl CompactionPolicy {
    pub fn new(high_water: usize, low_water: usize) -> Result<Self> {
        if low_water > high_water {
            return Err(Error::Config(format!(
                "compaction low water {} exceeds high water {}",
                low_water, high_water
            )));
        }
        Ok(Self {
            high_water,
            low_water,
        })
    }
}

/// Result of loading the persisted log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Records loaded into memory.
    pub loaded: usize,
    /// Entries dropped because they were not valid records.
    pub skipped: usize,
    /// Why the document could not be read at all, if it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl LoadReport {
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

/// Outcome of [`MessageStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was new and has been persisted.
    Appended,
    /// An equal record was already stored; nothing changed.
    Duplicate,
}

/// Persistence store for captured messages.
pub struct MessageStore {
    backend: Arc<dyn StorageBackend>,
    key: String,
    records: Vec<MessageRecord>,
}

impl MessageStore {
    /// Load the log stored under `key`.
    ///
    /// Read and parse failures never propagate: the store starts empty and
    /// the report says why.
    pub async fn load(backend: Arc<dyn StorageBackend>, key: impl Into<String>) -> (Self, LoadReport) {
        let mut store = Self {
            backend,
            key: key.into(),
            records: Vec::new(),
        };
        let report = store.reload().await;
        (store, report)
    }

    /// Replace the in-memory list with what is persisted.
    #[instrument(skip(self), fields(storage_key = %self.key))]
    pub async fn reload(&mut self) -> LoadReport {
        let raw = match self.backend.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No persisted messages, starting empty");
                self.records.clear();
                return LoadReport::default();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted messages, starting empty");
                self.records.clear();
                return LoadReport {
                    failure: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let (records, report) = decode_records(&raw);
        if let Some(failure) = &report.failure {
            warn!(%failure, "Persisted messages are malformed, starting empty");
        } else if report.skipped > 0 {
            warn!(
                skipped = report.skipped,
                "Dropped invalid entries from persisted messages"
            );
        }
        info!(loaded = report.loaded, "Loaded persisted messages");
        self.records = records;
        report
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// All stored records in append order.
    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a record equal to `record` is stored.
    pub fn contains(&self, record: &MessageRecord) -> bool {
        self.records.iter().any(|r| same_message(r, record))
    }

    /// Append a record unless an equal one is already stored.
    ///
    /// On a write failure the record stays in memory (and is written with
    /// the next successful change) and the error is returned.
    pub async fn append(&mut self, record: MessageRecord) -> Result<AppendOutcome> {
        record.validate_stored()?;
        if self.contains(&record) {
            trace!(message_key = %message_key(&record), "Duplicate record, not appended");
            return Ok(AppendOutcome::Duplicate);
        }
        self.records.push(record);
        self.persist().await?;
        Ok(AppendOutcome::Appended)
    }

    /// Drop every record.
    pub async fn clear(&mut self) -> Result<()> {
        let removed = self.records.len();
        self.records.clear();
        self.persist().await?;
        info!(removed, "Cleared message store");
        Ok(())
    }

    /// Truncate to the `low_water` most recent records once the log holds
    /// more than `high_water`. Returns the number of records discarded.
    #[instrument(skip(self), fields(storage_key = %self.key, len = self.records.len()))]
    pub async fn compact_if_oversized(&mut self, policy: CompactionPolicy) -> Result<usize> {
        if self.records.len() <= policy.high_water {
            return Ok(0);
        }
        let removed = self.records.len().saturating_sub(policy.low_water);
        if removed == 0 {
            return Ok(0);
        }
        self.records.drain(..removed);
        self.persist().await?;
        info!(
            removed,
            remaining = self.records.len(),
            "Compacted message store"
        );
        Ok(removed)
    }

    /// Union-merge records (already validated), skipping ones equal to a
    /// stored record or to an earlier record of the same batch. Persists
    /// once and returns the records that were added.
    pub async fn merge_imported(
        &mut self,
        records: Vec<MessageRecord>,
    ) -> Result<Vec<MessageRecord>> {
        let mut keys: HashSet<String> = self.records.iter().map(message_key).collect();
        let mut added = Vec::new();
        for record in records {
            let key = message_key(&record);
            if keys.contains(&key) && self.contains(&record) {
                continue;
            }
            keys.insert(key);
            self.records.push(record.clone());
            added.push(record);
        }
        if !added.is_empty() {
            self.persist().await?;
        }
        Ok(added)
    }

    /// Capture keys of records whose full time lies within `window` of `now`.
    ///
    /// Records without a parseable full time are skipped.
    pub fn recent_keys(&self, now: NaiveDateTime, window: Duration) -> Vec<String> {
        let cutoff = now - window;
        self.records
            .iter()
            .filter(|r| r.full_time().is_some_and(|t| t >= cutoff))
            .map(capture_key)
            .collect()
    }

    async fn persist(&self) -> Result<()> {
        let start = Instant::now();
        let json = serde_json::to_string(&self.records)?;
        if let Err(e) = self.backend.set(&self.key, &json).await {
            error!(
                storage_key = %self.key,
                error = %e,
                "Failed to persist messages; in-memory list stays authoritative"
            );
            return Err(match e {
                Error::Storage(_) => e,
                other => Error::Storage(other.to_string()),
            });
        }
        debug!(
            result_count = self.records.len(),
            bytes = json.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Persisted messages"
        );
        Ok(())
    }
}

/// Decode a persisted document, keeping valid records and counting the rest.
fn decode_records(raw: &str) -> (Vec<MessageRecord>, LoadReport) {
    let entries: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(serde_json::Value::Array(entries)) => entries,
        Ok(_) => {
            return (
                Vec::new(),
                LoadReport {
                    failure: Some("persisted messages are not a list".into()),
                    ..Default::default()
                },
            )
        }
        Err(e) => {
            return (
                Vec::new(),
                LoadReport {
                    failure: Some(e.to_string()),
                    ..Default::default()
                },
            )
        }
    };

    let mut records = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for entry in entries {
        match serde_json::from_value::<MessageRecord>(entry) {
            Ok(record) if record.validate_stored().is_ok() => records.push(record),
            _ => skipped += 1,
        }
    }
    let report = LoadReport {
        loaded: records.len(),
        skipped,
        failure: None,
    };
    (records, report)
}
