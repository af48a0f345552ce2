//! # chatlog-db
//!
//! Local persistence layer for the chatlog archive.
//!
//! This crate provides:
//! - Key/value storage backends (filesystem with atomic writes, in-memory)
//! - The per-installation storage key
//! - The deduplicated message log with size-bounded compaction
//! - Persisted filter rules
//! - JSON/text/CSV export and validated JSON import
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chatlog_db::{Archive, FilesystemBackend};
//!
//! #[tokio::main]
//! async fn main() -> chatlog_db::Result<()> {
//!     let backend = Arc::new(FilesystemBackend::new("./chatlog-data"));
//!     let (archive, report) = Archive::open(backend).await;
//!     println!("{} messages ({} skipped)", archive.messages.len(), report.skipped);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod exchange;
pub mod filters;
pub mod install;
pub mod messages;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

// Re-export core types
pub use chatlog_core::*;

pub use backend::{validate_key, FilesystemBackend, MemoryBackend, StorageBackend};
pub use exchange::{
    export_file_name, parse_import, ExportDocument, ExportFormat, ImportBundle, ImportReport,
};
pub use filters::FilterRuleStore;
pub use install::{filter_rules_key, generate_storage_key, resolve_storage_key};
pub use messages::{AppendOutcome, CompactionPolicy, LoadReport, MessageStore};

/// Combined persistence context: the message log and the filter rules of
/// one installation.
pub struct Archive {
    /// This installation's storage key.
    pub storage_key: String,
    /// Deduplicated message log.
    pub messages: MessageStore,
    /// User filter rules.
    pub filters: FilterRuleStore,
}

impl Archive {
    /// Open the archive for the installation using `backend`, creating the
    /// storage key on first use.
    pub async fn open(backend: Arc<dyn StorageBackend>) -> (Self, LoadReport) {
        Self::open_at(backend, Utc::now()).await
    }

    /// Like [`Archive::open`] with an explicit creation time for a new key.
    pub async fn open_at(backend: Arc<dyn StorageBackend>, now: DateTime<Utc>) -> (Self, LoadReport) {
        let storage_key = resolve_storage_key(backend.as_ref(), now.timestamp_millis()).await;
        let (messages, report) = MessageStore::load(backend.clone(), storage_key.clone()).await;
        let filters = FilterRuleStore::load(backend, filter_rules_key(&storage_key)).await;
        (
            Self {
                storage_key,
                messages,
                filters,
            },
            report,
        )
    }

    /// Whether a candidate is suppressed by the current rules.
    pub fn is_filtered(&self, record: &MessageRecord) -> bool {
        self.filters.rules().matches(record)
    }

    /// Merge a validated import bundle. Existing records are never
    /// overwritten.
    pub async fn import(&mut self, bundle: ImportBundle) -> Result<ImportReport> {
        let added = self.messages.merge_imported(bundle.messages).await?;
        let rules_added = self.filters.merge(&bundle.filter_rules).await?;
        info!(
            messages_added = added.len(),
            rules_added,
            total = self.messages.len(),
            "Import completed"
        );
        Ok(ImportReport {
            messages_added: added.len(),
            rules_added,
            added,
        })
    }

    /// Parse and merge an exported JSON document.
    pub async fn import_str(&mut self, text: &str) -> Result<ImportReport> {
        let bundle = parse_import(text)?;
        self.import(bundle).await
    }

    /// Build an export of the records matching `query`, in stored order,
    /// together with the current filter rules.
    pub fn export(&self, query: &MessageQuery, exported_at: DateTime<Utc>) -> ExportDocument {
        let messages = self
            .messages
            .records()
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        ExportDocument::new(messages, self.filters.rules().clone(), exported_at)
    }

    /// Search view over the stored records.
    pub fn view(&self, query: MessageQuery) -> MessageView {
        MessageView::build(self.messages.records(), query)
    }
}
