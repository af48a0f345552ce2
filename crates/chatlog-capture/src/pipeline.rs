//! The capture pipeline: one context object owning everything a running
//! observer needs.
//!
//! All operations take "now" explicitly and never sleep; the worker loop
//! (or a test) decides when to call them. Failures local to one node, one
//! record or one mutation batch are logged and swallowed here.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, instrument, trace, warn};

use chatlog_core::{capture_key, message_key, CaptureEvent, EventBus, FilterField, MessageRecord};
use chatlog_core::{Result, ViewHandle};
use chatlog_db::{AppendOutcome, Archive, ImportBundle, ImportReport};

use crate::config::CaptureConfig;
use crate::extractor::MessageExtractor;
use crate::known_keys::KnownKeys;
use crate::observer::{Observer, ObserverState};
use crate::scheduler::BatchScheduler;

/// Counters for one drained chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub saved: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl DrainSummary {
    pub fn processed(&self) -> usize {
        self.saved + self.filtered + self.duplicates + self.rejected + self.failed
    }
}

/// Point-in-time view of a pipeline's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStatus {
    pub state: ObserverState,
    pub pending: usize,
    pub draining: bool,
    pub known_keys: usize,
    pub stored: usize,
}

/// Capture context for nodes of type `N`.
pub struct CapturePipeline<N> {
    archive: Archive,
    extractor: Arc<dyn MessageExtractor<N>>,
    config: CaptureConfig,
    observer: Observer,
    known: KnownKeys,
    scheduler: BatchScheduler<MessageRecord>,
    events: EventBus,
    view: Option<ViewHandle>,
    seeded: usize,
    compaction_pending: bool,
}

impl<N> CapturePipeline<N> {
    pub fn new(
        archive: Archive,
        extractor: Arc<dyn MessageExtractor<N>>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            archive,
            extractor,
            observer: Observer::new(config.settle_delay(), config.throttle()),
            known: KnownKeys::new(config.stale_after()),
            scheduler: BatchScheduler::new(config.batch_size, config.drain_interval()),
            events: EventBus::default(),
            view: None,
            seeded: 0,
            compaction_pending: false,
            config,
        }
    }

    /// Publish events on an existing bus instead of a private one.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> ObserverState {
        self.observer.state()
    }

    pub fn known_keys(&self) -> &KnownKeys {
        &self.known
    }

    /// Candidates waiting to be filtered and stored.
    pub fn pending(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn is_draining(&self) -> bool {
        self.scheduler.is_draining()
    }

    pub fn compaction_pending(&self) -> bool {
        self.compaction_pending
    }

    pub fn status(&self) -> CaptureStatus {
        CaptureStatus {
            state: self.observer.state(),
            pending: self.scheduler.pending(),
            draining: self.scheduler.is_draining(),
            known_keys: self.known.len(),
            stored: self.archive.messages.len(),
        }
    }

    /// Attach the currently open view; it is refreshed right away.
    pub fn attach_view(&mut self, view: ViewHandle) {
        view.refresh(self.archive.messages.records());
        self.view = Some(view);
    }

    /// Detach the open view, returning it if one was attached.
    pub fn detach_view(&mut self) -> Option<ViewHandle> {
        self.view.take()
    }

    /// Earliest time at which [`CapturePipeline::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<NaiveDateTime> {
        match (self.observer.ready_at(), self.scheduler.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Handle the mount signal: start the settle delay and seed the known
    /// keys from recently stored records.
    pub fn mount(&mut self, now: NaiveDateTime) -> bool {
        if !self.observer.mount(now) {
            return false;
        }
        let recent = self
            .archive
            .messages
            .recent_keys(now, self.config.seed_window());
        self.seeded = self.known.seed(recent, now);
        debug!(seeded_keys = self.seeded, "Seeded known keys from store");
        true
    }

    /// Handle the unmount signal. Without the shutdown flag only the open
    /// view is detached. Returns true if observation stopped.
    pub fn unmount(&mut self, shutting_down: bool) -> bool {
        if self.detach_view().is_some() {
            debug!("View detached");
        }
        if !shutting_down {
            debug!("Unmount without shutdown, observation continues");
            return false;
        }
        if !self.observer.stop() {
            return false;
        }
        info!(
            pending = self.scheduler.pending(),
            "Observer stopped, pending candidates dropped"
        );
        self.events.emit(CaptureEvent::ObserverStopped);
        true
    }

    /// Advance timers: finish the settle delay, drain a due chunk, and run
    /// a deferred compaction once no drain is active.
    pub async fn poll(&mut self, now: NaiveDateTime) -> DrainSummary {
        self.finish_settle(now);
        if self.observer.is_stopped() {
            return DrainSummary::default();
        }
        let summary = self.drain(now).await;
        self.retry_deferred_compaction().await;
        summary
    }

    fn finish_settle(&mut self, now: NaiveDateTime) {
        if self.observer.poll_ready(now) {
            info!(seeded_keys = self.seeded, "Observer started");
            self.events.emit(CaptureEvent::ObserverStarted {
                seeded_keys: self.seeded,
            });
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Handle one mutation callback carrying the full visible node list.
    ///
    /// Returns the number of candidates forwarded to the scheduler. A
    /// throttled callback, or one arriving before observation started,
    /// forwards nothing.
    #[instrument(skip(self, nodes), fields(node_count = nodes.len()))]
    pub async fn on_mutation(&mut self, nodes: &[N], now: NaiveDateTime) -> usize {
        self.finish_settle(now);
        if !self.observer.admit_mutation(now) {
            return 0;
        }

        let mut fresh = Vec::new();
        for node in nodes {
            let record = match self
                .extractor
                .extract(node)
                .and_then(|record| record.validate_candidate().map(|()| record))
            {
                Ok(record) => record,
                Err(e) => {
                    trace!(error = %e, "Skipping node");
                    continue;
                }
            };
            let key = capture_key(&record);
            if self.known.observe(&key, now) {
                trace!(message_key = %key, "New candidate");
                fresh.push(record);
            }
        }
        let evicted = self.known.sweep(now);
        if evicted > 0 {
            debug!(evicted, "Evicted stale known keys");
        }

        let forwarded = fresh.len();
        if forwarded > 0 {
            let pending = self.scheduler.enqueue(fresh, now);
            debug!(forwarded, pending, "Queued candidates");
            self.drain(now).await;
            self.retry_deferred_compaction().await;
        }
        forwarded
    }

    /// Filter and store the chunk due at `now`, if any.
    async fn drain(&mut self, now: NaiveDateTime) -> DrainSummary {
        let chunk = self.scheduler.tick(now);
        let mut summary = DrainSummary::default();
        if chunk.is_empty() {
            return summary;
        }

        for candidate in chunk {
            if self.archive.is_filtered(&candidate) {
                let key = capture_key(&candidate);
                trace!(message_key = %key, "Candidate filtered");
                self.events.emit(CaptureEvent::MessageFiltered { key });
                summary.filtered += 1;
                continue;
            }

            let record = candidate.with_full_time(now.date());
            let key = message_key(&record);
            if let Err(e) = record.validate_stored() {
                warn!(message_key = %key, error = %e, "Rejected invalid message");
                self.events.emit(CaptureEvent::MessageRejected {
                    key,
                    reason: e.to_string(),
                });
                summary.rejected += 1;
                continue;
            }
            match self.archive.messages.append(record).await {
                Ok(AppendOutcome::Appended) => {
                    trace!(message_key = %key, "Message saved");
                    self.events.emit(CaptureEvent::MessageSaved { key });
                    summary.saved += 1;
                }
                Ok(AppendOutcome::Duplicate) => {
                    self.events.emit(CaptureEvent::MessageDuplicate { key });
                    summary.duplicates += 1;
                }
                Err(e) => {
                    warn!(message_key = %key, error = %e, "Failed to save message");
                    self.events.emit(CaptureEvent::SaveFailed {
                        key,
                        error: e.to_string(),
                    });
                    summary.failed += 1;
                }
            }
        }

        debug!(
            batch_size = summary.processed(),
            saved = summary.saved,
            filtered = summary.filtered,
            pending = self.scheduler.pending(),
            "Drained chunk"
        );
        if summary.saved > 0 {
            self.refresh_view();
        }
        summary
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Periodic compaction check. Deferred while a drain is active.
    pub async fn request_compaction(&mut self) -> Option<usize> {
        if self.scheduler.is_draining() {
            debug!(
                pending = self.scheduler.pending(),
                "Drain active, compaction deferred"
            );
            self.compaction_pending = true;
            return None;
        }
        Some(self.run_compaction().await)
    }

    async fn retry_deferred_compaction(&mut self) {
        if self.compaction_pending && !self.scheduler.is_draining() {
            debug!("Running deferred compaction");
            self.run_compaction().await;
        }
    }

    async fn run_compaction(&mut self) -> usize {
        self.compaction_pending = false;
        match self
            .archive
            .messages
            .compact_if_oversized(self.config.compaction)
            .await
        {
            Ok(0) => 0,
            Ok(removed) => {
                self.events.emit(CaptureEvent::MessagesCompacted {
                    removed,
                    remaining: self.archive.messages.len(),
                });
                self.refresh_view();
                removed
            }
            Err(e) => {
                error!(error = %e, "Compaction failed to persist");
                self.refresh_view();
                0
            }
        }
    }

    // =========================================================================
    // Rules and import
    // =========================================================================

    /// Add a filter rule; it applies from the next drained candidate.
    pub async fn add_rule(&mut self, field: FilterField, pattern: &str) -> Result<bool> {
        self.archive.filters.add(field, pattern).await
    }

    pub async fn remove_rule(&mut self, field: FilterField, pattern: &str) -> Result<bool> {
        self.archive.filters.remove(field, pattern).await
    }

    /// Merge an import and mark its new records as known.
    pub async fn import(&mut self, bundle: ImportBundle, now: NaiveDateTime) -> Result<ImportReport> {
        let report = self.archive.import(bundle).await?;
        self.known.seed(report.added.iter().map(capture_key), now);
        self.events.emit(CaptureEvent::ImportCompleted {
            messages_added: report.messages_added,
            rules_added: report.rules_added,
        });
        self.refresh_view();
        Ok(report)
    }

    /// Rebuild the known keys from the store, as on mount.
    pub fn rebuild_known_keys(&mut self, now: NaiveDateTime) -> usize {
        self.known.clear();
        let recent = self
            .archive
            .messages
            .recent_keys(now, self.config.seed_window());
        self.known.seed(recent, now)
    }

    fn refresh_view(&self) {
        if let Some(view) = &self.view {
            view.refresh(self.archive.messages.records());
        }
    }

    /// Consume the pipeline, returning the archive.
    pub fn into_archive(self) -> Archive {
        self.archive
    }
}
