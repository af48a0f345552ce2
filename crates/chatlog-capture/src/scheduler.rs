//! Chunked drain queue.
//!
//! Candidates are queued and handed out in fixed-size chunks, one chunk per
//! drain interval, so a burst never has to be processed in one go. The
//! scheduler only decides *what* is due; the caller supplies "now" and does
//! the processing.

use std::collections::VecDeque;

use chrono::{Duration, NaiveDateTime};

/// Pending queue with a single drain loop.
#[derive(Debug, Clone)]
pub struct BatchScheduler<T> {
    pending: VecDeque<T>,
    batch_size: usize,
    interval: Duration,
    next_due: Option<NaiveDateTime>,
}

impl<T> BatchScheduler<T> {
    pub fn new(batch_size: usize, interval: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            batch_size: batch_size.max(1),
            interval,
            next_due: None,
        }
    }

    /// Append items to the tail of the queue.
    ///
    /// If no drain is active this starts one with the first chunk due
    /// immediately. An active drain keeps its schedule.
    pub fn enqueue<I>(&mut self, items: I, now: NaiveDateTime) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        self.pending.extend(items);
        if self.next_due.is_none() && !self.pending.is_empty() {
            self.next_due = Some(now);
        }
        self.pending.len()
    }

    /// Whether a drain loop is active.
    pub fn is_draining(&self) -> bool {
        self.next_due.is_some()
    }

    /// When the next chunk is due, if draining.
    pub fn next_due(&self) -> Option<NaiveDateTime> {
        self.next_due
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Take the chunk due at `now`, in enqueue order.
    ///
    /// Returns an empty chunk if nothing is due. The drain loop ends when
    /// the queue runs empty.
    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<T> {
        match self.next_due {
            Some(due) if now >= due => {}
            _ => return Vec::new(),
        }
        let take = self.batch_size.min(self.pending.len());
        let chunk: Vec<T> = self.pending.drain(..take).collect();
        self.next_due = if self.pending.is_empty() {
            None
        } else {
            Some(now + self.interval)
        };
        chunk
    }
}
