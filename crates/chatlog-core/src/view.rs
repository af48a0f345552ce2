//! Search view over the stored messages.
//!
//! This is the model behind the settings panel: a case-insensitive search
//! term, an optional kind restriction, newest-first ordering, pagination and
//! per-kind counts. Rendering is left to the caller.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::defaults::PAGE_SIZE;
use crate::models::{MessageKind, MessageRecord};

/// Kind restriction of a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KindFilter {
    #[default]
    All,
    Only(MessageKind),
}

impl KindFilter {
    fn accepts(&self, kind: MessageKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Only(k) => *k == kind,
        }
    }
}

/// Search criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    term: String,
    pub kind: KindFilter,
}

impl MessageQuery {
    /// Match everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search term (matched case-insensitively).
    pub fn with_term(mut self, term: impl AsRef<str>) -> Self {
        self.term = term.as_ref().trim().to_lowercase();
        self
    }

    pub fn with_kind(mut self, kind: KindFilter) -> Self {
        self.kind = kind;
        self
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// Whether a record satisfies the query.
    ///
    /// The term is looked up in content and sender, and in the group name
    /// for group messages.
    pub fn matches(&self, record: &MessageRecord) -> bool {
        if !self.kind.accepts(record.kind) {
            return false;
        }
        if self.term.is_empty() {
            return true;
        }
        record.content.to_lowercase().contains(&self.term)
            || record.sender.to_lowercase().contains(&self.term)
            || (record.is_group()
                && record
                    .group_name
                    .as_deref()
                    .is_some_and(|g| g.to_lowercase().contains(&self.term)))
    }
}

/// Counts shown above the message list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageStats {
    pub total: usize,
    pub group: usize,
    pub direct: usize,
}

/// A filtered, newest-first, paginated snapshot of the store.
#[derive(Debug, Clone)]
pub struct MessageView {
    query: MessageQuery,
    messages: Vec<MessageRecord>,
    page_size: usize,
    current_page: usize,
}

impl MessageView {
    /// Build a view from records in append order.
    pub fn build(records: &[MessageRecord], query: MessageQuery) -> Self {
        Self::with_page_size(records, query, PAGE_SIZE)
    }

    pub fn with_page_size(records: &[MessageRecord], query: MessageQuery, page_size: usize) -> Self {
        let messages = records
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        Self {
            query,
            messages,
            page_size: page_size.max(1),
            current_page: 1,
        }
    }

    /// Re-run the current query against fresh records, keeping the page
    /// when it still exists.
    pub fn refresh(&mut self, records: &[MessageRecord]) {
        let page = self.current_page;
        *self = Self::with_page_size(records, self.query.clone(), self.page_size);
        self.current_page = page.min(self.page_count()).max(1);
    }

    pub fn query(&self) -> &MessageQuery {
        &self.query
    }

    /// All matching messages, newest first.
    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    /// Number of pages (zero when nothing matches).
    pub fn page_count(&self) -> usize {
        self.messages.len().div_ceil(self.page_size)
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Jump to a page, clamped into `1..=page_count`. Returns the page
    /// actually selected.
    pub fn go_to(&mut self, page: usize) -> usize {
        self.current_page = page.clamp(1, self.page_count().max(1));
        self.current_page
    }

    pub fn next_page(&mut self) -> usize {
        self.go_to(self.current_page + 1)
    }

    pub fn prev_page(&mut self) -> usize {
        self.go_to(self.current_page.saturating_sub(1))
    }

    /// Messages on the current page.
    pub fn page(&self) -> &[MessageRecord] {
        let start = (self.current_page - 1) * self.page_size;
        let end = (start + self.page_size).min(self.messages.len());
        self.messages.get(start..end).unwrap_or(&[])
    }

    pub fn stats(&self) -> MessageStats {
        let group = self.messages.iter().filter(|m| m.is_group()).count();
        MessageStats {
            total: self.messages.len(),
            group,
            direct: self.messages.len() - group,
        }
    }
}

/// Shared handle to the currently open view.
///
/// The capture side refreshes it after every change to the store; whoever
/// displays the view reads it through [`ViewHandle::lock`].
#[derive(Debug, Clone)]
pub struct ViewHandle {
    inner: Arc<Mutex<MessageView>>,
}

impl ViewHandle {
    pub fn new(view: MessageView) -> Self {
        Self {
            inner: Arc::new(Mutex::new(view)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, MessageView> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-run the view's query against `records`.
    pub fn refresh(&self, records: &[MessageRecord]) {
        self.lock().refresh(records);
    }

    /// Copy of the current view.
    pub fn snapshot(&self) -> MessageView {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<MessageRecord> {
        vec![
            MessageRecord::direct("Alice", "20240101 09:00", "Good morning"),
            MessageRecord::group("Rustaceans", "Bob", "20240101 09:05", "cargo build"),
            MessageRecord::group("Gophers", "Carol", "20240101 09:10", "go vet"),
            MessageRecord::direct("Dave", "20240101 09:15", "see you"),
        ]
    }

    #[test]
    fn test_view_is_newest_first() {
        let view = MessageView::build(&sample(), MessageQuery::new());
        assert_eq!(view.messages()[0].sender, "Dave");
        assert_eq!(view.messages()[3].sender, "Alice");
    }

    #[test]
    fn test_term_is_case_insensitive() {
        let view = MessageView::build(&sample(), MessageQuery::new().with_term("GOOD"));
        assert_eq!(view.messages().len(), 1);
        assert_eq!(view.messages()[0].sender, "Alice");
    }

    #[test]
    fn test_term_matches_group_name() {
        let view = MessageView::build(&sample(), MessageQuery::new().with_term("rustacean"));
        assert_eq!(view.messages().len(), 1);
        assert_eq!(view.messages()[0].sender, "Bob");
    }

    #[test]
    fn test_kind_filter() {
        let query = MessageQuery::new().with_kind(KindFilter::Only(MessageKind::Direct));
        let view = MessageView::build(&sample(), query);
        assert!(view.messages().iter().all(|m| !m.is_group()));
        assert_eq!(view.stats(), MessageStats { total: 2, group: 0, direct: 2 });
    }

    #[test]
    fn test_stats() {
        let view = MessageView::build(&sample(), MessageQuery::new());
        assert_eq!(view.stats(), MessageStats { total: 4, group: 2, direct: 2 });
    }

    #[test]
    fn test_pagination_clamps() {
        let mut view = MessageView::with_page_size(&sample(), MessageQuery::new(), 3);
        assert_eq!(view.page_count(), 2);
        assert_eq!(view.page().len(), 3);
        assert_eq!(view.next_page(), 2);
        assert_eq!(view.page().len(), 1);
        assert_eq!(view.next_page(), 2);
        assert_eq!(view.go_to(0), 1);
        assert_eq!(view.go_to(99), 2);
        assert_eq!(view.prev_page(), 1);
    }

    #[test]
    fn test_empty_view_has_no_pages() {
        let view = MessageView::build(&[], MessageQuery::new());
        assert_eq!(view.page_count(), 0);
        assert!(view.page().is_empty());
        assert_eq!(view.current_page(), 1);
    }

    #[test]
    fn test_refresh_keeps_query_and_page() {
        let mut records = sample();
        let mut view =
            MessageView::with_page_size(&records, MessageQuery::new().with_term("o"), 1);
        view.go_to(2);
        records.push(MessageRecord::direct("Eve", "20240101 09:20", "hello"));
        view.refresh(&records);
        assert_eq!(view.current_page(), 2);
        assert_eq!(view.messages()[0].sender, "Eve");
    }

    #[test]
    fn test_view_handle_refresh_is_shared() {
        let mut records = sample();
        let handle = ViewHandle::new(MessageView::build(&records, MessageQuery::new()));
        let other = handle.clone();

        records.push(MessageRecord::direct("Eve", "20240101 09:20", "hello"));
        handle.refresh(&records);

        assert_eq!(other.snapshot().stats().total, 5);
        assert_eq!(other.lock().messages()[0].sender, "Eve");
    }
}
