//! Mapping UI nodes to candidate records.

use serde::{Deserialize, Serialize};

use chatlog_core::{Error, MessageRecord, Result};

/// Separator between sender and text in a group conversation summary.
const GROUP_SUMMARY_SEPARATOR: char = '：';

/// Turns one UI node into a candidate record.
///
/// A node lacking the expected structure yields [`Error::Extraction`]; the
/// pipeline skips it and keeps scanning.
pub trait MessageExtractor<N>: Send + Sync {
    fn extract(&self, node: &N) -> Result<MessageRecord>;
}

impl<N, F> MessageExtractor<N> for F
where
    F: Fn(&N) -> Result<MessageRecord> + Send + Sync,
{
    fn extract(&self, node: &N) -> Result<MessageRecord> {
        self(node)
    }
}

/// Snapshot of one entry of the recent-contacts list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactNode {
    /// Conversation title: the contact for direct chats, the group otherwise.
    pub title: Option<String>,
    /// Displayed time of the last message (`HH:MM`).
    pub time: Option<String>,
    /// Last-message preview, `"sender：text"` in groups.
    pub summary: Option<String>,
}

impl ContactNode {
    pub fn new(title: &str, time: &str, summary: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            time: Some(time.to_string()),
            summary: Some(summary.to_string()),
        }
    }
}

/// Extractor for [`ContactNode`] previews.
///
/// A full-width colon that is neither the first nor the last character of
/// the summary marks a group message; anything else is a direct message
/// from the conversation title.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryExtractor;

impl MessageExtractor<ContactNode> for SummaryExtractor {
    fn extract(&self, node: &ContactNode) -> Result<MessageRecord> {
        let title = required(&node.title, "title")?;
        let time = required(&node.time, "time")?;
        let summary = required(&node.summary, "summary")?;

        let record = match summary.find(GROUP_SUMMARY_SEPARATOR) {
            Some(idx) if idx > 0 && idx + GROUP_SUMMARY_SEPARATOR.len_utf8() < summary.len() => {
                let sender = summary[..idx].trim();
                let text = &summary[idx + GROUP_SUMMARY_SEPARATOR.len_utf8()..];
                MessageRecord::group(title, sender, time, text)
            }
            _ => MessageRecord::direct(title, time, summary),
        };

        record
            .validate_candidate()
            .map_err(|e| Error::Extraction(e.to_string()))?;
        Ok(record)
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) => Ok(v),
        None => Err(Error::Extraction(format!("node has no {}", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlog_core::MessageKind;

    #[test]
    fn test_group_summary() {
        let node = ContactNode::new(" Rustaceans ", "09:05", "Bob： cargo build ");
        let record = SummaryExtractor.extract(&node).unwrap();
        assert_eq!(record.kind, MessageKind::Group);
        assert_eq!(record.group_name.as_deref(), Some("Rustaceans"));
        assert_eq!(record.sender, "Bob");
        assert_eq!(record.time, "09:05");
        assert_eq!(record.content, "cargo build");
    }

    #[test]
    fn test_direct_summary() {
        let node = ContactNode::new("Alice", "09:00", "hi");
        let record = SummaryExtractor.extract(&node).unwrap();
        assert_eq!(record, MessageRecord::direct("Alice", "09:00", "hi"));
    }

    #[test]
    fn test_colon_at_edges_is_direct() {
        let leading = SummaryExtractor
            .extract(&ContactNode::new("Alice", "09:00", "：hi"))
            .unwrap();
        assert_eq!(leading.kind, MessageKind::Direct);
        assert_eq!(leading.content, "：hi");

        let trailing = SummaryExtractor
            .extract(&ContactNode::new("Alice", "09:00", "note："))
            .unwrap();
        assert_eq!(trailing.kind, MessageKind::Direct);
    }

    #[test]
    fn test_ascii_colon_is_not_a_separator() {
        let record = SummaryExtractor
            .extract(&ContactNode::new("Alice", "09:00", "Bob: hi"))
            .unwrap();
        assert_eq!(record.kind, MessageKind::Direct);
    }

    #[test]
    fn test_trailing_colon_after_trim_is_direct() {
        let record = SummaryExtractor
            .extract(&ContactNode::new("Team", "09:00", "Bob： "))
            .unwrap();
        assert_eq!(record.kind, MessageKind::Direct);
        assert_eq!(record.sender, "Team");
        assert_eq!(record.content, "Bob：");
    }

    #[test]
    fn test_empty_text_becomes_placeholder() {
        let direct = SummaryExtractor
            .extract(&ContactNode::new("Alice", "09:00", ""))
            .unwrap();
        assert_eq!(direct.content, "表情");
    }

    #[test]
    fn test_missing_parts_fail() {
        let node = ContactNode {
            title: Some("Alice".into()),
            time: None,
            summary: Some("hi".into()),
        };
        assert!(matches!(
            SummaryExtractor.extract(&node),
            Err(Error::Extraction(_))
        ));
        assert!(SummaryExtractor
            .extract(&ContactNode::new("", "09:00", "hi"))
            .is_err());
    }

    #[test]
    fn test_day_label_time_is_not_extractable() {
        for label in ["昨天", "星期二", "12/30"] {
            let result = SummaryExtractor.extract(&ContactNode::new("Alice", label, "hi"));
            assert!(
                matches!(result, Err(Error::Extraction(_))),
                "{} extracted",
                label
            );
        }
    }

    #[test]
    fn test_closure_extractor() {
        let extractor =
            |n: &String| -> Result<MessageRecord> { Ok(MessageRecord::direct("X", "09:00", n)) };
        let record = extractor.extract(&"hey".to_string()).unwrap();
        assert_eq!(record.content, "hey");
    }
}
