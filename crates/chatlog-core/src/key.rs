//! Message identity.
//!
//! The coarse key (`kind_sender_time_content`) is a fast membership test. It
//! leaves out the group name, so two groups can produce the same key; the
//! full equality check in [`same_message`] runs before anything is stored.

use crate::models::{MessageKind, MessageRecord};

const SEPARATOR: char = '_';

/// Coarse identity key of a record, using its time exactly as stored.
pub fn message_key(record: &MessageRecord) -> String {
    join_key(record.kind, &record.sender, &record.time, &record.content)
}

/// Identity key of a record as the capture side sees it.
///
/// Stored records carry a date prefix that freshly captured candidates do
/// not have; this key uses the short time so both sides agree.
pub fn capture_key(record: &MessageRecord) -> String {
    join_key(
        record.kind,
        &record.sender,
        record.short_time(),
        &record.content,
    )
}

fn join_key(kind: MessageKind, sender: &str, time: &str, content: &str) -> String {
    let mut key =
        String::with_capacity(kind.as_str().len() + sender.len() + time.len() + content.len() + 3);
    key.push_str(kind.as_str());
    key.push(SEPARATOR);
    key.push_str(sender);
    key.push(SEPARATOR);
    key.push_str(time);
    key.push(SEPARATOR);
    key.push_str(content);
    key
}

/// Full-record equality: kind, sender, time and content, plus the group
/// name for group messages.
pub fn same_message(a: &MessageRecord, b: &MessageRecord) -> bool {
    let base = a.kind == b.kind && a.sender == b.sender && a.time == b.time && a.content == b.content;
    match a.kind {
        MessageKind::Group => base && a.group_name == b.group_name,
        MessageKind::Direct => base,
    }
}
