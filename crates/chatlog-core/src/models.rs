//! Message data model.
//!
//! A [`MessageRecord`] is created by the capture side with the short time the
//! chat client displays (`HH:MM`) and is rewritten to a fully qualified time
//! (`YYYYMMDD HH:MM`) exactly once, when it is accepted into the store.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::defaults::{
    DATE_PREFIX_FORMAT, EMPTY_CONTENT_PLACEHOLDER, FULL_TIME_FORMAT, SHORT_TIME_FORMAT,
};
use crate::error::{Error, Result};

// =============================================================================
// MESSAGE KIND
// =============================================================================

/// Conversation type a message was captured from.
///
/// Serialized with the strings the chat client's archive has always used so
/// that previously exported files import unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Message posted in a group conversation.
    #[serde(rename = "群消息", alias = "group", alias = "GroupMessage")]
    Group,
    /// One-to-one conversation.
    #[serde(rename = "私聊消息", alias = "direct", alias = "DirectMessage")]
    Direct,
}

impl MessageKind {
    /// Persisted string form (also used in identity keys and filter matching).
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Group => "群消息",
            MessageKind::Direct => "私聊消息",
        }
    }

    /// Short ASCII label for command-line use.
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Group => "group",
            MessageKind::Direct => "direct",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "群消息" | "group" | "GroupMessage" => Ok(MessageKind::Group),
            "私聊消息" | "direct" | "DirectMessage" => Ok(MessageKind::Direct),
            other => Err(Error::InvalidInput(format!(
                "unknown message kind '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// MESSAGE RECORD
// =============================================================================

/// A single chat message, either freshly captured or stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Present only for group messages.
    #[serde(rename = "groupName", default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    pub sender: String,
    /// `HH:MM` while a candidate, `YYYYMMDD HH:MM` once stored.
    pub time: String,
    pub content: String,
}

impl MessageRecord {
    /// Build a group message. Empty content becomes the placeholder.
    pub fn group(
        group_name: impl Into<String>,
        sender: impl Into<String>,
        time: impl Into<String>,
        content: impl AsRef<str>,
    ) -> Self {
        Self {
            kind: MessageKind::Group,
            group_name: Some(group_name.into()),
            sender: sender.into(),
            time: time.into(),
            content: normalize_content(content.as_ref()),
        }
    }

    /// Build a direct message. Empty content becomes the placeholder.
    pub fn direct(
        sender: impl Into<String>,
        time: impl Into<String>,
        content: impl AsRef<str>,
    ) -> Self {
        Self {
            kind: MessageKind::Direct,
            group_name: None,
            sender: sender.into(),
            time: time.into(),
            content: normalize_content(content.as_ref()),
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == MessageKind::Group
    }

    /// Whether `time` already carries a date (`YYYYMMDD HH:MM`).
    pub fn is_fully_qualified(&self) -> bool {
        self.full_time().is_some()
    }

    /// Parsed fully qualified time, if the record has one.
    pub fn full_time(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.time, FULL_TIME_FORMAT).ok()
    }

    /// Time of day as the chat client displayed it, without any date prefix.
    pub fn short_time(&self) -> &str {
        if self.is_fully_qualified() {
            self.time
                .split_once(' ')
                .map(|(_, t)| t)
                .unwrap_or(&self.time)
        } else {
            &self.time
        }
    }

    /// Prefix the captured time with `date`.
    ///
    /// A record that is already fully qualified is returned unchanged, so the
    /// rewrite happens at most once.
    pub fn with_full_time(mut self, date: NaiveDate) -> Self {
        if !self.is_fully_qualified() {
            self.time = format!("{} {}", date.format(DATE_PREFIX_FORMAT), self.time);
        }
        self
    }

    /// Check the invariants every record must hold.
    pub fn validate(&self) -> Result<()> {
        if self.sender.trim().is_empty() {
            return Err(Error::InvalidInput("sender is empty".into()));
        }
        if self.content.is_empty() {
            return Err(Error::InvalidInput("content is empty".into()));
        }
        if self.time.trim().is_empty() {
            return Err(Error::InvalidInput("time is empty".into()));
        }
        match (self.kind, &self.group_name) {
            (MessageKind::Group, Some(name)) if !name.trim().is_empty() => Ok(()),
            (MessageKind::Group, _) => Err(Error::InvalidInput(
                "group message without group name".into(),
            )),
            (MessageKind::Direct, None) => Ok(()),
            (MessageKind::Direct, Some(_)) => Err(Error::InvalidInput(
                "direct message with group name".into(),
            )),
        }
    }

    /// Check a captured candidate: the record invariants, plus a time that
    /// [`MessageRecord::with_full_time`] turns into a fully qualified one.
    ///
    /// Relative labels the chat client shows for older chats (`昨天`,
    /// weekday names, dates) fail here.
    pub fn validate_candidate(&self) -> Result<()> {
        self.validate()?;
        if self.is_fully_qualified()
            || NaiveTime::parse_from_str(&self.time, SHORT_TIME_FORMAT).is_ok()
        {
            return Ok(());
        }
        Err(Error::InvalidInput(format!(
            "time '{}' is not a time of day",
            self.time
        )))
    }

    /// Check the invariants of a stored record (adds a fully qualified time).
    pub fn validate_stored(&self) -> Result<()> {
        self.validate()?;
        if !self.is_fully_qualified() {
            return Err(Error::InvalidInput(format!(
                "time '{}' is not fully qualified",
                self.time
            )));
        }
        Ok(())
    }
}

/// Replace empty or whitespace-only content with the placeholder.
pub fn normalize_content(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        EMPTY_CONTENT_PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}
