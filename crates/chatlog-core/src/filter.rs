//! User-defined suppression rules.
//!
//! A [`FilterRuleSet`] maps each message field to a list of plain substring
//! patterns. A record is suppressed when any populated field contains any
//! pattern configured for that field. Matching is case-sensitive and there
//! is no pattern syntax beyond containment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::models::MessageRecord;

/// A message field a rule can match against.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum FilterField {
    #[serde(rename = "type")]
    Kind,
    #[serde(rename = "groupName")]
    GroupName,
    #[serde(rename = "sender")]
    Sender,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "content")]
    #[default]
    Content,
}

impl FilterField {
    /// All fields in display order.
    pub const ALL: [FilterField; 5] = [
        FilterField::Kind,
        FilterField::GroupName,
        FilterField::Sender,
        FilterField::Time,
        FilterField::Content,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::Kind => "type",
            FilterField::GroupName => "groupName",
            FilterField::Sender => "sender",
            FilterField::Time => "time",
            FilterField::Content => "content",
        }
    }

    /// The record's value for this field, if populated.
    pub fn value_of<'a>(&self, record: &'a MessageRecord) -> Option<&'a str> {
        let value = match self {
            FilterField::Kind => record.kind.as_str(),
            FilterField::GroupName => record.group_name.as_deref()?,
            FilterField::Sender => record.sender.as_str(),
            FilterField::Time => record.time.as_str(),
            FilterField::Content => record.content.as_str(),
        };
        (!value.is_empty()).then_some(value)
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "type" | "kind" => Ok(FilterField::Kind),
            "groupName" | "group_name" | "group" => Ok(FilterField::GroupName),
            "sender" => Ok(FilterField::Sender),
            "time" => Ok(FilterField::Time),
            "content" => Ok(FilterField::Content),
            other => Err(Error::InvalidInput(format!(
                "unknown filter field '{}'",
                other
            ))),
        }
    }
}

/// Substring patterns per field.
///
/// Serialized as `{"type": [...], "groupName": [...], "sender": [...],
/// "time": [...], "content": [...]}`. Missing or null fields read as empty
/// and unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRuleSet {
    #[serde(rename = "type", default, deserialize_with = "null_as_empty")]
    kind: Vec<String>,
    #[serde(rename = "groupName", default, deserialize_with = "null_as_empty")]
    group_name: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    sender: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    time: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    content: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl FilterRuleSet {
    /// Create an empty rule set (suppresses nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Patterns configured for a field.
    pub fn patterns(&self, field: FilterField) -> &[String] {
        match field {
            FilterField::Kind => &self.kind,
            FilterField::GroupName => &self.group_name,
            FilterField::Sender => &self.sender,
            FilterField::Time => &self.time,
            FilterField::Content => &self.content,
        }
    }

    fn patterns_mut(&mut self, field: FilterField) -> &mut Vec<String> {
        match field {
            FilterField::Kind => &mut self.kind,
            FilterField::GroupName => &mut self.group_name,
            FilterField::Sender => &mut self.sender,
            FilterField::Time => &mut self.time,
            FilterField::Content => &mut self.content,
        }
    }

    /// Add a pattern. Returns false if it is blank or already present.
    pub fn add(&mut self, field: FilterField, pattern: &str) -> bool {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return false;
        }
        let patterns = self.patterns_mut(field);
        if patterns.iter().any(|p| p == pattern) {
            return false;
        }
        patterns.push(pattern.to_string());
        true
    }

    /// Remove a pattern. Returns false if it was not present.
    pub fn remove(&mut self, field: FilterField, pattern: &str) -> bool {
        let patterns = self.patterns_mut(field);
        let before = patterns.len();
        patterns.retain(|p| p != pattern);
        patterns.len() != before
    }

    /// Union `other` into this set, returning how many patterns were new.
    pub fn merge(&mut self, other: &FilterRuleSet) -> usize {
        other
            .iter()
            .filter(|(field, pattern)| self.add(*field, pattern))
            .count()
    }

    /// All `(field, pattern)` pairs in field display order.
    pub fn iter(&self) -> impl Iterator<Item = (FilterField, &str)> + '_ {
        FilterField::ALL.into_iter().flat_map(move |field| {
            self.patterns(field)
                .iter()
                .map(move |p| (field, p.as_str()))
        })
    }

    /// Total number of patterns across all fields.
    pub fn len(&self) -> usize {
        FilterField::ALL
            .iter()
            .map(|f| self.patterns(*f).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the record should be suppressed.
    pub fn matches(&self, record: &MessageRecord) -> bool {
        FilterField::ALL.iter().any(|field| {
            let patterns = self.patterns(*field);
            if patterns.is_empty() {
                return false;
            }
            match field.value_of(record) {
                Some(value) => patterns.iter().any(|p| value.contains(p.as_str())),
                None => false,
            }
        })
    }
}

/// Whether `record` is suppressed by `rules`.
pub fn should_filter(record: &MessageRecord, rules: &FilterRuleSet) -> bool {
    rules.matches(record)
}
