//! Export and import of the archive.
//!
//! JSON exports carry `{messages, filterRules, version, exportTime}` and are
//! the only format that imports back. The text and CSV renderings are for
//! reading.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chatlog_core::defaults::{EXPORT_FILE_STEM, EXPORT_VERSION};
use chatlog_core::{Error, FilterRuleSet, MessageRecord, Result};

/// Output format of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Text,
    Csv,
}

impl ExportFormat {
    /// File extension, also the name accepted on the command line.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Text),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::InvalidInput(format!(
                "unknown export format '{}'",
                other
            ))),
        }
    }
}

/// The exported archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportDocument {
    pub messages: Vec<MessageRecord>,
    #[serde(rename = "filterRules")]
    pub filter_rules: FilterRuleSet,
    pub version: String,
    #[serde(rename = "exportTime")]
    pub export_time: String,
}

impl ExportDocument {
    pub fn new(
        messages: Vec<MessageRecord>,
        filter_rules: FilterRuleSet,
        exported_at: DateTime<Utc>,
    ) -> Self {
        Self {
            messages,
            filter_rules,
            version: EXPORT_VERSION.to_string(),
            export_time: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn render(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Json => self.render_json(),
            ExportFormat::Text => Ok(self.render_text()),
            ExportFormat::Csv => Ok(self.render_csv()),
        }
    }

    /// Pretty-printed JSON.
    pub fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::from("Messages:\n");
        let lines: Vec<String> = self
            .messages
            .iter()
            .map(|msg| match (&msg.group_name, msg.is_group()) {
                (Some(group), true) => {
                    format!("[{}] [{}] {}: {}", msg.time, group, msg.sender, msg.content)
                }
                _ => format!("[{}] {}: {}", msg.time, msg.sender, msg.content),
            })
            .collect();
        out.push_str(&lines.join("\n"));
        out.push_str("\n\nFilter rules:\n");
        let rules: Vec<String> = self
            .filter_rules
            .iter()
            .map(|(field, pattern)| format!("{}: {}", field, pattern))
            .collect();
        out.push_str(&rules.join("\n"));
        out
    }

    pub fn render_csv(&self) -> String {
        let mut out = String::from("Type,Group,Sender,Time,Content\n");
        let rows: Vec<String> = self
            .messages
            .iter()
            .map(|msg| {
                [
                    msg.kind.as_str(),
                    msg.group_name.as_deref().unwrap_or(""),
                    &msg.sender,
                    &msg.time,
                    &msg.content,
                ]
                .iter()
                .map(|field| csv_field(field))
                .collect::<Vec<_>>()
                .join(",")
            })
            .collect();
        out.push_str(&rows.join("\n"));
        out.push_str("\n\nFilter Field,Filter Value\n");
        let rules: Vec<String> = self
            .filter_rules
            .iter()
            .map(|(field, pattern)| format!("{},{}", csv_field(field.as_str()), csv_field(pattern)))
            .collect();
        out.push_str(&rules.join("\n"));
        out
    }
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Download file name for an export made at local time `now`.
pub fn export_file_name(now: NaiveDateTime, format: ExportFormat) -> String {
    format!(
        "{}_{}.{}",
        EXPORT_FILE_STEM,
        now.format("%Y%m%d_%H%M"),
        format.extension()
    )
}

/// Contents of a validated import file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportBundle {
    pub messages: Vec<MessageRecord>,
    pub filter_rules: FilterRuleSet,
}

/// Parse an exported JSON document.
///
/// The whole file is rejected if it is not a JSON object, if `messages` is
/// missing or not a list, or if any message is not a valid stored record.
/// `filterRules` is optional.
pub fn parse_import(text: &str) -> Result<ImportBundle> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| Error::ImportFormat(format!("not a JSON document: {}", e)))?;
    let Value::Object(mut doc) = doc else {
        return Err(Error::ImportFormat("top level is not an object".into()));
    };

    let messages = match doc.remove("messages") {
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(Error::ImportFormat("'messages' is not a list".into())),
        None => return Err(Error::ImportFormat("missing 'messages'".into())),
    };

    let messages = messages
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let record = MessageRecord::deserialize(entry)
                .map_err(|e| Error::ImportFormat(format!("message {}: {}", i, e)))?;
            record
                .validate_stored()
                .map_err(|e| Error::ImportFormat(format!("message {}: {}", i, e)))?;
            Ok(record)
        })
        .collect::<Result<Vec<_>>>()?;

    let filter_rules = match doc.remove("filterRules") {
        None | Some(Value::Null) => FilterRuleSet::new(),
        Some(rules) => FilterRuleSet::deserialize(rules)
            .map_err(|e| Error::ImportFormat(format!("'filterRules': {}", e)))?,
    };

    Ok(ImportBundle {
        messages,
        filter_rules,
    })
}

/// Counts reported after an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub messages_added: usize,
    pub rules_added: usize,
    /// The records that were new, for seeding the known-key set.
    #[serde(skip)]
    pub added: Vec<MessageRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlog_core::FilterField;
    use chrono::{NaiveDate, TimeZone};

    fn document() -> ExportDocument {
        let mut rules = FilterRuleSet::new();
        rules.add(FilterField::Content, "spam");
        rules.add(FilterField::Sender, "bot");
        ExportDocument::new(
            vec![
                MessageRecord::group("Rust", "Bob", "20240101 09:05", "say \"hi\""),
                MessageRecord::direct("Alice", "20240101 09:00", "hello"),
            ],
            rules,
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_json_export_imports_back() {
        let doc = document();
        let json = doc.render_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], "1.0.3");
        assert_eq!(value["exportTime"], "2024-01-01T12:00:00.000Z");
        assert!(value["messages"][1].get("groupName").is_none());

        let bundle = parse_import(&json).unwrap();
        assert_eq!(bundle.messages, doc.messages);
        assert_eq!(bundle.filter_rules, doc.filter_rules);
    }

    #[test]
    fn test_text_rendering() {
        let text = document().render_text();
        let expected = "Messages:\n\
                        [20240101 09:05] [Rust] Bob: say \"hi\"\n\
                        [20240101 09:00] Alice: hello\n\
                        \n\
                        Filter rules:\n\
                        sender: bot\n\
                        content: spam";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_csv_rendering_doubles_quotes() {
        let csv = document().render_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Type,Group,Sender,Time,Content");
        assert_eq!(
            lines[1],
            r#""群消息","Rust","Bob","20240101 09:05","say ""hi""""#
        );
        assert_eq!(lines[2], r#""私聊消息","","Alice","20240101 09:00","hello""#);
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "Filter Field,Filter Value");
        assert_eq!(lines[5], r#""sender","bot""#);
    }

    #[test]
    fn test_export_file_name() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(8, 5, 0)
            .unwrap();
        assert_eq!(
            export_file_name(now, ExportFormat::Csv),
            "chat_messages_20240307_0805.csv"
        );
    }

    #[test]
    fn test_import_rules_only() {
        let bundle = parse_import(r#"{"messages":[],"filterRules":{"content":["spam"]}}"#).unwrap();
        assert!(bundle.messages.is_empty());
        assert_eq!(bundle.filter_rules.patterns(FilterField::Content), ["spam"]);
    }

    #[test]
    fn test_import_rejects_bad_structure() {
        for bad in [
            "nope",
            "[]",
            r#"{"filterRules":{}}"#,
            r#"{"messages":{"a":1}}"#,
            r#"{"messages":[{"type":"私聊消息","sender":"A"}]}"#,
            r#"{"messages":[{"type":"私聊消息","sender":"A","time":"09:00","content":"x"}]}"#,
            r#"{"messages":[],"filterRules":{"content":"spam"}}"#,
        ] {
            assert!(
                matches!(parse_import(bad), Err(Error::ImportFormat(_))),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn test_import_ignores_unknown_rule_fields() {
        let bundle =
            parse_import(r#"{"messages":[],"filterRules":{"color":["red"],"sender":["x"]}}"#)
                .unwrap();
        assert_eq!(bundle.filter_rules.len(), 1);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("TXT".parse::<ExportFormat>().unwrap(), ExportFormat::Text);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
