//! chatlog: command-line access to the local message archive.
//!
//! Browses, exports and imports the archive kept under the data directory,
//! edits filter rules, and runs the capture pipeline over contact-list
//! snapshots read from stdin.

mod capture;
mod logging;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use chatlog_core::{Clock, SystemClock};
use chatlog_db::{
    export_file_name, Archive, CompactionPolicy, ExportFormat, FilesystemBackend, FilterField,
    KindFilter, MessageKind, MessageQuery, MessageRecord,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chatlog")]
#[command(author, version, about = "Local archive of captured chat messages")]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the archive
    #[arg(long, global = true, env = "CHATLOG_DATA_DIR", default_value = "./chatlog-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List stored messages, newest first
    List {
        #[command(flatten)]
        filter: QueryArgs,

        /// Page to show (1-based)
        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show message counts
    Stats {
        #[command(flatten)]
        filter: QueryArgs,
    },

    /// Export messages and filter rules
    Export {
        /// Output format: json, txt or csv
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,

        /// Output file, or "-" for stdout (default: chat_messages_<timestamp>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        filter: QueryArgs,
    },

    /// Merge a previously exported JSON file
    Import {
        /// Path to the export file
        path: PathBuf,
    },

    /// Delete every stored message
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Trim the archive if it exceeds its size limit
    Compact,

    /// Manage filter rules
    Rules {
        #[command(subcommand)]
        command: RuleCommands,
    },

    /// Capture messages from contact-list snapshots on stdin
    ///
    /// Each line is a JSON array of {"title", "time", "summary"} objects.
    Capture {
        /// Delay between snapshots in ms (default: the throttle interval)
        #[arg(long)]
        pace_ms: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum RuleCommands {
    /// Show all rules
    List,

    /// Add a substring rule
    Add {
        /// Field to match: type, groupName, sender, time or content
        #[arg(short, long, default_value = "content")]
        field: FilterField,

        pattern: String,
    },

    /// Remove a rule
    Remove {
        /// Field the rule matches
        #[arg(short, long)]
        field: FilterField,

        pattern: String,
    },
}

#[derive(clap::Args, Debug, Default)]
struct QueryArgs {
    /// Case-insensitive search term
    #[arg(short, long)]
    query: Option<String>,

    /// Restrict to one conversation type
    #[arg(short, long, value_enum)]
    kind: Option<KindArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Group,
    Direct,
}

impl QueryArgs {
    fn to_query(&self) -> MessageQuery {
        let kind = match self.kind {
            None => KindFilter::All,
            Some(KindArg::Group) => KindFilter::Only(MessageKind::Group),
            Some(KindArg::Direct) => KindFilter::Only(MessageKind::Direct),
        };
        MessageQuery::new()
            .with_term(self.query.as_deref().unwrap_or_default())
            .with_kind(kind)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _guard = logging::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut archive = open_archive(&cli.data_dir).await?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::List { filter, page, json } => {
            cmd_list(&archive, &filter, page, json, &mut out)?;
        }
        Commands::Stats { filter } => {
            cmd_stats(&archive, &filter, &mut out)?;
        }
        Commands::Export {
            format,
            output,
            filter,
        } => {
            cmd_export(&archive, format, output.as_deref(), &filter, &mut out).await?;
        }
        Commands::Import { path } => {
            cmd_import(&mut archive, &path, &mut out).await?;
        }
        Commands::Clear { yes } => {
            cmd_clear(&mut archive, yes, &mut out).await?;
        }
        Commands::Compact => {
            let policy = chatlog_capture::CaptureConfig::from_env().compaction;
            cmd_compact(&mut archive, policy, &mut out).await?;
        }
        Commands::Rules { command } => {
            cmd_rules(&mut archive, command, &mut out).await?;
        }
        Commands::Capture { pace_ms } => {
            drop(out);
            capture::run_capture(archive, pace_ms).await?;
        }
    }
    Ok(())
}

async fn open_archive(data_dir: &Path) -> anyhow::Result<Archive> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;
    let backend = Arc::new(FilesystemBackend::new(data_dir));
    let (archive, report) = Archive::open(backend).await;
    if let Some(failure) = &report.failure {
        warn!(failure = %failure, "Stored messages could not be read; starting empty");
    } else if report.skipped > 0 {
        warn!(skipped = report.skipped, "Skipped invalid stored records");
    }
    info!(
        storage_key = %archive.storage_key,
        loaded = report.loaded,
        "Archive opened"
    );
    Ok(archive)
}

fn format_record(record: &MessageRecord) -> String {
    match record.group_name.as_deref() {
        Some(group) if !group.is_empty() => format!(
            "[{}] [{}] {}: {}",
            record.time, group, record.sender, record.content
        ),
        _ => format!("[{}] {}: {}", record.time, record.sender, record.content),
    }
}

fn cmd_list(
    archive: &Archive,
    filter: &QueryArgs,
    page: usize,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut view = archive.view(filter.to_query());
    let page = view.go_to(page);

    if json {
        serde_json::to_writer_pretty(&mut *out, view.page())?;
        writeln!(out)?;
        return Ok(());
    }

    if view.messages().is_empty() {
        writeln!(out, "No messages.")?;
        return Ok(());
    }
    for record in view.page() {
        writeln!(out, "{}", format_record(record))?;
    }
    writeln!(
        out,
        "-- page {}/{} ({} messages)",
        page,
        view.page_count(),
        view.messages().len()
    )?;
    Ok(())
}

fn cmd_stats(archive: &Archive, filter: &QueryArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let stats = archive.view(filter.to_query()).stats();
    writeln!(out, "Total:  {}", stats.total)?;
    writeln!(out, "Group:  {}", stats.group)?;
    writeln!(out, "Direct: {}", stats.direct)?;
    Ok(())
}

async fn cmd_export(
    archive: &Archive,
    format: ExportFormat,
    output: Option<&Path>,
    filter: &QueryArgs,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let document = archive.export(&filter.to_query(), chrono::Utc::now());
    let rendered = document.render(format)?;

    match output {
        Some(path) if path == Path::new("-") => {
            out.write_all(rendered.as_bytes())?;
            writeln!(out)?;
        }
        _ => {
            let path = output
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(export_file_name(SystemClock.now(), format)));
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("cannot write {}", path.display()))?;
            writeln!(
                out,
                "Exported {} messages to {}",
                document.messages.len(),
                path.display()
            )?;
        }
    }
    Ok(())
}

async fn cmd_import(archive: &mut Archive, path: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let report = archive.import_str(&text).await?;
    writeln!(
        out,
        "Imported {} messages and {} filter rules",
        report.messages_added, report.rules_added
    )?;
    Ok(())
}

async fn cmd_clear(archive: &mut Archive, yes: bool, out: &mut impl Write) -> anyhow::Result<()> {
    if !yes {
        bail!("refusing to delete {} messages without --yes", archive.messages.len());
    }
    let removed = archive.messages.len();
    archive.messages.clear().await?;
    writeln!(out, "Deleted {} messages", removed)?;
    Ok(())
}

async fn cmd_compact(
    archive: &mut Archive,
    policy: CompactionPolicy,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let removed = archive.messages.compact_if_oversized(policy).await?;
    if removed == 0 {
        writeln!(
            out,
            "{} messages, under the limit of {}",
            archive.messages.len(),
            policy.high_water
        )?;
    } else {
        writeln!(
            out,
            "Removed {} oldest messages, {} remain",
            removed,
            archive.messages.len()
        )?;
    }
    Ok(())
}

async fn cmd_rules(
    archive: &mut Archive,
    command: RuleCommands,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        RuleCommands::List => {
            let rules = archive.filters.rules();
            if rules.is_empty() {
                writeln!(out, "No filter rules.")?;
            }
            for (field, pattern) in rules.iter() {
                writeln!(out, "{}: {}", field, pattern)?;
            }
        }
        RuleCommands::Add { field, pattern } => {
            if archive.filters.add(field, &pattern).await? {
                writeln!(out, "Added {}: {}", field, pattern.trim())?;
            } else {
                writeln!(out, "Rule already present")?;
            }
        }
        RuleCommands::Remove { field, pattern } => {
            if !archive.filters.remove(field, &pattern).await? {
                bail!("no rule {}: {}", field, pattern);
            }
            writeln!(out, "Removed {}: {}", field, pattern)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("chatlog").chain(args.iter().copied())).unwrap()
    }

    async fn archive_in(dir: &TempDir) -> Archive {
        open_archive(dir.path()).await.unwrap()
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_parse_list_with_filters() {
        let cli = parse(&["list", "--query", "Alice", "--kind", "group", "--page", "2"]);
        match cli.command {
            Commands::List { filter, page, json } => {
                assert_eq!(filter.query.as_deref(), Some("Alice"));
                assert_eq!(filter.kind, Some(KindArg::Group));
                assert_eq!(page, 2);
                assert!(!json);
                assert_eq!(
                    filter.to_query(),
                    MessageQuery::new()
                        .with_term("alice")
                        .with_kind(KindFilter::Only(MessageKind::Group))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_export_format() {
        let cli = parse(&["export", "--format", "txt", "--output", "-"]);
        match cli.command {
            Commands::Export { format, output, .. } => {
                assert_eq!(format, ExportFormat::Text);
                assert_eq!(output, Some(PathBuf::from("-")));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["chatlog", "export", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_parse_rule_field_defaults_to_content() {
        let cli = parse(&["rules", "add", "spam"]);
        match cli.command {
            Commands::Rules {
                command: RuleCommands::Add { field, pattern },
            } => {
                assert_eq!(field, FilterField::Content);
                assert_eq!(pattern, "spam");
            }
            other => panic!("unexpected {:?}", other),
        }
        let cli = parse(&["rules", "remove", "--field", "groupName", "Team"]);
        assert!(matches!(
            cli.command,
            Commands::Rules {
                command: RuleCommands::Remove {
                    field: FilterField::GroupName,
                    ..
                }
            }
        ));
    }

    #[test]
    fn test_parse_data_dir_is_global() {
        let cli = parse(&["stats", "--data-dir", "/tmp/archive"]);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/archive"));
    }

    #[test]
    fn test_format_record() {
        let group = MessageRecord::group("Team", "Bob", "20240101 09:00", "standup");
        assert_eq!(format_record(&group), "[20240101 09:00] [Team] Bob: standup");
        let direct = MessageRecord::direct("Alice", "20240101 09:01", "hi");
        assert_eq!(format_record(&direct), "[20240101 09:01] Alice: hi");
    }

    #[tokio::test]
    async fn test_rules_then_import_then_list() {
        let dir = TempDir::new().unwrap();
        let mut archive = archive_in(&dir).await;

        let mut buf = Vec::new();
        cmd_rules(
            &mut archive,
            RuleCommands::Add {
                field: FilterField::Sender,
                pattern: "bot".into(),
            },
            &mut buf,
        )
        .await
        .unwrap();
        assert_eq!(output(buf), "Added sender: bot\n");

        let file = dir.path().join("import.json");
        std::fs::write(
            &file,
            r#"{"messages":[{"type":"私聊消息","sender":"Alice","time":"20240101 09:00","content":"hi"}]}"#,
        )
        .unwrap();
        let mut buf = Vec::new();
        cmd_import(&mut archive, &file, &mut buf).await.unwrap();
        assert_eq!(output(buf), "Imported 1 messages and 0 filter rules\n");

        // Reopen from disk; both the rule and the message persisted.
        let archive = archive_in(&dir).await;
        assert_eq!(archive.view(MessageQuery::new()).stats().total, 1);
        let mut buf = Vec::new();
        cmd_list(&archive, &QueryArgs::default(), 1, false, &mut buf).unwrap();
        assert_eq!(
            output(buf),
            "[20240101 09:00] Alice: hi\n-- page 1/1 (1 messages)\n"
        );
        let mut buf = Vec::new();
        cmd_rules(&mut archive_in(&dir).await, RuleCommands::List, &mut buf)
            .await
            .unwrap();
        assert_eq!(output(buf), "sender: bot\n");
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let dir = TempDir::new().unwrap();
        let mut archive = archive_in(&dir).await;
        archive
            .messages
            .append(MessageRecord::direct("Alice", "20240101 09:00", "hi"))
            .await
            .unwrap();

        let mut buf = Vec::new();
        assert!(cmd_clear(&mut archive, false, &mut buf).await.is_err());
        assert_eq!(archive.messages.len(), 1);

        cmd_clear(&mut archive, true, &mut buf).await.unwrap();
        assert_eq!(output(buf), "Deleted 1 messages\n");
        assert!(archive_in(&dir).await.messages.is_empty());
    }

    #[tokio::test]
    async fn test_export_to_stdout_as_csv() {
        let dir = TempDir::new().unwrap();
        let mut archive = archive_in(&dir).await;
        archive
            .messages
            .append(MessageRecord::group("Team", "Bob", "20240101 09:00", "say \"hi\""))
            .await
            .unwrap();

        let mut buf = Vec::new();
        cmd_export(
            &archive,
            ExportFormat::Csv,
            Some(Path::new("-")),
            &QueryArgs::default(),
            &mut buf,
        )
        .await
        .unwrap();
        let text = output(buf);
        assert!(text.starts_with("Type,Group,Sender,Time,Content\n"));
        assert!(text.contains("\"say \"\"hi\"\"\""));
    }

    #[tokio::test]
    async fn test_export_to_file_reimports() {
        let dir = TempDir::new().unwrap();
        let mut archive = archive_in(&dir).await;
        archive
            .messages
            .append(MessageRecord::direct("Alice", "20240101 09:00", "hi"))
            .await
            .unwrap();
        let path = dir.path().join("out.json");

        let mut buf = Vec::new();
        cmd_export(
            &archive,
            ExportFormat::Json,
            Some(&path),
            &QueryArgs::default(),
            &mut buf,
        )
        .await
        .unwrap();
        assert!(output(buf).starts_with("Exported 1 messages"));

        let other = TempDir::new().unwrap();
        let mut fresh = archive_in(&other).await;
        let mut buf = Vec::new();
        cmd_import(&mut fresh, &path, &mut buf).await.unwrap();
        assert_eq!(fresh.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_compact_under_limit_reports_count() {
        let dir = TempDir::new().unwrap();
        let mut archive = archive_in(&dir).await;
        let mut buf = Vec::new();
        cmd_compact(&mut archive, CompactionPolicy::default(), &mut buf)
            .await
            .unwrap();
        assert_eq!(output(buf), "0 messages, under the limit of 10000\n");
    }

    #[tokio::test]
    async fn test_remove_missing_rule_fails() {
        let dir = TempDir::new().unwrap();
        let mut archive = archive_in(&dir).await;
        let mut buf = Vec::new();
        let result = cmd_rules(
            &mut archive,
            RuleCommands::Remove {
                field: FilterField::Content,
                pattern: "spam".into(),
            },
            &mut buf,
        )
        .await;
        assert!(result.is_err());
    }
}
