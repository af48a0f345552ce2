//! Integration tests for the archive against the filesystem backend.

use std::sync::Arc;

use chatlog_db::{
    AppendOutcome, Archive, CompactionPolicy, FilesystemBackend, FilterField, MessageRecord,
    StorageBackend,
};

fn fs_backend(dir: &tempfile::TempDir) -> Arc<dyn StorageBackend> {
    Arc::new(FilesystemBackend::new(dir.path()))
}

/// After compaction of 10,001 records exactly the 5,000 most recent remain.
#[tokio::test]
async fn test_compaction_bounds_store() {
    let dir = tempfile::tempdir().unwrap();
    let (mut archive, _) = Archive::open(fs_backend(&dir)).await;

    let records: Vec<MessageRecord> = (0..10_001)
        .map(|i| MessageRecord::direct("Alice", "20240101 09:00", format!("message {}", i)))
        .collect();
    let added = archive.messages.merge_imported(records).await.unwrap();
    assert_eq!(added.len(), 10_001);

    let removed = archive
        .messages
        .compact_if_oversized(CompactionPolicy::default())
        .await
        .unwrap();
    assert_eq!(removed, 5_001);
    assert_eq!(archive.messages.len(), 5_000);
    assert_eq!(archive.messages.records()[0].content, "message 5001");
    assert_eq!(archive.messages.records()[4_999].content, "message 10000");

    let (reopened, report) = Archive::open(fs_backend(&dir)).await;
    assert_eq!(report.loaded, 5_000);
    assert_eq!(reopened.messages.records(), archive.messages.records());
}

#[tokio::test]
async fn test_append_is_idempotent_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let msg = MessageRecord::direct("Alice", "20240101 09:00", "hi");

    let (mut archive, _) = Archive::open(fs_backend(&dir)).await;
    assert_eq!(
        archive.messages.append(msg.clone()).await.unwrap(),
        AppendOutcome::Appended
    );

    let (mut reopened, _) = Archive::open(fs_backend(&dir)).await;
    assert_eq!(
        reopened.messages.append(msg).await.unwrap(),
        AppendOutcome::Duplicate
    );
    assert_eq!(reopened.messages.len(), 1);
}

#[tokio::test]
async fn test_group_and_direct_with_same_fields_are_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let (mut archive, _) = Archive::open(fs_backend(&dir)).await;

    let group = MessageRecord::group("Team", "Alice", "20240101 09:00", "hi");
    let direct = MessageRecord::direct("Alice", "20240101 09:00", "hi");
    archive.messages.append(group).await.unwrap();
    archive.messages.append(direct).await.unwrap();
    assert_eq!(archive.messages.len(), 2);
}

#[tokio::test]
async fn test_import_rules_only_then_filter_applies() {
    let dir = tempfile::tempdir().unwrap();
    let (mut archive, _) = Archive::open(fs_backend(&dir)).await;

    let report = archive
        .import_str(r#"{"messages":[],"filterRules":{"content":["spam"]}}"#)
        .await
        .unwrap();
    assert_eq!(report.messages_added, 0);
    assert_eq!(report.rules_added, 1);

    assert!(archive.is_filtered(&MessageRecord::direct("Bob", "10:00", "buy spam now")));
    assert!(!archive.is_filtered(&MessageRecord::direct("Bob", "10:00", "hello")));

    let (reopened, _) = Archive::open(fs_backend(&dir)).await;
    assert_eq!(reopened.filters.rules().patterns(FilterField::Content), ["spam"]);
}

#[tokio::test]
async fn test_invalid_import_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (mut archive, _) = Archive::open(fs_backend(&dir)).await;

    let bad = r#"{
        "messages": [
            {"type":"私聊消息","sender":"Alice","time":"20240101 09:00","content":"ok"},
            {"type":"私聊消息","sender":"","time":"20240101 09:01","content":"bad"}
        ],
        "filterRules": {"content":["spam"]}
    }"#;
    assert!(archive.import_str(bad).await.is_err());
    assert!(archive.messages.is_empty());
    assert!(archive.filters.rules().is_empty());
}

#[tokio::test]
async fn test_export_then_import_into_fresh_archive() {
    let source_dir = tempfile::tempdir().unwrap();
    let (mut source, _) = Archive::open(fs_backend(&source_dir)).await;
    source
        .messages
        .append(MessageRecord::group("Team", "Bob", "20240101 09:05", "standup"))
        .await
        .unwrap();
    source.filters.add(FilterField::Sender, "bot").await.unwrap();

    let json = source
        .export(&Default::default(), chrono::Utc::now())
        .render_json()
        .unwrap();

    let target_dir = tempfile::tempdir().unwrap();
    let (mut target, _) = Archive::open(fs_backend(&target_dir)).await;
    let first = target.import_str(&json).await.unwrap();
    assert_eq!((first.messages_added, first.rules_added), (1, 1));

    let second = target.import_str(&json).await.unwrap();
    assert_eq!((second.messages_added, second.rules_added), (0, 0));
    assert_eq!(target.messages.len(), 1);
}

#[tokio::test]
async fn test_corrupt_message_file_opens_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (archive, _) = Archive::open(fs_backend(&dir)).await;
    let path = dir.path().join(format!("{}.json", archive.storage_key));
    std::fs::write(&path, "{ truncated").unwrap();

    let (reopened, report) = Archive::open(fs_backend(&dir)).await;
    assert!(reopened.messages.is_empty());
    assert!(report.failure.is_some());
}
