//! Tests for the directory tailer

use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;

use zrx_protocol::Family;

use super::*;
use crate::event::TailEvent;

const WAIT: Duration = Duration::from_secs(10);

fn test_config(dir: &std::path::Path) -> DirectoryTailerConfig {
    let mut config = DirectoryTailerConfig::new(dir);
    config.file.poll_interval = Duration::from_millis(10);
    config.file.max_backoff = Duration::from_millis(50);
    config
}

async fn start_tailer(
    config: DirectoryTailerConfig,
) -> (Arc<DirectoryTailer>, mpsc::Receiver<TailEvent>) {
    let (tx, rx) = mpsc::channel(256);
    let tailer = DirectoryTailer::new(config, tx);
    tailer.start().await;
    (tailer, rx)
}

/// Wait for the next data event.
async fn next_data(rx: &mut mpsc::Receiver<TailEvent>) -> (Family, String) {
    loop {
        let event = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for data event")
            .expect("event channel closed");
        if let TailEvent::Data { family, line, .. } = event {
            return (family, line);
        }
    }
}

/// Poll until the tracked set satisfies the predicate.
async fn wait_tracked(tailer: &DirectoryTailer, predicate: impl Fn(&[PathBuf]) -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let tracked = tailer.tracked();
        if predicate(&tracked) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "tracked set never converged: {tracked:?}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_invalid_pattern_is_an_error() {
    let err = DirectoryTailerConfig::with_patterns("/tmp/x", &["("], &[]).unwrap_err();
    assert!(err.to_string().contains("invalid file pattern"));
}

#[test]
fn test_default_pattern_matching() {
    let config = DirectoryTailerConfig::new("/tmp/x");
    assert!(config.matches("problems-a.ndjson"));
    assert!(config.matches("history-2024.ndjson"));
    assert!(config.matches("problems-x-main-process-1.ndjson"));
    assert!(config.matches("history-x-task-manager-12.ndjson"));

    assert!(!config.matches("problems-a.ndjson.old"));
    assert!(!config.matches("notes.txt"));
    assert!(!config.matches("export-main-process-1.ndjson"));
    assert!(!config.matches("problemsx.ndjson"));
}

#[tokio::test]
async fn test_initial_scan_tracks_matching_files_only() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("problems-a.ndjson"), b"{\"p\":1}\n").unwrap();
    std::fs::write(dir.path().join("history-b.ndjson"), b"{\"h\":1}\n").unwrap();
    std::fs::write(dir.path().join("problems-c.ndjson.old"), b"{\"old\":1}\n").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"nope\n").unwrap();

    let (tailer, mut rx) = start_tailer(test_config(dir.path())).await;
    wait_tracked(&tailer, |t| t.len() == 2).await;

    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(next_data(&mut rx).await);
    }
    seen.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    assert_eq!(
        seen,
        vec![
            (Family::History, "{\"h\":1}".to_string()),
            (Family::Problems, "{\"p\":1}".to_string()),
        ]
    );

    tailer.stop().await;
}

#[tokio::test]
async fn test_worker_subfile_reports_domain_family() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("problems-x-main-process-1.ndjson"),
        b"{\"w\":1}\n",
    )
    .unwrap();

    let (tailer, mut rx) = start_tailer(test_config(dir.path())).await;
    let (family, line) = next_data(&mut rx).await;
    assert_eq!(family, Family::Problems);
    assert_eq!(line, "{\"w\":1}");

    tailer.stop().await;
}

#[tokio::test]
async fn test_custom_include_patterns() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("export-main-process-1.ndjson"), b"{\"m\":1}\n").unwrap();

    let mut config =
        DirectoryTailerConfig::with_patterns(dir.path(), &[r"^export-.*\.ndjson$"], &[r"\.old$"])
            .unwrap();
    config.file.poll_interval = Duration::from_millis(10);
    config.file.max_backoff = Duration::from_millis(50);

    let (tailer, mut rx) = start_tailer(config).await;
    let (family, _) = next_data(&mut rx).await;
    // Neither prefix matches, so the worker substring decides.
    assert_eq!(family, Family::MainProcess);

    tailer.stop().await;
}

#[tokio::test]
async fn test_ignored_file_gets_no_tailer() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("problems-a.ndjson.old"), b"{\"a\":1}\n").unwrap();

    let (tailer, mut rx) = start_tailer(test_config(dir.path())).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(tailer.tracked().is_empty());
    assert!(rx.try_recv().is_err());

    tailer.stop().await;
}

// ============================================================================
// Dynamic membership
// ============================================================================

#[tokio::test]
async fn test_new_file_discovered_and_tailed() {
    let dir = TempDir::new().unwrap();
    let (tailer, mut rx) = start_tailer(test_config(dir.path())).await;
    assert!(tailer.tracked().is_empty());

    std::fs::write(dir.path().join("problems-new.ndjson"), b"{\"n\":1}\n").unwrap();

    let (family, line) = next_data(&mut rx).await;
    assert_eq!(family, Family::Problems);
    assert_eq!(line, "{\"n\":1}");
    wait_tracked(&tailer, |t| t.len() == 1).await;

    tailer.stop().await;
}

#[tokio::test]
async fn test_removed_file_is_untracked() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history-a.ndjson");
    std::fs::write(&path, b"{\"h\":1}\n").unwrap();

    let (tailer, mut rx) = start_tailer(test_config(dir.path())).await;
    let _ = next_data(&mut rx).await;

    std::fs::remove_file(&path).unwrap();
    wait_tracked(&tailer, |t| t.is_empty()).await;

    tailer.stop().await;
}

#[tokio::test]
async fn test_appends_flow_through_running_tailer() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("problems-a.ndjson");
    std::fs::write(&path, b"{\"a\":1}\n").unwrap();

    let (tailer, mut rx) = start_tailer(test_config(dir.path())).await;
    assert_eq!(next_data(&mut rx).await.1, "{\"a\":1}");

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"{\"a\":2}\n").unwrap();
    drop(file);

    assert_eq!(next_data(&mut rx).await.1, "{\"a\":2}");

    tailer.stop().await;
}

// ============================================================================
// Scan and stop semantics
// ============================================================================

#[tokio::test]
async fn test_concurrent_scan_requests_are_safe() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("problems-a.ndjson"), b"{\"a\":1}\n").unwrap();

    let (tx, _rx) = mpsc::channel(256);
    let tailer = DirectoryTailer::new(test_config(dir.path()), tx);
    tokio::join!(tailer.scan(), tailer.scan(), tailer.scan());
    assert_eq!(tailer.tracked().len(), 1);

    tailer.stop().await;
}

#[tokio::test]
async fn test_missing_directory_warns_and_recovers_nothing() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("not-there");

    let (tailer, mut rx) = start_tailer(test_config(&missing)).await;

    let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert!(matches!(event, TailEvent::Warn { .. }), "got {event:?}");
    assert!(tailer.tracked().is_empty());

    tailer.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent_and_bounded() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("problems-a.ndjson"), b"{\"a\":1}\n").unwrap();
    std::fs::write(dir.path().join("history-b.ndjson"), b"{\"h\":1}\n").unwrap();

    let (tailer, mut rx) = start_tailer(test_config(dir.path())).await;
    wait_tracked(&tailer, |t| t.len() == 2).await;

    timeout(Duration::from_secs(5), tailer.stop())
        .await
        .expect("stop did not complete in time");
    assert!(tailer.tracked().is_empty());
    tailer.stop().await;

    // Drain whatever was in flight; the channel then stays quiet.
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_scan_after_stop_is_dropped() {
    let dir = TempDir::new().unwrap();
    let (tailer, _rx) = start_tailer(test_config(dir.path())).await;
    tailer.stop().await;

    std::fs::write(dir.path().join("problems-late.ndjson"), b"{\"l\":1}\n").unwrap();
    tailer.scan().await;
    assert!(tailer.tracked().is_empty());
}
