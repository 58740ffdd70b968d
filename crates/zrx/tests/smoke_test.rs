//! Smoke tests for the export stream pipeline
//!
//! These wire the real components together over a temp directory - tailer ->
//! ring -> hub, the same pump the serve command runs - and verify that lines
//! appended to export files come out the other side as envelopes, SSE
//! frames, and snapshot results.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use zrx_hub::{Query, RingBuffer, SseHub, SseReceiver};
use zrx_protocol::{Record, Source};
use zrx_tailer::{DirectoryTailer, DirectoryTailerConfig, TailEvent};

const WAIT: Duration = Duration::from_secs(10);

struct Pipeline {
    dir: TempDir,
    ring: Arc<RingBuffer>,
    hub: Arc<SseHub>,
    tailer: Arc<DirectoryTailer>,
    pump: JoinHandle<()>,
}

async fn start_pipeline(drop_threshold: usize) -> Pipeline {
    let dir = TempDir::new().unwrap();
    let ring = Arc::new(RingBuffer::new(1000).unwrap());
    let hub = Arc::new(SseHub::new(drop_threshold));

    let (tx, mut rx) = mpsc::channel::<TailEvent>(256);
    let mut config = DirectoryTailerConfig::new(dir.path());
    config.file.poll_interval = Duration::from_millis(10);
    config.file.max_backoff = Duration::from_millis(50);
    let tailer = DirectoryTailer::new(config, tx);
    tailer.start().await;

    // The same classify -> ring -> hub pump the serve command runs.
    let pump = {
        let ring = Arc::clone(&ring);
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let TailEvent::Data { path, family, line } = event {
                    let file = path.file_name().unwrap().to_string_lossy().into_owned();
                    let envelope = ring.push(Source::new(file, family), Record::new(line));
                    hub.broadcast(
                        family.event_name(),
                        &envelope.record.to_json_line(),
                        Some(envelope.id),
                    );
                }
            }
        })
    };

    Pipeline {
        dir,
        ring,
        hub,
        tailer,
        pump,
    }
}

impl Pipeline {
    fn write(&self, name: &str, content: &[u8]) {
        std::fs::write(self.dir.path().join(name), content).unwrap();
    }

    fn append(&self, name: &str, content: &[u8]) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.dir.path().join(name))
            .unwrap();
        file.write_all(content).unwrap();
    }

    async fn wait_latest_id(&self, at_least: u64) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.ring.latest_id() < at_least {
            assert!(
                tokio::time::Instant::now() < deadline,
                "ring stuck at id {} waiting for {at_least}",
                self.ring.latest_id()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn shutdown(self) {
        self.hub.close();
        self.tailer.stop().await;
        drop(self.tailer);
        let _ = timeout(WAIT, self.pump).await;
    }
}

async fn next_frame(receiver: &mut SseReceiver) -> String {
    let frame = timeout(WAIT, receiver.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("hub closed");
    String::from_utf8(frame.to_vec()).unwrap()
}

fn frame_id(frame: &str) -> u64 {
    frame
        .lines()
        .find_map(|l| l.strip_prefix("id: "))
        .expect("frame without id")
        .parse()
        .unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_basic_append() {
    let pipeline = start_pipeline(64 * 1024).await;
    let (_, mut client) = pipeline.hub.register();

    pipeline.write("problems-x.ndjson", b"");
    pipeline.append("problems-x.ndjson", b"{\"a\":1}\n");
    pipeline.append("problems-x.ndjson", b"{\"a\":2}\n");

    let first = next_frame(&mut client).await;
    assert_eq!(first, "id: 1\nevent: zabbix.problems\ndata: {\"a\":1}\n\n");
    let second = next_frame(&mut client).await;
    assert_eq!(second, "id: 2\nevent: zabbix.problems\ndata: {\"a\":2}\n\n");

    let items = pipeline.ring.query(&Query::new());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].record.raw(), "{\"a\":1}");
    assert_eq!(items[0].source.file, "problems-x.ndjson");
    assert_eq!(pipeline.ring.latest_id(), 2);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_partial_line_then_completion() {
    let pipeline = start_pipeline(64 * 1024).await;
    let (_, mut client) = pipeline.hub.register();

    pipeline.write("problems-x.ndjson", b"");
    pipeline.append("problems-x.ndjson", b"{\"a\":");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pipeline.ring.latest_id(), 0, "partial line was emitted");

    pipeline.append("problems-x.ndjson", b"3}\n");
    let frame = next_frame(&mut client).await;
    assert_eq!(frame, "id: 1\nevent: zabbix.problems\ndata: {\"a\":3}\n\n");

    pipeline.wait_latest_id(1).await;
    assert_eq!(pipeline.ring.latest_id(), 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_rotation_streams_new_file_without_duplicates() {
    let pipeline = start_pipeline(64 * 1024).await;

    pipeline.write("history-1.ndjson", b"{\"line\":\"A\"}\n");
    pipeline.wait_latest_id(1).await;

    // Replace the inode under the same path.
    let path = pipeline.dir.path().join("history-1.ndjson");
    std::fs::remove_file(&path).unwrap();
    std::fs::write(&path, b"{\"line\":\"B\"}\n").unwrap();

    pipeline.wait_latest_id(2).await;
    let items = pipeline.ring.query(&Query::new());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].record.raw(), "{\"line\":\"A\"}");
    assert_eq!(items[1].record.raw(), "{\"line\":\"B\"}");
    assert_eq!(items[1].id, 2);

    // No duplicate of A ever shows up.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pipeline.ring.latest_id(), 2);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_truncation_emits_only_new_content() {
    let pipeline = start_pipeline(64 * 1024).await;

    pipeline.write("problems-t.ndjson", b"{\"a\":1}\n{\"a\":2}\n");
    pipeline.wait_latest_id(2).await;

    // Truncate in place, then write one new line.
    pipeline.write("problems-t.ndjson", b"{\"c\":3}\n");

    pipeline.wait_latest_id(3).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pipeline.ring.latest_id(), 3);
    let items = pipeline.ring.query(&Query::new().since(2));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].record.raw(), "{\"c\":3}");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_old_files_are_ignored() {
    let pipeline = start_pipeline(64 * 1024).await;

    pipeline.write("problems-a.ndjson.old", b"{\"stale\":1}\n");
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(pipeline.tailer.tracked().is_empty());
    assert_eq!(pipeline.ring.latest_id(), 0);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_backpressure_drops_for_slow_client_only() {
    const TOTAL: u64 = 1000;

    // A threshold a slow client trips quickly, but comfortably above any
    // transient queue a continuously-drained client accumulates.
    let pipeline = start_pipeline(8 * 1024).await;

    let (_, mut slow) = pipeline.hub.register();
    let (_, mut fast) = pipeline.hub.register();

    let mut content = Vec::new();
    for i in 1..=TOTAL {
        content.extend_from_slice(format!("{{\"n\":{i}}}\n").as_bytes());
    }
    pipeline.write("problems-load.ndjson", &content);

    // The healthy client drains continuously and sees every id in order.
    let mut expected = 1u64;
    while expected <= TOTAL {
        let frame = next_frame(&mut fast).await;
        assert_eq!(frame_id(&frame), expected);
        expected += 1;
    }

    pipeline.wait_latest_id(TOTAL).await;

    // The slow client never drained: a strict subset arrived, the rest were
    // dropped for it alone.
    let mut received = 0u64;
    while slow.try_recv().is_some() {
        received += 1;
    }
    assert!(received > 0);
    assert!(received < TOTAL, "slow client got all {received} frames");
    assert!(pipeline.hub.stats().frames_dropped >= TOTAL - received);

    // Catch-up via the ring: the most recent 100 after the gap.
    let items = pipeline.ring.query(&Query::new().since(TOTAL - 100));
    let ids: Vec<u64> = items.iter().map(|e| e.id).collect();
    assert_eq!(ids, (TOTAL - 99..=TOTAL).collect::<Vec<u64>>());

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_snapshot_through_http_front() {
    use axum::body::Body;
    use axum::http::{Request, header};
    use tower::ServiceExt;

    let pipeline = start_pipeline(64 * 1024).await;
    pipeline.write("problems-web.ndjson", b"{\"a\":1}\n{\"a\":2}\n");
    pipeline.wait_latest_id(2).await;

    let app = zrx_api::routes::build_router(zrx_api::AppState::new(
        Arc::clone(&pipeline.ring),
        Arc::clone(&pipeline.hub),
    ));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/events/zabbix/?family=problems")
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["latestId"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["items"][0]["record"]["a"], 1);

    pipeline.shutdown().await;
}
