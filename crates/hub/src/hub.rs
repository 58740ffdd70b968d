//! SSE fan-out hub
//!
//! Registry of connected live clients plus the broadcast and heartbeat
//! machinery. Broadcasting never blocks and never fails the pipeline: a
//! client past its pending-byte budget loses the frame (the replay ring and
//! `sinceId` are the recovery path), a disconnected client is evicted, and
//! every other client is untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use zrx_protocol::frame;

use crate::sink::{SendOutcome, SseReceiver, SseSink};

/// Registry of live clients with broadcast, drop policy, and heartbeat
#[derive(Debug)]
pub struct SseHub {
    /// Connected sinks
    sinks: RwLock<Vec<Arc<SseSink>>>,
    /// Per-client pending-byte bound past which frames are dropped
    drop_threshold: usize,
    /// Heartbeat task, when running
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    /// Set once by close(); registrations after this end immediately
    closed: AtomicBool,
    /// Total broadcast calls
    broadcasts: AtomicU64,
    /// Frames dropped to individual slow clients
    frames_dropped: AtomicU64,
    /// Sinks evicted after disconnect or write failure
    sinks_evicted: AtomicU64,
}

/// Statistics snapshot for logging and tests
#[derive(Debug, Clone, Copy)]
pub struct HubStats {
    /// Currently connected clients
    pub clients: usize,
    /// Total broadcast calls
    pub broadcasts: u64,
    /// Frames dropped to slow clients
    pub frames_dropped: u64,
    /// Sinks evicted after disconnect
    pub sinks_evicted: u64,
}

impl SseHub {
    /// Create a hub with the given per-client drop threshold (bytes).
    pub fn new(drop_threshold: usize) -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
            drop_threshold,
            heartbeat: Mutex::new(None),
            closed: AtomicBool::new(false),
            broadcasts: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            sinks_evicted: AtomicU64::new(0),
        }
    }

    /// Register a new client. Returns its id and the frame stream.
    ///
    /// After [`close`](Self::close) the returned stream ends immediately.
    pub fn register(&self) -> (u64, SseReceiver) {
        let (sink, receiver) = SseSink::new();
        let id = sink.id();
        if self.closed.load(Ordering::Acquire) {
            // Dropping the sink closes the channel before first poll.
            return (id, receiver);
        }
        self.sinks.write().push(sink);
        debug!(client = id, "sse client registered");
        (id, receiver)
    }

    /// Remove a client by id.
    pub fn unregister(&self, id: u64) {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|s| s.id() != id);
        if sinks.len() < before {
            debug!(client = id, "sse client unregistered");
        }
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// Broadcast one event frame to every connected client.
    ///
    /// Returns the number of clients the frame was queued for.
    pub fn broadcast(&self, event: &str, data: &str, id: Option<u64>) -> usize {
        self.broadcast_frame(frame::event_frame(event, data, id))
    }

    /// Broadcast pre-encoded frame bytes to every connected client.
    pub fn broadcast_frame(&self, frame: Bytes) -> usize {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);

        let mut sent = 0;
        let mut saw_closed = false;
        {
            let sinks = self.sinks.read();
            for sink in sinks.iter() {
                match sink.try_send(frame.clone(), self.drop_threshold) {
                    SendOutcome::Sent => sent += 1,
                    SendOutcome::Dropped => {
                        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                        trace!(
                            client = sink.id(),
                            pending = sink.pending(),
                            "frame dropped for slow client"
                        );
                    }
                    SendOutcome::Closed => saw_closed = true,
                }
            }
        }

        if saw_closed {
            self.cleanup();
        }
        sent
    }

    /// Evict sinks whose clients have gone away.
    pub fn cleanup(&self) -> usize {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|s| s.is_connected());
        let removed = before - sinks.len();
        if removed > 0 {
            self.sinks_evicted.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "evicted disconnected sse clients");
        }
        removed
    }

    /// Start the periodic heartbeat. A no-op if already running or closed.
    ///
    /// Each tick writes a comment frame (`: hb <millis>`) to every client
    /// and sweeps out disconnected sinks.
    pub fn heartbeat_start(self: &Arc<Self>, interval: Duration) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut slot = self.heartbeat.lock();
        if slot.is_some() {
            return;
        }

        let hub = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so heartbeats start
            // one interval after connect.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                hub.broadcast_frame(frame::heartbeat_frame(Utc::now().timestamp_millis()));
                hub.cleanup();
            }
        }));
    }

    /// Stop the heartbeat task if running.
    pub fn heartbeat_stop(&self) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
    }

    /// Stop the heartbeat, end every client stream, clear the registry.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.heartbeat_stop();
        let mut sinks = self.sinks.write();
        // Dropping the sinks drops their senders, which ends each client's
        // frame stream.
        sinks.clear();
        debug!("sse hub closed");
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> HubStats {
        HubStats {
            clients: self.client_count(),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            sinks_evicted: self.sinks_evicted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
