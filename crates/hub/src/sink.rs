//! Client sinks for live streams
//!
//! Each connected client owns an [`SseReceiver`]; the hub keeps the matching
//! `SseSink`. Frames queue on an unbounded channel with a shared byte
//! counter: the hub increments it when queueing a frame, the HTTP writer
//! decrements it as frames drain to the socket. That counter is the
//! "pending outbound" level the drop policy inspects, so a client that has
//! stopped reading accumulates pending bytes until the hub starts dropping
//! frames for it.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// Counter for generating unique sink ids
static SINK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Outcome of offering one frame to one sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    /// Frame queued for delivery
    Sent,
    /// Frame dropped, client over its pending-byte budget
    Dropped,
    /// Client gone, sink should be evicted
    Closed,
}

/// The hub's half of a client connection
#[derive(Debug)]
pub(crate) struct SseSink {
    /// Unique identifier
    id: u64,
    /// Frame channel to the HTTP writer
    sender: mpsc::UnboundedSender<Bytes>,
    /// Bytes queued but not yet drained by the writer
    pending_bytes: Arc<AtomicUsize>,
}

impl SseSink {
    /// Create a sink and the receiver handed to the HTTP writer.
    pub(crate) fn new() -> (Arc<Self>, SseReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending_bytes = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(Self {
            id: SINK_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            sender,
            pending_bytes: Arc::clone(&pending_bytes),
        });
        (
            sink,
            SseReceiver {
                receiver,
                pending_bytes,
            },
        )
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Bytes currently queued for this client.
    #[inline]
    pub(crate) fn pending(&self) -> usize {
        self.pending_bytes.load(Ordering::Acquire)
    }

    /// Whether the client end still exists.
    #[inline]
    pub(crate) fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Offer one frame. Checks run in order: liveness, budget, send.
    pub(crate) fn try_send(&self, frame: Bytes, drop_threshold: usize) -> SendOutcome {
        if self.sender.is_closed() {
            return SendOutcome::Closed;
        }
        if self.pending() >= drop_threshold {
            return SendOutcome::Dropped;
        }
        let len = frame.len();
        self.pending_bytes.fetch_add(len, Ordering::AcqRel);
        match self.sender.send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(_) => {
                self.pending_bytes.fetch_sub(len, Ordering::AcqRel);
                SendOutcome::Closed
            }
        }
    }
}

/// The client half of a registration: a stream of encoded SSE frames.
///
/// Dropping the receiver disconnects the client; the hub evicts the matching
/// sink on the next broadcast or heartbeat tick. The stream ends when the
/// hub closes.
#[derive(Debug)]
pub struct SseReceiver {
    receiver: mpsc::UnboundedReceiver<Bytes>,
    pending_bytes: Arc<AtomicUsize>,
}

impl SseReceiver {
    /// Await the next frame. `None` once the hub has closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        let frame = self.receiver.recv().await?;
        self.pending_bytes.fetch_sub(frame.len(), Ordering::AcqRel);
        Some(frame)
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Bytes> {
        let frame = self.receiver.try_recv().ok()?;
        self.pending_bytes.fetch_sub(frame.len(), Ordering::AcqRel);
        Some(frame)
    }
}

impl Stream for SseReceiver {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(frame)) => {
                self.pending_bytes.fetch_sub(frame.len(), Ordering::AcqRel);
                Poll::Ready(Some(frame))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
