//! Shared handler state

use std::sync::Arc;

use zrx_hub::{RingBuffer, SseHub};

/// State shared by every handler: the replay ring and the live-client hub.
#[derive(Clone)]
pub struct AppState {
    pub ring: Arc<RingBuffer>,
    pub hub: Arc<SseHub>,
}

impl AppState {
    pub fn new(ring: Arc<RingBuffer>, hub: Arc<SseHub>) -> Self {
        Self { ring, hub }
    }
}
