//! Ring buffer for envelope replay
//!
//! The `RingBuffer` stores the last `capacity` envelopes and assigns every
//! pushed record its monotonic id. Snapshot requests and late-joining
//! clients query it by id range; anything already evicted by capacity
//! pressure is silently absent, which makes replay best-effort by design.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use zrx_protocol::{Envelope, Family, Record, Source};

use crate::error::{HubError, Result};

/// Default number of items a query returns when no limit is given
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Upper bound a query limit is clamped to
pub const MAX_QUERY_LIMIT: usize = 10_000;

/// Filter parameters for a range query
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Only envelopes of this family (None = all families)
    pub family: Option<Family>,
    /// Maximum items to return (default 100, clamped to 1..=10000)
    pub limit: Option<usize>,
    /// Only envelopes with id strictly greater than this
    pub since_id: u64,
}

impl Query {
    /// A query matching everything, with default limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one family
    pub fn with_family(mut self, family: Family) -> Self {
        self.family = Some(family);
        self
    }

    /// Cap the result length
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Only ids after this one
    pub fn since(mut self, id: u64) -> Self {
        self.since_id = id;
        self
    }
}

/// Bounded in-memory log of the latest envelopes
#[derive(Debug)]
pub struct RingBuffer {
    inner: RwLock<RingInner>,
}

#[derive(Debug)]
struct RingInner {
    /// Fixed-size slot storage
    slots: Vec<Option<Arc<Envelope>>>,
    /// Next slot to write
    write_pos: usize,
    /// Resident envelopes (<= capacity)
    count: usize,
    /// Next id to assign; ids start at 1 and are never reused
    next_id: u64,
}

impl RingBuffer {
    /// Create a ring with the given capacity.
    ///
    /// A zero capacity is a configuration error and rejected at startup.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(HubError::InvalidCapacity { capacity });
        }
        Ok(Self {
            inner: RwLock::new(RingInner {
                slots: vec![None; capacity],
                write_pos: 0,
                count: 0,
                next_id: 1,
            }),
        })
    }

    /// Append a record, assigning its id and insertion timestamp.
    ///
    /// Constant time. The completed envelope is returned for broadcasting.
    pub fn push(&self, source: Source, record: Record) -> Arc<Envelope> {
        let mut inner = self.inner.write();

        let envelope = Arc::new(Envelope {
            id: inner.next_id,
            time: Utc::now().timestamp_millis(),
            source,
            record,
        });
        inner.next_id += 1;

        let pos = inner.write_pos;
        inner.slots[pos] = Some(Arc::clone(&envelope));
        inner.write_pos = (pos + 1) % inner.slots.len();
        if inner.count < inner.slots.len() {
            inner.count += 1;
        }

        envelope
    }

    /// Highest id assigned so far, 0 before the first push.
    pub fn latest_id(&self) -> u64 {
        self.inner.read().next_id - 1
    }

    /// Resident envelope count.
    pub fn len(&self) -> usize {
        self.inner.read().count
    }

    /// Whether the ring holds no envelopes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.inner.read().slots.len()
    }

    /// Resident envelopes matching the query, oldest first.
    ///
    /// Ids in the result are strictly ascending. The walk starts at the
    /// oldest resident slot and stops once the limit is reached. A single
    /// read lock makes the result a consistent snapshot against concurrent
    /// pushes.
    pub fn query(&self, query: &Query) -> Vec<Arc<Envelope>> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT);

        let inner = self.inner.read();
        let capacity = inner.slots.len();
        let start = if inner.count == capacity {
            inner.write_pos
        } else {
            0
        };

        let mut out = Vec::new();
        for i in 0..inner.count {
            let Some(envelope) = &inner.slots[(start + i) % capacity] else {
                continue;
            };
            if envelope.id <= query.since_id {
                continue;
            }
            if let Some(family) = query.family
                && envelope.source.family != family
            {
                continue;
            }
            out.push(Arc::clone(envelope));
            if out.len() == limit {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "ring_test.rs"]
mod tests;
