//! Deduplicated, newest-first request storage with broadcast

use hookwatch_common::CapturedRequestEvent;
use std::collections::{HashSet, VecDeque};
use tokio::sync::{broadcast, RwLock};

/// Maximum number of requests kept for display
const MAX_REQUESTS: usize = 1000;

/// Events broadcast to renderers
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A live request was prepended
    Live(CapturedRequestEvent),
    /// A historical batch was merged
    Historical { inserted: usize, total: usize },
}

/// Ordered store shared by the live consumer and the historical fetch.
///
/// The front of the sequence holds live arrivals in arrival order; behind
/// them sits the historical region, ordered newest-first by timestamp. One
/// lock serializes both writers.
///
/// At capacity the oldest entries are evicted from the back. Their ids stay
/// known, so an evicted request never reappears.
pub struct RequestStore {
    inner: RwLock<StoreInner>,
    broadcast_tx: broadcast::Sender<StoreEvent>,
    capacity: usize,
}

#[derive(Default)]
struct StoreInner {
    requests: VecDeque<CapturedRequestEvent>,
    ids: HashSet<String>,
    /// Number of entries at the front that arrived live
    live_len: usize,
}

impl StoreInner {
    fn evict(&mut self, capacity: usize) {
        while self.requests.len() > capacity {
            self.requests.pop_back();
        }
        self.live_len = self.live_len.min(self.requests.len());
    }
}

impl RequestStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_REQUESTS)
    }

    /// Store keeping at most `capacity` requests (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        Self {
            inner: RwLock::new(StoreInner::default()),
            broadcast_tx,
            capacity: capacity.max(1),
        }
    }

    /// Prepend a live request. Returns `false` if its id is already stored.
    pub async fn append_live(&self, request: CapturedRequestEvent) -> bool {
        let mut inner = self.inner.write().await;

        if !inner.ids.insert(request.request_id.clone()) {
            return false;
        }

        inner.requests.push_front(request.clone());
        inner.live_len += 1;
        inner.evict(self.capacity);

        // Sent under the lock so subscribers see store order
        let _ = self.broadcast_tx.send(StoreEvent::Live(request));
        true
    }

    /// Merge a historical batch, skipping ids already stored.
    /// Returns the number of inserted requests.
    pub async fn load_historical(&self, batch: Vec<CapturedRequestEvent>) -> usize {
        let mut inner = self.inner.write().await;
        let mut inserted = 0;

        for request in batch {
            if inner.ids.contains(&request.request_id) {
                continue;
            }

            let live_len = inner.live_len;
            let index = inner
                .requests
                .iter()
                .skip(live_len)
                .position(|existing| existing.timestamp < request.timestamp)
                .map_or(inner.requests.len(), |pos| pos + live_len);

            inner.ids.insert(request.request_id.clone());
            inner.requests.insert(index, request);
            inserted += 1;
        }
        inner.evict(self.capacity);

        let total = inner.requests.len();
        let _ = self
            .broadcast_tx
            .send(StoreEvent::Historical { inserted, total });
        inserted
    }

    /// Get all stored requests, newest first
    pub async fn get_requests(&self) -> Vec<CapturedRequestEvent> {
        self.inner.read().await.requests.iter().cloned().collect()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.requests.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Subscribe to store events
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.broadcast_tx.subscribe()
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new()
    }
}
