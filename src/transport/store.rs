//! In-memory response store used by [`super::HyperTransport`].

use dashmap::DashMap;

use crate::policy::CachedResponse;

/// Entries kept by [`ResponseStore::new`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// Stored responses keyed by absolute URL. Only GET responses are stored.
/// Inserting a new URL into a full store evicts the oldest entry.
#[derive(Debug)]
pub struct ResponseStore {
    entries: DashMap<String, CachedResponse>,
    capacity: usize,
}

impl Default for ResponseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Store holding at most `capacity` responses (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, url: &str) -> Option<CachedResponse> {
        self.entries.get(url).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, url: impl Into<String>, response: CachedResponse) {
        let url = url.into();
        while !self.entries.contains_key(&url) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().stored_at)
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else {
                break;
            };
            self.entries.remove(&oldest);
            tracing::debug!(url = %oldest, "Response evicted");
        }
        tracing::debug!(url = %url, status = response.head.status, bytes = response.body.len(), "Response stored");
        self.entries.insert(url, response);
    }

    pub fn remove(&self, url: &str) -> Option<CachedResponse> {
        self.entries.remove(url).map(|(_, response)| response)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
