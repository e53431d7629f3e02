//! In-process [`DistributedStore`] backed by a sharded concurrent map

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::trace;

use super::DistributedStore;
use crate::error::Result;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

impl StoredEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Writes between sweeps of expired entries
const PURGE_INTERVAL: usize = 256;

/// Memory store with lazy eviction of expired entries
///
/// Entries never read again are swept every [`PURGE_INTERVAL`] writes.
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredEntry>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Expiration of the live entry under `key`
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    /// Whether the store holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        trace!(purged = before.saturating_sub(self.entries.len()), "purged expired entries");
    }
}

#[async_trait]
impl DistributedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Utc::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        // Expired: evict unless a writer replaced it in the meantime
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        trace!(key, "evicted expired entry");
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, expires_at: DateTime<Utc>) -> Result<()> {
        self.entries
            .insert(key.to_owned(), StoredEntry { value, expires_at });
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_INTERVAL == 0 {
            self.purge_expired();
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
