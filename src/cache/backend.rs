//! Cache backend implementations.

use crate::utils::instant_after;
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Instant,
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Duration, now: Instant) -> Self {
        Self {
            data,
            expires_at: instant_after(now, ttl),
            last_accessed: now,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// One page of a prefix scan. `cursor` is `None` once the scan is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    pub cursor: Option<String>,
}

/// Key/value store with per-entry expiry. Keys are full storage keys.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    /// Incremental listing of keys starting with `prefix`, at most `count`
    /// per page. Pass the returned cursor back to continue.
    async fn scan(&self, prefix: &str, cursor: Option<&str>, count: usize) -> Result<ScanPage>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// In-process backend. Expired entries are dropped lazily; when full, the
/// least recently read entry is evicted.
pub struct MemoryCache {
    entries: RwLock<BTreeMap<String, CacheEntry>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    fn evict_if_needed(&self, entries: &mut BTreeMap<String, CacheEntry>, now: Instant) {
        entries.retain(|_, e| !e.is_expired(now));
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(key) {
            if entry.is_expired(now) {
                entries.remove(key);
                return Ok(None);
            }
            entry.last_accessed = now;
            return Ok(Some(entry.data.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(key) {
            self.evict_if_needed(&mut entries, now);
        }
        entries.insert(key.to_string(), CacheEntry::new(value.to_vec(), ttl, now));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.remove(key).is_some())
    }

    async fn scan(&self, prefix: &str, cursor: Option<&str>, count: usize) -> Result<ScanPage> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let start = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        let mut keys = Vec::new();
        let mut last = None;
        let mut more = false;
        for (k, e) in entries.range((start, Bound::Unbounded)) {
            if !k.starts_with(prefix) {
                break;
            }
            if keys.len() >= count.max(1) {
                more = true;
                break;
            }
            last = Some(k.clone());
            if !e.is_expired(now) {
                keys.push(k.clone());
            }
        }
        Ok(ScanPage {
            keys,
            cursor: if more { last } else { None },
        })
    }

    async fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| !e.is_expired(now))
            .count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Stores nothing; every read misses.
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _: &str, _: &[u8], _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &str) -> Result<bool> {
        Ok(false)
    }
    async fn scan(&self, _: &str, _: Option<&str>, _: usize) -> Result<ScanPage> {
        Ok(ScanPage::default())
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
