//! Volatile tier: a key -> bytes store with per-entry expiry.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::CacheResult;

/// The volatile store protocol.
///
/// Implementations must treat an expired entry exactly like a missing one.
pub trait VolatileStore: Send + Sync {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value`; `ttl = None` means no expiry.
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove `key`, returning whether a live entry was removed.
    fn delete(&self, key: &str) -> CacheResult<bool>;

    fn exists(&self, key: &str) -> CacheResult<bool>;

    /// All live keys, in no particular order.
    fn keys(&self) -> CacheResult<Vec<String>>;

    /// Drop every entry.
    fn flush(&self) -> CacheResult<()>;
}

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process volatile tier.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }
}

impl VolatileStore for MemoryStore {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.bytes.clone()));
            }
        } else {
            return Ok(None);
        }
        // Expired: the read guard is released above.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            Entry {
                bytes: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        self.purge_expired();
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }

    fn flush(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }
}
