//! The two-tier cache.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::frame::DataFrame;

use super::durable::{DurableFormat, DurableStore};
use super::payload::Payload;
use super::volatile::VolatileStore;
use super::{CacheError, CachePolicy, CacheResult};

/// Volatile slot holding the list of durable file names.
pub const MANIFEST_KEY: &str = "CacheFiles";

/// Requested volatile-tier lifetime for [`TieredCache::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheTtl {
    /// The policy's default TTL.
    #[default]
    Default,
    NoExpiry,
    /// Zero falls back to the default.
    Seconds(u64),
}

impl CacheTtl {
    fn resolve(self, default: Duration) -> Option<Duration> {
        match self {
            CacheTtl::Default | CacheTtl::Seconds(0) => Some(default),
            CacheTtl::NoExpiry => None,
            CacheTtl::Seconds(secs) => Some(Duration::from_secs(secs)),
        }
    }
}

/// Receives the cross-cutting reset when the cache is flushed.
pub trait CacheStateSink: Send + Sync {
    /// Clear every tracked cache state, returning how many records changed.
    fn reset_cache_states(&self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
}

/// Where a key currently lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyPresence {
    pub volatile: bool,
    pub durable: bool,
}

pub struct TieredCache {
    volatile: Arc<dyn VolatileStore>,
    durable: DurableStore,
    policy: CachePolicy,
    sink: Option<Arc<dyn CacheStateSink>>,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("durable", &self.durable)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TieredCache {
    pub fn new(volatile: Arc<dyn VolatileStore>, durable: DurableStore, policy: CachePolicy) -> Self {
        Self {
            volatile,
            durable,
            policy,
            sink: None,
        }
    }

    /// Register who gets their cache states reset on [`flush`](Self::flush).
    pub fn with_state_sink(mut self, sink: Arc<dyn CacheStateSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn volatile(&self) -> &dyn VolatileStore {
        self.volatile.as_ref()
    }

    pub fn durable(&self) -> &DurableStore {
        &self.durable
    }

    /// Durable file names, rebuilt from disk when the volatile copy is missing.
    pub fn manifest(&self) -> CacheResult<Vec<String>> {
        let Some(bytes) = self.volatile.get(MANIFEST_KEY)? else {
            return self.rebuild_manifest();
        };
        match bincode::serde::decode_from_slice::<Vec<String>, _>(
            &bytes,
            bincode::config::standard(),
        ) {
            Ok((files, _)) => Ok(files),
            Err(e) => {
                warn!(error = %e, "Unreadable cache manifest, rebuilding");
                self.rebuild_manifest()
            }
        }
    }

    /// Re-list the durable directory and store the result as the manifest.
    pub fn rebuild_manifest(&self) -> CacheResult<Vec<String>> {
        let files = self.durable.list_filenames()?;
        self.store_manifest(&files)?;
        debug!(files = files.len(), "Rebuilt cache manifest");
        Ok(files)
    }

    fn store_manifest(&self, files: &[String]) -> CacheResult<()> {
        let bytes = bincode::serde::encode_to_vec(files, bincode::config::standard())?;
        self.volatile.set(MANIFEST_KEY, &bytes, None)
    }

    /// Whether the manifest lists `key`, rebuilding once on a miss.
    fn durable_has(&self, key: &str) -> CacheResult<bool> {
        let filename = DurableStore::filename(key);
        if self.manifest()?.contains(&filename) {
            return Ok(true);
        }
        let found = self.rebuild_manifest()?.contains(&filename);
        if found {
            warn!(key, "Manifest was missing a durable entry");
        }
        Ok(found)
    }

    fn check_key(key: &str) -> CacheResult<()> {
        if key == MANIFEST_KEY {
            return Err(CacheError::ReservedKey(key.to_string()));
        }
        Ok(())
    }

    /// Look up `key`, falling through to the durable tier and promoting on a hit.
    ///
    /// Absent in both tiers is `Ok(None)`; an unreadable durable artifact is an error.
    pub fn get(&self, key: &str) -> CacheResult<Option<Payload>> {
        Self::check_key(key)?;

        if let Some(bytes) = self.volatile.get(key)? {
            debug!(key, tier = "volatile", "Cache hit");
            return Ok(Some(Payload::decode(&bytes)?));
        }

        if !self.durable_has(key)? {
            debug!(key, "Cache miss");
            return Ok(None);
        }

        let payload = match self.load_durable(key) {
            Ok(payload) => payload,
            Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(key, "Durable entry vanished, rebuilding manifest");
                self.rebuild_manifest()?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.volatile
            .set(key, &payload.encode()?, Some(self.policy.promotion_ttl))?;
        debug!(key, tier = "durable", "Cache hit, promoted");
        Ok(Some(payload))
    }

    /// [`get`](Self::get) for keys that must hold a table.
    pub fn get_table(&self, key: &str) -> CacheResult<Option<DataFrame>> {
        match self.get(key)? {
            None => Ok(None),
            Some(Payload::Table(table)) => Ok(Some(table)),
            Some(Payload::Value(_)) => Err(CacheError::FormatMismatch {
                key: key.to_string(),
            }),
        }
    }

    fn load_durable(&self, key: &str) -> CacheResult<Payload> {
        match DurableFormat::for_key(key) {
            DurableFormat::Csv => Ok(Payload::Table(self.durable.read_table(key)?)),
            DurableFormat::Binary => {
                let bytes = self.durable.read_bytes(key)?;
                Payload::decode(&bytes).map_err(|e| CacheError::Corrupt {
                    key: key.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Store `payload`: durable tier first, then the volatile mirror, then the manifest.
    ///
    /// Key constraints are checked before anything is written.
    pub fn set(&self, key: &str, payload: &Payload, ttl: CacheTtl) -> CacheResult<()> {
        Self::check_key(key)?;

        let format = DurableFormat::for_key(key);
        if payload.is_table() && !DurableFormat::accepts_table(key) {
            return Err(CacheError::MissingTableMarker {
                key: key.to_string(),
            });
        }
        if format == DurableFormat::Csv && !payload.is_table() {
            return Err(CacheError::FormatMismatch {
                key: key.to_string(),
            });
        }

        let encoded = payload.encode()?;
        match (format, payload) {
            (DurableFormat::Csv, Payload::Table(table)) => self.durable.write_table(key, table)?,
            _ => self.durable.write_bytes(key, &encoded)?,
        }

        self.volatile
            .set(key, &encoded, ttl.resolve(self.policy.default_ttl))?;

        let filename = DurableStore::filename(key);
        let mut files = self.manifest()?;
        if !files.contains(&filename) {
            files.push(filename);
            self.store_manifest(&files)?;
        }

        debug!(key, ?format, "Cache set");
        Ok(())
    }

    /// Present in either tier.
    pub fn exists(&self, key: &str) -> CacheResult<bool> {
        Self::check_key(key)?;
        if self.volatile.exists(key)? {
            return Ok(true);
        }
        self.durable_has(key)
    }

    /// Remove `key` from both tiers, then reconcile the manifest.
    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        Self::check_key(key)?;
        let removed = self.remove_both(key)?;
        self.rebuild_manifest()?;
        debug!(key, removed, "Cache delete");
        Ok(removed)
    }

    fn remove_both(&self, key: &str) -> CacheResult<bool> {
        let in_volatile = self.volatile.delete(key)?;
        let in_durable = self.durable.remove(key)?;
        Ok(in_volatile || in_durable)
    }

    /// Clear the volatile tier and every durable artifact outside the protected
    /// namespace (or all of them with `include_protected`), then reset tracked
    /// cache states. Returns the number of durable files removed.
    pub fn flush(&self, include_protected: bool) -> CacheResult<usize> {
        self.volatile.flush()?;

        let mut removed = 0;
        for filename in self.durable.list_filenames()? {
            let key = DurableStore::key_from_filename(&filename);
            if !include_protected && self.policy.is_protected(&key) {
                continue;
            }
            if self.durable.remove(&key)? {
                removed += 1;
            }
        }
        self.rebuild_manifest()?;

        if let Some(sink) = &self.sink {
            let reset = sink.reset_cache_states().map_err(CacheError::CacheState)?;
            info!(reset, "Reset saved query cache states");
        }
        info!(removed, include_protected, "Flushed cache");
        Ok(removed)
    }

    /// Every known key in either tier, manifest slot excluded.
    fn all_keys(&self) -> CacheResult<BTreeSet<String>> {
        let mut keys: BTreeSet<String> = self.volatile.keys()?.into_iter().collect();
        keys.extend(
            self.manifest()?
                .iter()
                .map(|f| DurableStore::key_from_filename(f)),
        );
        keys.remove(MANIFEST_KEY);
        Ok(keys)
    }

    /// Delete every key whose text matches the regex `pattern`; returns the deleted keys.
    pub fn delete_by_pattern(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let re = Regex::new(pattern)?;
        let mut deleted = Vec::new();
        for key in self.all_keys()? {
            if re.is_match(&key) {
                self.remove_both(&key)?;
                deleted.push(key);
            }
        }
        self.rebuild_manifest()?;
        info!(pattern, deleted = deleted.len(), "Deleted cache keys by pattern");
        Ok(deleted)
    }

    /// Remove every key belonging to the test namespace.
    pub fn delete_test_keys(&self) -> CacheResult<Vec<String>> {
        self.delete_by_pattern("TEST")
    }

    /// Known keys and where they live.
    pub fn keys_report(
        &self,
        include_protected: bool,
        include_hidden: bool,
    ) -> CacheResult<BTreeMap<String, KeyPresence>> {
        let volatile: BTreeSet<String> = self.volatile.keys()?.into_iter().collect();
        let durable: BTreeSet<String> = self
            .manifest()?
            .iter()
            .map(|f| DurableStore::key_from_filename(f))
            .collect();

        let report = volatile
            .union(&durable)
            .filter(|key| key.as_str() != MANIFEST_KEY)
            .filter(|key| include_protected || !self.policy.is_protected(key))
            .filter(|key| include_hidden || !self.policy.is_hidden(key))
            .map(|key| {
                let presence = KeyPresence {
                    volatile: volatile.contains(key),
                    durable: durable.contains(key),
                };
                (key.clone(), presence)
            })
            .collect();
        Ok(report)
    }
}
