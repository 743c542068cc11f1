//! Two-tier artifact cache.
//!
//! Artifacts (tables and plain values) are kept in a volatile tier with a
//! bounded TTL and mirrored to a durable tier of one file per key. The
//! durable tier is the backstop: a volatile miss falls through to disk and
//! promotes the artifact back into the volatile tier.
//!
//! # Durable layout
//!
//! ```text
//! {directory}/SavedQueryDataframe__42:combined__AnnotatedFeature:u=mmol%2FL.cache   (csv)
//! {directory}/SavedQuerySummaryStats__42.cache                                    (bincode)
//! ```
//!
//! In file names `_` is written `_5F` and `::` is written `__`.
//! Keys whose lowercased form contains `dataframe` (and not `intensity_data`)
//! are stored as CSV with a header row and a column type row; everything else
//! as bincode.
//!
//! # Manifest
//!
//! The set of durable file names is mirrored in the volatile tier under the
//! reserved key `CacheFiles`, and rebuilt from the directory listing whenever
//! it is missing or a lookup misses.

mod durable;
mod hash;
pub mod keys;
mod payload;
mod sqlite_store;
mod tiered;
mod volatile;

pub use durable::{DurableFormat, DurableStore};
pub use hash::spec_fingerprint;
pub use keys::{DataFrameKey, DataFrameType, KeyError, KeyParam};
pub use payload::{Datum, Payload};
pub use sqlite_store::SqliteStore;
pub use tiered::{CacheStateSink, CacheTtl, KeyPresence, TieredCache, MANIFEST_KEY};
pub use volatile::{MemoryStore, VolatileStore};

use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheSettings, VolatileKind};

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to encode cache entry: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Failed to decode cache entry: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Tables can only be cached under keys containing 'dataframe': {key}")]
    MissingTableMarker { key: String },

    #[error("Key {key} is stored as CSV and only accepts tables")]
    FormatMismatch { key: String },

    #[error("'{0}' is reserved for the cache manifest")]
    ReservedKey(String),

    #[error("Corrupt durable cache entry {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Failed to reset cache states: {0}")]
    CacheState(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::SettingsError),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Expiry and namespace rules for a [`TieredCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub default_ttl: Duration,
    pub promotion_ttl: Duration,
    pub protected_prefix: String,
    pub hidden_prefixes: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from_settings(&CacheSettings::default())
    }
}

impl CachePolicy {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            default_ttl: Duration::from_secs(settings.default_ttl_seconds),
            promotion_ttl: Duration::from_secs(settings.promotion_ttl_seconds),
            protected_prefix: settings.protected_prefix.clone(),
            hidden_prefixes: settings.hidden_prefixes.clone(),
        }
    }

    pub fn is_protected(&self, key: &str) -> bool {
        key.starts_with(&self.protected_prefix)
    }

    pub fn is_hidden(&self, key: &str) -> bool {
        self.hidden_prefixes.iter().any(|p| key.contains(p.as_str()))
    }
}

/// Build a cache from settings: the configured volatile tier over the durable directory.
pub fn open(settings: &CacheSettings) -> CacheResult<TieredCache> {
    let volatile: Arc<dyn VolatileStore> = match settings.volatile {
        VolatileKind::Memory => Arc::new(MemoryStore::new()),
        VolatileKind::Sqlite => Arc::new(SqliteStore::open(settings.resolved_volatile_path()?)?),
    };
    let durable = DurableStore::open(settings.resolved_directory()?)?;
    Ok(TieredCache::new(
        volatile,
        durable,
        CachePolicy::from_settings(settings),
    ))
}
