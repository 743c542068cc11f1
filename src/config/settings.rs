//! TOML-based configuration for phenoquery.
//!
//! Supports a config file (phenoquery.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [cache]
//! directory = "${PHENOQUERY_CACHE}/files"
//! default_ttl_seconds = 7200
//! promotion_ttl_seconds = 86400
//! protected_prefix = "Task"
//! hidden_prefixes = ["analysis_view_table_row_"]
//! volatile = "sqlite"
//! volatile_path = "${HOME}/.phenoquery/volatile.db"
//!
//! [query]
//! dialect = "postgres"
//! require_declared_joins = false
//! test_namespace = false
//!
//! [logging]
//! level = "info"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub query: QuerySettings,
    pub logging: LoggingSettings,
}

/// Which volatile tier implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatileKind {
    /// In-process map; lost when the process exits.
    #[default]
    Memory,
    /// SQLite file shared between processes.
    Sqlite,
}

/// Tiered cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Durable tier root (supports ${ENV_VAR} expansion).
    pub directory: String,

    /// TTL for `set` when the caller gives none.
    pub default_ttl_seconds: u64,

    /// TTL for entries promoted from the durable tier on a volatile miss.
    pub promotion_ttl_seconds: u64,

    /// Key prefix kept by `flush` unless explicitly included.
    pub protected_prefix: String,

    /// Key prefixes left out of key reports unless explicitly included.
    pub hidden_prefixes: Vec<String>,

    pub volatile: VolatileKind,

    /// SQLite file for `volatile = "sqlite"` (supports ${ENV_VAR} expansion).
    pub volatile_path: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
            default_ttl_seconds: 60 * 60 * 2,
            promotion_ttl_seconds: 60 * 60 * 24,
            protected_prefix: "Task".to_string(),
            hidden_prefixes: vec!["analysis_view_table_row_".to_string()],
            volatile: VolatileKind::Memory,
            volatile_path: None,
        }
    }
}

fn default_cache_dir() -> String {
    dirs::cache_dir()
        .map(|d| d.join("phenoquery").join("files"))
        .unwrap_or_else(|| PathBuf::from(".phenoquery").join("files"))
        .to_string_lossy()
        .into_owned()
}

impl CacheSettings {
    /// Durable tier root with environment variables expanded.
    pub fn resolved_directory(&self) -> Result<PathBuf, SettingsError> {
        Ok(PathBuf::from(expand_env_vars(&self.directory)?))
    }

    /// Volatile SQLite path with environment variables expanded.
    pub fn resolved_volatile_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.volatile_path {
            Some(path) => Ok(PathBuf::from(expand_env_vars(path)?)),
            None => Ok(self.resolved_directory()?.join("volatile.db")),
        }
    }
}

/// Query compilation configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// SQL dialect used when rendering queries.
    pub dialect: Dialect,

    /// Reject joins that need an inferred relation instead of warning.
    pub require_declared_joins: bool,

    /// Prefix derived cache keys with `TEST::`.
    pub test_namespace: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// One of error, warn, info, debug, trace.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Where [`Settings::load`] looks, first hit wins.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(explicit) = env::var_os("PHENOQUERY_CONFIG") {
        paths.push(PathBuf::from(explicit));
    }
    paths.push(PathBuf::from("phenoquery.toml"));
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("phenoquery").join("config.toml"));
    }
    paths
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// `$PHENOQUERY_CONFIG`, then `./phenoquery.toml`, then
    /// `<config dir>/phenoquery/config.toml`, then built-in defaults.
    ///
    /// An explicit `PHENOQUERY_CONFIG` that does not exist is an error rather
    /// than a silent fallback.
    pub fn load() -> Result<Self, SettingsError> {
        let explicit = env::var_os("PHENOQUERY_CONFIG").is_some();
        for (i, path) in candidate_paths().into_iter().enumerate() {
            if path.exists() || (explicit && i == 0) {
                return Self::from_file(path);
            }
        }
        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |msg: String| -> Result<(), SettingsError> {
            Err(SettingsError::InvalidConfig(msg))
        };

        if self.cache.promotion_ttl_seconds == 0 {
            return invalid("cache.promotion_ttl_seconds must be greater than zero".into());
        }
        if self.cache.protected_prefix.is_empty() {
            return invalid("cache.protected_prefix must not be empty".into());
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return invalid(format!("unknown logging.level '{}'", self.logging.level));
        }
        Ok(())
    }
}

static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(?:\{([^}]*)\}|([A-Za-z0-9_]+))").unwrap());

/// Substitute `${VAR}` and `$VAR` from the environment. A `$` not followed
/// by a name is kept as is.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;

    for caps in ENV_REF.captures_iter(s) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        let value = env::var(name).map_err(|_| SettingsError::MissingEnvVar(name.to_string()))?;

        out.push_str(&s[last..whole.start]);
        out.push_str(&value);
        last = whole.end;
    }
    out.push_str(&s[last..]);
    Ok(out)
}
