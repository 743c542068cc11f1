//! Configuration module for phenoquery.
//!
//! Settings are loaded once by the caller and passed explicitly to the
//! cache and compiler constructors.

mod settings;

pub use settings::{
    expand_env_vars, CacheSettings, LoggingSettings, QuerySettings, Settings, SettingsError,
    VolatileKind,
};
