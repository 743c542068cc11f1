//! Logging setup for binaries and tests.

use std::str::FromStr;

use tracing::Level;

use crate::config::SettingsError;

/// Install a stderr `fmt` subscriber at `level` (error, warn, info, debug or trace).
///
/// Returns `Ok(false)` when a global subscriber was already installed.
pub fn init(level: &str) -> Result<bool, SettingsError> {
    let level = Level::from_str(level)
        .map_err(|_| SettingsError::InvalidConfig(format!("unknown logging.level '{}'", level)))?;
    Ok(init_level(level))
}

pub fn init_level(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
