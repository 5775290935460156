// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawConfigFile, Settings};
use crate::errors::{FlakeError, Result};

/// Load a configuration file and return the raw, unvalidated `RawConfigFile`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        FlakeError::Config(format!("reading config file at {}: {e}", path.display()))
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it into [`Settings`].
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Settings> {
    let raw_config = load_from_path(&path)?;
    Settings::try_from(raw_config)
}

/// Resolve the settings for this invocation.
///
/// - An explicit path must exist.
/// - Otherwise [`default_config_path`] is used when present.
/// - Otherwise built-in defaults apply.
pub fn resolve(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        debug!(path = %path.display(), "loading config from --config");
        return load_and_validate(path);
    }

    let default_path = default_config_path();
    if default_path.is_file() {
        debug!(path = %default_path.display(), "loading config from working directory");
        return load_and_validate(default_path);
    }

    debug!("no config file; using built-in defaults");
    Settings::try_from(RawConfigFile::default())
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("flakeloop.toml")
}
