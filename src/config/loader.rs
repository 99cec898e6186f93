// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::config::model::ConfigFile;
use crate::errors::Result;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "Devloop.toml";

/// Load a configuration file from a given path.
///
/// This only performs TOML deserialization; semantic checks happen when the
/// file is merged with the command line in [`Settings::resolve`](crate::config::Settings::resolve).
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;

    let config: ConfigFile = toml::from_str(&contents)?;
    debug!(?path, "loaded config file");

    Ok(config)
}

/// Locate and load the config file.
///
/// An explicitly requested file must exist. The default file is optional:
/// devloop runs fine from flags alone.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<ConfigFile>> {
    match explicit {
        Some(path) => load_from_path(path).map(Some),
        None => {
            let path = default_config_path();
            if path.is_file() {
                load_from_path(&path).map(Some)
            } else {
                debug!(?path, "no config file; using flags and defaults");
                Ok(None)
            }
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}
