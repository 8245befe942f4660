//! Configuration file helpers
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Each binary owns its settings struct and resolution; this module only
//! provides the shared file lookup and typed environment parsing.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Directory under the platform config dir holding IVS files
pub const CONFIG_DIR_NAME: &str = "ivs";

/// Default config file path for `module`: `<config_dir>/ivs/<module>.toml`
pub fn config_file_path(module: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(format!("{module}.toml")))
}

/// Load a TOML settings file
///
/// An explicitly given path must exist. Without one, the default path for
/// `module` is tried and a missing file yields `T::default()`.
pub fn load_toml<T>(explicit: Option<&Path>, module: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match config_file_path(module) {
            Some(path) if path.exists() => path,
            _ => {
                tracing::debug!(module, "No config file, using defaults");
                return Ok(T::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let parsed = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), "Loaded config file");
    Ok(parsed)
}

/// Read and parse environment variable `name`
///
/// Unset or blank yields `None`; a value that does not parse is an error
/// rather than silently falling through to a lower-priority source.
pub fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?}: {e}"))),
        _ => Ok(None),
    }
}

/// Resolve one setting across the four tiers
pub fn resolve<T>(cli: Option<T>, env_name: &str, file: Option<T>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = cli {
        return Ok(value);
    }
    if let Some(value) = env_override(env_name)? {
        return Ok(value);
    }
    Ok(file.unwrap_or(default))
}
