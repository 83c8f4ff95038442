//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Logging section shared by the server and client TOML files
#[derive(Debug, Clone, serde::Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level directive (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

/// Load a TOML bootstrap file into `T`
///
/// A missing file is a configuration error; callers only invoke this when
/// the operator asked for a config file explicitly.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
}

/// Data folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file value
/// 4. OS-dependent compiled default
pub fn resolve_data_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        debug!("Data folder from command line: {}", path.display());
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            debug!("Data folder from {}: {}", env_var_name, path);
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        debug!("Data folder from config file: {}", path.display());
        return path.to_path_buf();
    }

    default_data_folder()
}

/// Get OS-dependent default data folder path
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("alcoord"))
        .unwrap_or_else(|| PathBuf::from("./alcoord_data"))
}
