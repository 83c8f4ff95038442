//! Server configuration
//!
//! Every setting resolves in the same order: command line, environment
//! (handled by clap's `env` attribute), TOML bootstrap file, built-in
//! default.

use crate::coordinator::CoordinatorSettings;
use crate::error::{Error, Result};
use alcoord_common::config::{load_toml, resolve_data_folder, LoggingConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DATA_FOLDER_ENV: &str = "ALCOORD_DATA_FOLDER";
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DATABASE_FILE: &str = "alcoord.db";

/// TOML bootstrap file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub data_folder: Option<PathBuf>,
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub balance_threshold: Option<i64>,
    pub reuse_labels: Option<bool>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(load_toml(path)?)
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub data_folder: Option<PathBuf>,
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub balance_threshold: Option<i64>,
    pub reuse_labels: bool,
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_folder: PathBuf,
    pub bind: String,
    pub port: u16,
    pub coordinator: CoordinatorSettings,
    pub log_level: Option<String>,
}

impl ServerConfig {
    pub fn resolve(cli: CliOverrides, toml: Option<TomlConfig>) -> Result<Self> {
        let toml = toml.unwrap_or_default();
        let defaults = CoordinatorSettings::default();

        let balance_threshold = cli
            .balance_threshold
            .or(toml.balance_threshold)
            .unwrap_or(defaults.balance_threshold);
        if balance_threshold < 0 {
            return Err(Error::Config(format!(
                "balance_threshold must be non-negative, got {}",
                balance_threshold
            )));
        }

        Ok(Self {
            data_folder: resolve_data_folder(
                cli.data_folder.as_deref(),
                DATA_FOLDER_ENV,
                toml.data_folder.as_deref(),
            ),
            bind: cli
                .bind
                .or(toml.bind)
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            port: cli.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            coordinator: CoordinatorSettings {
                balance_threshold,
                reuse_labels: cli.reuse_labels || toml.reuse_labels.unwrap_or(defaults.reuse_labels),
            },
            log_level: toml.logging.level,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_folder.join(DATABASE_FILE)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_given() {
        let cli = CliOverrides {
            data_folder: Some(PathBuf::from("/tmp/alcoord-test")),
            ..Default::default()
        };
        let config = ServerConfig::resolve(cli, None).unwrap();
        assert_eq!(config.listen_address(), "127.0.0.1:5000");
        assert_eq!(config.coordinator, CoordinatorSettings::default());
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/alcoord-test/alcoord.db")
        );
    }

    #[test]
    fn test_cli_beats_toml() {
        let toml: TomlConfig = toml::from_str(
            r#"
            data_folder = "/srv/alcoord"
            port = 6000
            bind = "0.0.0.0"
            balance_threshold = 3
            reuse_labels = true

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        let cli = CliOverrides {
            data_folder: Some(PathBuf::from("/cli")),
            port: Some(7000),
            ..Default::default()
        };

        let config = ServerConfig::resolve(cli, Some(toml)).unwrap();
        assert_eq!(config.data_folder, PathBuf::from("/cli"));
        assert_eq!(config.port, 7000);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.coordinator.balance_threshold, 3);
        assert!(config.coordinator.reuse_labels);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let cli = CliOverrides {
            data_folder: Some(PathBuf::from("/tmp")),
            balance_threshold: Some(-1),
            ..Default::default()
        };
        assert!(matches!(
            ServerConfig::resolve(cli, None),
            Err(Error::Config(_))
        ));
    }
}
