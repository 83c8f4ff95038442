//! Client configuration
//!
//! Resolution order per setting: command line, environment, TOML bootstrap
//! file, built-in default. Project, model name and data directory have no
//! default and must come from one of the first three.

use crate::classifier::TrainOptions;
use crate::error::{Error, Result};
use crate::scan::{ScanSettings, DEFAULT_CHUNK_SIZE};
use crate::strategy::StrategyKind;
use alcoord_common::config::{load_toml, resolve_data_folder, LoggingConfig};
use alcoord_common::protocol::MODEL_ENDPOINT;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const OUTPUT_DIR_ENV: &str = "ALCOORD_CLIENT_OUTPUT";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_STRATEGY: StrategyKind = StrategyKind::LeastConfidence;

/// TOML bootstrap file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub project: Option<String>,
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub strategy: Option<StrategyKind>,
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub simulation: Option<bool>,
    pub batch_size: Option<usize>,
    pub jobs: Option<usize>,
    pub seed: Option<u64>,
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
    pub project: Option<String>,
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub strategy: Option<StrategyKind>,
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub simulation: bool,
    pub batch_size: Option<usize>,
    pub jobs: Option<usize>,
    pub seed: Option<u64>,
}

/// Fully resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub project: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub strategy: StrategyKind,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub simulation: bool,
    pub scan: ScanSettings,
    pub train: TrainOptions,
    pub log_level: Option<String>,
}

impl ClientConfig {
    pub fn resolve(cli: CliOverrides, toml: Option<TomlConfig>) -> Result<Self> {
        let toml = toml.unwrap_or_default();

        let project = required("project", cli.project.or(toml.project))?;
        let name = required("name", cli.name.or(toml.name))?;
        let data_dir = cli
            .data_dir
            .or(toml.data_dir)
            .ok_or_else(|| Error::Config("data_dir is required".to_string()))?;

        let chunk_size = cli
            .batch_size
            .or(toml.batch_size)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }

        let mut train = TrainOptions::default();
        if let Some(seed) = cli.seed.or(toml.seed) {
            train.seed = seed;
        }

        Ok(Self {
            project,
            name,
            host: cli
                .host
                .or(toml.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            strategy: cli.strategy.or(toml.strategy).unwrap_or(DEFAULT_STRATEGY),
            data_dir,
            output_dir: resolve_data_folder(
                cli.output_dir.as_deref(),
                OUTPUT_DIR_ENV,
                toml.output_dir.as_deref(),
            ),
            simulation: cli.simulation || toml.simulation.unwrap_or(false),
            scan: ScanSettings {
                chunk_size,
                workers: cli.jobs.or(toml.jobs).unwrap_or(0),
            },
            train,
            log_level: toml.logging.level,
        })
    }

    /// `<output-dir>/<project>.<name>`, home of the label store
    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(format!("{}.{}", self.project, self.name))
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, MODEL_ENDPOINT)
    }
}

fn required(key: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!("{} is required", key))),
    }
}
